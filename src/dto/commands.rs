//! Validated business payloads submitted from the control surfaces.

use validator::Validate;

/// An audience email before relay to the game.
#[derive(Debug, Clone, Validate)]
pub struct EmailRequest {
    /// Email subject; must not be blank.
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub subject: String,
    /// Email body; must not be blank.
    #[validate(length(min = 1, message = "body must not be empty"))]
    pub body: String,
    /// Requested sender persona, exactly as the user wrote it. Validated
    /// against the fixed roster by the email service, which decides whether
    /// to reject or coerce it depending on the origin.
    pub persona: Option<String>,
}

/// An audience shop purchase before relay to the game.
#[derive(Debug, Clone, Validate)]
pub struct ShopRequest {
    /// Item identifier; must not be blank.
    #[validate(length(min = 1, message = "item must not be empty"))]
    pub item: String,
    /// Quantity ordered; at least one.
    #[validate(range(min = 1, message = "amount must be at least 1"))]
    pub amount: u32,
}

/// An audience hint before relay to the game.
#[derive(Debug, Clone, Validate)]
pub struct HintRequest {
    /// Hint category understood by the game.
    pub kind: String,
    /// Hint text; must not be blank.
    #[validate(length(min = 1, message = "hint text must not be empty"))]
    pub text: String,
}

/// Field markers recognised inside a chat email command.
const FIELD_MARKERS: [&str; 3] = ["subject:", "body:", "user:"];

/// Extract the value following `marker` in `content`, stopping at the next
/// recognised field marker. Returns the value and the unconsumed remainder.
/// Markers match case-insensitively; values keep their original case.
fn find_field(content: &str, marker: &str) -> Option<(String, String)> {
    let lower = content.to_ascii_lowercase();
    let start = lower.find(marker)?;
    let rest = &content[start + marker.len()..];
    let rest_lower = &lower[start + marker.len()..];

    let next = FIELD_MARKERS
        .iter()
        .filter_map(|candidate| rest_lower.find(candidate))
        .min();

    match next {
        Some(pos) => Some((rest[..pos].trim().to_string(), rest[pos..].to_string())),
        None => Some((rest.trim().to_string(), String::new())),
    }
}

/// Whether `content` contains any recognised field marker.
pub fn has_field_markers(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    FIELD_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Parse the body of a chat `!email` command.
///
/// Accepts `subject:<text> body:<text>` with an optional trailing
/// `user:<persona>`. Returns `None` when either mandatory field is missing
/// or blank.
pub fn parse_email_command(content: &str) -> Option<EmailRequest> {
    let (subject, rest) = find_field(content, "subject:")?;
    if subject.is_empty() {
        return None;
    }

    let search_in = if rest.is_empty() { content } else { &rest };
    let (body, rest) = find_field(search_in, "body:")?;
    if body.is_empty() {
        return None;
    }

    let persona = find_field(&rest, "user:")
        .map(|(value, _)| value)
        .filter(|value| !value.is_empty());

    Some(EmailRequest {
        subject,
        body,
        persona,
    })
}

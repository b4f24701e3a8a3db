//! Validation helpers for DTOs.

/// In-game sender personas accepted on relayed emails.
pub const EMAIL_PERSONAS: &[&str] = &[
    "Dr_Bao", "Prof_Lea", "Auto", "Dr_Max", "Dr_Ken", "Dr_Ena", "Dr_Ula", "Dr_Ler", "user",
    "Dr_Noa",
];

/// Whether `persona` is one of the fixed in-game senders.
pub fn is_valid_persona(persona: &str) -> bool {
    EMAIL_PERSONAS.contains(&persona)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_personas_are_accepted() {
        assert!(is_valid_persona("Dr_Bao"));
        assert!(is_valid_persona("user"));
        assert!(is_valid_persona("Prof_Lea"));
    }

    #[test]
    fn unknown_personas_are_rejected() {
        assert!(!is_valid_persona("dr_bao")); // case-sensitive
        assert!(!is_valid_persona("Dr_Who"));
        assert!(!is_valid_persona(""));
    }
}

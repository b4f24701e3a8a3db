//! Persisted circuit breaker for the external panel session.

use std::{fs, io::ErrorKind, path::PathBuf, time::Duration};

use tracing::{info, warn};

/// Tuning knobs for the panel circuit breaker.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// File persisting the suppression deadline across restarts.
    pub path: PathBuf,
    /// Connection attempts tolerated before tripping.
    pub max_attempts: u32,
    /// Cooldown between individual attempts.
    pub attempt_cooldown: Duration,
    /// Suppression window once tripped.
    pub down_window: Duration,
}

/// What to do after a failed connection attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Wait out the per-attempt cooldown, then try again.
    Retry {
        /// How long to wait before the next attempt.
        after: Duration,
    },
    /// The attempt budget is exhausted; the server is presumed down.
    Tripped {
        /// Unix seconds until which attempts are suppressed.
        until: i64,
    },
}

/// Reconnect-attempt accounting with a persisted trip deadline.
///
/// All decisions are made against an injected `now` (unix seconds) so the
/// arithmetic stays testable without touching the clock.
pub struct PanelBreaker {
    config: BreakerConfig,
    attempts: u32,
    cooldown_until: Option<i64>,
    server_down_until: Option<i64>,
}

impl PanelBreaker {
    /// Load the breaker, picking up a previously persisted deadline.
    ///
    /// A missing file means no suppression; a garbled one is ignored with a
    /// warning. A deadline already in the past is discarded.
    pub fn load(config: BreakerConfig, now: i64) -> Self {
        let server_down_until = match fs::read_to_string(&config.path) {
            Ok(contents) => match contents.trim().parse::<i64>() {
                Ok(deadline) if deadline > now => {
                    info!(
                        path = %config.path.display(),
                        deadline,
                        "panel suppression deadline restored from disk"
                    );
                    Some(deadline)
                }
                Ok(_) => None,
                Err(err) => {
                    warn!(
                        path = %config.path.display(),
                        error = %err,
                        "ignoring garbled panel suppression file"
                    );
                    None
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                warn!(
                    path = %config.path.display(),
                    error = %err,
                    "failed to read panel suppression file"
                );
                None
            }
        };

        Self {
            config,
            attempts: 0,
            cooldown_until: None,
            server_down_until,
        }
    }

    /// Unix second until which connection attempts are suppressed, if any.
    ///
    /// Consults both the per-attempt cooldown and the trip deadline. A trip
    /// deadline that has elapsed is cleared here, which also resets the
    /// attempt counter for the new window.
    pub fn suppressed_until(&mut self, now: i64) -> Option<i64> {
        if let Some(deadline) = self.server_down_until {
            if now < deadline {
                return Some(deadline);
            }
            info!("panel suppression window elapsed; attempts resume");
            self.server_down_until = None;
            self.attempts = 0;
            self.remove_file();
        }

        match self.cooldown_until {
            Some(deadline) if now < deadline => Some(deadline),
            _ => None,
        }
    }

    /// Account for a failed connection attempt.
    pub fn record_failure(&mut self, now: i64) -> FailureOutcome {
        self.attempts += 1;
        if self.attempts >= self.config.max_attempts {
            let until = now + self.config.down_window.as_secs() as i64;
            self.server_down_until = Some(until);
            self.attempts = 0;
            self.cooldown_until = None;
            self.persist(until);
            FailureOutcome::Tripped { until }
        } else {
            let after = self.config.attempt_cooldown;
            self.cooldown_until = Some(now + after.as_secs() as i64);
            FailureOutcome::Retry { after }
        }
    }

    /// Clear all counters after a successful (verified) session.
    pub fn record_success(&mut self) {
        self.attempts = 0;
        self.cooldown_until = None;
        self.server_down_until = None;
        self.remove_file();
    }

    fn persist(&self, deadline: i64) {
        if let Err(err) = fs::write(&self.config.path, deadline.to_string()) {
            warn!(
                path = %self.config.path.display(),
                error = %err,
                "failed to persist panel suppression deadline"
            );
        }
    }

    fn remove_file(&self) {
        match fs::remove_file(&self.config.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(
                    path = %self.config.path.display(),
                    error = %err,
                    "failed to remove panel suppression file"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &tempfile::TempDir) -> BreakerConfig {
        BreakerConfig {
            path: dir.path().join("panel_down_until.txt"),
            max_attempts: 3,
            attempt_cooldown: Duration::from_secs(30),
            down_window: Duration::from_secs(3600),
        }
    }

    #[test]
    fn failures_below_cap_schedule_retries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut breaker = PanelBreaker::load(config(&dir), 1000);

        assert_eq!(
            breaker.record_failure(1000),
            FailureOutcome::Retry {
                after: Duration::from_secs(30)
            }
        );
        assert_eq!(breaker.suppressed_until(1010), Some(1030));
        assert_eq!(breaker.suppressed_until(1031), None);
    }

    #[test]
    fn exhausted_attempts_trip_and_persist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(&dir);
        let mut breaker = PanelBreaker::load(cfg.clone(), 1000);

        breaker.record_failure(1000);
        breaker.record_failure(1040);
        let outcome = breaker.record_failure(1080);
        assert_eq!(outcome, FailureOutcome::Tripped { until: 1080 + 3600 });

        // Suppressed for the full window.
        assert_eq!(breaker.suppressed_until(1081), Some(4680));
        assert_eq!(breaker.suppressed_until(4679), Some(4680));

        // And the deadline survives a restart.
        let persisted = fs::read_to_string(&cfg.path).expect("deadline file");
        assert_eq!(persisted.trim(), "4680");
        let mut restarted = PanelBreaker::load(cfg, 2000);
        assert_eq!(restarted.suppressed_until(2000), Some(4680));
    }

    #[test]
    fn window_elapse_resets_the_counter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut breaker = PanelBreaker::load(config(&dir), 0);

        for t in [0, 40, 80] {
            breaker.record_failure(t);
        }
        assert!(breaker.suppressed_until(100).is_some());

        // Window over: attempts resume from a clean slate, so the next two
        // failures stay below the cap.
        assert_eq!(breaker.suppressed_until(80 + 3600), None);
        assert!(matches!(
            breaker.record_failure(80 + 3600),
            FailureOutcome::Retry { .. }
        ));
        assert!(matches!(
            breaker.record_failure(80 + 3700),
            FailureOutcome::Retry { .. }
        ));
    }

    #[test]
    fn success_clears_state_and_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(&dir);
        let mut breaker = PanelBreaker::load(cfg.clone(), 0);

        for t in [0, 40, 80] {
            breaker.record_failure(t);
        }
        assert!(cfg.path.exists());

        breaker.record_success();
        assert_eq!(breaker.suppressed_until(81), None);
        assert!(!cfg.path.exists());
    }

    #[test]
    fn stale_and_garbled_files_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(&dir);

        fs::write(&cfg.path, "500").expect("write");
        let mut stale = PanelBreaker::load(cfg.clone(), 1000);
        assert_eq!(stale.suppressed_until(1000), None);

        fs::write(&cfg.path, "not-a-number").expect("write");
        let mut garbled = PanelBreaker::load(cfg, 1000);
        assert_eq!(garbled.suppressed_until(1000), None);
    }
}

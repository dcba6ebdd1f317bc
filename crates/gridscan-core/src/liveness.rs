//! Liveness classification from last-update timestamps.
//!
//! Entities report to the explorer periodically; the age of the last
//! report decides whether an entity is considered up. Two threshold
//! shapes exist: a flat cutoff used for aggregate online counts, and a
//! graded one with a "likely down" band used for per-entity status.

use serde::{Deserialize, Serialize};

/// Classified status of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Online,
    LikelyDown,
    Down,
}

/// Minutes used by the flat cutoff for aggregate online counts.
pub const DEFAULT_ONLINE_CUTOFF_MINUTES: f64 = 20.0;

/// Threshold policy for liveness classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum LivenessPolicy {
    /// Online strictly below the cutoff, down otherwise.
    Cutoff { online_below_minutes: f64 },
    /// Online below `up_below`, undecided up to and including
    /// `likely_down_above`, likely down below `down_from`, down after.
    Graded {
        up_below: f64,
        likely_down_above: f64,
        down_from: f64,
    },
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self::Cutoff {
            online_below_minutes: DEFAULT_ONLINE_CUTOFF_MINUTES,
        }
    }
}

impl LivenessPolicy {
    /// The graded policy with the 15/16/20 minute bands.
    pub fn graded() -> Self {
        Self::Graded {
            up_below: 15.0,
            likely_down_above: 16.0,
            down_from: 20.0,
        }
    }

    /// Classify an entity last updated at `last_updated` as of `now`.
    ///
    /// Returns `None` inside the graded policy's undecided band.
    pub fn classify(&self, last_updated: i64, now: i64) -> Option<Liveness> {
        let minutes = now.saturating_sub(last_updated) as f64 / 60.0;
        match *self {
            Self::Cutoff {
                online_below_minutes,
            } => {
                if minutes < online_below_minutes {
                    Some(Liveness::Online)
                } else {
                    Some(Liveness::Down)
                }
            }
            Self::Graded {
                up_below,
                likely_down_above,
                down_from,
            } => {
                if minutes < up_below {
                    Some(Liveness::Online)
                } else if minutes <= likely_down_above {
                    None
                } else if minutes < down_from {
                    Some(Liveness::LikelyDown)
                } else {
                    Some(Liveness::Down)
                }
            }
        }
    }

    /// Classify, keeping `previous` when the result is undecided.
    pub fn classify_or(&self, last_updated: i64, now: i64, previous: Liveness) -> Liveness {
        self.classify(last_updated, now).unwrap_or(previous)
    }

    /// Whether the entity counts as online. Undecided counts as offline.
    pub fn is_online(&self, last_updated: i64, now: i64) -> bool {
        self.classify(last_updated, now) == Some(Liveness::Online)
    }
}

/// Binary classification with the 20-minute cutoff.
pub fn classify(last_updated: i64, now: i64) -> Liveness {
    LivenessPolicy::default()
        .classify(last_updated, now)
        .unwrap_or(Liveness::Down)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn ten_minutes_is_online() {
        assert_eq!(classify(NOW - 10 * 60, NOW), Liveness::Online);
    }

    #[test]
    fn twenty_five_minutes_is_down() {
        assert_eq!(classify(NOW - 25 * 60, NOW), Liveness::Down);
    }

    #[test]
    fn cutoff_boundary_is_exclusive() {
        assert_eq!(classify(NOW - 20 * 60 + 1, NOW), Liveness::Online);
        assert_eq!(classify(NOW - 20 * 60, NOW), Liveness::Down);
    }

    #[test]
    fn future_timestamps_are_online() {
        assert_eq!(classify(NOW + 300, NOW), Liveness::Online);
    }

    #[test]
    fn graded_bands() {
        let policy = LivenessPolicy::graded();
        assert_eq!(policy.classify(NOW - 14 * 60, NOW), Some(Liveness::Online));
        assert_eq!(policy.classify(NOW - 15 * 60, NOW), None);
        assert_eq!(policy.classify(NOW - 16 * 60, NOW), None);
        assert_eq!(policy.classify(NOW - 17 * 60, NOW), Some(Liveness::LikelyDown));
        assert_eq!(policy.classify(NOW - 20 * 60, NOW), Some(Liveness::Down));
        assert_eq!(policy.classify(NOW - 3 * 3600, NOW), Some(Liveness::Down));
    }

    #[test]
    fn graded_dead_zone_keeps_previous_state() {
        let policy = LivenessPolicy::graded();
        let at = NOW - 15 * 60 - 30;
        assert_eq!(policy.classify_or(at, NOW, Liveness::Online), Liveness::Online);
        assert_eq!(policy.classify_or(at, NOW, Liveness::Down), Liveness::Down);
        assert!(!policy.is_online(at, NOW));
    }

    #[test]
    fn extreme_timestamps_saturate() {
        assert_eq!(classify(i64::MIN, NOW), Liveness::Down);
        assert_eq!(classify(i64::MAX, NOW), Liveness::Online);
        assert_eq!(
            LivenessPolicy::graded().classify(i64::MIN, i64::MAX),
            Some(Liveness::Down)
        );
    }

    #[test]
    fn custom_cutoff() {
        let policy = LivenessPolicy::Cutoff {
            online_below_minutes: 5.0,
        };
        assert!(policy.is_online(NOW - 4 * 60, NOW));
        assert!(!policy.is_online(NOW - 6 * 60, NOW));
    }
}

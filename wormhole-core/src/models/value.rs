use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Content of a cleared (or never written) value
pub const EMPTY_CONTENT: &str = "";

/// Observable state of the shared value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueState {
    /// Nothing written, cleared by a client, or expired
    Empty,
    /// Holding non-empty content with an armed expiry timer
    Set,
}

/// Snapshot of the single synchronized value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedValue {
    pub content: String,
    /// Bumped on every accepted write or clear
    pub version: u64,
    /// Monotonic time of the last write or clear
    pub last_write_at: Instant,
    /// Wall-clock time of the last write or clear
    pub updated_at: DateTime<Utc>,
}

impl SharedValue {
    #[must_use]
    pub fn initial(now: Instant, utc_now: DateTime<Utc>) -> Self {
        Self {
            content: EMPTY_CONTENT.to_string(),
            version: 0,
            last_write_at: now,
            updated_at: utc_now,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    #[must_use]
    pub fn state(&self) -> ValueState {
        if self.is_empty() {
            ValueState::Empty
        } else {
            ValueState::Set
        }
    }

    /// True if `other` carries a newer version than `self`
    #[must_use]
    pub const fn is_superseded_by(&self, other: &Self) -> bool {
        other.version > self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_value_is_empty() {
        let value = SharedValue::initial(Instant::now(), Utc::now());

        assert_eq!(value.content, "");
        assert_eq!(value.version, 0);
        assert_eq!(value.state(), ValueState::Empty);
    }

    #[tokio::test]
    async fn test_state_follows_content() {
        let mut value = SharedValue::initial(Instant::now(), Utc::now());
        value.content = "123".to_string();
        value.version = 1;

        assert_eq!(value.state(), ValueState::Set);
        assert!(!value.is_empty());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ValueState::Empty).unwrap(), "\"empty\"");
        assert_eq!(serde_json::to_string(&ValueState::Set).unwrap(), "\"set\"");
    }
}

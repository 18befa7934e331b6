//! Room configuration
//!
//! Tunables for the client-side session room: leaderboard poll cadence, the
//! capacity of the event channel handed to the UI layer, and the reconnect
//! policy for the broadcast subscription. Values come from the environment
//! with sensible defaults; builder setters cover programmatic overrides.

use std::time::Duration;

/// Bounded exponential backoff for (re)subscribing to the broadcast topic.
///
/// `max_attempts` counts every try including the first; setting it to 1
/// restores plain single-attempt behavior with no retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl ReconnectPolicy {
    /// One try, no retries.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to sleep before retry number `retry` (1-based): the base delay
    /// doubled per retry, capped at `max_delay`.
    pub fn delay_before(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let ms = self.base_delay.as_millis().saturating_mul(1u128 << exp);
        let capped = ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// How often to pull a leaderboard snapshot between phase transitions.
    pub leaderboard_poll_interval: Duration,
    /// Capacity of the room event channel handed to the UI layer.
    pub event_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            leaderboard_poll_interval: Duration::from_secs(4),
            event_capacity: 64,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl RoomConfig {
    /// Build a config from the environment, falling back to defaults for
    /// anything unset or unparsable.
    ///
    /// Recognized variables: `LEADERBOARD_POLL_MS`, `ROOM_EVENT_CAPACITY`,
    /// `RECONNECT_ATTEMPTS`, `RECONNECT_BASE_MS`, `RECONNECT_CAP_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            leaderboard_poll_interval: std::env::var("LEADERBOARD_POLL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.leaderboard_poll_interval),
            event_capacity: std::env::var("ROOM_EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.event_capacity),
            reconnect: ReconnectPolicy {
                max_attempts: std::env::var("RECONNECT_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.reconnect.max_attempts),
                base_delay: std::env::var("RECONNECT_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.reconnect.base_delay),
                max_delay: std::env::var("RECONNECT_CAP_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.reconnect.max_delay),
            },
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.leaderboard_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "LEADERBOARD_POLL_MS",
            "ROOM_EVENT_CAPACITY",
            "RECONNECT_ATTEMPTS",
            "RECONNECT_BASE_MS",
            "RECONNECT_CAP_MS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_when_unset() {
        clear_env();
        assert_eq!(RoomConfig::from_env(), RoomConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("LEADERBOARD_POLL_MS", "1500");
        std::env::set_var("RECONNECT_ATTEMPTS", "3");
        let config = RoomConfig::from_env();
        assert_eq!(config.leaderboard_poll_interval, Duration::from_millis(1500));
        assert_eq!(config.reconnect.max_attempts, 3);
        assert_eq!(config.event_capacity, RoomConfig::default().event_capacity);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        clear_env();
        std::env::set_var("ROOM_EVENT_CAPACITY", "lots");
        std::env::set_var("RECONNECT_ATTEMPTS", "0");
        let config = RoomConfig::from_env();
        assert_eq!(config.event_capacity, RoomConfig::default().event_capacity);
        assert_eq!(
            config.reconnect.max_attempts,
            RoomConfig::default().reconnect.max_attempts
        );
        clear_env();
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::from_millis(500));
        assert_eq!(policy.delay_before(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_before(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_before(10), Duration::from_secs(8));
    }
}

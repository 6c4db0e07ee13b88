//! Public types for the stream transport client.

use std::time::Duration;

use pulseboard_protocol::constants::{
    DEFAULT_INITIAL_RECONNECT_DELAY, DEFAULT_MAX_RECONNECT_DELAY,
    DEFAULT_RECONNECT_ATTEMPT_CEILING,
};

/// State of the single transport connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Dial or handshake in progress.
    Connecting,
    /// Transport open (or mock mode active).
    Connected,
    /// No transport. Initial state.
    #[default]
    Disconnected,
    /// A transport error was observed; always followed by `Disconnected`.
    Error,
}

/// Diagnostic counters for the connection lifecycle.
///
/// All counters are monotonic except `attempting`, which carries the
/// current attempt number and resets to 0 on a successful open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub opened: u64,
    pub closed: u64,
    pub errored: u64,
    pub attempting: u32,
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Whether unexpected disconnects trigger reconnection at all.
    pub enabled: bool,
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
    /// Attempt number past which the delay saturates at `max_delay`.
    /// Attempts themselves never stop.
    pub attempt_ceiling: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: DEFAULT_INITIAL_RECONNECT_DELAY,
            max_delay: DEFAULT_MAX_RECONNECT_DELAY,
            attempt_ceiling: DEFAULT_RECONNECT_ATTEMPT_CEILING,
        }
    }
}

impl ReconnectConfig {
    /// Delay for a given attempt number (1-based):
    /// `min(max_delay, initial_delay * 2^(attempt - 1))`.
    ///
    /// Registration retries are jittered; connection backoff is not — a
    /// single dashboard client reconnecting to its one configured server
    /// has no herd to thunder with.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.initial_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn reconnect_defaults() {
        let config = ReconnectConfig::default();
        assert!(config.enabled);
        assert_eq!(config.initial_delay, Duration::from_millis(5000));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.attempt_ceiling, 5);
    }

    #[test]
    fn backoff_sequence_caps_at_max_delay() {
        let config = ReconnectConfig::default();
        let expected_ms = [5000u64, 10000, 20000, 40000, 60000, 60000, 60000];
        for (i, &ms) in expected_ms.iter().enumerate() {
            let delay = config.delay_for_attempt((i + 1) as u32);
            assert_eq!(
                delay,
                Duration::from_millis(ms),
                "attempt {} should delay {ms}ms",
                i + 1
            );
        }
    }

    #[test]
    fn backoff_survives_huge_attempt_numbers() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(u32::MAX), config.max_delay);
        assert_eq!(config.delay_for_attempt(64), config.max_delay);
    }

    #[test]
    fn backoff_attempt_zero_behaves_like_one() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), config.delay_for_attempt(1));
    }
}

//! Reconnect policy
//!
//! Reconnects run at a constant delay for as long as the session is
//! active. There is deliberately no attempt cap and no backoff: the agent
//! is a local process that is either up or restarting, and the display
//! should resume as soon as it comes back.

use std::time::Duration;

/// Default delay between a disconnect and the next connection attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Reconnect policy for a stream session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reconnect after the stream ends or fails
    pub enabled: bool,
    /// Wait before each reconnect
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Reconnect indefinitely, waiting `delay` between attempts
    pub fn constant(delay: Duration) -> Self {
        Self {
            enabled: true,
            delay,
        }
    }

    /// Never reconnect; the session ends with its first connection
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            delay: Duration::ZERO,
        }
    }

    /// Build from the `autoReconnect` / `reconnectDelayMs` settings
    pub fn from_settings(auto_reconnect: bool, reconnect_delay_ms: u64) -> Self {
        Self {
            enabled: auto_reconnect,
            delay: Duration::from_millis(reconnect_delay_ms),
        }
    }

    /// Delay before the next attempt, or `None` if the session should stop
    pub fn next_delay(&self) -> Option<Duration> {
        self.enabled.then_some(self.delay)
    }
}

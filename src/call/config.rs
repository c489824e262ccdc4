//! Call registry configuration

use std::time::Duration;

/// What to do when a user who is already ringing or in a call starts another
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallerBusyPolicy {
    /// Fail with `Busy`: a user is party to at most one call
    #[default]
    Reject,
    /// Only the callee is checked; a caller may ring several users
    Allow,
}

/// Configuration for the call registry
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Busy handling for the calling side
    pub caller_busy_policy: CallerBusyPolicy,

    /// Ringing calls older than this are reclaimed
    pub ring_timeout: Duration,

    /// Active calls without signaling activity for this long are reclaimed
    pub idle_timeout: Duration,

    /// How often the cleanup task runs
    pub cleanup_interval: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            caller_busy_policy: CallerBusyPolicy::Reject,
            ring_timeout: Duration::from_secs(45),
            idle_timeout: Duration::from_secs(4 * 60 * 60),
            cleanup_interval: Duration::from_secs(15),
        }
    }
}

impl CallConfig {
    /// Set the caller busy policy
    pub fn caller_busy_policy(mut self, policy: CallerBusyPolicy) -> Self {
        self.caller_busy_policy = policy;
        self
    }

    /// Set the ring timeout
    pub fn ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = timeout;
        self
    }

    /// Set the idle timeout for active calls
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

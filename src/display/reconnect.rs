use std::fmt;
use std::time::Duration;

/// Connection status shown by a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub factor: f64,
    /// Consecutive failures before endpoint discovery runs. Zero disables it.
    pub discovery_after: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(30_000),
            factor: 1.5,
            discovery_after: 3,
        }
    }
}

/// What to do after a failed or dropped connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPlan {
    pub delay: Duration,
    /// Failure count this plan responds to, starting at 1.
    pub attempt: u32,
    /// Run endpoint discovery before reconnecting.
    pub discover: bool,
}

/// Consecutive-failure counter producing exponential delays.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Called when a channel opens.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// `min(base * factor^attempts, max)`.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let scaled = self.policy.base.as_secs_f64() * self.policy.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.policy.max.as_secs_f64() {
            self.policy.max
        } else {
            Duration::from_secs_f64(scaled)
        }
    }

    /// Records a failure. The counter resets to zero whenever discovery is due.
    pub fn on_failure(&mut self) -> ReconnectPlan {
        let delay = self.delay_for(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        let attempt = self.attempts;
        let discover = self.policy.discovery_after > 0 && self.attempts >= self.policy.discovery_after;
        if discover {
            self.attempts = 0;
        }
        ReconnectPlan {
            delay,
            attempt,
            discover,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

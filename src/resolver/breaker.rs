//! Circuit breaker gating Tier-2 auto-apply
//!
//! Tracks consecutive failed auto-applies. Once the threshold is reached the
//! breaker opens and refuses auto-apply until the cooldown has elapsed, then
//! admits a single probe whose outcome closes or reopens it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Consecutive failures that open the breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Time the breaker stays open before admitting a probe
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Point-in-time view of the breaker for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    /// Seconds left before an open breaker admits a probe
    pub remaining_cooldown_secs: Option<u64>,
}

/// Three-state breaker over auto-apply outcomes
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    failure_threshold: u32,
    cooldown: Duration,
    last_failure_time: Option<Instant>,
    /// When the outstanding half-open probe was admitted
    probe_started: Option<Instant>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            last_failure_time: None,
            probe_started: None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether an auto-apply may proceed now
    pub fn check_permission(&mut self) -> bool {
        self.check_permission_at(Instant::now())
    }

    /// `check_permission` against an explicit clock reading
    pub fn check_permission_at(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooled_down = self
                    .last_failure_time
                    .map(|last| now.saturating_duration_since(last) > self.cooldown)
                    .unwrap_or(true);

                if cooled_down {
                    info!("Circuit breaker moving to HALF_OPEN, admitting one probe");
                    self.state = CircuitState::HalfOpen;
                    self.probe_started = Some(now);
                    true
                } else {
                    debug!("Circuit breaker OPEN, auto-apply refused");
                    false
                }
            }
            CircuitState::HalfOpen => {
                // A probe whose outcome never arrived expires after one cooldown
                let probe_pending = self
                    .probe_started
                    .map(|started| now.saturating_duration_since(started) <= self.cooldown)
                    .unwrap_or(false);

                if probe_pending {
                    debug!("Circuit breaker HALF_OPEN, probe already in flight");
                    false
                } else {
                    self.probe_started = Some(now);
                    true
                }
            }
        }
    }

    /// Record a successful auto-apply
    pub fn record_success(&mut self) {
        if self.state == CircuitState::HalfOpen {
            info!("Circuit breaker probe succeeded, moving to CLOSED");
            self.state = CircuitState::Closed;
            self.last_failure_time = None;
        } else if self.consecutive_failures > 0 {
            debug!(
                "Circuit breaker resetting failure count from {}",
                self.consecutive_failures
            );
        }

        self.consecutive_failures = 0;
        self.probe_started = None;
    }

    /// Record a failed auto-apply
    pub fn record_failure(&mut self) {
        self.record_failure_at(Instant::now());
    }

    /// `record_failure` against an explicit clock reading
    pub fn record_failure_at(&mut self, now: Instant) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_time = Some(now);
        self.probe_started = None;

        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.failure_threshold {
                    warn!(
                        "Circuit breaker OPENING after {} consecutive failures",
                        self.consecutive_failures
                    );
                    self.state = CircuitState::Open;
                } else {
                    debug!(
                        "Circuit breaker failure {}/{}",
                        self.consecutive_failures, self.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit breaker probe failed, back to OPEN");
                self.state = CircuitState::Open;
            }
            CircuitState::Open => {
                debug!("Circuit breaker additional failure while OPEN");
            }
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let remaining_cooldown_secs = match (self.state, self.last_failure_time) {
            (CircuitState::Open, Some(last)) => {
                Some(self.cooldown.saturating_sub(last.elapsed()).as_secs())
            }
            _ => None,
        };

        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            failure_threshold: self.failure_threshold,
            cooldown_secs: self.cooldown.as_secs(),
            remaining_cooldown_secs,
        }
    }
}

//! Circuit breaker with half-open probe protection
//!
//! Guards each upstream client against a flapping provider. In half-open
//! state only one probe request is admitted at a time so a recovering
//! backend is not hit by a thundering herd.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Circuit breaker settings
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Successes needed in half-open state to close the circuit
    pub success_threshold: u32,
    /// How long the circuit stays open before admitting a probe
    pub timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
    // single-probe token for the half-open state
    half_open_allowed: bool,
}

/// Circuit breaker guarding one upstream client.
///
/// All operations are O(1) under a single mutex and never perform I/O.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
                half_open_allowed: true,
            }),
        }
    }

    /// Whether a request may proceed. Transitions open -> half-open once the
    /// timeout has elapsed; in half-open, admits exactly one in-flight probe.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.config.timeout)
                    .unwrap_or(false);
                if !elapsed {
                    return false;
                }
                debug!("circuit breaker transitioning from open to half-open");
                inner.state = CircuitState::HalfOpen;
                inner.successes = 0;
                inner.half_open_allowed = true;
                Self::take_probe(&mut inner)
            }
            CircuitState::HalfOpen => Self::take_probe(&mut inner),
        }
    }

    fn take_probe(inner: &mut BreakerInner) -> bool {
        if inner.half_open_allowed {
            inner.half_open_allowed = false;
            true
        } else {
            false
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                inner.half_open_allowed = true;
                if inner.successes >= self.config.success_threshold {
                    debug!("circuit breaker closing after successful probes");
                    inner.state = CircuitState::Closed;
                    inner.failures = 0;
                }
            }
            CircuitState::Closed => inner.failures = 0,
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();

        inner.failures += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.failures >= self.config.failure_threshold {
                    warn!(
                        failures = inner.failures,
                        "circuit breaker opening after consecutive failures"
                    );
                    inner.state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                debug!("circuit breaker re-opening after failed probe");
                inner.state = CircuitState::Open;
                inner.successes = 0;
                inner.half_open_allowed = true;
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

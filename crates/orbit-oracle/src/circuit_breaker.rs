//! Circuit breaker for oracle calls.
//!
//! A stalled or failing oracle stalls the whole search, so repeated failures
//! open the circuit and calls fail fast until the recovery timeout elapses.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Clone, Debug, PartialEq)]
pub enum CircuitState {
    /// Normal operation, counting consecutive failures
    Closed { failures: u32 },
    /// Failing fast
    Open { opened_at: Instant },
    /// Probing recovery
    HalfOpen { success_count: u32 },
}

/// Circuit breaker shared by clones.
#[derive(Clone, Debug)]
pub struct CircuitBreaker {
    state: Arc<Mutex<CircuitState>>,
    failure_threshold: u32,
    recovery_timeout: Duration,
    success_threshold: u32,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(failure_threshold: u32, recovery_timeout: Duration, success_threshold: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(CircuitState::Closed { failures: 0 })),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            success_threshold: success_threshold.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check if a call is allowed.
    pub fn allow(&self) -> bool {
        let mut state = self.lock();
        match *state {
            CircuitState::Closed { .. } | CircuitState::HalfOpen { .. } => true,
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() >= self.recovery_timeout {
                    *state = CircuitState::HalfOpen { success_count: 0 };
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call.
    pub fn success(&self) {
        let mut state = self.lock();
        match *state {
            CircuitState::HalfOpen { success_count } => {
                let new_count = success_count + 1;
                *state = if new_count >= self.success_threshold {
                    CircuitState::Closed { failures: 0 }
                } else {
                    CircuitState::HalfOpen {
                        success_count: new_count,
                    }
                };
            }
            CircuitState::Closed { .. } => *state = CircuitState::Closed { failures: 0 },
            CircuitState::Open { .. } => {}
        }
    }

    /// Record a failed call.
    pub fn failure(&self) {
        let mut state = self.lock();
        match *state {
            CircuitState::Closed { failures } => {
                let failures = failures + 1;
                *state = if failures >= self.failure_threshold {
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    }
                } else {
                    CircuitState::Closed { failures }
                };
            }
            CircuitState::HalfOpen { .. } => {
                *state = CircuitState::Open {
                    opened_at: Instant::now(),
                };
            }
            CircuitState::Open { .. } => {}
        }
    }

    /// Current state for monitoring.
    pub fn state(&self) -> CircuitState {
        self.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), CircuitState::Open { .. })
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60), 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60), 1);
        breaker.failure();
        assert!(breaker.allow());
        breaker.failure();
        assert!(breaker.is_open());
        assert!(!breaker.allow());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60), 1);
        breaker.failure();
        breaker.success();
        breaker.failure();
        assert_eq!(breaker.state(), CircuitState::Closed { failures: 1 });
    }

    #[test]
    fn test_half_open_recovery() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0), 2);
        breaker.failure();
        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen { success_count: 0 });

        breaker.success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen { success_count: 1 });
        breaker.success();
        assert_eq!(breaker.state(), CircuitState::Closed { failures: 0 });
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0), 2);
        breaker.failure();
        assert!(breaker.allow());
        breaker.failure();
        assert!(breaker.is_open());
    }
}

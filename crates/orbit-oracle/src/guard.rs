//! Timeout and circuit-breaker wrapper for any oracle.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use orbit_models::{DetectedObject, RawImage};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OracleError, OracleResult};
use crate::oracle::DetectionOracle;

/// Guard configuration.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Upper bound on a single oracle call, retries included
    pub call_timeout: Duration,
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing
    pub recovery_timeout: Duration,
    /// Successful probes needed to close the circuit again
    pub success_threshold: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(300),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

impl GuardConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            call_timeout: std::env::var("ORBIT_ORACLE_CALL_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.call_timeout),
            failure_threshold: std::env::var("ORBIT_ORACLE_FAILURE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.failure_threshold),
            ..defaults
        }
    }
}

/// Wraps an oracle with a per-call timeout and a circuit breaker.
pub struct GuardedOracle<O> {
    inner: O,
    breaker: CircuitBreaker,
    call_timeout: Duration,
}

impl<O: DetectionOracle> GuardedOracle<O> {
    pub fn new(inner: O, config: GuardConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(
                config.failure_threshold,
                config.recovery_timeout,
                config.success_threshold,
            ),
            call_timeout: config.call_timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

#[async_trait]
impl<O: DetectionOracle> DetectionOracle for GuardedOracle<O> {
    async fn detect(
        &self,
        frames: &[RawImage],
        description: &str,
        threshold: f64,
    ) -> OracleResult<DetectedObject> {
        if !self.breaker.allow() {
            metrics::counter!("orbit_oracle_rejected_total").increment(1);
            return Err(OracleError::CircuitOpen(self.inner.name()));
        }

        let outcome = tokio::time::timeout(
            self.call_timeout,
            self.inner.detect(frames, description, threshold),
        )
        .await
        .unwrap_or_else(|_| Err(OracleError::Timeout(self.call_timeout.as_millis() as u64)));

        match &outcome {
            Ok(_) => self.breaker.success(),
            Err(OracleError::NoFrames) => {}
            Err(e) => {
                warn!(oracle = self.inner.name(), error = %e, "Oracle call failed");
                metrics::counter!("orbit_oracle_failures_total").increment(1);
                self.breaker.failure();
            }
        }

        outcome
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyOracle {
        calls: AtomicU32,
        fail: bool,
        delay: Duration,
    }

    impl FlakyOracle {
        fn new(fail: bool, delay: Duration) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail,
                delay,
            }
        }
    }

    #[async_trait]
    impl DetectionOracle for FlakyOracle {
        async fn detect(
            &self,
            _frames: &[RawImage],
            description: &str,
            _threshold: f64,
        ) -> OracleResult<DetectedObject> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(OracleError::ServiceUnavailable("down".into()))
            } else {
                Ok(DetectedObject::new(description, true, 0.9, 0.9))
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn frames() -> Vec<RawImage> {
        vec![RawImage::from_bytes(vec![0u8; 4])]
    }

    fn config(failure_threshold: u32, call_timeout: Duration) -> GuardConfig {
        GuardConfig {
            call_timeout,
            failure_threshold,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }

    #[tokio::test]
    async fn test_passes_through_success() {
        let guarded = GuardedOracle::new(
            FlakyOracle::new(false, Duration::ZERO),
            config(2, Duration::from_secs(5)),
        );
        let detected = guarded.detect(&frames(), "dog barks", 0.5).await.unwrap();
        assert!(detected.is_detected);
        assert_eq!(guarded.name(), "flaky");
    }

    #[tokio::test]
    async fn test_opens_circuit_and_fails_fast() {
        let guarded = GuardedOracle::new(
            FlakyOracle::new(true, Duration::ZERO),
            config(2, Duration::from_secs(5)),
        );

        for _ in 0..2 {
            assert!(guarded.detect(&frames(), "dog barks", 0.5).await.is_err());
        }
        let err = guarded.detect(&frames(), "dog barks", 0.5).await.unwrap_err();
        assert!(matches!(err, OracleError::CircuitOpen("flaky")));
        assert_eq!(guarded.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_times_out_slow_oracle() {
        let guarded = GuardedOracle::new(
            FlakyOracle::new(false, Duration::from_secs(10)),
            config(5, Duration::from_millis(20)),
        );
        let err = guarded.detect(&frames(), "dog barks", 0.5).await.unwrap_err();
        assert!(matches!(err, OracleError::Timeout(20)));
        assert!(!guarded.breaker().is_open());
    }
}

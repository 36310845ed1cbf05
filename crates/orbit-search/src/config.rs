//! Search configuration.

use crate::reconcile::ReconcileConfig;

/// Search run configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Sampled frames per window
    pub frames_per_window: usize,
    /// Probability a proposition must exceed to count as active
    pub detection_threshold: f64,
    /// Threshold passed to the oracle for its own yes/no decision
    pub oracle_threshold: f64,
    /// Sampled frames per second of video
    pub sample_rate: f64,
    /// Let a frame satisfying only the right side of `UNTIL` accept
    pub include_initial_state: bool,
    /// Query every camera of a window concurrently
    pub parallel_oracle_calls: bool,
    /// Gap tolerances for evidence reconciliation
    pub reconcile: ReconcileConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            frames_per_window: 3,
            detection_threshold: 0.5,
            oracle_threshold: 0.349,
            sample_rate: 1.0,
            include_initial_state: true,
            parallel_oracle_calls: false,
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            frames_per_window: std::env::var("ORBIT_FRAMES_PER_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.frames_per_window),
            detection_threshold: std::env::var("ORBIT_DETECTION_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.detection_threshold),
            oracle_threshold: std::env::var("ORBIT_ORACLE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.oracle_threshold),
            sample_rate: std::env::var("ORBIT_SAMPLE_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sample_rate),
            include_initial_state: std::env::var("ORBIT_INCLUDE_INITIAL_STATE")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.include_initial_state),
            parallel_oracle_calls: std::env::var("ORBIT_PARALLEL_ORACLE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.parallel_oracle_calls),
            reconcile: ReconcileConfig {
                single_split_max_gap: std::env::var("ORBIT_SINGLE_SPLIT_MAX_GAP")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.reconcile.single_split_max_gap),
                joint_max_gap: std::env::var("ORBIT_JOINT_MAX_GAP")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.reconcile.joint_max_gap),
            },
        }
    }

    /// Reject values the search cannot run with.
    pub fn validate(&self) -> crate::error::SearchResult<()> {
        use crate::error::SearchError;

        if self.frames_per_window == 0 {
            return Err(SearchError::config("frames_per_window must be at least 1"));
        }
        if self.sample_rate.is_nan() || self.sample_rate <= 0.0 {
            return Err(SearchError::config(format!(
                "sample_rate must be positive, got {}",
                self.sample_rate
            )));
        }
        for (name, value) in [
            ("detection_threshold", self.detection_threshold),
            ("oracle_threshold", self.oracle_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SearchError::config(format!(
                    "{} must lie in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

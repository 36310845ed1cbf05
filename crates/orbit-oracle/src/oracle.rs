//! Detection oracle trait.

use async_trait::async_trait;
use std::sync::Arc;

use orbit_models::{DetectedObject, RawImage};

use crate::error::OracleResult;

/// Scores one proposition against one camera's ordered frame sequence.
///
/// Implementations must be side-effect free with respect to the frames and
/// safe to call repeatedly. `probability` must lie in [0, 1] and be monotonic
/// with `confidence` for a given oracle instance.
#[async_trait]
pub trait DetectionOracle: Send + Sync {
    /// Score `description` against `frames`.
    ///
    /// # Arguments
    /// * `frames` - Consecutive frames from one camera
    /// * `description` - Proposition text, e.g. "man holds lantern"
    /// * `threshold` - Oracle-side decision threshold for `is_detected`
    async fn detect(
        &self,
        frames: &[RawImage],
        description: &str,
        threshold: f64,
    ) -> OracleResult<DetectedObject>;

    /// Oracle name for logging.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: DetectionOracle + ?Sized> DetectionOracle for Arc<T> {
    async fn detect(
        &self,
        frames: &[RawImage],
        description: &str,
        threshold: f64,
    ) -> OracleResult<DetectedObject> {
        (**self).detect(frames, description, threshold).await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

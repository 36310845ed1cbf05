//! Valuation fusion across cameras.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use tracing::trace;

use orbit_models::{CameraId, DetectedObject, FrameWindow, Proposition, VideoFrame};
use orbit_oracle::DetectionOracle;

use crate::error::{SearchError, SearchResult};
use crate::metrics::names;

/// Asks the oracle about every proposition on every camera of a window and
/// keeps, per proposition, the most confident camera.
pub struct ValuationFuser<'a, O: ?Sized> {
    oracle: &'a O,
    oracle_threshold: f64,
    parallel: bool,
}

impl<'a, O: DetectionOracle + ?Sized> ValuationFuser<'a, O> {
    pub fn new(oracle: &'a O, oracle_threshold: f64) -> Self {
        Self {
            oracle,
            oracle_threshold,
            parallel: false,
        }
    }

    /// Issue one window's per-camera calls concurrently.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Fuse one window into a `VideoFrame` indexed by the window ordinal.
    ///
    /// Ties in confidence go to the lowest camera id.
    pub async fn fuse(
        &self,
        window: FrameWindow,
        propositions: &[Proposition],
    ) -> SearchResult<VideoFrame> {
        if window.images.is_empty() {
            return Err(SearchError::NoCameras(window.index));
        }

        let mut object_of_interest = BTreeMap::new();
        for prop in propositions {
            let detections = self.detect_all(&window, prop).await?;
            let best = best_detection(detections).ok_or(SearchError::NoCameras(window.index))?;
            trace!(
                window = window.index,
                proposition = %prop,
                camera = %best.0,
                probability = best.1.probability,
                "fused"
            );
            object_of_interest.insert(prop.clone(), best);
        }

        Ok(VideoFrame::new(window.index, window.images, object_of_interest))
    }

    /// Detections for `prop` on every camera, in ascending camera order.
    async fn detect_all(
        &self,
        window: &FrameWindow,
        prop: &str,
    ) -> SearchResult<Vec<(CameraId, DetectedObject)>> {
        metrics::counter!(names::ORACLE_CALLS_TOTAL).increment(window.images.len() as u64);

        if self.parallel {
            let calls = window.images.iter().map(|(camera, frames)| async move {
                self.oracle
                    .detect(frames, prop, self.oracle_threshold)
                    .await
                    .map(|detected| (*camera, detected))
            });
            return Ok(try_join_all(calls).await?);
        }

        let mut detections = Vec::with_capacity(window.images.len());
        for (camera, frames) in &window.images {
            let detected = self
                .oracle
                .detect(frames, prop, self.oracle_threshold)
                .await?;
            detections.push((*camera, detected));
        }
        Ok(detections)
    }
}

/// The first detection wins unless a later one is strictly more confident.
fn best_detection(
    detections: Vec<(CameraId, DetectedObject)>,
) -> Option<(CameraId, DetectedObject)> {
    detections.into_iter().fold(None, |best, candidate| match best {
        Some(b) if candidate.1.confidence <= b.1.confidence => Some(b),
        _ => Some(candidate),
    })
}

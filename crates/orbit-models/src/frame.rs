//! Frame windows and fused video frames.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::camera::CameraId;
use crate::detection::{DetectedObject, Proposition};

/// Index of a frame window (window ordinal) or of a native video frame,
/// depending on context.
pub type FrameIndex = u64;

/// One encoded frame image (JPEG bytes). Clones share the buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct RawImage {
    data: Arc<[u8]>,
}

impl RawImage {
    /// Wrap encoded image bytes.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::from(data.into()),
        }
    }

    /// Encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawImage({} bytes)", self.data.len())
    }
}

/// Fixed-length group of consecutive sampled frames across all cameras.
#[derive(Debug, Clone, Default)]
pub struct FrameWindow {
    /// Window ordinal within the stream
    pub index: FrameIndex,
    /// Ordered frames per camera
    pub images: BTreeMap<CameraId, Vec<RawImage>>,
}

impl FrameWindow {
    pub fn new(index: FrameIndex) -> Self {
        Self {
            index,
            images: BTreeMap::new(),
        }
    }

    /// Number of cameras contributing to this window.
    pub fn camera_count(&self) -> usize {
        self.images.len()
    }
}

/// A frame window after valuation fusion.
///
/// Holds exactly one `(camera, detection)` entry per proposition requested for
/// the window: the detection from the camera that scored it highest.
#[derive(Debug, Clone, Default)]
pub struct VideoFrame {
    pub frame_idx: FrameIndex,
    pub frame_images: BTreeMap<CameraId, Vec<RawImage>>,
    pub object_of_interest: BTreeMap<Proposition, (CameraId, DetectedObject)>,
}

impl VideoFrame {
    pub fn new(
        frame_idx: FrameIndex,
        frame_images: BTreeMap<CameraId, Vec<RawImage>>,
        object_of_interest: BTreeMap<Proposition, (CameraId, DetectedObject)>,
    ) -> Self {
        Self {
            frame_idx,
            frame_images,
            object_of_interest,
        }
    }

    /// Propositions whose probability is strictly above `threshold`, with
    /// that probability and the camera it came from.
    ///
    /// A probability equal to the threshold is not a detection.
    pub fn thresholded_detected_objects(
        &self,
        threshold: f64,
    ) -> BTreeMap<Proposition, (f64, CameraId)> {
        self.object_of_interest
            .iter()
            .filter_map(|(prop, (cam_id, detected))| {
                let probability = detected.detected_probability();
                (probability > threshold).then(|| (prop.clone(), (probability, *cam_id)))
            })
            .collect()
    }

    /// Whether `prop` is active at `threshold` on this frame.
    pub fn is_active(&self, prop: &str, threshold: f64) -> bool {
        self.object_of_interest
            .get(prop)
            .map(|(_, detected)| detected.detected_probability() > threshold)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(values: &[(&str, f64)]) -> VideoFrame {
        let object_of_interest = values
            .iter()
            .map(|(name, p)| {
                (
                    name.to_string(),
                    (CameraId::new(0), DetectedObject::new(*name, *p > 0.5, *p, *p)),
                )
            })
            .collect();
        VideoFrame::new(0, BTreeMap::new(), object_of_interest)
    }

    #[test]
    fn test_threshold_is_strict() {
        let frame = frame_with(&[("a", 0.50), ("b", 0.51), ("c", 0.2)]);
        let thresh = frame.thresholded_detected_objects(0.50);

        assert!(!thresh.contains_key("a"));
        assert_eq!(thresh.get("b"), Some(&(0.51, CameraId::new(0))));
        assert!(!thresh.contains_key("c"));
        assert_eq!(thresh.len(), 1);
    }

    #[test]
    fn test_is_active() {
        let frame = frame_with(&[("a", 0.9), ("b", 0.5)]);
        assert!(frame.is_active("a", 0.5));
        assert!(!frame.is_active("b", 0.5));
        assert!(!frame.is_active("missing", 0.5));
    }

    #[test]
    fn test_raw_image_shares_buffer() {
        let img = RawImage::from_bytes(vec![0xff, 0xd8, 0xff]);
        let copy = img.clone();
        assert_eq!(copy.as_bytes(), &[0xff, 0xd8, 0xff]);
        assert_eq!(format!("{:?}", copy), "RawImage(3 bytes)");
    }
}

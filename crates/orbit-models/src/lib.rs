//! Shared data models for the orbit frame-of-interest search.
//!
//! This crate provides Serde-serializable types for:
//! - Propositions, camera ids and oracle detections
//! - Frame windows and fused per-window video frames
//! - Specification splits and raw detection sets
//! - The search output consumed by the cropper

pub mod camera;
pub mod detection;
pub mod frame;
pub mod output;
pub mod run;

// Re-export common types
pub use camera::{CameraId, CameraIdParseError};
pub use detection::{DetectedObject, Proposition};
pub use frame::{FrameIndex, FrameWindow, RawImage, VideoFrame};
pub use output::{DetectionSets, FrameSelection, SearchOutput, Split, SplitParseError};
pub use run::RunId;

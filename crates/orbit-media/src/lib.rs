//! FFmpeg CLI wrapper for frame sampling and clip cropping.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with a timeout-aware runner
//! - Progress parsing from `-progress pipe:2`
//! - Video probing via ffprobe
//! - Per-camera frame sampling exposed as lazy forward-only feeds
//! - Cropping a video to its frames of interest with a trim/concat graph

pub mod command;
pub mod config;
pub mod crop;
pub mod error;
pub mod frames;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use config::MediaConfig;
pub use crop::{build_filter_graph, frames_to_keep, group_into_ranges, Cropper, WHOLE_VIDEO};
pub use error::{MediaError, MediaResult};
pub use frames::{CameraFeed, FrameIter, SampledVideo};
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;

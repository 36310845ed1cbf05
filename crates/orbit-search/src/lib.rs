//! Frame-of-interest search over multi-camera video.
//!
//! This crate provides:
//! - Valuation fusion of per-camera oracle detections into video frames
//! - The frame-of-interest buffer and interval reconciliation of raw evidence
//! - The orchestrator driving one search run end to end
//! - Dataset loading and post-processing of search results
//! - Configuration, run logging and metrics for the `orbit-search` binary

pub mod buffer;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fuser;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod reconcile;
pub mod window;

pub use buffer::FramesOfInterest;
pub use config::SearchConfig;
pub use dataset::{load_results, write_json, CropRecord, Dataset, EntryResult, QueryEntry};
pub use error::{SearchError, SearchResult};
pub use fuser::ValuationFuser;
pub use logging::RunLogger;
pub use orchestrator::{select_frames, RunReport, SearchOrchestrator, SearchRun};
pub use reconcile::{group_with_gaps, intersection_with_gaps, ReconcileConfig, Run};
pub use window::WindowStream;

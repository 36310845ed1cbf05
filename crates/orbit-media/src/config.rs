//! Media configuration.

use std::time::Duration;

/// FFmpeg settings for sampling and cropping.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Kill FFmpeg after this long
    pub ffmpeg_timeout: Duration,
    /// JPEG quality for sampled frames (2 best, 31 worst)
    pub jpeg_quality: u8,
    /// x264 preset for cropped clips
    pub crop_preset: String,
    /// x264 CRF for cropped clips
    pub crop_crf: u8,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_timeout: Duration::from_secs(1800),
            jpeg_quality: 2,
            crop_preset: "fast".to_string(),
            crop_crf: 23,
        }
    }
}

impl MediaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ffmpeg_timeout: std::env::var("ORBIT_FFMPEG_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.ffmpeg_timeout),
            jpeg_quality: std::env::var("ORBIT_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jpeg_quality),
            crop_preset: std::env::var("ORBIT_CROP_PRESET").unwrap_or(defaults.crop_preset),
            crop_crf: std::env::var("ORBIT_CROP_CRF")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.crop_crf),
        }
    }
}

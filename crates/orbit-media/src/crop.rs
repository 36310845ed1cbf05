//! Cropping a video down to its frames of interest.

use std::ops::Range;
use std::path::Path;

use tracing::{info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_video;

/// Frame list value meaning "no frames of interest found".
pub const WHOLE_VIDEO: i64 = -1;

/// Group frame indices into contiguous end-exclusive ranges.
///
/// Input may be unsorted and contain duplicates.
pub fn group_into_ranges(frames: &[u64]) -> Vec<Range<u64>> {
    let mut sorted = frames.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges: Vec<Range<u64>> = Vec::new();
    for frame in sorted {
        match ranges.last_mut() {
            Some(range) if range.end == frame => range.end = frame + 1,
            _ => ranges.push(frame..frame + 1),
        }
    }
    ranges
}

/// Build the `trim`/`concat` filter graph selecting `ranges` from input 0.
///
/// The concatenated stream is labelled `[outv]`.
pub fn build_filter_graph(ranges: &[Range<u64>]) -> String {
    let mut parts: Vec<String> = ranges
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[0:v]trim=start_frame={}:end_frame={},setpts=PTS-STARTPTS[v{}]",
                r.start, r.end, i
            )
        })
        .collect();
    let labels: String = (0..ranges.len()).map(|i| format!("[v{}]", i)).collect();
    parts.push(format!("{}concat=n={}:v=1[outv]", labels, ranges.len()));
    parts.join("; ")
}

/// Frames a crop should keep.
///
/// The sentinel or an empty list keeps the whole video. Otherwise exactly the
/// listed frames are kept, so separate stretches become separate segments.
pub fn frames_to_keep(frames: &[i64], frame_count: u64) -> Vec<u64> {
    let kept: Vec<u64> = frames
        .iter()
        .filter(|&&f| f != WHOLE_VIDEO)
        .filter_map(|&f| u64::try_from(f).ok())
        .collect();

    if kept.is_empty() {
        (0..frame_count).collect()
    } else {
        kept
    }
}

/// Crops videos with FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct Cropper {
    config: MediaConfig,
}

impl Cropper {
    pub fn new(config: MediaConfig) -> Self {
        Self { config }
    }

    /// Write the frames of interest of `input` to `output` as one clip.
    ///
    /// `frames` is a search result frame list: native frame indices, or
    /// `[-1]` when nothing was found.
    pub async fn crop(
        &self,
        input: impl AsRef<Path>,
        frames: &[i64],
        output: impl AsRef<Path>,
    ) -> MediaResult<()> {
        let input = input.as_ref();
        let output = output.as_ref();

        let info = probe_video(input).await?;
        let ranges = group_into_ranges(&frames_to_keep(frames, info.frame_count));

        if ranges.is_empty() {
            warn!(video = %input.display(), "No frames to keep");
            return Err(MediaError::invalid_video(format!(
                "{} has no frames to crop",
                input.display()
            )));
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cmd = FfmpegCommand::new(input, output)
            .filter_complex(build_filter_graph(&ranges))
            .map("[outv]")
            .video_codec("libx264")
            .preset(self.config.crop_preset.clone())
            .crf(self.config.crop_crf);

        FfmpegRunner::new()
            .with_timeout(self.config.ffmpeg_timeout)
            .run(&cmd)
            .await?;

        info!(
            video = %input.display(),
            output = %output.display(),
            segments = ranges.len(),
            "Cropped video"
        );
        Ok(())
    }
}

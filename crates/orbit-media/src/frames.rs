//! Frame sampling and per-camera frame feeds.
//!
//! A camera's video is sampled once with FFmpeg's `fps` filter into numbered
//! JPEG files; the search then walks those files forward, reading each image
//! only when it is pulled.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info};

use orbit_models::RawImage;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

const FRAME_PREFIX: &str = "frame_";
const FRAME_PATTERN: &str = "frame_%06d.jpg";

/// Lazy, finite, forward-only sequence of sampled frames.
pub type FrameIter = Box<dyn Iterator<Item = MediaResult<RawImage>> + Send>;

/// One camera's sampled frames plus the rates needed to map them back to
/// native frame indices.
pub struct CameraFeed {
    /// Native frame rate of the source video
    pub fps: f64,
    /// Sampled frames per second
    pub sample_rate: f64,
    pub frames: FrameIter,
}

impl CameraFeed {
    pub fn new<I>(fps: f64, sample_rate: f64, frames: I) -> Self
    where
        I: IntoIterator<Item = MediaResult<RawImage>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            fps,
            sample_rate,
            frames: Box::new(frames.into_iter()),
        }
    }

    /// Feed over frames already in memory.
    pub fn from_images(fps: f64, sample_rate: f64, images: Vec<RawImage>) -> Self {
        Self::new(fps, sample_rate, images.into_iter().map(Ok))
    }

    /// Native frames between two consecutive samples.
    pub fn frame_step(&self) -> MediaResult<u64> {
        if self.sample_rate.is_nan() || self.sample_rate <= 0.0 {
            return Err(MediaError::InvalidSampleRate(self.sample_rate));
        }
        Ok(((self.fps / self.sample_rate).round() as u64).max(1))
    }
}

/// A video sampled to JPEG files on disk.
#[derive(Debug)]
pub struct SampledVideo {
    pub info: VideoInfo,
    pub sample_rate: f64,
    frame_paths: Vec<PathBuf>,
    /// Owned scratch directory, removed when the frames are dropped
    scratch: Option<TempDir>,
}

impl SampledVideo {
    /// Sample `path` at `sample_rate` frames per second into `work_dir`.
    pub async fn extract(
        path: impl AsRef<Path>,
        sample_rate: f64,
        work_dir: impl AsRef<Path>,
        config: &MediaConfig,
    ) -> MediaResult<Self> {
        let path = path.as_ref();
        let work_dir = work_dir.as_ref();

        if sample_rate.is_nan() || sample_rate <= 0.0 {
            return Err(MediaError::InvalidSampleRate(sample_rate));
        }

        let info = probe_video(path).await?;
        tokio::fs::create_dir_all(work_dir).await?;

        let cmd = FfmpegCommand::new(path, work_dir.join(FRAME_PATTERN))
            .video_filter(format!("fps={}", sample_rate))
            .jpeg_quality(config.jpeg_quality)
            .no_audio();

        let expected = ((info.duration * sample_rate).ceil() as u64).max(1);
        FfmpegRunner::new()
            .with_timeout(config.ffmpeg_timeout)
            .run_with_progress(&cmd, move |p| {
                debug!(
                    frames = p.frame,
                    percent = p.percentage(expected),
                    "Sampling frames"
                );
            })
            .await?;

        let frame_paths = list_frames(work_dir)?;
        if frame_paths.is_empty() {
            return Err(MediaError::invalid_video(format!(
                "No frames sampled from {}",
                path.display()
            )));
        }

        info!(
            video = %path.display(),
            fps = info.fps,
            sample_rate,
            sampled = frame_paths.len(),
            "Sampled video"
        );

        Ok(Self {
            info,
            sample_rate,
            frame_paths,
            scratch: None,
        })
    }

    /// Sample into a fresh temporary directory owned by the result.
    pub async fn extract_temp(
        path: impl AsRef<Path>,
        sample_rate: f64,
        config: &MediaConfig,
    ) -> MediaResult<Self> {
        let dir = tempfile::Builder::new().prefix("orbit-frames-").tempdir()?;
        let mut sampled = Self::extract(path, sample_rate, dir.path(), config).await?;
        sampled.scratch = Some(dir);
        Ok(sampled)
    }

    pub fn len(&self) -> usize {
        self.frame_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_paths.is_empty()
    }

    /// Lazy forward-only iterator over the sampled frames.
    pub fn frames(self) -> FrameIter {
        Box::new(FrameFiles {
            paths: self.frame_paths.into_iter(),
            _scratch: self.scratch,
        })
    }

    /// Turn into a camera feed for the search.
    pub fn into_feed(self) -> CameraFeed {
        let fps = self.info.fps;
        let sample_rate = self.sample_rate;
        CameraFeed {
            fps,
            sample_rate,
            frames: self.frames(),
        }
    }
}

struct FrameFiles {
    paths: std::vec::IntoIter<PathBuf>,
    _scratch: Option<TempDir>,
}

impl Iterator for FrameFiles {
    type Item = MediaResult<RawImage>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        Some(
            std::fs::read(&path)
                .map(RawImage::from_bytes)
                .map_err(MediaError::from),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

/// Sampled frame files in `dir`, in frame order.
fn list_frames(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension().is_some_and(|ext| ext == "jpg")
                && p
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(FRAME_PREFIX))
        })
        .collect();
    // Zero-padded names sort numerically
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_step() {
        let feed = CameraFeed::from_images(30.0, 1.0, vec![]);
        assert_eq!(feed.frame_step().unwrap(), 30);

        let feed = CameraFeed::from_images(29.97, 2.0, vec![]);
        assert_eq!(feed.frame_step().unwrap(), 15);

        let feed = CameraFeed::from_images(30.0, 0.0, vec![]);
        assert!(matches!(feed.frame_step(), Err(MediaError::InvalidSampleRate(_))));
    }

    #[test]
    fn test_list_frames_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["frame_000002.jpg", "frame_000001.jpg", "frame_000010.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }

        let paths = list_frames(dir.path()).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["frame_000001.jpg", "frame_000002.jpg", "frame_000010.jpg"]);
    }

    #[test]
    fn test_frames_read_lazily_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame_000001.jpg"), [1u8]).unwrap();
        std::fs::write(dir.path().join("frame_000002.jpg"), [2u8, 2]).unwrap();

        let sampled = SampledVideo {
            info: VideoInfo {
                duration: 2.0,
                width: 0,
                height: 0,
                fps: 30.0,
                frame_count: 60,
            },
            sample_rate: 1.0,
            frame_paths: list_frames(dir.path()).unwrap(),
            scratch: None,
        };
        assert_eq!(sampled.len(), 2);

        let feed = sampled.into_feed();
        assert_eq!(feed.frame_step().unwrap(), 30);
        let sizes: Vec<usize> = feed.frames.map(|f| f.unwrap().len()).collect();
        assert_eq!(sizes, [1, 2]);
    }
}

//! Frame-of-interest buffer.

use std::ops::RangeInclusive;

use orbit_models::{FrameIndex, VideoFrame};

/// Admitted frames of the active epoch, plus the native frame ranges of every
/// epoch that completed.
#[derive(Debug, Clone)]
pub struct FramesOfInterest {
    frames_per_window: u64,
    frame_step: u64,
    frame_buffer: Vec<VideoFrame>,
    foi_history: Vec<RangeInclusive<FrameIndex>>,
}

impl FramesOfInterest {
    pub fn new(frames_per_window: u64, frame_step: u64) -> Self {
        Self {
            frames_per_window: frames_per_window.max(1),
            frame_step: frame_step.max(1),
            frame_buffer: Vec::new(),
            foi_history: Vec::new(),
        }
    }

    pub fn push(&mut self, frame: VideoFrame) {
        self.frame_buffer.push(frame);
    }

    /// Native frames covered by one window.
    pub fn window_span(&self) -> u64 {
        self.frames_per_window * self.frame_step
    }

    /// Record the buffered epoch's native frame range and clear the buffer.
    ///
    /// The range runs from the first native frame of the first buffered
    /// window to the last native frame of the last one. Flushing an empty
    /// buffer records nothing.
    pub fn flush_frame_buffer(&mut self) {
        let first = self.frame_buffer.first().map(|f| f.frame_idx);
        let last = self.frame_buffer.last().map(|f| f.frame_idx);

        if let (Some(first), Some(last)) = (first, last) {
            let span = self.window_span();
            self.foi_history.push(first * span..=(last + 1) * span - 1);
        }
        self.frame_buffer.clear();
    }

    /// Sorted, de-duplicated union of every flushed range.
    pub fn compile_foi(&self) -> Vec<FrameIndex> {
        let mut foi: Vec<FrameIndex> = self
            .foi_history
            .iter()
            .flat_map(|range| range.clone())
            .collect();
        foi.sort_unstable();
        foi.dedup();
        foi
    }

    pub fn buffered(&self) -> &[VideoFrame] {
        &self.frame_buffer
    }

    /// Number of epochs flushed so far.
    pub fn epochs(&self) -> usize {
        self.foi_history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn frame(idx: u64) -> VideoFrame {
        VideoFrame::new(idx, BTreeMap::new(), BTreeMap::new())
    }

    #[test]
    fn test_flush_scales_to_native_frames() {
        let mut foi = FramesOfInterest::new(3, 10);
        for idx in [2, 3, 5] {
            foi.push(frame(idx));
        }
        foi.flush_frame_buffer();

        let frames = foi.compile_foi();
        assert_eq!(frames.first(), Some(&60));
        assert_eq!(frames.last(), Some(&179));
        assert_eq!(frames.len(), 120);
        assert!(foi.buffered().is_empty());
    }

    #[test]
    fn test_empty_flush_records_nothing() {
        let mut foi = FramesOfInterest::new(1, 1);
        foi.flush_frame_buffer();
        assert_eq!(foi.epochs(), 0);
        assert!(foi.compile_foi().is_empty());
    }

    #[test]
    fn test_compile_is_sorted_union() {
        let mut foi = FramesOfInterest::new(1, 1);
        foi.push(frame(7));
        foi.push(frame(9));
        foi.flush_frame_buffer();
        foi.push(frame(2));
        foi.push(frame(8));
        foi.flush_frame_buffer();

        assert_eq!(foi.compile_foi(), (2..=9).collect::<Vec<_>>());
        assert!(foi.compile_foi().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_unflushed_epoch_is_not_reported() {
        let mut foi = FramesOfInterest::new(1, 1);
        foi.push(frame(4));
        assert!(foi.compile_foi().is_empty());
    }
}

//! Lazy multi-camera windowing.

use orbit_media::{CameraFeed, FrameIter};
use orbit_models::{CameraId, FrameIndex, FrameWindow};

use crate::error::{SearchError, SearchResult};

/// Splits every camera's sampled frames into consecutive windows of
/// `frames_per_window` frames. The last window may be shorter.
///
/// Windows are read on demand; the stream ends after the last window or the
/// first error.
pub struct WindowStream {
    feeds: Vec<(CameraId, FrameIter)>,
    frames_per_window: usize,
    next_index: FrameIndex,
    done: bool,
}

impl WindowStream {
    /// Camera ids follow the order of `feeds`.
    pub fn new(feeds: Vec<CameraFeed>, frames_per_window: usize) -> Self {
        let feeds = feeds
            .into_iter()
            .enumerate()
            .map(|(i, feed)| (CameraId::new(i as u32), feed.frames))
            .collect();
        Self {
            feeds,
            frames_per_window: frames_per_window.max(1),
            next_index: 0,
            done: false,
        }
    }

    fn read_window(&mut self) -> SearchResult<Option<FrameWindow>> {
        let mut window = FrameWindow::new(self.next_index);

        for (camera, frames) in self.feeds.iter_mut() {
            let images = frames
                .by_ref()
                .take(self.frames_per_window)
                .collect::<Result<Vec<_>, _>>()?;
            window.images.insert(*camera, images);
        }

        let mut lengths = window.images.values().map(Vec::len);
        let first = lengths.next().unwrap_or(0);
        if lengths.any(|len| len != first) {
            return Err(SearchError::config(format!(
                "camera streams differ in length at window {}",
                self.next_index
            )));
        }
        if first == 0 {
            return Ok(None);
        }

        self.next_index += 1;
        Ok(Some(window))
    }
}

impl Iterator for WindowStream {
    type Item = SearchResult<FrameWindow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_window() {
            Ok(Some(window)) => Some(Ok(window)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

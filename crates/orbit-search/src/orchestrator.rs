//! Search orchestration.
//!
//! One run walks the window stream once:
//!
//! 1. fuse each window into a `VideoFrame`
//! 2. bucket its thresholded detections by specification split
//! 3. feed frames that touch the specification to the automaton and buffer
//! 4. on acceptance, reset the automaton and flush the buffer
//!
//! At end of stream a pending match is resolved, then the flushed frames of
//! interest are intersected with the reconciled detection range.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, Instrument};

use orbit_automaton::{AutomatonConfig, Specification, VideoAutomaton};
use orbit_media::CameraFeed;
use orbit_models::{
    CameraId, DetectionSets, FrameIndex, FrameSelection, Proposition, RunId, SearchOutput,
};
use orbit_oracle::DetectionOracle;

use crate::buffer::FramesOfInterest;
use crate::config::SearchConfig;
use crate::error::{SearchError, SearchResult};
use crate::fuser::ValuationFuser;
use crate::logging::RunLogger;
use crate::metrics::names;
use crate::reconcile::intersection_with_gaps;
use crate::window::WindowStream;

/// Windows between progress log lines.
const PROGRESS_EVERY: u64 = 100;

/// Counters for one search run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub cameras: usize,
    pub frame_step: u64,
    pub windows: u64,
    pub admitted_frames: u64,
    pub epochs_accepted: u64,
    pub frames_of_interest: usize,
}

/// Output of one search run.
#[derive(Debug, Clone)]
pub struct SearchRun {
    pub output: SearchOutput,
    pub report: RunReport,
}

/// Runs frame-of-interest searches with one oracle and configuration.
pub struct SearchOrchestrator<O> {
    oracle: O,
    config: SearchConfig,
}

impl<O: DetectionOracle> SearchOrchestrator<O> {
    pub fn new(oracle: O, config: SearchConfig) -> SearchResult<Self> {
        config.validate()?;
        Ok(Self { oracle, config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Search `feeds` for the frames satisfying `specification`.
    ///
    /// Camera `i` of the output is `feeds[i]`. All feeds must share one
    /// frame rate and sample rate.
    pub async fn run(
        &self,
        propositions: &[Proposition],
        specification: &str,
        feeds: Vec<CameraFeed>,
    ) -> SearchResult<SearchRun> {
        let run_id = RunId::new();
        let logger = RunLogger::new(&run_id, "search");
        let span = logger.create_span();

        async {
            logger.log_start(&format!(
                "{} propositions, {} cameras, spec: {}",
                propositions.len(),
                feeds.len(),
                specification
            ));

            let result = self
                .search(&logger, run_id.clone(), propositions, specification, feeds)
                .await;
            match &result {
                Ok(run) => {
                    if run.output.foi.is_nothing_found() {
                        logger.log_warning("no frames of interest found");
                    }
                    metrics::counter!(names::RUNS_TOTAL, "outcome" => outcome_label(&run.output))
                        .increment(1);
                    metrics::histogram!(names::RUN_DURATION_SECONDS)
                        .record(run.report.elapsed_ms as f64 / 1000.0);
                    logger.log_completion(&format!(
                        "{} windows, {} admitted, {} epochs, {} frames of interest in {} ms",
                        run.report.windows,
                        run.report.admitted_frames,
                        run.report.epochs_accepted,
                        run.report.frames_of_interest,
                        run.report.elapsed_ms
                    ));
                }
                Err(e) => {
                    metrics::counter!(names::RUNS_TOTAL, "outcome" => "error").increment(1);
                    logger.log_error(&e.to_string());
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn search(
        &self,
        logger: &RunLogger,
        run_id: RunId,
        propositions: &[Proposition],
        specification: &str,
        feeds: Vec<CameraFeed>,
    ) -> SearchResult<SearchRun> {
        let started_at = Utc::now();
        let timer = Instant::now();

        let spec = Specification::new(propositions.iter().cloned(), specification)?;
        let mut automaton = VideoAutomaton::new(
            spec.clone(),
            AutomatonConfig {
                include_initial_state: self.config.include_initial_state,
                detection_threshold: self.config.detection_threshold,
            },
        );

        let cameras = feeds.len();
        let frame_step = shared_frame_step(&feeds)?;
        let window_len = self.config.frames_per_window as u64;
        let mut buffer = FramesOfInterest::new(window_len, frame_step);
        let mut detections = DetectionSets::new();

        let fuser = ValuationFuser::new(&self.oracle, self.config.oracle_threshold)
            .parallel(self.config.parallel_oracle_calls);

        let mut windows = 0u64;
        let mut admitted_frames = 0u64;
        let mut epochs_accepted = 0u64;

        for window in WindowStream::new(feeds, self.config.frames_per_window) {
            let frame = fuser.fuse(window?, spec.propositions()).await?;
            windows += 1;
            metrics::counter!(names::WINDOWS_TOTAL).increment(1);
            if windows % PROGRESS_EVERY == 0 {
                logger.log_progress(&format!(
                    "{} windows, {} epochs accepted",
                    windows, epochs_accepted
                ));
            }

            for (prop, (_, camera)) in
                frame.thresholded_detected_objects(self.config.detection_threshold)
            {
                detections.insert(spec.check_split(&prop)?, frame.frame_idx, camera);
            }

            if !automaton.validate_frame(&frame) {
                continue;
            }

            automaton.add_frame(&frame)?;
            buffer.push(frame);
            admitted_frames += 1;

            if automaton.check_automaton() {
                debug!(
                    window = ?automaton.accepted_at(),
                    epoch_len = automaton.trace().len(),
                    "Epoch accepted"
                );
                metrics::counter!(names::ACCEPTANCES_TOTAL).increment(1);
                automaton.reset();
                buffer.flush_frame_buffer();
                epochs_accepted += 1;
            }
        }

        if automaton.finish() {
            debug!(window = ?automaton.accepted_at(), "Epoch accepted at end of stream");
            metrics::counter!(names::ACCEPTANCES_TOTAL).increment(1);
            buffer.flush_frame_buffer();
            epochs_accepted += 1;
        }

        let foi = select_frames(
            &buffer.compile_foi(),
            &detections,
            buffer.window_span(),
            &self.config,
        );

        let report = RunReport {
            run_id,
            started_at,
            elapsed_ms: timer.elapsed().as_millis() as u64,
            cameras,
            frame_step,
            windows,
            admitted_frames,
            epochs_accepted,
            frames_of_interest: foi.len(),
        };

        Ok(SearchRun {
            output: SearchOutput { foi, detections },
            report,
        })
    }
}

/// Native frame stride shared by every feed.
fn shared_frame_step(feeds: &[CameraFeed]) -> SearchResult<u64> {
    let first = feeds
        .first()
        .ok_or_else(|| SearchError::config("no camera feeds"))?;

    for (i, feed) in feeds.iter().enumerate().skip(1) {
        if (feed.fps - first.fps).abs() > 1e-6
            || (feed.sample_rate - first.sample_rate).abs() > 1e-6
        {
            return Err(SearchError::config(format!(
                "camera {} runs at {} fps sampled at {}, camera 0 at {} fps sampled at {}",
                i, feed.fps, feed.sample_rate, first.fps, first.sample_rate
            )));
        }
    }

    Ok(first.frame_step()?)
}

/// Combine the automaton's frames of interest with reconciled detections.
///
/// `window_span` is the number of native frames per window.
pub fn select_frames(
    automaton_foi: &[FrameIndex],
    detections: &DetectionSets,
    window_span: u64,
    config: &SearchConfig,
) -> FrameSelection {
    if automaton_foi.is_empty() {
        return FrameSelection::NothingFound;
    }

    let reconciled = intersection_with_gaps(detections, &config.reconcile);
    let scaled: BTreeMap<FrameIndex, BTreeSet<CameraId>> = reconciled
        .into_iter()
        .map(|(window, cameras)| (window * window_span, cameras))
        .collect();

    let (Some(&min_key), Some(&max_key)) = (scaled.keys().next(), scaled.keys().next_back()) else {
        return FrameSelection::NothingFound;
    };

    let frames: BTreeMap<FrameIndex, Vec<CameraId>> = automaton_foi
        .iter()
        .filter(|&&frame| (min_key..=max_key).contains(&frame))
        .filter_map(|&frame| {
            scaled
                .range(..=frame)
                .next_back()
                .map(|(_, cameras)| (frame, cameras.iter().copied().collect()))
        })
        .collect();

    if frames.is_empty() {
        FrameSelection::NothingFound
    } else {
        FrameSelection::Frames(frames)
    }
}

fn outcome_label(output: &SearchOutput) -> &'static str {
    if output.foi.is_nothing_found() {
        "nothing_found"
    } else {
        "found"
    }
}

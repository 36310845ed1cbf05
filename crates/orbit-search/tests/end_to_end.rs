//! End-to-end search over a scripted oracle.

use std::ops::RangeInclusive;

use async_trait::async_trait;

use orbit_media::CameraFeed;
use orbit_models::{CameraId, DetectedObject, FrameSelection, RawImage, Split};
use orbit_oracle::{DetectionOracle, OracleResult};
use orbit_search::{SearchConfig, SearchOrchestrator};

/// Answers from a fixed truth table keyed by the frame number stored in each
/// image's first byte.
struct ScriptedOracle {
    truth: Vec<(&'static str, Vec<RangeInclusive<u8>>)>,
}

impl ScriptedOracle {
    /// `a` and `b` hold at 4-8 and 13-21, `c` holds at 17-25.
    fn until_scenario() -> Self {
        Self {
            truth: vec![
                ("a", vec![4..=8, 13..=21]),
                ("b", vec![4..=8, 13..=21]),
                ("c", vec![17..=25]),
            ],
        }
    }

    fn holds(&self, prop: &str, frame: u8) -> bool {
        self.truth
            .iter()
            .filter(|(name, _)| *name == prop)
            .any(|(_, ranges)| ranges.iter().any(|r| r.contains(&frame)))
    }
}

#[async_trait]
impl DetectionOracle for ScriptedOracle {
    async fn detect(
        &self,
        frames: &[RawImage],
        description: &str,
        threshold: f64,
    ) -> OracleResult<DetectedObject> {
        let frame = frames[0].as_bytes()[0];
        let p = if self.holds(description, frame) { 1.0 } else { 0.0 };
        Ok(DetectedObject::new(description, p > threshold, p, p))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn single_camera(frames: u8) -> Vec<CameraFeed> {
    let images = (0..frames).map(|i| RawImage::from_bytes(vec![i])).collect();
    vec![CameraFeed::from_images(1.0, 1.0, images)]
}

fn config(include_initial_state: bool) -> SearchConfig {
    SearchConfig {
        frames_per_window: 1,
        include_initial_state,
        ..Default::default()
    }
}

fn props() -> Vec<String> {
    vec!["a".into(), "b".into(), "c".into()]
}

fn selected(foi: &FrameSelection) -> Vec<u64> {
    match foi {
        FrameSelection::Frames(frames) => frames.keys().copied().collect(),
        FrameSelection::NothingFound => Vec::new(),
    }
}

#[tokio::test]
async fn test_until_selects_second_stretch() {
    let orchestrator =
        SearchOrchestrator::new(ScriptedOracle::until_scenario(), config(true)).unwrap();
    let run = orchestrator
        .run(&props(), "(a AND b) UNTIL c", single_camera(30))
        .await
        .unwrap();

    // accepts at 22, then 23, 24 and 25 each satisfy the right side alone
    assert_eq!(run.report.windows, 30);
    assert_eq!(run.report.admitted_frames, 18);
    assert_eq!(run.report.epochs_accepted, 4);

    assert_eq!(selected(&run.output.foi), (13..=25).collect::<Vec<_>>());
    if let FrameSelection::Frames(frames) = &run.output.foi {
        assert!(frames.values().all(|cams| cams == &vec![CameraId::new(0)]));
    }

    let before = run.output.detections.get(Split::Before);
    let after = run.output.detections.get(Split::After);
    assert_eq!(before.len(), 14);
    assert_eq!(after.len(), 9);
    assert!(before.contains(&(4, CameraId::new(0))));
}

#[tokio::test]
async fn test_without_initial_state_stops_at_first_acceptance() {
    let orchestrator =
        SearchOrchestrator::new(ScriptedOracle::until_scenario(), config(false)).unwrap();
    let run = orchestrator
        .run(&props(), "(a AND b) UNTIL c", single_camera(30))
        .await
        .unwrap();

    assert_eq!(run.report.epochs_accepted, 1);
    assert_eq!(selected(&run.output.foi), (13..=22).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_match_pending_at_end_of_stream_is_kept() {
    // c starts inside the a&b stretch and both run to the last frame
    let oracle = ScriptedOracle {
        truth: vec![("a", vec![0..=5]), ("b", vec![0..=5]), ("c", vec![3..=5])],
    };
    let orchestrator = SearchOrchestrator::new(oracle, config(true)).unwrap();
    let run = orchestrator
        .run(&props(), "(a AND b) UNTIL c", single_camera(6))
        .await
        .unwrap();

    assert_eq!(run.report.admitted_frames, 6);
    assert_eq!(run.report.epochs_accepted, 1);
    assert!(!run.output.foi.is_nothing_found());
}

#[tokio::test]
async fn test_unsatisfied_specification_is_nothing_found() {
    let oracle = ScriptedOracle {
        truth: vec![("a", vec![2..=6]), ("b", vec![2..=6]), ("c", vec![])],
    };
    let orchestrator = SearchOrchestrator::new(oracle, config(true)).unwrap();
    let run = orchestrator
        .run(&props(), "(a AND b) UNTIL c", single_camera(10))
        .await
        .unwrap();

    assert!(run.output.foi.is_nothing_found());
    assert_eq!(run.output.foi.to_frame_list(), vec![-1]);
    assert_eq!(run.output.detections.get(Split::Before).len(), 5);

    let json = serde_json::to_value(&run.output).unwrap();
    assert_eq!(json["foi"], serde_json::json!({"-1": {}}));
}

#[tokio::test]
async fn test_windows_scale_to_native_frames() {
    // each window is 3 samples, one sample every 10 native frames
    let images = (0..9).map(|i| RawImage::from_bytes(vec![i / 3])).collect();
    let feeds = vec![CameraFeed::from_images(10.0, 1.0, images)];

    let oracle = ScriptedOracle {
        truth: vec![("a", vec![1..=1]), ("b", vec![1..=2])],
    };
    let config = SearchConfig {
        frames_per_window: 3,
        ..Default::default()
    };
    let orchestrator = SearchOrchestrator::new(oracle, config).unwrap();
    let run = orchestrator
        .run(&["a".to_string(), "b".to_string()], "a AND b", feeds)
        .await
        .unwrap();

    assert_eq!(run.report.frame_step, 10);
    assert_eq!(run.report.windows, 3);
    // window 1 covers native frames 30..=59
    assert_eq!(selected(&run.output.foi), (30..=59).collect::<Vec<_>>());
    assert_eq!(run.report.epochs_accepted, 1);
}

#[tokio::test]
async fn test_malformed_specification_fails() {
    let orchestrator =
        SearchOrchestrator::new(ScriptedOracle::until_scenario(), config(true)).unwrap();
    let err = orchestrator
        .run(&props(), "(a AND b) UNTIL", single_camera(3))
        .await
        .unwrap_err();
    assert!(matches!(err, orbit_search::SearchError::Format(_)));
}

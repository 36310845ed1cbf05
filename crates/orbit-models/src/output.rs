//! Splits, raw detection sets and the search output.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::camera::CameraId;
use crate::frame::FrameIndex;

/// Side of the top-level `UNTIL` a proposition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Split {
    /// Left operand of `UNTIL`, or the whole formula when there is none.
    Before = 0,
    /// Right operand of `UNTIL`.
    After = 1,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Before, Split::After];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl From<Split> for u8 {
    fn from(split: Split) -> Self {
        split as u8
    }
}

impl TryFrom<u8> for Split {
    type Error = SplitParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Split::Before),
            1 => Ok(Split::After),
            other => Err(SplitParseError(other)),
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid split id: {0}")]
pub struct SplitParseError(u8);

/// Raw `(window index, camera)` evidence accumulated per split over a run.
///
/// Serialized as a two-element array of `[index, "camN"]` pair lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionSets {
    by_split: [BTreeSet<(FrameIndex, CameraId)>; 2],
}

impl DetectionSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a detection; returns false if it was already present.
    pub fn insert(&mut self, split: Split, frame_idx: FrameIndex, camera: CameraId) -> bool {
        self.by_split[split.index()].insert((frame_idx, camera))
    }

    pub fn get(&self, split: Split) -> &BTreeSet<(FrameIndex, CameraId)> {
        &self.by_split[split.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.by_split.iter().all(BTreeSet::is_empty)
    }

    /// Total number of recorded pairs across both splits.
    pub fn len(&self) -> usize {
        self.by_split.iter().map(BTreeSet::len).sum()
    }
}

/// Native frames of interest with the cameras that support them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FrameSelection {
    /// Sentinel for "nothing found"; serialized as `{"-1": {}}`.
    #[default]
    NothingFound,
    /// Native frame index to the sorted cameras supporting it.
    Frames(BTreeMap<FrameIndex, Vec<CameraId>>),
}

impl FrameSelection {
    /// Sentinel frame index understood by the cropper as "entire video".
    pub const SENTINEL: i64 = -1;

    pub fn is_nothing_found(&self) -> bool {
        matches!(self, FrameSelection::NothingFound)
    }

    /// Frame list handed to the cropper: `[-1]` for the sentinel.
    pub fn to_frame_list(&self) -> Vec<i64> {
        match self {
            FrameSelection::NothingFound => vec![Self::SENTINEL],
            FrameSelection::Frames(frames) => frames.keys().map(|&f| f as i64).collect(),
        }
    }

    /// Number of selected frames (zero for the sentinel).
    pub fn len(&self) -> usize {
        match self {
            FrameSelection::NothingFound => 0,
            FrameSelection::Frames(frames) => frames.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for FrameSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FrameSelection::NothingFound => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(&Self::SENTINEL, &BTreeMap::<String, ()>::new())?;
                map.end()
            }
            FrameSelection::Frames(frames) => frames.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FrameSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<i64, serde_json::Value>::deserialize(deserializer)?;
        if raw.contains_key(&Self::SENTINEL) {
            return Ok(FrameSelection::NothingFound);
        }

        let mut frames = BTreeMap::new();
        for (frame, cams) in raw {
            let frame = FrameIndex::try_from(frame)
                .map_err(|_| de::Error::custom(format!("negative frame index {}", frame)))?;
            let cams: Vec<CameraId> = serde_json::from_value(cams).map_err(de::Error::custom)?;
            frames.insert(frame, cams);
        }
        Ok(FrameSelection::Frames(frames))
    }
}

/// Result of one search run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutput {
    pub foi: FrameSelection,
    pub detections: DetectionSets,
}

impl SearchOutput {
    /// The "nothing found" result, keeping whatever raw detections were seen.
    pub fn nothing_found(detections: DetectionSets) -> Self {
        Self {
            foi: FrameSelection::NothingFound,
            detections,
        }
    }
}

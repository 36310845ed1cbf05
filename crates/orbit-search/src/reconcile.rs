//! Interval reconciliation of raw detection evidence.
//!
//! Detections arrive as `(window, camera)` pairs bucketed by specification
//! split. Short detector dropouts are bridged so a stretch of evidence stays
//! one run; the largest run wins. Bridged indices only shape the run: they
//! are never reported as evidence.

use std::collections::{BTreeMap, BTreeSet};

use orbit_models::{CameraId, DetectionSets, FrameIndex, Split};

/// Gap tolerances for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Bridging budget when only one split has evidence
    pub single_split_max_gap: u64,
    /// Bridging budget when both splits have evidence
    pub joint_max_gap: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            single_split_max_gap: 2,
            joint_max_gap: 1,
        }
    }
}

/// A contiguous run of indices after gap bridging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub start: FrameIndex,
    /// Inclusive
    pub end: FrameIndex,
    /// Indices present in the input, excluding bridged ones
    pub members: Vec<FrameIndex>,
}

impl Run {
    fn starting_at(index: FrameIndex) -> Self {
        Self {
            start: index,
            end: index,
            members: vec![index],
        }
    }

    /// Length including bridged indices.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Partition `indices` into maximal runs, bridging gaps of up to `max_gap`
/// missing indices while the run's total bridged count stays within
/// `max_gap`.
///
/// Input order and duplicates do not matter. A bridge that would exceed the
/// budget is dropped: the run ends before it and a new run starts at the
/// index after the gap.
pub fn group_with_gaps(indices: &[FrameIndex], max_gap: u64) -> Vec<Run> {
    let sorted: BTreeSet<FrameIndex> = indices.iter().copied().collect();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut runs = Vec::new();
    let mut current = Run::starting_at(first);
    let mut bridged = 0u64;

    for index in iter {
        let missing = index - current.end - 1;
        if missing == 0 {
            current.end = index;
            current.members.push(index);
        } else if missing <= max_gap && bridged + missing <= max_gap {
            bridged += missing;
            current.end = index;
            current.members.push(index);
        } else {
            runs.push(std::mem::replace(&mut current, Run::starting_at(index)));
            bridged = 0;
        }
    }

    runs.push(current);
    runs
}

/// First run of greatest length.
fn largest(runs: Vec<Run>) -> Option<Run> {
    runs.into_iter().fold(None, |best, run| match best {
        Some(b) if b.len() >= run.len() => Some(b),
        _ => Some(run),
    })
}

/// Reconcile both splits' evidence into the best-supported stretch.
///
/// Returns each original index of the chosen run with the union of cameras
/// reported there by either split. Empty when there is no evidence.
pub fn intersection_with_gaps(
    detections: &DetectionSets,
    config: &ReconcileConfig,
) -> BTreeMap<FrameIndex, BTreeSet<CameraId>> {
    let before = detections.get(Split::Before);
    let after = detections.get(Split::After);

    let max_gap = match (before.is_empty(), after.is_empty()) {
        (true, true) => return BTreeMap::new(),
        (false, false) => config.joint_max_gap,
        _ => config.single_split_max_gap,
    };

    let mut cameras: BTreeMap<FrameIndex, BTreeSet<CameraId>> = BTreeMap::new();
    for &(index, camera) in before.iter().chain(after.iter()) {
        cameras.entry(index).or_default().insert(camera);
    }

    let indices: Vec<FrameIndex> = cameras.keys().copied().collect();
    let Some(run) = largest(group_with_gaps(&indices, max_gap)) else {
        return BTreeMap::new();
    };

    run.members
        .iter()
        .filter_map(|index| cameras.get(index).map(|cams| (*index, cams.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam(n: u32) -> CameraId {
        CameraId::new(n)
    }

    fn spans(runs: &[Run]) -> Vec<(u64, u64)> {
        runs.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn test_contiguous_input_is_one_run() {
        let input: Vec<u64> = (5..15).collect();
        let runs = group_with_gaps(&input, 2);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].members, input);
        assert_eq!(runs[0].len(), 10);
    }

    #[test]
    fn test_empty_input() {
        assert!(group_with_gaps(&[], 2).is_empty());
    }

    #[test]
    fn test_small_gap_bridged() {
        let runs = group_with_gaps(&[1, 2, 4, 5], 1);
        assert_eq!(spans(&runs), vec![(1, 5)]);
        assert_eq!(runs[0].members, vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_large_gap_splits() {
        let runs = group_with_gaps(&[1, 2, 5, 6], 1);
        assert_eq!(spans(&runs), vec![(1, 2), (5, 6)]);
    }

    #[test]
    fn test_budget_exhaustion_drops_bridge() {
        // second one-frame gap would bring the budget to 2 > 1
        let runs = group_with_gaps(&[1, 3, 5, 6], 1);
        assert_eq!(spans(&runs), vec![(1, 3), (5, 6)]);
        assert_eq!(runs[0].members, vec![1, 3]);
        assert_eq!(runs[1].members, vec![5, 6]);
    }

    #[test]
    fn test_budget_is_cumulative() {
        let runs = group_with_gaps(&[0, 2, 4, 10], 2);
        assert_eq!(spans(&runs), vec![(0, 4), (10, 10)]);
    }

    #[test]
    fn test_duplicates_and_order_ignored() {
        let runs = group_with_gaps(&[3, 1, 2, 2, 3], 0);
        assert_eq!(spans(&runs), vec![(1, 3)]);
    }

    #[test]
    fn test_single_split_keys_are_original_indices() {
        let mut sets = DetectionSets::new();
        for i in [10, 11, 13, 14, 30] {
            sets.insert(Split::Before, i, cam(0));
        }
        sets.insert(Split::Before, 13, cam(2));

        let result = intersection_with_gaps(&sets, &ReconcileConfig::default());
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![10, 11, 13, 14]);
        assert_eq!(result[&13], BTreeSet::from([cam(0), cam(2)]));
        assert!(!result.contains_key(&12));
    }

    #[test]
    fn test_joint_uses_tighter_gap() {
        let mut sets = DetectionSets::new();
        for i in [1, 2, 3] {
            sets.insert(Split::Before, i, cam(0));
        }
        // two missing frames: bridged alone (gap 2), not jointly (gap 1)
        for i in [6, 7, 8, 9] {
            sets.insert(Split::After, i, cam(1));
        }

        let result = intersection_with_gaps(&sets, &ReconcileConfig::default());
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![6, 7, 8, 9]);

        let loose = ReconcileConfig {
            single_split_max_gap: 2,
            joint_max_gap: 2,
        };
        assert_eq!(intersection_with_gaps(&sets, &loose).len(), 7);
    }

    #[test]
    fn test_joint_merges_cameras_across_splits() {
        let mut sets = DetectionSets::new();
        sets.insert(Split::Before, 4, cam(1));
        sets.insert(Split::After, 4, cam(0));
        sets.insert(Split::After, 5, cam(0));

        let result = intersection_with_gaps(&sets, &ReconcileConfig::default());
        assert_eq!(result[&4], BTreeSet::from([cam(0), cam(1)]));
        assert_eq!(result[&5], BTreeSet::from([cam(0)]));
    }

    #[test]
    fn test_tie_goes_to_first_run() {
        let mut sets = DetectionSets::new();
        for i in [0, 1, 10, 11] {
            sets.insert(Split::After, i, cam(0));
        }
        let result = intersection_with_gaps(&sets, &ReconcileConfig::default());
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_no_evidence() {
        let result = intersection_with_gaps(&DetectionSets::new(), &ReconcileConfig::default());
        assert!(result.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let mut sets = DetectionSets::new();
        for i in [3, 4, 6, 9, 10, 11] {
            sets.insert(Split::Before, i, cam(i as u32 % 2));
            sets.insert(Split::After, i + 1, cam(0));
        }
        let config = ReconcileConfig::default();
        assert_eq!(
            intersection_with_gaps(&sets, &config),
            intersection_with_gaps(&sets, &config)
        );
    }
}

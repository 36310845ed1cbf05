//! Datasets: loading query entries and post-processing search results.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use orbit_media::Cropper;
use orbit_models::{Proposition, SearchOutput};

use crate::error::{SearchError, SearchResult};

/// Supported datasets, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Dataset {
    /// Ego-Exo4D multi-view question set: a JSON object keyed by video id
    #[value(name = "egoexo4d")]
    EgoExo4D,
    /// A JSON array of entries, each carrying its own `video_id`
    Generic,
}

/// One question over one recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEntry {
    pub video_id: String,
    pub question: String,
    #[serde(default)]
    pub candidates: Vec<String>,
    #[serde(default)]
    pub correct_answer: serde_json::Value,
    /// One video per camera, in camera order
    pub video_paths: Vec<PathBuf>,
    pub proposition: Vec<Proposition>,
    pub specification: String,
}

/// An entry with its search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryResult {
    #[serde(flatten)]
    pub entry: QueryEntry,
    /// Native frames of interest, `[-1]` when nothing was found
    pub frames_of_interest: Vec<i64>,
    pub search: SearchOutput,
}

impl EntryResult {
    pub fn new(entry: QueryEntry, search: SearchOutput) -> Self {
        Self {
            frames_of_interest: search.foi.to_frame_list(),
            entry,
            search,
        }
    }
}

/// Frames of one contiguous clip from the first to the last frame of interest.
///
/// The nothing-found sentinel and an empty list pass through unchanged.
fn clip_span(frames: &[i64]) -> Vec<i64> {
    let kept = frames.iter().copied().filter(|&f| f >= 0);
    match (kept.clone().min(), kept.max()) {
        (Some(start), Some(end)) => (start..=end).collect(),
        _ => frames.to_vec(),
    }
}

/// One cropped clip in the post-processing index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropRecord {
    pub id: String,
    pub video_id: String,
    pub question: String,
    pub candidates: Vec<String>,
    pub correct_answer: serde_json::Value,
    /// Relative to the output directory
    pub video_path: String,
}

/// Ego-Exo4D stores entries keyed by video id, without the id inside.
#[derive(Debug, Deserialize)]
struct KeyedEntry {
    question: String,
    #[serde(default)]
    candidates: Vec<String>,
    #[serde(default)]
    correct_answer: serde_json::Value,
    video_paths: Vec<PathBuf>,
    proposition: Vec<Proposition>,
    specification: String,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Dataset::EgoExo4D => "egoexo4d",
            Dataset::Generic => "generic",
        }
    }

    /// Read query entries from a dataset file.
    pub fn load_entries(&self, path: impl AsRef<Path>) -> SearchResult<Vec<QueryEntry>> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let entries = self.parse_entries(&raw)?;

        if let Some(entry) = entries.iter().find(|e| e.video_paths.is_empty()) {
            return Err(SearchError::dataset(format!(
                "entry {} has no videos",
                entry.video_id
            )));
        }

        info!(
            dataset = self.name(),
            path = %path.display(),
            entries = entries.len(),
            "Loaded dataset"
        );
        Ok(entries)
    }

    fn parse_entries(&self, raw: &str) -> SearchResult<Vec<QueryEntry>> {
        match self {
            Dataset::EgoExo4D => {
                let keyed: BTreeMap<String, KeyedEntry> = serde_json::from_str(raw)?;
                Ok(keyed
                    .into_iter()
                    .map(|(video_id, e)| QueryEntry {
                        video_id,
                        question: e.question,
                        candidates: e.candidates,
                        correct_answer: e.correct_answer,
                        video_paths: e.video_paths,
                        proposition: e.proposition,
                        specification: e.specification,
                    })
                    .collect())
            }
            Dataset::Generic => Ok(serde_json::from_str(raw)?),
        }
    }

    /// Stable output name for an entry's cropped clip.
    pub fn output_id(&self, entry: &QueryEntry) -> String {
        match self {
            Dataset::EgoExo4D => {
                let digest = Sha256::digest(format!("{}{}", entry.question, entry.video_id));
                format!("{:x}", digest)
            }
            Dataset::Generic => entry.video_id.clone(),
        }
    }

    /// Crop each result's first video to its frames of interest under
    /// `<out_dir>/videos/` and write `<out_dir>/index.json`.
    ///
    /// Entries whose crop fails are logged and left out of the index.
    pub async fn postprocess(
        &self,
        results: &[EntryResult],
        out_dir: impl AsRef<Path>,
        cropper: &Cropper,
    ) -> SearchResult<Vec<CropRecord>> {
        let out_dir = out_dir.as_ref();
        let videos_dir = out_dir.join("videos");
        tokio::fs::create_dir_all(&videos_dir).await?;

        let mut records = Vec::with_capacity(results.len());
        for result in results {
            let entry = &result.entry;
            let Some(input) = entry.video_paths.first() else {
                warn!(video_id = %entry.video_id, "Entry has no video, skipping");
                continue;
            };

            let id = self.output_id(entry);
            let video_path = format!("videos/{}.mp4", id);

            let frames = clip_span(&result.frames_of_interest);
            if let Err(e) = cropper
                .crop(input, &frames, out_dir.join(&video_path))
                .await
            {
                warn!(video_id = %entry.video_id, error = %e, "Crop failed, skipping");
                continue;
            }

            records.push(CropRecord {
                id,
                video_id: entry.video_id.clone(),
                question: entry.question.clone(),
                candidates: entry.candidates.clone(),
                correct_answer: entry.correct_answer.clone(),
                video_path,
            });
        }

        write_json(out_dir.join("index.json"), &records)?;
        info!(
            dataset = self.name(),
            cropped = records.len(),
            total = results.len(),
            "Post-processing complete"
        );
        Ok(records)
    }
}

/// Read search results written by [`write_json`].
pub fn load_results(path: impl AsRef<Path>) -> SearchResult<Vec<EntryResult>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Pretty-print `value` to `path`.
pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> SearchResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_models::{CameraId, DetectionSets, FrameSelection};

    fn entry(video_id: &str, question: &str) -> QueryEntry {
        QueryEntry {
            video_id: video_id.to_string(),
            question: question.to_string(),
            candidates: vec!["yes".into(), "no".into()],
            correct_answer: serde_json::json!(0),
            video_paths: vec![PathBuf::from("cam0.mp4")],
            proposition: vec!["a".into(), "b".into()],
            specification: "a UNTIL b".into(),
        }
    }

    #[test]
    fn test_load_keyed_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("egoexo.json");
        std::fs::write(
            &path,
            r#"{
                "take-2": {"question": "q2", "video_paths": ["b0.mp4", "b1.mp4"],
                           "proposition": ["x"], "specification": "x"},
                "take-1": {"question": "q1", "candidates": ["A", "B"], "correct_answer": "A",
                           "video_paths": ["a0.mp4"], "proposition": ["y"], "specification": "y"}
            }"#,
        )
        .unwrap();

        let entries = Dataset::EgoExo4D.load_entries(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].video_id, "take-1");
        assert_eq!(entries[0].candidates, vec!["A", "B"]);
        assert_eq!(entries[1].video_paths.len(), 2);
    }

    #[test]
    fn test_load_generic_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generic.json");
        write_json(&path, &[entry("v1", "q")]).unwrap();

        let entries = Dataset::Generic.load_entries(&path).unwrap();
        assert_eq!(entries, vec![entry("v1", "q")]);
    }

    #[test]
    fn test_entry_without_videos_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generic.json");
        let mut bad = entry("v1", "q");
        bad.video_paths.clear();
        write_json(&path, &[bad]).unwrap();

        assert!(matches!(
            Dataset::Generic.load_entries(&path),
            Err(SearchError::Dataset(_))
        ));
    }

    #[test]
    fn test_clip_span_fills_gaps() {
        assert_eq!(clip_span(&[12, 9, 14]), vec![9, 10, 11, 12, 13, 14]);
        assert_eq!(clip_span(&[0, 1, 2, 5]), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(clip_span(&[-1]), vec![-1]);
        assert!(clip_span(&[]).is_empty());
    }

    #[test]
    fn test_output_ids() {
        let e = entry("take-1", "What happens?");
        let id = Dataset::EgoExo4D.output_id(&e);
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, Dataset::EgoExo4D.output_id(&e));
        assert_ne!(id, Dataset::EgoExo4D.output_id(&entry("take-2", "What happens?")));
        assert_eq!(Dataset::Generic.output_id(&e), "take-1");
    }

    #[test]
    fn test_results_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let mut detections = DetectionSets::new();
        detections.insert(orbit_models::Split::After, 3, CameraId::new(0));
        let found = EntryResult::new(
            entry("v1", "q"),
            SearchOutput {
                foi: FrameSelection::Frames(BTreeMap::from([(90, vec![CameraId::new(0)])])),
                detections,
            },
        );
        let missing = EntryResult::new(
            entry("v2", "q"),
            SearchOutput::nothing_found(DetectionSets::new()),
        );
        assert_eq!(missing.frames_of_interest, vec![-1]);

        write_json(&path, &[found.clone(), missing.clone()]).unwrap();
        assert_eq!(load_results(&path).unwrap(), vec![found, missing]);
    }

    #[tokio::test]
    async fn test_postprocess_skips_failed_crops() {
        let dir = tempfile::tempdir().unwrap();
        let mut e = entry("v1", "q");
        e.video_paths = vec![dir.path().join("missing.mp4")];
        let results = vec![EntryResult::new(e, SearchOutput::default())];

        let records = Dataset::Generic
            .postprocess(&results, dir.path(), &Cropper::default())
            .await
            .unwrap();
        assert!(records.is_empty());

        let index: Vec<CropRecord> =
            serde_json::from_slice(&std::fs::read(dir.path().join("index.json")).unwrap()).unwrap();
        assert!(index.is_empty());
    }
}

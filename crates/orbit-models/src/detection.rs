//! Oracle detection results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Name of one atomic detectable event, e.g. `"child kicks ball"`.
pub type Proposition = String;

/// Result of scoring one proposition against one camera's frame sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectedObject {
    /// Proposition the oracle was asked about
    pub name: Proposition,
    /// Oracle's own yes/no decision
    pub is_detected: bool,
    /// Raw oracle score in [0, 1]
    pub confidence: f64,
    /// Calibrated score in [0, 1], used for thresholding
    pub probability: f64,
}

impl DetectedObject {
    /// Create a detection. Scores are clamped to [0, 1].
    pub fn new(
        name: impl Into<Proposition>,
        is_detected: bool,
        confidence: f64,
        probability: f64,
    ) -> Self {
        Self {
            name: name.into(),
            is_detected,
            confidence: clamp_unit(confidence),
            probability: clamp_unit(probability),
        }
    }

    /// A detection that found nothing.
    pub fn undetected(name: impl Into<Proposition>) -> Self {
        Self::new(name, false, 0.0, 0.0)
    }

    /// The calibrated probability used by thresholding.
    pub fn detected_probability(&self) -> f64 {
        self.probability
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

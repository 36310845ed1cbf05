//! Camera identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of one camera of a multi-camera recording.
///
/// Rendered as `cam<N>`. Ordering is by ordinal, so `cam2 < cam10`; the
/// valuation fuser relies on this to break confidence ties deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CameraId(u32);

impl CameraId {
    /// Create a camera id from its ordinal.
    pub fn new(ordinal: u32) -> Self {
        Self(ordinal)
    }

    /// The camera ordinal.
    pub fn ordinal(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cam{}", self.0)
    }
}

impl FromStr for CameraId {
    type Err = CameraIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("cam")
            .and_then(|n| n.parse::<u32>().ok())
            .map(CameraId)
            .ok_or_else(|| CameraIdParseError(s.to_string()))
    }
}

impl TryFrom<String> for CameraId {
    type Error = CameraIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CameraId> for String {
    fn from(id: CameraId) -> Self {
        id.to_string()
    }
}

impl JsonSchema for CameraId {
    fn schema_name() -> String {
        "CameraId".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

#[derive(Debug, Error)]
#[error("Invalid camera id: {0}")]
pub struct CameraIdParseError(String);

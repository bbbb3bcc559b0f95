//! Prior-knowledge loading.
//!
//! A prior file is a JSON array of variables whose semantic types are known
//! up front (mined offline or written by hand):
//!
//! ```json
//! [{
//!   "VariableName": "alt_in_cm",
//!   "SemanticInfo": { "CoordinateFrames": ["MAV_FRAME_GLOBAL"], "Units": ["cm"] }
//! }]
//! ```
//!
//! Frame names resolve through [`FrameId::from_name`] (unknown names become
//! the `None` sentinel); unit spellings resolve through the protocol spec's
//! unit table (unknown spellings become [`crate::types::UNKNOWN_UNIT`]).
//! Priors never carry a dimension: they constrain frame and unit sets only.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::protocol::{ProtocolSpec, SpecError};
use crate::types::{FrameId, SemType, TypeSource};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariableEntry {
    pub variable_name: String,
    pub semantic_info: SemanticInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SemanticInfo {
    pub coordinate_frames: Vec<String>,
    pub units: Vec<String>,
}

/// Reads and parses a prior file. Malformed JSON is fatal.
pub fn load_prior(path: &Path) -> Result<Vec<VariableEntry>, SpecError> {
    let raw = fs::read_to_string(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SpecError::PriorJson {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves prior entries into semantic types keyed by qualified variable
/// name.
pub fn prior_types(
    entries: &[VariableEntry],
    spec: &ProtocolSpec,
) -> BTreeMap<String, SemType> {
    let mut result = BTreeMap::new();
    for entry in entries {
        let mut ty = SemType::default();
        for frame_name in &entry.semantic_info.coordinate_frames {
            ty.frames.insert(FrameId::from_name(frame_name));
        }
        for unit_name in &entry.semantic_info.units {
            ty.units.insert(spec.unit_id(unit_name));
        }
        ty.sources.push(TypeSource::Intrinsic);
        result.insert(entry.variable_name.clone(), ty);
    }
    result
}

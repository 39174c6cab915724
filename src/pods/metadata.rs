//! Pod metadata sidecar: a small JSON file (`pod_metadata.json`) placed next
//! to the coverage artifacts, round-tripped opaquely through [`Pod`]. Used by
//! tooling to attach labels, links, and provenance to a run.

use crate::core::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const POD_METADATA_FILE: &str = "pod_metadata.json";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PodMetadata {
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub links: Vec<String>,
}

/// Load the sidecar from `dir`, if present. A missing file is `Ok(None)`;
/// unreadable or malformed JSON is an error for the caller to handle.
pub fn load_pod_metadata(dir: &Path) -> Result<Option<PodMetadata>> {
    let path = dir.join(POD_METADATA_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    let md = serde_json::from_str(&text)?;
    Ok(Some(md))
}

/// Write the sidecar into `dir`, replacing any existing one.
pub fn save_pod_metadata(dir: &Path, md: &PodMetadata) -> Result<()> {
    let path = dir.join(POD_METADATA_FILE);
    let text = serde_json::to_string_pretty(md)?;
    fs::write(path, text)?;
    Ok(())
}

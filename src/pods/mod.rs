//! Pod assembly: turning one meta file plus its counter files into a
//! stable-keyed [`Profile`] with provenance.

pub mod discovery;
pub mod metadata;

use crate::core::{hash_hex, CounterFile, MetaFile, PkgFuncKey};
use crate::pods::metadata::PodMetadata;
use crate::profile::{combine_counts, Profile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A labeled, timestamped bundle of one profile plus provenance, optionally
/// with nested sub-pods. The unit handed to reporting consumers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub id: String,
    pub profile: Profile,
    pub labels: HashMap<String, String>,
    pub links: Vec<String>,
    pub source: Option<PathBuf>,
    pub timestamp: Option<DateTime<Utc>>,
    pub sub_pods: Vec<Pod>,
}

impl Pod {
    pub fn new(id: impl Into<String>, profile: Profile) -> Self {
        Self {
            id: id.into(),
            profile,
            labels: HashMap::new(),
            links: Vec::new(),
            source: None,
            timestamp: None,
            sub_pods: Vec::new(),
        }
    }

    /// Fold a metadata sidecar into this pod. Sidecar values win over
    /// anything derived from artifact filenames.
    pub fn apply_metadata(&mut self, md: PodMetadata) {
        self.labels.extend(md.labels);
        if md.timestamp.is_some() {
            self.timestamp = md.timestamp;
        }
        if md.source.is_some() {
            self.source = md.source;
        }
        self.links.extend(md.links);
    }

    /// Snapshot this pod's sidecar-visible fields.
    pub fn metadata(&self) -> PodMetadata {
        PodMetadata {
            labels: self.labels.clone(),
            timestamp: self.timestamp,
            source: self.source.clone(),
            links: self.links.clone(),
        }
    }

    /// True when labels contain every key/value pair of `wanted`.
    pub fn labels_match(&self, wanted: &HashMap<String, String>) -> bool {
        wanted
            .iter()
            .all(|(k, v)| self.labels.get(k) == Some(v))
    }
}

/// Per-meta lookup table translating positional counter records to stable
/// keys. Built once per pod so algebra never sees file-local indices.
struct FuncIndex {
    table: Vec<Vec<(PkgFuncKey, usize)>>,
}

impl FuncIndex {
    fn build(meta: &MetaFile) -> Self {
        let table = meta
            .packages
            .iter()
            .map(|pkg| {
                pkg.functions
                    .iter()
                    .map(|f| (PkgFuncKey::new(&pkg.path, &f.func_name), f.units.len()))
                    .collect()
            })
            .collect();
        Self { table }
    }

    fn resolve(&self, package_index: u32, function_index: u32) -> Option<&(PkgFuncKey, usize)> {
        self.table
            .get(package_index as usize)
            .and_then(|funcs| funcs.get(function_index as usize))
    }
}

/// Build a pod from one meta file and the counter files discovered alongside
/// it.
///
/// Resilience policy: a counter file whose hash does not reference this meta
/// file is skipped with a warning, and individual function records with
/// out-of-range indices or a counts/units length mismatch are dropped with a
/// warning. The pod always materializes, degrading to meta-only when every
/// counter file is rejected.
pub fn build_pod(meta: MetaFile, counter_files: &[CounterFile]) -> Pod {
    let index = FuncIndex::build(&meta);
    let mode = meta.mode;
    let meta_hash = meta.file_hash;
    let mut profile = Profile::new(meta);
    let mut first_name = None;

    for cf in counter_files {
        if cf.meta_file_hash != meta_hash {
            log::warn!(
                "skipping counter file {}: references meta hash {} but pod meta is {}",
                cf.file_path.display(),
                hash_hex(&cf.meta_file_hash),
                hash_hex(&meta_hash)
            );
            continue;
        }
        if first_name.is_none() {
            first_name = discovery::parse_counter_filename_path(&cf.file_path);
        }
        for segment in &cf.segments {
            profile
                .args
                .extend(segment.args.iter().map(|(k, v)| (k.clone(), v.clone())));
            for fc in &segment.functions {
                let Some((key, unit_count)) = index.resolve(fc.package_index, fc.function_index)
                else {
                    log::warn!(
                        "dropping counter record in {}: indices ({}, {}) out of range",
                        cf.file_path.display(),
                        fc.package_index,
                        fc.function_index
                    );
                    continue;
                };
                if fc.counts.len() != *unit_count {
                    log::warn!(
                        "dropping counter record for {}.{} in {}: {} counts for {} units",
                        key.pkg_path,
                        key.func_name,
                        cf.file_path.display(),
                        fc.counts.len(),
                        unit_count
                    );
                    continue;
                }
                match profile.counters.get_mut(key) {
                    Some(existing) => combine_counts(mode, existing, &fc.counts),
                    None => {
                        profile.counters.insert(key.clone(), fc.counts.clone());
                    }
                }
            }
        }
    }

    let mut id = hash_hex(&meta_hash);
    let mut timestamp = None;
    if let Some(parsed) = first_name {
        id.push_str(&format!("-{}", parsed.nanos));
        timestamp = nanos_to_datetime(parsed.nanos);
    }

    let mut pod = Pod::new(id, profile);
    pod.timestamp = timestamp;
    pod
}

fn nanos_to_datetime(nanos: u64) -> Option<DateTime<Utc>> {
    let nanos = i64::try_from(nanos).ok()?;
    DateTime::from_timestamp(nanos / 1_000_000_000, (nanos % 1_000_000_000) as u32)
}

//! Artifact discovery: the filename convention tying counter files to their
//! meta file, and the directory scan that turns a tree of artifacts into a
//! [`CoverageSet`].
//!
//! Convention: meta files are named `covmeta.<hex-hash>` and counter files
//! `covcounters.<hex-hash>.<pid>.<nanotime>`, where the hex hash is the
//! 32-digit lowercase rendering of the meta file's embedded hash.

use crate::core::CounterFile;
use crate::formats::counters::read_counter_file;
use crate::formats::meta::read_meta_file;
use crate::pods::metadata::load_pod_metadata;
use crate::pods::{build_pod, Pod};
use crate::set::CoverageSet;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

static META_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^covmeta\.([0-9a-f]{32})$").unwrap());

static COUNTER_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^covcounters\.([0-9a-f]{32})\.([0-9]+)\.([0-9]+)$").unwrap());

/// Parsed fields of a conventional counter filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterFileName {
    pub hash: String,
    pub pid: u64,
    pub nanos: u64,
}

/// Extract the hex hash from a conventional meta filename.
pub fn parse_meta_filename(name: &str) -> Option<String> {
    META_FILE_RE
        .captures(name)
        .map(|caps| caps[1].to_string())
}

/// Parse a conventional counter filename into its hash/pid/nanotime fields.
pub fn parse_counter_filename(name: &str) -> Option<CounterFileName> {
    let caps = COUNTER_FILE_RE.captures(name)?;
    Some(CounterFileName {
        hash: caps[1].to_string(),
        pid: caps[2].parse().ok()?,
        nanos: caps[3].parse().ok()?,
    })
}

pub(crate) fn parse_counter_filename_path(path: &Path) -> Option<CounterFileName> {
    parse_counter_filename(path.file_name()?.to_str()?)
}

/// Scan a directory tree for coverage artifacts and assemble a pod per meta
/// file found.
///
/// Loading is resilient: a meta or counter file that fails to decode is
/// skipped with a warning rather than failing the scan, reflecting that many
/// independently-produced files are being aggregated and partial loss is
/// tolerable. Counter files whose hash matches no meta file are ignored with
/// a warning. Pods are built in parallel and returned in a deterministic
/// order (sorted by id).
pub fn scan_directory(dir: &Path) -> Result<CoverageSet> {
    let mut meta_paths: HashMap<String, PathBuf> = HashMap::new();
    let mut counter_paths: HashMap<String, Vec<PathBuf>> = HashMap::new();

    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if let Some(hash) = parse_meta_filename(name) {
            if let Some(previous) = meta_paths.insert(hash, entry.path().to_path_buf()) {
                log::warn!(
                    "duplicate meta file for one hash: {} shadows {}",
                    entry.path().display(),
                    previous.display()
                );
            }
        } else if let Some(parsed) = parse_counter_filename(name) {
            counter_paths
                .entry(parsed.hash)
                .or_default()
                .push(entry.path().to_path_buf());
        }
    }

    for (hash, orphans) in counter_paths.iter() {
        if !meta_paths.contains_key(hash) {
            log::warn!(
                "ignoring {} counter file(s) for hash {hash}: no matching meta file",
                orphans.len()
            );
        }
    }

    let mut groups: Vec<(PathBuf, Vec<PathBuf>)> = meta_paths
        .into_iter()
        .map(|(hash, meta_path)| {
            let mut counters = counter_paths.remove(&hash).unwrap_or_default();
            counters.sort();
            (meta_path, counters)
        })
        .collect();
    groups.sort();

    let mut pods: Vec<Pod> = groups
        .par_iter()
        .filter_map(|(meta_path, counters)| match load_pod(meta_path, counters) {
            Ok(pod) => Some(pod),
            Err(e) => {
                log::warn!("skipping pod for {}: {e:#}", meta_path.display());
                None
            }
        })
        .collect();
    pods.sort_by(|a, b| a.id.cmp(&b.id));

    Ok(CoverageSet::from_pods(pods))
}

fn load_pod(meta_path: &Path, counter_paths: &[PathBuf]) -> Result<Pod> {
    let meta = read_meta_file(meta_path)?;

    let counter_files: Vec<CounterFile> = counter_paths
        .iter()
        .filter_map(|path| match read_counter_file(path) {
            Ok(cf) => Some(cf),
            Err(e) => {
                log::warn!("skipping counter file {}: {e:#}", path.display());
                None
            }
        })
        .collect();

    let mut pod = build_pod(meta, &counter_files);
    pod.source = Some(meta_path.to_path_buf());

    if let Some(pod_dir) = meta_path.parent() {
        match load_pod_metadata(pod_dir) {
            Ok(Some(md)) => pod.apply_metadata(md),
            Ok(None) => {}
            Err(e) => log::warn!(
                "ignoring unreadable pod metadata in {}: {e}",
                pod_dir.display()
            ),
        }
    }

    Ok(pod)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meta_filename() {
        let hash = "0123456789abcdef0123456789abcdef";
        assert_eq!(
            parse_meta_filename(&format!("covmeta.{hash}")),
            Some(hash.to_string())
        );
        assert_eq!(parse_meta_filename("covmeta.tooshort"), None);
        assert_eq!(parse_meta_filename(&format!("covmeta.{hash}.extra")), None);
        // Uppercase hex is not conventional.
        assert_eq!(
            parse_meta_filename("covmeta.0123456789ABCDEF0123456789ABCDEF"),
            None
        );
    }

    #[test]
    fn test_parse_counter_filename() {
        let hash = "0123456789abcdef0123456789abcdef";
        let parsed =
            parse_counter_filename(&format!("covcounters.{hash}.12345.1699999999000000000"))
                .unwrap();
        assert_eq!(parsed.hash, hash);
        assert_eq!(parsed.pid, 12345);
        assert_eq!(parsed.nanos, 1_699_999_999_000_000_000);

        assert_eq!(parse_counter_filename(&format!("covcounters.{hash}")), None);
        assert_eq!(
            parse_counter_filename(&format!("covcounters.{hash}.12345")),
            None
        );
    }
}

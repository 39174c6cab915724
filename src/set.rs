//! A concurrency-guarded collection of pods with filtering and whole-set
//! merge.
//!
//! The mutex only serializes access to the pod list itself. Filtering and
//! merging snapshot the pods under the lock, then compute on the copies, so
//! long operations never block writers and returned data shares nothing with
//! the set.

use crate::core::errors::{CoverageError, Result};
use crate::pods::Pod;
use crate::profile::{merge_profiles, Profile};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CoverageSet {
    pods: Mutex<Vec<Pod>>,
}

impl Clone for CoverageSet {
    fn clone(&self) -> Self {
        Self {
            pods: Mutex::new(self.pods.lock().clone()),
        }
    }
}

impl CoverageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pods(pods: Vec<Pod>) -> Self {
        Self {
            pods: Mutex::new(pods),
        }
    }

    pub fn add(&self, pod: Pod) {
        self.pods.lock().push(pod);
    }

    /// Independently-owned snapshot of the current pods.
    pub fn pods(&self) -> Vec<Pod> {
        self.pods.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.pods.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.lock().is_empty()
    }

    /// Narrow every pod's profile to packages whose path starts with one of
    /// the given prefixes. An empty prefix list keeps everything (the result
    /// is an equivalent deep copy). Pods left with zero packages and zero
    /// counters, and no surviving sub-pods, are dropped. Sub-pods are
    /// filtered with the same prefixes.
    pub fn filter_by_path(&self, prefixes: &[String]) -> CoverageSet {
        let snapshot = self.pods();
        let filtered = snapshot
            .into_iter()
            .filter_map(|pod| filter_pod_by_path(pod, prefixes))
            .collect();
        CoverageSet::from_pods(filtered)
    }

    /// Keep pods whose label map is a superset of `wanted` by exact value.
    /// Sub-pods are filtered independently, so a pod may be kept while only
    /// some of its sub-pods pass.
    pub fn filter_by_label(&self, wanted: &HashMap<String, String>) -> CoverageSet {
        let snapshot = self.pods();
        let filtered = snapshot
            .into_iter()
            .filter_map(|pod| filter_pod_by_label(pod, wanted))
            .collect();
        CoverageSet::from_pods(filtered)
    }

    /// Merge every profile in the set (pods and sub-pods, recursively) into
    /// one summary pod.
    ///
    /// All profiles must be algebra-compatible. The summary pod inherits
    /// labels, links, and source from the first contributing pod; this is a
    /// documented simplification, not a stable identity guarantee.
    pub fn merge(&self) -> Result<Pod> {
        let snapshot = self.pods();
        if snapshot.is_empty() {
            return Err(CoverageError::MissingData("coverage set is empty".into()));
        }

        let mut profiles: Vec<Profile> = Vec::new();
        for pod in &snapshot {
            collect_profiles(pod, &mut profiles);
        }
        let merged = merge_profiles(&profiles)?;

        let representative = &snapshot[0];
        let mut pod = Pod::new(merged.meta.hash_hex(), merged);
        pod.labels = representative.labels.clone();
        pod.links = representative.links.clone();
        pod.source = representative.source.clone();
        pod.timestamp = representative.timestamp;
        Ok(pod)
    }
}

fn collect_profiles(pod: &Pod, out: &mut Vec<Profile>) {
    out.push(pod.profile.clone());
    for sub in &pod.sub_pods {
        collect_profiles(sub, out);
    }
}

fn path_matches(pkg_path: &str, prefixes: &[String]) -> bool {
    prefixes.is_empty() || prefixes.iter().any(|p| pkg_path.starts_with(p.as_str()))
}

fn filter_pod_by_path(mut pod: Pod, prefixes: &[String]) -> Option<Pod> {
    pod.profile
        .meta
        .packages
        .retain(|pkg| path_matches(&pkg.path, prefixes));
    pod.profile
        .counters
        .retain(|key, _| path_matches(&key.pkg_path, prefixes));

    pod.sub_pods = pod
        .sub_pods
        .into_iter()
        .filter_map(|sub| filter_pod_by_path(sub, prefixes))
        .collect();

    let emptied = pod.profile.meta.packages.is_empty() && pod.profile.counters.is_empty();
    if emptied && pod.sub_pods.is_empty() {
        return None;
    }
    Some(pod)
}

fn filter_pod_by_label(mut pod: Pod, wanted: &HashMap<String, String>) -> Option<Pod> {
    pod.sub_pods = pod
        .sub_pods
        .into_iter()
        .filter_map(|sub| filter_pod_by_label(sub, wanted))
        .collect();
    if !pod.labels_match(wanted) {
        return None;
    }
    Some(pod)
}

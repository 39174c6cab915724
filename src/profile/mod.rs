//! Aggregated coverage profiles and their algebra.
//!
//! A [`Profile`] pairs one canonical meta file with a counters map keyed by
//! [`PkgFuncKey`], so nothing downstream of the pod builder ever touches the
//! positional indices counter files carry. The algebra (merge, intersect,
//! subtract) never mutates its operands; every result is newly allocated so
//! concurrent holders of the inputs observe no change.

use crate::core::errors::{CoverageError, Result};
use crate::core::{CounterMode, MetaFile, PkgFuncKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One canonical meta file plus aggregated, stably-keyed counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub meta: MetaFile,
    pub counters: HashMap<PkgFuncKey, Vec<u64>>,
    pub args: HashMap<String, String>,
}

impl Profile {
    pub fn new(meta: MetaFile) -> Self {
        Self {
            meta,
            counters: HashMap::new(),
            args: HashMap::new(),
        }
    }

    /// True when the profile carries no counter data at all (meta-only).
    pub fn is_meta_only(&self) -> bool {
        self.counters.is_empty()
    }

    /// Total executed units across all functions.
    pub fn covered_units(&self) -> usize {
        self.counters
            .values()
            .map(|counts| counts.iter().filter(|&&c| c > 0).count())
            .sum()
    }
}

/// Combine `src` into `dst` positionally under the given mode.
///
/// Set mode is boolean OR; Count and Atomic saturate instead of wrapping.
/// When the vectors disagree in length, overlapping positions combine and the
/// longer tail is preserved.
pub(crate) fn combine_counts(mode: CounterMode, dst: &mut Vec<u64>, src: &[u64]) {
    let overlap = dst.len().min(src.len());
    for i in 0..overlap {
        dst[i] = match mode {
            CounterMode::Set => u64::from(dst[i] > 0 || src[i] > 0),
            _ => dst[i].saturating_add(src[i]),
        };
    }
    if src.len() > dst.len() {
        for &value in &src[overlap..] {
            let normalized = match mode {
                CounterMode::Set => u64::from(value > 0),
                _ => value,
            };
            dst.push(normalized);
        }
    }
}

/// Verify all operands share hash, mode, and granularity; the error names the
/// first operand that disagrees with the first.
fn check_compatible(profiles: &[&Profile]) -> Result<()> {
    let Some(first) = profiles.first() else {
        return Err(CoverageError::MissingData(
            "no profiles to operate on".into(),
        ));
    };
    for p in &profiles[1..] {
        if p.meta.file_hash != first.meta.file_hash {
            return Err(CoverageError::incompatible(
                &p.meta.file_path,
                format!(
                    "meta hash {} does not match {}",
                    p.meta.hash_hex(),
                    first.meta.hash_hex()
                ),
            ));
        }
        if p.meta.mode != first.meta.mode {
            return Err(CoverageError::incompatible(
                &p.meta.file_path,
                format!(
                    "counter mode {:?} does not match {:?}",
                    p.meta.mode, first.meta.mode
                ),
            ));
        }
        if p.meta.granularity != first.meta.granularity {
            return Err(CoverageError::incompatible(
                &p.meta.file_path,
                format!(
                    "granularity {:?} does not match {:?}",
                    p.meta.granularity, first.meta.granularity
                ),
            ));
        }
    }
    Ok(())
}

/// Union the operands' counter maps into a fresh profile.
///
/// Shared keys combine positionally under the operands' counter mode. Args
/// union with later operands winning on collision. A single operand yields a
/// deep copy.
pub fn merge_profiles(profiles: &[Profile]) -> Result<Profile> {
    let refs: Vec<&Profile> = profiles.iter().collect();
    check_compatible(&refs)?;

    let mut result = profiles[0].clone();
    let mode = result.meta.mode;
    for p in &profiles[1..] {
        for (key, counts) in &p.counters {
            match result.counters.get_mut(key) {
                Some(existing) => combine_counts(mode, existing, counts),
                None => {
                    result.counters.insert(key.clone(), counts.clone());
                }
            }
        }
        result
            .args
            .extend(p.args.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Ok(result)
}

/// Keep only evidence present in every operand.
///
/// For each function in the canonical meta with at least one coverable unit,
/// the key must appear with a matching-length vector in every operand;
/// otherwise it is dropped. Per-unit results take the minimum evidence: Set
/// mode requires all operands nonzero, Count mode takes the arithmetic min.
/// Keys whose whole result vector is zero are omitted to keep output sparse.
pub fn intersect_profiles(profiles: &[Profile]) -> Result<Profile> {
    let refs: Vec<&Profile> = profiles.iter().collect();
    check_compatible(&refs)?;

    let first = &profiles[0];
    let mode = first.meta.mode;
    let mut result = Profile::new(first.meta.clone());
    for p in profiles {
        result
            .args
            .extend(p.args.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    for pkg in &first.meta.packages {
        for func in &pkg.functions {
            if func.units.is_empty() {
                continue;
            }
            let key = PkgFuncKey::new(&pkg.path, &func.func_name);
            let vectors: Option<Vec<&Vec<u64>>> = profiles
                .iter()
                .map(|p| p.counters.get(&key).filter(|v| v.len() == func.units.len()))
                .collect();
            let Some(vectors) = vectors else {
                continue;
            };

            let mut combined = vec![0u64; func.units.len()];
            for (i, slot) in combined.iter_mut().enumerate() {
                *slot = match mode {
                    CounterMode::Set => u64::from(vectors.iter().all(|v| v[i] > 0)),
                    _ => vectors.iter().map(|v| v[i]).min().unwrap_or(0),
                };
            }
            if combined.iter().any(|&c| c > 0) {
                result.counters.insert(key, combined);
            }
        }
    }
    Ok(result)
}

/// Remove `b`'s evidence from `a`.
///
/// Per key in `a`, positions where `b` shows no execution (key absent, vector
/// length differs, or value zero) keep `a`'s value; all other positions become
/// zero. A differing vector length in `b` counts as "not covered in b", so the
/// whole of `a`'s vector passes through. All-zero results are omitted.
pub fn subtract_profiles(a: &Profile, b: &Profile) -> Result<Profile> {
    check_compatible(&[a, b])?;

    let mut result = Profile::new(a.meta.clone());
    result.args = a.args.clone();

    for (key, va) in &a.counters {
        let remaining: Vec<u64> = match b.counters.get(key) {
            Some(vb) if vb.len() == va.len() => va
                .iter()
                .zip(vb)
                .map(|(&av, &bv)| if bv == 0 { av } else { 0 })
                .collect(),
            _ => va.clone(),
        };
        if remaining.iter().any(|&c| c > 0) {
            result.counters.insert(key.clone(), remaining);
        }
    }
    Ok(result)
}

pub mod errors;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;

/// How counters were recorded by the instrumented binary.
///
/// `Set` counters are booleans (executed / not executed); `Count` and
/// `Atomic` are execution totals. `Atomic` differs from `Count` only in how
/// the instrumented process increments the slot, so all arithmetic in this
/// crate treats them identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterMode {
    Invalid,
    Set,
    Count,
    Atomic,
}

impl CounterMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CounterMode::Invalid),
            1 => Some(CounterMode::Set),
            2 => Some(CounterMode::Count),
            3 => Some(CounterMode::Atomic),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            CounterMode::Invalid => 0,
            CounterMode::Set => 1,
            CounterMode::Count => 2,
            CounterMode::Atomic => 3,
        }
    }
}

/// Whether one counter slot covers a basic block or a whole function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterGranularity {
    Block,
    Func,
}

impl CounterGranularity {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CounterGranularity::Block),
            1 => Some(CounterGranularity::Func),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            CounterGranularity::Block => 0,
            CounterGranularity::Func => 1,
        }
    }
}

/// One coverable source region, mapped to exactly one counter slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverableUnit {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub num_stmt: u32,
}

/// Descriptor for one instrumented function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncDesc {
    pub package_path: String,
    pub func_name: String,
    pub src_file: String,
    pub is_literal: bool,
    pub units: Vec<CoverableUnit>,
}

/// Descriptor for one instrumented package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeta {
    pub path: String,
    pub name: String,
    pub module_path: String,
    pub functions: Vec<FuncDesc>,
}

/// Fully decoded meta-data file: the structural description of everything the
/// instrumented binary can cover.
///
/// Immutable once decoded. The embedded hash is trusted from the file header
/// and never recomputed; it is the join key tying counter files to this meta
/// file and the compatibility key for profile algebra.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFile {
    pub file_path: PathBuf,
    pub file_hash: [u8; 16],
    pub mode: CounterMode,
    pub granularity: CounterGranularity,
    pub packages: Vec<PackageMeta>,
}

impl MetaFile {
    /// Lowercase hex rendering of the embedded hash, as used in artifact
    /// filenames and pod ids.
    pub fn hash_hex(&self) -> String {
        hash_hex(&self.file_hash)
    }

    /// Total number of functions across all packages.
    pub fn num_functions(&self) -> usize {
        self.packages.iter().map(|p| p.functions.len()).sum()
    }
}

pub fn hash_hex(hash: &[u8; 16]) -> String {
    let mut out = String::with_capacity(32);
    for byte in hash {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Counter payload for one function in one segment.
///
/// The indices are positions into the referenced meta file's package and
/// function tables. They are file-local and must be resolved to a
/// [`PkgFuncKey`] before any cross-file aggregation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCounters {
    pub package_index: u32,
    pub function_index: u32,
    pub counts: Vec<u64>,
}

/// One self-contained run of counter data within a counter file. A process
/// that flushes more than once produces multiple segments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDataSegment {
    pub args: HashMap<String, String>,
    pub functions: Vec<FunctionCounters>,
}

/// Fully decoded counter-data file for one execution of an instrumented
/// binary, tied to its meta file by `meta_file_hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterFile {
    pub file_path: PathBuf,
    pub meta_file_hash: [u8; 16],
    pub segments: Vec<CounterDataSegment>,
    pub goos: String,
    pub goarch: String,
}

/// Stable identity for one function across files and runs.
///
/// Every aggregation in this crate keys on this pair rather than on the
/// positional indices counter files carry, so consumers never depend on
/// file-local record order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PkgFuncKey {
    pub pkg_path: String,
    pub func_name: String,
}

impl PkgFuncKey {
    pub fn new(pkg_path: impl Into<String>, func_name: impl Into<String>) -> Self {
        Self {
            pkg_path: pkg_path.into(),
            func_name: func_name.into(),
        }
    }
}

// Export modules for library usage
pub mod core;
pub mod formats;
pub mod pods;
pub mod profile;
pub mod set;

// Re-export commonly used types
pub use crate::core::{
    CounterDataSegment, CounterFile, CounterGranularity, CounterMode, CoverableUnit, FuncDesc,
    FunctionCounters, MetaFile, PackageMeta, PkgFuncKey,
};

pub use crate::core::errors::{CoverageError, Result};

pub use crate::formats::counters::{decode_counter_bytes, encode_counter_bytes, read_counter_file};
pub use crate::formats::meta::{decode_meta_bytes, encode_meta_bytes, read_meta_file};

pub use crate::pods::{
    build_pod,
    discovery::{parse_counter_filename, parse_meta_filename, scan_directory, CounterFileName},
    metadata::{load_pod_metadata, save_pod_metadata, PodMetadata, POD_METADATA_FILE},
    Pod,
};

pub use crate::profile::{intersect_profiles, merge_profiles, subtract_profiles, Profile};

pub use crate::set::CoverageSet;

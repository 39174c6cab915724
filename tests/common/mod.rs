#![allow(dead_code)]

//! Shared fixture builders for integration tests.

use covpods::{
    CounterDataSegment, CounterFile, CounterGranularity, CounterMode, CoverableUnit, FuncDesc,
    FunctionCounters, MetaFile, PackageMeta,
};
use std::collections::HashMap;
use std::path::PathBuf;

pub const FIXTURE_HASH: [u8; 16] = [
    0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd,
    0xef,
];

pub fn fixture_hash_hex() -> String {
    "0123456789abcdef0123456789abcdef".to_string()
}

pub fn unit(start_line: u32, end_line: u32) -> CoverableUnit {
    CoverableUnit {
        start_line,
        start_col: 1,
        end_line,
        end_col: 2,
        num_stmt: 1,
    }
}

pub fn func(pkg_path: &str, name: &str, num_units: usize) -> FuncDesc {
    FuncDesc {
        package_path: pkg_path.to_string(),
        func_name: name.to_string(),
        src_file: format!("{pkg_path}/src.go"),
        is_literal: false,
        units: (0..num_units as u32)
            .map(|i| unit(10 + i * 5, 13 + i * 5))
            .collect(),
    }
}

pub fn package(path: &str, functions: Vec<FuncDesc>) -> PackageMeta {
    PackageMeta {
        path: path.to_string(),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        module_path: "example.com/mod".to_string(),
        functions,
    }
}

/// Meta fixture: pkg/a with F (2 units) and G (1 unit), pkg/b with H (3 units).
pub fn fixture_meta(mode: CounterMode) -> MetaFile {
    MetaFile {
        file_path: PathBuf::from(format!("covmeta.{}", fixture_hash_hex())),
        file_hash: FIXTURE_HASH,
        mode,
        granularity: CounterGranularity::Block,
        packages: vec![
            package("pkg/a", vec![func("pkg/a", "F", 2), func("pkg/a", "G", 1)]),
            package("pkg/b", vec![func("pkg/b", "H", 3)]),
        ],
    }
}

/// Counter fixture with one segment covering function F of pkg/a.
pub fn fixture_counters(counts_for_f: Vec<u64>) -> CounterFile {
    counter_file_with(vec![FunctionCounters {
        package_index: 0,
        function_index: 0,
        counts: counts_for_f,
    }])
}

pub fn counter_file_with(functions: Vec<FunctionCounters>) -> CounterFile {
    let mut args = HashMap::new();
    args.insert("GOOS".to_string(), "linux".to_string());
    args.insert("GOARCH".to_string(), "amd64".to_string());
    CounterFile {
        file_path: PathBuf::from(format!(
            "covcounters.{}.100.1700000000000000000",
            fixture_hash_hex()
        )),
        meta_file_hash: FIXTURE_HASH,
        segments: vec![CounterDataSegment { args, functions }],
        goos: "linux".to_string(),
        goarch: "amd64".to_string(),
    }
}

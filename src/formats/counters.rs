//! Codec for the counter-data file format.
//!
//! A counter file records how often each coverable unit executed during one
//! run of an instrumented binary. It references its meta file by hash and
//! carries one segment per counter flush. Layout:
//!
//! ```text
//! magic[4] version[4] meta_hash[16] flavor[1] big_endian[1] pad[6]  -- 32 bytes
//! segments, each:
//!   num_funcs[8] strtab_len[4] args_len[4]
//!   string table (ULEB128 count, then length-prefixed entries)
//!   args table (ULEB128 pair count, then key/value string indices)
//!   per-function records: ULEB128 (num_counters, pkg_idx, fn_idx) + counters
//! footer: magic[4] num_segments[4]
//! ```
//!
//! The footer's segment count must match the number of segments actually
//! decoded; a disagreement means the file was cut or stitched and fails the
//! integrity check.

use crate::core::errors::{CoverageError, Result};
use crate::core::{CounterDataSegment, CounterFile, FunctionCounters};
use crate::formats::raw::{read_string_table, write_uleb128, Cursor, StringTableBuilder};
use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;

/// Magic bytes identifying a counter-data file ("\0cvc").
pub const COUNTER_MAGIC: [u8; 4] = [0x00, 0x63, 0x76, 0x63];

/// Current counter-data format version.
pub const COUNTER_VERSION: u32 = 1;

/// The only counter encoding flavor this decoder understands.
pub const FLAVOR_ULEB128: u8 = 1;

/// Args-table keys with dedicated fields on [`CounterFile`].
const ARG_GOOS: &str = "GOOS";
const ARG_GOARCH: &str = "GOARCH";

/// Decode a counter-data file from an in-memory buffer.
pub fn decode_counter_bytes(data: &[u8], path: &Path) -> Result<CounterFile> {
    let mut cur = Cursor::new(data, path);

    let magic = cur.take(4, "magic")?;
    if magic != COUNTER_MAGIC {
        return Err(CoverageError::format(
            path,
            format!("bad counter magic {magic:02x?}"),
        ));
    }
    let version = cur.read_u32_le("version")?;
    if version != COUNTER_VERSION {
        return Err(CoverageError::format(
            path,
            format!("unsupported counter version {version} (want {COUNTER_VERSION})"),
        ));
    }
    let meta_file_hash = cur.read_hash("meta hash reference")?;
    let flavor = cur.read_u8("counter flavor")?;
    if flavor != FLAVOR_ULEB128 {
        return Err(CoverageError::format(
            path,
            format!("unsupported counter flavor {flavor}"),
        ));
    }
    let big_endian = cur.read_u8("endianness flag")?;
    if big_endian != 0 {
        return Err(CoverageError::format(
            path,
            "big-endian counter files are not supported",
        ));
    }
    cur.take(6, "header padding")?;

    let mut segments = Vec::new();
    loop {
        // The footer begins with the magic bytes; segment headers cannot,
        // since a num_funcs field starting with "\0cvc" would be implausibly
        // large and the magic's leading NUL keeps the ambiguity theoretical
        // rather than practical for real artifacts.
        match cur.peek(4) {
            Some(next) if next == COUNTER_MAGIC => break,
            Some(_) => segments.push(decode_segment(&mut cur)?),
            None => return Err(CoverageError::truncated(path, "segment or footer")),
        }
    }

    cur.take(4, "footer magic")?;
    let declared = cur.read_u32_le("footer segment count")? as usize;
    if declared != segments.len() {
        return Err(CoverageError::integrity(
            path,
            format!(
                "footer declares {declared} segments but {} were decoded",
                segments.len()
            ),
        ));
    }
    if !cur.is_empty() {
        return Err(CoverageError::corruption(
            path,
            format!("{} trailing bytes after footer", cur.remaining()),
        ));
    }

    let (goos, goarch) = host_args(&segments);
    Ok(CounterFile {
        file_path: path.to_path_buf(),
        meta_file_hash,
        segments,
        goos,
        goarch,
    })
}

fn decode_segment(cur: &mut Cursor<'_>) -> Result<CounterDataSegment> {
    let num_funcs = cur.read_u64_le("segment function count")?;
    let strtab_len = cur.read_u32_le("segment string table length")? as usize;
    let args_len = cur.read_u32_le("segment args table length")? as usize;

    let mut strtab_cur = cur.take_slice(strtab_len, "segment string table")?;
    let entry_count = strtab_cur.read_uleb128("string table entry count")? as usize;
    let strings = read_string_table(&mut strtab_cur, entry_count)?;

    let mut args_cur = cur.take_slice(args_len, "segment args table")?;
    let pair_count = args_cur.read_uleb128("args pair count")? as usize;
    let mut args = HashMap::with_capacity(pair_count);
    for _ in 0..pair_count {
        let key_idx = args_cur.read_uleb128_u32("args key index")?;
        let value_idx = args_cur.read_uleb128_u32("args value index")?;
        let key = arg_string(&strings, key_idx, cur)?;
        let value = arg_string(&strings, value_idx, cur)?;
        args.insert(key, value);
    }

    let num_funcs = usize::try_from(num_funcs)
        .ok()
        .filter(|n| *n <= cur.remaining())
        .ok_or_else(|| {
            CoverageError::corruption(
                cur.path(),
                format!("segment function count {num_funcs} exceeds remaining data"),
            )
        })?;
    let mut functions = Vec::with_capacity(num_funcs);
    for _ in 0..num_funcs {
        let num_counters = cur.read_uleb128("counter count")? as usize;
        let package_index = cur.read_uleb128_u32("package index")?;
        let function_index = cur.read_uleb128_u32("function index")?;
        if num_counters > cur.remaining() {
            return Err(CoverageError::corruption(
                cur.path(),
                format!("counter count {num_counters} exceeds remaining data"),
            ));
        }
        let mut counts = Vec::with_capacity(num_counters);
        for _ in 0..num_counters {
            counts.push(cur.read_uleb128("counter value")?);
        }
        functions.push(FunctionCounters {
            package_index,
            function_index,
            counts,
        });
    }

    Ok(CounterDataSegment { args, functions })
}

fn arg_string(strings: &[String], idx: u32, cur: &Cursor<'_>) -> Result<String> {
    strings.get(idx as usize).cloned().ok_or_else(|| {
        CoverageError::corruption(
            cur.path(),
            format!(
                "args string index {idx} out of range (table has {} entries)",
                strings.len()
            ),
        )
    })
}

/// GOOS/GOARCH come from the first segment that recorded them.
fn host_args(segments: &[CounterDataSegment]) -> (String, String) {
    let goos = segments
        .iter()
        .find_map(|s| s.args.get(ARG_GOOS).cloned())
        .unwrap_or_default();
    let goarch = segments
        .iter()
        .find_map(|s| s.args.get(ARG_GOARCH).cloned())
        .unwrap_or_default();
    (goos, goarch)
}

/// Encode a `CounterFile` into the on-disk byte layout.
pub fn encode_counter_bytes(cf: &CounterFile) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&COUNTER_MAGIC);
    out.extend_from_slice(&COUNTER_VERSION.to_le_bytes());
    out.extend_from_slice(&cf.meta_file_hash);
    out.push(FLAVOR_ULEB128);
    out.push(0); // little-endian
    out.extend_from_slice(&[0u8; 6]);

    for segment in &cf.segments {
        encode_segment(segment, &mut out);
    }

    out.extend_from_slice(&COUNTER_MAGIC);
    out.extend_from_slice(&(cf.segments.len() as u32).to_le_bytes());
    out
}

fn encode_segment(segment: &CounterDataSegment, out: &mut Vec<u8>) {
    let mut strtab = StringTableBuilder::new();

    // Sort args for a deterministic byte encoding.
    let mut pairs: Vec<(&String, &String)> = segment.args.iter().collect();
    pairs.sort();

    let mut args_body = Vec::new();
    write_uleb128(&mut args_body, pairs.len() as u64);
    for (key, value) in pairs {
        write_uleb128(&mut args_body, u64::from(strtab.intern(key)));
        write_uleb128(&mut args_body, u64::from(strtab.intern(value)));
    }

    let mut strtab_body = Vec::new();
    write_uleb128(&mut strtab_body, strtab.len() as u64);
    strtab.encode_entries(&mut strtab_body);

    out.extend_from_slice(&(segment.functions.len() as u64).to_le_bytes());
    out.extend_from_slice(&(strtab_body.len() as u32).to_le_bytes());
    out.extend_from_slice(&(args_body.len() as u32).to_le_bytes());
    out.extend_from_slice(&strtab_body);
    out.extend_from_slice(&args_body);

    for func in &segment.functions {
        write_uleb128(out, func.counts.len() as u64);
        write_uleb128(out, u64::from(func.package_index));
        write_uleb128(out, u64::from(func.function_index));
        for &count in &func.counts {
            write_uleb128(out, count);
        }
    }
}

/// Read and decode a counter-data file from disk.
pub fn read_counter_file(path: &Path) -> anyhow::Result<CounterFile> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read counter file: {}", path.display()))?;
    decode_counter_bytes(&data, path)
        .with_context(|| format!("Failed to decode counter file: {}", path.display()))
}

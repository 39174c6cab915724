//! Codec for the coverage meta-data file format.
//!
//! A meta file is the structural half of a coverage artifact pair: it lists
//! every package, function, and coverable unit the instrumented binary can
//! report on, with no execution data. Layout (all fixed-width fields
//! little-endian):
//!
//! ```text
//! magic[4] version[4] total_len[8] num_pkgs[8] hash[16]
//! mode[1] granularity[1] pad[6]
//! strtab_off[4] strtab_len[4] strtab_entries[4] pad[4]   -- 64-byte header
//! pkg_offsets: num_pkgs x u64
//! pkg_lengths: num_pkgs x u64
//! string table (ULEB128 length-prefixed entries)
//! per-package blobs at the recorded offsets (ULEB128 fields throughout)
//! ```

use crate::core::errors::{CoverageError, Result};
use crate::core::{CounterGranularity, CounterMode, CoverableUnit, FuncDesc, MetaFile, PackageMeta};
use crate::formats::raw::{read_string_table, write_uleb128, Cursor, StringTableBuilder};
use anyhow::Context;
use std::path::Path;

/// Magic bytes identifying a meta-data file ("\0cvm").
pub const META_MAGIC: [u8; 4] = [0x00, 0x63, 0x76, 0x6d];

/// Current meta-data format version.
pub const META_VERSION: u32 = 1;

/// Fixed header size in bytes.
const META_HEADER_LEN: usize = 64;

/// Decode a meta-data file from an in-memory buffer.
///
/// `path` is a label used in errors and recorded on the result; the buffer is
/// the entire file. The embedded hash is trusted from the header, not
/// recomputed. Zero packages is valid (a meta-only file).
pub fn decode_meta_bytes(data: &[u8], path: &Path) -> Result<MetaFile> {
    let mut cur = Cursor::new(data, path);

    let magic = cur.take(4, "magic")?;
    if magic != META_MAGIC {
        return Err(CoverageError::format(
            path,
            format!("bad meta magic {magic:02x?}"),
        ));
    }
    let version = cur.read_u32_le("version")?;
    if version != META_VERSION {
        return Err(CoverageError::format(
            path,
            format!("unsupported meta version {version} (want {META_VERSION})"),
        ));
    }

    let total_len = cur.read_u64_le("total length")?;
    if total_len != data.len() as u64 {
        return Err(CoverageError::corruption(
            path,
            format!(
                "declared length {total_len} does not match buffer length {}",
                data.len()
            ),
        ));
    }
    let num_pkgs = cur.read_u64_le("package count")?;
    let file_hash = cur.read_hash("meta hash")?;
    let mode_byte = cur.read_u8("counter mode")?;
    let mode = CounterMode::from_u8(mode_byte).ok_or_else(|| {
        CoverageError::corruption(path, format!("invalid counter mode byte {mode_byte}"))
    })?;
    let gran_byte = cur.read_u8("counter granularity")?;
    let granularity = CounterGranularity::from_u8(gran_byte).ok_or_else(|| {
        CoverageError::corruption(path, format!("invalid granularity byte {gran_byte}"))
    })?;
    cur.take(6, "header padding")?;
    let strtab_off = cur.read_u32_le("string table offset")? as usize;
    let strtab_len = cur.read_u32_le("string table length")? as usize;
    let strtab_entries = cur.read_u32_le("string table entry count")? as usize;
    cur.take(4, "header padding")?;
    debug_assert_eq!(cur.pos(), META_HEADER_LEN);

    // Each package contributes one offset and one length to the tables, so an
    // absurd count is detectable before any allocation.
    let num_pkgs = usize::try_from(num_pkgs)
        .ok()
        .filter(|n| n.checked_mul(16).is_some_and(|bytes| bytes <= cur.remaining()))
        .ok_or_else(|| {
            CoverageError::corruption(path, format!("package count {num_pkgs} exceeds file size"))
        })?;

    let mut pkg_offsets = Vec::with_capacity(num_pkgs);
    for _ in 0..num_pkgs {
        pkg_offsets.push(cur.read_u64_le("package offset")? as usize);
    }
    let mut pkg_lengths = Vec::with_capacity(num_pkgs);
    for _ in 0..num_pkgs {
        pkg_lengths.push(cur.read_u64_le("package length")? as usize);
    }

    let mut strtab_cur = cur.slice_at(strtab_off, strtab_len, "string table")?;
    let strings = read_string_table(&mut strtab_cur, strtab_entries)?;

    let mut packages = Vec::with_capacity(num_pkgs);
    for (offset, length) in pkg_offsets.into_iter().zip(pkg_lengths) {
        let mut pkg_cur = cur.slice_at(offset, length, "package blob")?;
        packages.push(decode_package(&mut pkg_cur, &strings)?);
    }

    Ok(MetaFile {
        file_path: path.to_path_buf(),
        file_hash,
        mode,
        granularity,
        packages,
    })
}

fn lookup<'a>(strings: &'a [String], idx: u32, cur: &Cursor<'_>) -> Result<&'a str> {
    strings.get(idx as usize).map(String::as_str).ok_or_else(|| {
        CoverageError::corruption(
            cur.path(),
            format!(
                "string index {idx} out of range (table has {} entries)",
                strings.len()
            ),
        )
    })
}

fn decode_package(cur: &mut Cursor<'_>, strings: &[String]) -> Result<PackageMeta> {
    let path_idx = cur.read_uleb128_u32("package path index")?;
    let name_idx = cur.read_uleb128_u32("package name index")?;
    let modpath_idx = cur.read_uleb128_u32("module path index")?;
    let num_funcs = cur.read_uleb128("function count")? as usize;

    let pkg_path = lookup(strings, path_idx, cur)?.to_string();
    let pkg_name = lookup(strings, name_idx, cur)?.to_string();
    let module_path = lookup(strings, modpath_idx, cur)?.to_string();

    if num_funcs > cur.remaining() {
        return Err(CoverageError::corruption(
            cur.path(),
            format!("function count {num_funcs} exceeds package blob size"),
        ));
    }
    let mut functions = Vec::with_capacity(num_funcs);
    for _ in 0..num_funcs {
        functions.push(decode_function(cur, strings, &pkg_path)?);
    }

    Ok(PackageMeta {
        path: pkg_path,
        name: pkg_name,
        module_path,
        functions,
    })
}

fn decode_function(cur: &mut Cursor<'_>, strings: &[String], pkg_path: &str) -> Result<FuncDesc> {
    let num_units = cur.read_uleb128("unit count")? as usize;
    let fname_idx = cur.read_uleb128_u32("function name index")?;
    let srcfile_idx = cur.read_uleb128_u32("source file index")?;
    let lit = cur.read_uleb128("literal flag")?;
    if lit > 1 {
        return Err(CoverageError::corruption(
            cur.path(),
            format!("literal flag must be 0 or 1, got {lit}"),
        ));
    }

    let func_name = lookup(strings, fname_idx, cur)?.to_string();
    let src_file = lookup(strings, srcfile_idx, cur)?.to_string();

    if num_units > cur.remaining() {
        return Err(CoverageError::corruption(
            cur.path(),
            format!("unit count {num_units} exceeds package blob size"),
        ));
    }
    let mut units = Vec::with_capacity(num_units);
    for _ in 0..num_units {
        units.push(CoverableUnit {
            start_line: cur.read_uleb128_u32("unit start line")?,
            start_col: cur.read_uleb128_u32("unit start column")?,
            end_line: cur.read_uleb128_u32("unit end line")?,
            end_col: cur.read_uleb128_u32("unit end column")?,
            num_stmt: cur.read_uleb128_u32("unit statement count")?,
        });
    }

    Ok(FuncDesc {
        package_path: pkg_path.to_string(),
        func_name,
        src_file,
        is_literal: lit == 1,
        units,
    })
}

/// Encode a `MetaFile` back into the on-disk byte layout.
///
/// Strings are interned in first-use order; package offsets and the declared
/// total length are computed during assembly. `encode_meta_bytes` followed by
/// [`decode_meta_bytes`] reproduces the input structure exactly.
pub fn encode_meta_bytes(meta: &MetaFile) -> Vec<u8> {
    let mut strtab = StringTableBuilder::new();
    let mut blobs: Vec<Vec<u8>> = Vec::with_capacity(meta.packages.len());
    for pkg in &meta.packages {
        blobs.push(encode_package(pkg, &mut strtab));
    }

    let mut strtab_body = Vec::new();
    strtab.encode_entries(&mut strtab_body);

    let tables_len = meta.packages.len() * 16;
    let strtab_off = META_HEADER_LEN + tables_len;
    let blobs_start = strtab_off + strtab_body.len();

    let mut offsets = Vec::with_capacity(blobs.len());
    let mut running = blobs_start;
    for blob in &blobs {
        offsets.push(running as u64);
        running += blob.len();
    }
    let total_len = running as u64;

    let mut out = Vec::with_capacity(running);
    out.extend_from_slice(&META_MAGIC);
    out.extend_from_slice(&META_VERSION.to_le_bytes());
    out.extend_from_slice(&total_len.to_le_bytes());
    out.extend_from_slice(&(meta.packages.len() as u64).to_le_bytes());
    out.extend_from_slice(&meta.file_hash);
    out.push(meta.mode.as_u8());
    out.push(meta.granularity.as_u8());
    out.extend_from_slice(&[0u8; 6]);
    out.extend_from_slice(&(strtab_off as u32).to_le_bytes());
    out.extend_from_slice(&(strtab_body.len() as u32).to_le_bytes());
    out.extend_from_slice(&(strtab.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    debug_assert_eq!(out.len(), META_HEADER_LEN);

    for offset in &offsets {
        out.extend_from_slice(&offset.to_le_bytes());
    }
    for blob in &blobs {
        out.extend_from_slice(&(blob.len() as u64).to_le_bytes());
    }
    out.extend_from_slice(&strtab_body);
    for blob in &blobs {
        out.extend_from_slice(blob);
    }
    debug_assert_eq!(out.len() as u64, total_len);
    out
}

fn encode_package(pkg: &PackageMeta, strtab: &mut StringTableBuilder) -> Vec<u8> {
    let mut out = Vec::new();
    write_uleb128(&mut out, u64::from(strtab.intern(&pkg.path)));
    write_uleb128(&mut out, u64::from(strtab.intern(&pkg.name)));
    write_uleb128(&mut out, u64::from(strtab.intern(&pkg.module_path)));
    write_uleb128(&mut out, pkg.functions.len() as u64);
    for func in &pkg.functions {
        write_uleb128(&mut out, func.units.len() as u64);
        write_uleb128(&mut out, u64::from(strtab.intern(&func.func_name)));
        write_uleb128(&mut out, u64::from(strtab.intern(&func.src_file)));
        write_uleb128(&mut out, u64::from(func.is_literal));
        for unit in &func.units {
            write_uleb128(&mut out, u64::from(unit.start_line));
            write_uleb128(&mut out, u64::from(unit.start_col));
            write_uleb128(&mut out, u64::from(unit.end_line));
            write_uleb128(&mut out, u64::from(unit.end_col));
            write_uleb128(&mut out, u64::from(unit.num_stmt));
        }
    }
    out
}

/// Read and decode a meta-data file from disk.
pub fn read_meta_file(path: &Path) -> anyhow::Result<MetaFile> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read meta file: {}", path.display()))?;
    decode_meta_bytes(&data, path)
        .with_context(|| format!("Failed to decode meta file: {}", path.display()))
}

//! Low-level byte cursor shared by the meta and counter decoders.
//!
//! All fixed-width fields in both formats are little-endian; variable-width
//! integers are unsigned LEB128 capped at 10 bytes (the longest encoding of a
//! `u64`). The cursor carries the path label of the file being decoded so
//! every error names its source.

use crate::core::errors::{CoverageError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Maximum bytes in a valid ULEB128-encoded u64.
const MAX_ULEB128_LEN: usize = 10;

#[derive(Debug)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8], path: &'a Path) -> Self {
        Self { data, pos: 0, path }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// Take the next `n` bytes, or fail with a truncation error naming `what`.
    pub fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(CoverageError::truncated(self.path, what));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek(&self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        Some(&self.data[self.pos..self.pos + n])
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub fn read_u32_le(&mut self, what: &'static str) -> Result<u32> {
        let bytes = self.take(4, what)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64_le(&mut self, what: &'static str) -> Result<u64> {
        let bytes = self.take(8, what)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn read_hash(&mut self, what: &'static str) -> Result<[u8; 16]> {
        let bytes = self.take(16, what)?;
        let mut hash = [0u8; 16];
        hash.copy_from_slice(bytes);
        Ok(hash)
    }

    /// Read an unsigned LEB128 value. An encoding longer than 10 bytes or one
    /// that overflows a u64 is corruption, not truncation.
    pub fn read_uleb128(&mut self, what: &'static str) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        for i in 0..MAX_ULEB128_LEN {
            let byte = self.read_u8(what)?;
            let low = u64::from(byte & 0x7f);
            if shift >= 64 || (shift == 63 && low > 1) {
                return Err(CoverageError::corruption(
                    self.path,
                    format!("uleb128 overflow while reading {what}"),
                ));
            }
            value |= low << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if i == MAX_ULEB128_LEN - 1 {
                break;
            }
        }
        Err(CoverageError::corruption(
            self.path,
            format!("uleb128 run too long while reading {what}"),
        ))
    }

    /// Read a ULEB128 value expected to fit in usize-sized table positions.
    pub fn read_uleb128_u32(&mut self, what: &'static str) -> Result<u32> {
        let value = self.read_uleb128(what)?;
        u32::try_from(value).map_err(|_| {
            CoverageError::corruption(self.path, format!("{what} value {value} out of range"))
        })
    }

    /// Produce a bounded sub-cursor over `[offset, offset + len)` of the
    /// underlying buffer. Offsets outside the buffer are corruption.
    pub fn slice_at(&self, offset: usize, len: usize, what: &'static str) -> Result<Cursor<'a>> {
        let end = offset.checked_add(len).ok_or_else(|| {
            CoverageError::corruption(self.path, format!("{what} region overflows"))
        })?;
        if end > self.data.len() {
            return Err(CoverageError::corruption(
                self.path,
                format!(
                    "{what} region [{offset}, {end}) outside buffer of {} bytes",
                    self.data.len()
                ),
            ));
        }
        Ok(Cursor::new(&self.data[offset..end], self.path))
    }

    /// Consume the next `len` bytes as a bounded sub-cursor.
    pub fn take_slice(&mut self, len: usize, what: &'static str) -> Result<Cursor<'a>> {
        let bytes = self.take(len, what)?;
        Ok(Cursor::new(bytes, self.path))
    }
}

/// Decode a string table: `count` entries, each a ULEB128 length followed by
/// that many UTF-8 bytes.
pub fn read_string_table(cur: &mut Cursor<'_>, count: usize) -> Result<Vec<String>> {
    // Each entry needs at least one length byte; reject counts the buffer
    // cannot possibly hold before allocating.
    if count > cur.remaining() {
        return Err(CoverageError::corruption(
            cur.path(),
            format!("string table declares {count} entries in {} bytes", cur.remaining()),
        ));
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cur.read_uleb128("string length")?;
        let len = usize::try_from(len).map_err(|_| {
            CoverageError::corruption(cur.path(), format!("string length {len} out of range"))
        })?;
        let bytes = cur.take(len, "string bytes")?;
        let text = std::str::from_utf8(bytes).map_err(|e| {
            CoverageError::corruption(cur.path(), format!("invalid utf-8 in string table: {e}"))
        })?;
        entries.push(text.to_string());
    }
    Ok(entries)
}

/// Append a ULEB128 encoding of `value` to `out`.
pub fn write_uleb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Interning string table builder used by both encoders. Strings keep their
/// first-use order so decoded indices stay stable across re-encodes.
#[derive(Default)]
pub struct StringTableBuilder {
    index: HashMap<String, u32>,
    entries: Vec<String>,
}

impl StringTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, value: &str) -> u32 {
        if let Some(&idx) = self.index.get(value) {
            return idx;
        }
        let idx = self.entries.len() as u32;
        self.index.insert(value.to_string(), idx);
        self.entries.push(value.to_string());
        idx
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode the table body: one ULEB128 length + bytes per entry, in intern
    /// order. The entry count is written by the caller, whose header layout
    /// differs between the two formats.
    pub fn encode_entries(&self, out: &mut Vec<u8>) {
        for entry in &self.entries {
            write_uleb128(out, entry.len() as u64);
            out.extend_from_slice(entry.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn cursor_over<'a>(data: &'a [u8], path: &'a Path) -> Cursor<'a> {
        Cursor::new(data, path)
    }

    #[test]
    fn test_uleb128_round_trip() {
        let path = PathBuf::from("test");
        for value in [0u64, 1, 127, 128, 300, 16_384, u64::from(u32::MAX), u64::MAX] {
            let mut buf = Vec::new();
            write_uleb128(&mut buf, value);
            let mut cur = cursor_over(&buf, &path);
            assert_eq!(cur.read_uleb128("value").unwrap(), value);
            assert!(cur.is_empty());
        }
    }

    #[test]
    fn test_uleb128_truncated() {
        let path = PathBuf::from("test");
        // Continuation bit set but no following byte.
        let mut cur = cursor_over(&[0x80], &path);
        let err = cur.read_uleb128("value").unwrap_err();
        assert!(matches!(
            err,
            crate::core::errors::CoverageError::TruncatedData { .. }
        ));
    }

    #[test]
    fn test_uleb128_overlong_is_corruption() {
        let path = PathBuf::from("test");
        let bytes = [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01];
        let mut cur = cursor_over(&bytes, &path);
        let err = cur.read_uleb128("value").unwrap_err();
        assert!(matches!(
            err,
            crate::core::errors::CoverageError::Corruption { .. }
        ));
    }

    #[test]
    fn test_take_past_end_is_truncation() {
        let path = PathBuf::from("test");
        let mut cur = cursor_over(&[1, 2, 3], &path);
        assert!(cur.take(2, "field").is_ok());
        let err = cur.take(2, "field").unwrap_err();
        assert!(matches!(
            err,
            crate::core::errors::CoverageError::TruncatedData { .. }
        ));
    }

    #[test]
    fn test_slice_at_out_of_bounds_is_corruption() {
        let path = PathBuf::from("test");
        let cur = cursor_over(&[0u8; 8], &path);
        assert!(cur.slice_at(4, 4, "table").is_ok());
        let err = cur.slice_at(4, 5, "table").unwrap_err();
        assert!(matches!(
            err,
            crate::core::errors::CoverageError::Corruption { .. }
        ));
    }

    #[test]
    fn test_string_table_round_trip() {
        let path = PathBuf::from("test");
        let mut builder = StringTableBuilder::new();
        assert_eq!(builder.intern("pkg/a"), 0);
        assert_eq!(builder.intern("Fn"), 1);
        assert_eq!(builder.intern("pkg/a"), 0);

        let mut buf = Vec::new();
        builder.encode_entries(&mut buf);
        let mut cur = cursor_over(&buf, &path);
        let decoded = read_string_table(&mut cur, 2).unwrap();
        assert_eq!(decoded, vec!["pkg/a".to_string(), "Fn".to_string()]);
    }
}

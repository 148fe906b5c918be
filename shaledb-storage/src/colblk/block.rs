// SPDX-License-Identifier: AGPL-3.0-or-later
// ShaleDB - Log-Structured Columnar Storage Engine
// Copyright (C) 2026 ShaleDB Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Key Block Container
//!
//! Serializes the key columns of one data block behind a fixed header:
//!
//! ```text
//! [rows: u32] [max_key_len: u32]
//! [(columns+1) x u32 column offsets]
//! [ceil(rows/64) x u64 prefix-changed words]
//! [column payloads...]
//! ```
//!
//! The writer is reset and reused across blocks; readers bind to an
//! immutable byte buffer shared through an `Arc` so pooled seekers can
//! hold column views without pinning a lifetime.

use byteorder::{ByteOrder, LittleEndian};
use shaledb_core::key::MVCC_SUFFIX_MAX_LEN;
use shaledb_core::{Result, ShaleError};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::bitmap::{BitmapBuilder, BitmapReader};
use super::prefix_bytes::{PrefixBytesIter, PrefixBytesReader};
use super::raw_bytes::RawBytesReader;
use super::schema::KeySchema;
use super::uint::UintReader;
use super::{DataType, KeyComparison, KeyWriter};

const FIXED_HEADER_LEN: usize = 8;

/// Builds a serialized key block from sorted engine keys.
pub struct KeyBlockWriter {
    key_writer: Box<dyn KeyWriter>,
    prefix_changed: BitmapBuilder,
    rows: usize,
    max_key_len: usize,
}

impl KeyBlockWriter {
    pub fn new(schema: &KeySchema) -> Self {
        Self {
            key_writer: (schema.new_key_writer)(),
            prefix_changed: BitmapBuilder::new(),
            rows: 0,
            max_key_len: 0,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Compares `key` against the last added row; see
    /// [`KeyWriter::compare_prev`].
    pub fn compare_prev(&self, key: &[u8]) -> KeyComparison {
        self.key_writer.compare_prev(key)
    }

    /// Appends `key`, which must not sort before the previous key.
    pub fn add(&mut self, key: &[u8]) {
        let kcmp = self.compare_prev(key);
        self.add_with_comparison(key, kcmp);
    }

    /// Appends `key` using a comparison the caller already obtained.
    pub fn add_with_comparison(&mut self, key: &[u8], kcmp: KeyComparison) {
        debug_assert!(
            self.rows == 0 || kcmp.user_key_comparison != Ordering::Less,
            "keys must be added in sorted order"
        );
        self.prefix_changed.push(self.rows == 0 || !kcmp.prefix_equal());
        self.key_writer
            .write_key(self.rows, key, kcmp.prefix_len, kcmp.common_prefix_len);
        // Track the worst-case materialized length so readers can size
        // iteration buffers up front. A stored suffix re-encodes to at
        // most max(its own length, the canonical MVCC form).
        let suffix_len = key.len() - kcmp.prefix_len;
        self.max_key_len = self
            .max_key_len
            .max(kcmp.prefix_len + suffix_len.max(MVCC_SUFFIX_MAX_LEN));
        self.rows += 1;
    }

    fn header_len(&self, rows: usize) -> usize {
        FIXED_HEADER_LEN
            + (self.key_writer.num_columns() + 1) * 4
            + BitmapBuilder::serialized_size(rows)
    }

    /// Current serialized size; callers poll this to cut blocks at a
    /// target size.
    pub fn size(&self) -> usize {
        self.key_writer
            .size(self.rows, self.header_len(self.rows) as u32) as usize
    }

    /// Serializes the block.
    pub fn finish(&mut self) -> Vec<u8> {
        let ncols = self.key_writer.num_columns();
        let header_len = self.header_len(self.rows);
        let total = self.key_writer.size(self.rows, header_len as u32) as usize;
        let mut buf = vec![0u8; total];
        LittleEndian::write_u32(&mut buf[0..4], self.rows as u32);
        LittleEndian::write_u32(&mut buf[4..8], self.max_key_len as u32);
        let bitmap_start = FIXED_HEADER_LEN + (ncols + 1) * 4;
        self.prefix_changed
            .finish(&mut buf[bitmap_start..header_len]);
        let mut offset = header_len as u32;
        for col in 0..ncols {
            let pos = FIXED_HEADER_LEN + col * 4;
            LittleEndian::write_u32(&mut buf[pos..pos + 4], offset);
            offset = self.key_writer.finish(col, self.rows, offset, &mut buf);
        }
        let pos = FIXED_HEADER_LEN + ncols * 4;
        LittleEndian::write_u32(&mut buf[pos..pos + 4], offset);
        debug_assert_eq!(offset as usize, total);
        tracing::trace!(rows = self.rows, bytes = total, "finished key block");
        buf
    }

    /// Clears all state for the next block.
    pub fn reset(&mut self) {
        self.key_writer.reset();
        self.prefix_changed.reset();
        self.rows = 0;
        self.max_key_len = 0;
    }

    /// Reconstructs row `row`'s key from the writer's column builders.
    pub fn materialize_key(&self, dst: &mut Vec<u8>, row: usize) {
        self.key_writer.materialize_key(dst, row);
    }

    pub fn write_debug(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        self.key_writer.write_debug(w, self.rows)
    }
}

/// One parsed column view.
#[derive(Debug, Clone)]
pub enum ColumnReader {
    PrefixBytes(PrefixBytesReader),
    Uint(UintReader),
    Bytes(RawBytesReader),
}

/// Read-only view over a serialized key block.
#[derive(Debug)]
pub struct KeyBlockReader {
    rows: usize,
    max_key_len: usize,
    columns: Vec<ColumnReader>,
    prefix_changed: BitmapReader,
}

impl KeyBlockReader {
    /// Parses and validates `data` against `schema`. All corruption is
    /// surfaced here; the column views handed out afterwards assume a
    /// well-formed block.
    pub fn new(data: impl Into<Arc<[u8]>>, schema: &KeySchema) -> Result<Self> {
        let data: Arc<[u8]> = data.into();
        let ncols = schema.column_types.len();
        let fixed = FIXED_HEADER_LEN + (ncols + 1) * 4;
        if data.len() < fixed {
            return Err(ShaleError::Corruption(format!(
                "key block {} bytes, header needs {fixed}",
                data.len()
            )));
        }
        let rows = LittleEndian::read_u32(&data[0..4]) as usize;
        let max_key_len = LittleEndian::read_u32(&data[4..8]) as usize;
        let bitmap_len = BitmapBuilder::serialized_size(rows);
        let header_len = fixed + bitmap_len;
        if data.len() < header_len {
            return Err(ShaleError::Corruption(format!(
                "key block {} bytes too short for {rows} rows",
                data.len()
            )));
        }
        let mut offsets = vec![0usize; ncols + 1];
        for (i, off) in offsets.iter_mut().enumerate() {
            let pos = FIXED_HEADER_LEN + i * 4;
            *off = LittleEndian::read_u32(&data[pos..pos + 4]) as usize;
        }
        if offsets[0] != header_len {
            return Err(ShaleError::Corruption(format!(
                "first column offset {} does not follow the header ({header_len})",
                offsets[0]
            )));
        }
        for i in 0..ncols {
            if offsets[i + 1] < offsets[i] || offsets[i + 1] > data.len() {
                return Err(ShaleError::Corruption(format!(
                    "column {i} offsets {}..{} out of bounds",
                    offsets[i],
                    offsets[i + 1]
                )));
            }
        }
        let prefix_changed = BitmapReader::new(data.clone(), fixed..header_len, rows)?;
        let mut columns = Vec::with_capacity(ncols);
        for (col, data_type) in schema.column_types.iter().enumerate() {
            let region = offsets[col]..offsets[col + 1];
            columns.push(match data_type {
                DataType::PrefixBytes => {
                    ColumnReader::PrefixBytes(PrefixBytesReader::new(data.clone(), region, rows)?)
                }
                DataType::Uint => ColumnReader::Uint(UintReader::new(data.clone(), region, rows)?),
                DataType::Bytes => {
                    ColumnReader::Bytes(RawBytesReader::new(data.clone(), region, rows)?)
                }
            });
        }
        let reader = Self {
            rows,
            max_key_len,
            columns,
            prefix_changed,
        };
        // Iteration buffers are sized from max_key_len; it must at least
        // cover the longest prefix plus a canonical MVCC suffix.
        if rows > 0 {
            let needed = reader.first_prefix_column().max_len() + 1 + MVCC_SUFFIX_MAX_LEN;
            if max_key_len < needed {
                return Err(ShaleError::Corruption(format!(
                    "key block max key length {max_key_len} below required {needed}"
                )));
            }
        } else if max_key_len != 0 {
            return Err(ShaleError::Corruption(format!(
                "empty key block declares max key length {max_key_len}"
            )));
        }
        tracing::trace!(rows, bytes = data.len(), "bound key block reader");
        Ok(reader)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Worst-case materialized key length, for sizing iteration buffers.
    #[inline]
    pub fn max_key_len(&self) -> usize {
        self.max_key_len
    }

    /// Prefix bytes view of column `col`. Panics when the schema maps
    /// `col` to a different type.
    pub fn prefix_bytes(&self, col: usize) -> &PrefixBytesReader {
        match &self.columns[col] {
            ColumnReader::PrefixBytes(r) => r,
            _ => panic!("column {col} is not a prefix bytes column"),
        }
    }

    /// Uint view of column `col`. Panics when the schema maps `col` to a
    /// different type.
    pub fn uints(&self, col: usize) -> &UintReader {
        match &self.columns[col] {
            ColumnReader::Uint(r) => r,
            _ => panic!("column {col} is not a uint column"),
        }
    }

    /// Raw bytes view of column `col`. Panics when the schema maps `col`
    /// to a different type.
    pub fn raw_bytes(&self, col: usize) -> &RawBytesReader {
        match &self.columns[col] {
            ColumnReader::Bytes(r) => r,
            _ => panic!("column {col} is not a raw bytes column"),
        }
    }

    #[inline]
    pub fn prefix_changed(&self) -> &BitmapReader {
        &self.prefix_changed
    }

    fn first_prefix_column(&self) -> &PrefixBytesReader {
        self.columns
            .iter()
            .find_map(|c| match c {
                ColumnReader::PrefixBytes(r) => Some(r),
                _ => None,
            })
            .expect("schema has no prefix bytes column")
    }

    /// An iterator buffer sized for any stored key in this block.
    pub fn key_iter(&self) -> PrefixBytesIter {
        self.first_prefix_column()
            .iter_with_capacity(self.max_key_len)
    }

    /// An iterator buffer that additionally fits a synthetic suffix of
    /// `suffix_len` bytes after any stored prefix.
    pub fn key_iter_with_suffix(&self, suffix_len: usize) -> PrefixBytesIter {
        let prefixes = self.first_prefix_column();
        let capacity = self
            .max_key_len
            .max(prefixes.max_len() + 1 + suffix_len);
        prefixes.iter_with_capacity(capacity)
    }
}

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

//! Raw Bytes Column
//!
//! Variable-length byte strings addressed through an offset array:
//!
//! ```text
//! [off_width: u8 in {0,1,2,4}] [(rows+1) x off_width offsets LE] [payload]
//! ```
//!
//! Offsets are stored at the narrowest width that can address the
//! payload. `off_width == 0` means every value is empty and nothing
//! further is stored — the common case for the untyped-version column,
//! where most blocks hold only MVCC keys.

use byteorder::{ByteOrder, LittleEndian};
use shaledb_core::{Result, ShaleError};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

#[inline]
fn offset_width(payload_len: usize) -> usize {
    match payload_len {
        0 => 0,
        1..=0xff => 1,
        0x100..=0xffff => 2,
        _ => 4,
    }
}

/// Builds a raw bytes column in row order.
#[derive(Debug)]
pub struct RawBytesBuilder {
    data: Vec<u8>,
    offsets: Vec<u32>,
}

impl Default for RawBytesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RawBytesBuilder {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            offsets: vec![0],
        }
    }

    /// Appends the next row's value, which may be empty.
    pub fn put(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.offsets.push(self.data.len() as u32);
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.offsets.len() - 1
    }

    #[inline]
    pub fn get(&self, row: usize) -> &[u8] {
        &self.data[self.offsets[row] as usize..self.offsets[row + 1] as usize]
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.offsets.clear();
        self.offsets.push(0);
    }

    /// Serialized end offset for `rows` rows starting at `offset`.
    pub fn size(&self, rows: usize, offset: u32) -> u32 {
        debug_assert_eq!(rows, self.rows());
        let width = offset_width(self.data.len());
        let mut size = 1;
        if width > 0 {
            size += (rows + 1) * width + self.data.len();
        }
        offset + size as u32
    }

    /// Serializes the column into `buf` at `offset`; returns the end
    /// offset.
    pub fn finish(&self, rows: usize, offset: u32, buf: &mut [u8]) -> u32 {
        debug_assert_eq!(rows, self.rows());
        let width = offset_width(self.data.len());
        let start = offset as usize;
        buf[start] = width as u8;
        if width == 0 {
            return (start + 1) as u32;
        }
        let mut pos = start + 1;
        for &off in &self.offsets {
            match width {
                1 => buf[pos] = off as u8,
                2 => LittleEndian::write_u16(&mut buf[pos..pos + 2], off as u16),
                _ => LittleEndian::write_u32(&mut buf[pos..pos + 4], off),
            }
            pos += width;
        }
        buf[pos..pos + self.data.len()].copy_from_slice(&self.data);
        (pos + self.data.len()) as u32
    }

    pub fn write_debug(&self, w: &mut dyn fmt::Write, rows: usize) -> fmt::Result {
        for row in 0..rows.min(self.rows()) {
            if row > 0 {
                write!(w, " ")?;
            }
            write!(w, "{:?}", String::from_utf8_lossy(self.get(row)))?;
        }
        Ok(())
    }
}

/// Read-only view over a serialized raw bytes column.
#[derive(Debug, Clone)]
pub struct RawBytesReader {
    data: Arc<[u8]>,
    off_width: usize,
    offsets: usize,
    payload: Range<usize>,
    rows: usize,
}

impl RawBytesReader {
    pub(crate) fn new(data: Arc<[u8]>, col: Range<usize>, rows: usize) -> Result<Self> {
        if col.is_empty() || col.end > data.len() {
            return Err(ShaleError::Corruption(
                "raw bytes column region empty".to_string(),
            ));
        }
        let off_width = data[col.start] as usize;
        if !matches!(off_width, 0 | 1 | 2 | 4) {
            return Err(ShaleError::Corruption(format!(
                "raw bytes offset width {off_width} invalid"
            )));
        }
        if off_width == 0 {
            if col.len() != 1 {
                return Err(ShaleError::Corruption(
                    "raw bytes column with zero width has trailing bytes".to_string(),
                ));
            }
            return Ok(Self {
                data,
                off_width,
                offsets: 0,
                payload: 0..0,
                rows,
            });
        }
        let offsets = col.start + 1;
        let payload_start = offsets + (rows + 1) * off_width;
        if payload_start > col.end {
            return Err(ShaleError::Corruption(format!(
                "raw bytes column region {} bytes too short for {rows} rows",
                col.len()
            )));
        }
        let reader = Self {
            data,
            off_width,
            offsets,
            payload: payload_start..col.end,
            rows,
        };
        // Offsets must be monotone and land exactly on the payload end.
        let mut prev = 0;
        for row in 0..=rows {
            let off = reader.offset(row);
            if off < prev || off > reader.payload.len() {
                return Err(ShaleError::Corruption(format!(
                    "raw bytes offset {off} at row {row} out of order"
                )));
            }
            prev = off;
        }
        if prev != reader.payload.len() {
            return Err(ShaleError::Corruption(format!(
                "raw bytes payload {} bytes, offsets cover {prev}",
                reader.payload.len()
            )));
        }
        Ok(reader)
    }

    pub(crate) fn empty() -> Self {
        Self {
            data: Arc::from(Vec::new()),
            off_width: 0,
            offsets: 0,
            payload: 0..0,
            rows: 0,
        }
    }

    #[inline]
    fn offset(&self, row: usize) -> usize {
        let pos = self.offsets + row * self.off_width;
        match self.off_width {
            1 => self.data[pos] as usize,
            2 => LittleEndian::read_u16(&self.data[pos..pos + 2]) as usize,
            _ => LittleEndian::read_u32(&self.data[pos..pos + 4]) as usize,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Value at `row`; empty slices are returned for unset rows.
    #[inline]
    pub fn at(&self, row: usize) -> &[u8] {
        debug_assert!(row < self.rows);
        if self.off_width == 0 {
            return &[];
        }
        let start = self.payload.start + self.offset(row);
        let end = self.payload.start + self.offset(row + 1);
        &self.data[start..end]
    }
}

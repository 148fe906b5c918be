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

//! Unsigned Integer Column
//!
//! Fixed-width integer column with delta-from-base compression. The
//! serialized form stores each row as an offset from the column minimum
//! at the narrowest width that fits the spread:
//!
//! ```text
//! [width: u8 in {0,1,2,4,8}] [base: u64 LE] [rows x width delta bytes LE]
//! ```
//!
//! `width == 0` means every row equals `base` and no per-row bytes are
//! stored, which collapses constant columns (e.g. an all-zero logical
//! time column) to nine bytes.

use byteorder::{ByteOrder, LittleEndian};
use shaledb_core::{Result, ShaleError};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

const HEADER_LEN: usize = 1 + 8;

#[inline]
fn width_for_range(range: u64) -> usize {
    match range {
        0 => 0,
        1..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xffff_ffff => 4,
        _ => 8,
    }
}

/// Builds an unsigned integer column in row order.
///
/// The default-value flavor treats unset rows as the default, so sparse
/// columns only pay for the rows they actually set.
#[derive(Debug, Default)]
pub struct UintBuilder {
    values: Vec<u64>,
    default_value: Option<u64>,
}

impl UintBuilder {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            default_value: None,
        }
    }

    /// A builder whose unset rows read as zero.
    pub fn with_zero_default() -> Self {
        Self {
            values: Vec::new(),
            default_value: Some(0),
        }
    }

    /// Sets the value for `row`. Rows must be set in increasing order;
    /// skipped rows are only permitted for the default-value flavor.
    pub fn set(&mut self, row: usize, value: u64) {
        if let Some(default) = self.default_value {
            while self.values.len() < row {
                self.values.push(default);
            }
        }
        debug_assert_eq!(self.values.len(), row, "rows must be set in order");
        self.values.push(value);
    }

    /// Value at `row`, accounting for the implicit default.
    #[inline]
    pub fn get(&self, row: usize) -> u64 {
        self.values
            .get(row)
            .copied()
            .unwrap_or_else(|| self.default_value.unwrap_or(0))
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }

    fn bounds(&self, rows: usize) -> (u64, u64) {
        debug_assert!(self.values.len() <= rows);
        let mut min = u64::MAX;
        let mut max = 0u64;
        for &v in &self.values[..self.values.len().min(rows)] {
            min = min.min(v);
            max = max.max(v);
        }
        if self.values.len() < rows {
            let default = self.default_value.unwrap_or(0);
            min = min.min(default);
            max = max.max(default);
        }
        if rows == 0 {
            (0, 0)
        } else {
            (min, max)
        }
    }

    /// Serialized end offset for `rows` rows starting at `offset`.
    pub fn size(&self, rows: usize, offset: u32) -> u32 {
        let (min, max) = self.bounds(rows);
        let width = width_for_range(max - min);
        offset + (HEADER_LEN + rows * width) as u32
    }

    /// Serializes the column into `buf` at `offset`; returns the end
    /// offset.
    pub fn finish(&self, rows: usize, offset: u32, buf: &mut [u8]) -> u32 {
        let (min, max) = self.bounds(rows);
        let width = width_for_range(max - min);
        let start = offset as usize;
        buf[start] = width as u8;
        LittleEndian::write_u64(&mut buf[start + 1..start + 9], min);
        let mut pos = start + HEADER_LEN;
        for row in 0..rows {
            let delta = self.get(row) - min;
            match width {
                0 => {}
                1 => buf[pos] = delta as u8,
                2 => LittleEndian::write_u16(&mut buf[pos..pos + 2], delta as u16),
                4 => LittleEndian::write_u32(&mut buf[pos..pos + 4], delta as u32),
                _ => LittleEndian::write_u64(&mut buf[pos..pos + 8], delta),
            }
            pos += width;
        }
        pos as u32
    }

    pub fn write_debug(&self, w: &mut dyn fmt::Write, rows: usize) -> fmt::Result {
        let shown = rows.min(self.values.len());
        for row in 0..shown {
            if row > 0 {
                write!(w, " ")?;
            }
            write!(w, "{}", self.get(row))?;
        }
        if rows > shown {
            write!(w, " (+{} default)", rows - shown)?;
        }
        Ok(())
    }
}

/// Read-only view over a serialized unsigned integer column.
#[derive(Debug, Clone)]
pub struct UintReader {
    data: Arc<[u8]>,
    width: usize,
    base: u64,
    payload: usize,
    rows: usize,
}

impl UintReader {
    pub(crate) fn new(data: Arc<[u8]>, col: Range<usize>, rows: usize) -> Result<Self> {
        if col.len() < HEADER_LEN || col.end > data.len() {
            return Err(ShaleError::Corruption(format!(
                "uint column region {} bytes, header needs {HEADER_LEN}",
                col.len()
            )));
        }
        let width = data[col.start] as usize;
        if !matches!(width, 0 | 1 | 2 | 4 | 8) {
            return Err(ShaleError::Corruption(format!(
                "uint column width {width} invalid"
            )));
        }
        let base = LittleEndian::read_u64(&data[col.start + 1..col.start + 9]);
        if col.len() != HEADER_LEN + rows * width {
            return Err(ShaleError::Corruption(format!(
                "uint column region {} bytes, expected {} for {rows} rows at width {width}",
                col.len(),
                HEADER_LEN + rows * width
            )));
        }
        Ok(Self {
            data,
            width,
            base,
            payload: col.start + HEADER_LEN,
            rows,
        })
    }

    pub(crate) fn empty() -> Self {
        Self {
            data: Arc::from(Vec::new()),
            width: 0,
            base: 0,
            payload: 0,
            rows: 0,
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Value at `row`.
    #[inline]
    pub fn at(&self, row: usize) -> u64 {
        debug_assert!(row < self.rows);
        let pos = self.payload + row * self.width;
        let delta = match self.width {
            0 => 0,
            1 => self.data[pos] as u64,
            2 => LittleEndian::read_u16(&self.data[pos..pos + 2]) as u64,
            4 => LittleEndian::read_u32(&self.data[pos..pos + 4]) as u64,
            _ => LittleEndian::read_u64(&self.data[pos..pos + 8]),
        };
        self.base + delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(builder: &UintBuilder, rows: usize) -> UintReader {
        let size = builder.size(rows, 0) as usize;
        let mut buf = vec![0u8; size];
        let end = builder.finish(rows, 0, &mut buf);
        assert_eq!(end as usize, size);
        UintReader::new(Arc::from(buf), 0..size, rows).unwrap()
    }

    #[test]
    fn test_constant_column_is_nine_bytes() {
        let mut b = UintBuilder::new();
        for row in 0..100 {
            b.set(row, 7);
        }
        assert_eq!(b.size(100, 0), 9);
        let r = round_trip(&b, 100);
        assert_eq!(r.at(0), 7);
        assert_eq!(r.at(99), 7);
    }

    #[test]
    fn test_width_selection() {
        for (spread, width) in [(0u64, 0usize), (200, 1), (60_000, 2), (1 << 30, 4), (1 << 40, 8)] {
            let mut b = UintBuilder::new();
            b.set(0, 1000);
            b.set(1, 1000 + spread);
            let size = b.size(2, 0) as usize;
            assert_eq!(size, 9 + 2 * width, "spread {spread}");
            let r = round_trip(&b, 2);
            assert_eq!(r.at(0), 1000);
            assert_eq!(r.at(1), 1000 + spread);
        }
    }

    #[test]
    fn test_zero_default_sparse_rows() {
        let mut b = UintBuilder::with_zero_default();
        b.set(2, 5);
        b.set(5, 9);
        // Rows 6..8 are never set and must read as zero.
        let r = round_trip(&b, 8);
        let expected = [0, 0, 5, 0, 0, 9, 0, 0];
        for (row, want) in expected.iter().enumerate() {
            assert_eq!(r.at(row), *want, "row {row}");
        }
    }

    #[test]
    fn test_all_default_column() {
        let b = UintBuilder::with_zero_default();
        assert_eq!(b.size(50, 0), 9);
        let r = round_trip(&b, 50);
        assert_eq!(r.at(49), 0);
    }

    #[test]
    fn test_large_values() {
        let mut b = UintBuilder::new();
        b.set(0, u64::MAX);
        b.set(1, 0);
        let r = round_trip(&b, 2);
        assert_eq!(r.at(0), u64::MAX);
        assert_eq!(r.at(1), 0);
    }

    #[test]
    fn test_corrupt_width_rejected() {
        let mut buf = vec![0u8; 9];
        buf[0] = 3;
        assert!(UintReader::new(Arc::from(buf), 0..9, 0).is_err());
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut b = UintBuilder::new();
        b.set(0, 1);
        b.set(1, 300);
        let size = b.size(2, 0) as usize;
        let mut buf = vec![0u8; size];
        b.finish(2, 0, &mut buf);
        buf.pop();
        let len = buf.len();
        assert!(UintReader::new(Arc::from(buf), 0..len, 2).is_err());
    }
}

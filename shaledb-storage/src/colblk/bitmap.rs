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

//! Per-Row Bit Set
//!
//! A dense bit-per-row set serialized as little-endian `u64` words. The
//! key block uses one to mark the first row of every equal-prefix run
//! (the "prefix changed" bit), which the seeker consults to find the end
//! of a run without touching the prefix column.

use byteorder::{ByteOrder, LittleEndian};
use shaledb_core::{Result, ShaleError};
use std::ops::Range;
use std::sync::Arc;

/// Builds a bit set one row at a time.
#[derive(Debug, Default)]
pub struct BitmapBuilder {
    words: Vec<u64>,
    len: usize,
}

impl BitmapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the bit for the next row.
    #[inline]
    pub fn push(&mut self, bit: bool) {
        let word = self.len / 64;
        if word >= self.words.len() {
            self.words.push(0);
        }
        if bit {
            self.words[word] |= 1 << (self.len % 64);
        }
        self.len += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn get(&self, row: usize) -> bool {
        debug_assert!(row < self.len);
        (self.words[row / 64] >> (row % 64)) & 1 == 1
    }

    pub fn reset(&mut self) {
        self.words.clear();
        self.len = 0;
    }

    /// Serialized size in bytes for `rows` rows.
    pub fn serialized_size(rows: usize) -> usize {
        rows.div_ceil(64) * 8
    }

    /// Writes the words into `buf`, which must be exactly sized.
    pub fn finish(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), Self::serialized_size(self.len));
        for (i, word) in self.words.iter().enumerate() {
            LittleEndian::write_u64(&mut buf[i * 8..i * 8 + 8], *word);
        }
    }
}

/// Read-only view over a serialized bit set.
#[derive(Debug, Clone)]
pub struct BitmapReader {
    data: Arc<[u8]>,
    words: Range<usize>,
    rows: usize,
}

impl BitmapReader {
    pub(crate) fn new(data: Arc<[u8]>, words: Range<usize>, rows: usize) -> Result<Self> {
        let expected = BitmapBuilder::serialized_size(rows);
        if words.len() != expected || words.end > data.len() {
            return Err(ShaleError::Corruption(format!(
                "bit set region {} bytes, expected {expected} for {rows} rows",
                words.len()
            )));
        }
        Ok(Self { data, words, rows })
    }

    pub(crate) fn empty() -> Self {
        Self {
            data: Arc::from(Vec::new()),
            words: 0..0,
            rows: 0,
        }
    }

    #[inline]
    fn word(&self, i: usize) -> u64 {
        let start = self.words.start + i * 8;
        LittleEndian::read_u64(&self.data[start..start + 8])
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn get(&self, row: usize) -> bool {
        debug_assert!(row < self.rows);
        (self.word(row / 64) >> (row % 64)) & 1 == 1
    }

    /// Returns the smallest set index >= `row`, or `rows` when no set
    /// bit remains.
    pub fn seek_set_bit_ge(&self, row: usize) -> usize {
        if row >= self.rows {
            return self.rows;
        }
        let num_words = self.rows.div_ceil(64);
        let mut w = row / 64;
        let mut word = self.word(w) & (!0u64 << (row % 64));
        loop {
            if word != 0 {
                let found = w * 64 + word.trailing_zeros() as usize;
                return found.min(self.rows);
            }
            w += 1;
            if w >= num_words {
                return self.rows;
            }
            word = self.word(w);
        }
    }
}

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

//! Prefix Bytes Column
//!
//! A sorted byte-string dictionary with two layers of prefix
//! compression. Because the block's rows arrive in sorted order, equal
//! prefixes form contiguous runs; the column stores each distinct
//! prefix once (a *slot*) together with the row where its run begins.
//! On top of that, the longest prefix common to every slot is stored a
//! single time and stripped from each slot's bytes:
//!
//! ```text
//! [slots: u32] [max_prefix_len: u32] [shared_len: u32]
//! [slots x u32 start_rows] [(slots+1) x u32 offsets]
//! [shared bytes] [per-slot bytes after the shared prefix]
//! ```
//!
//! Readers reconstruct a row's prefix as `shared ++ slot_suffix`. The
//! [`PrefixBytesIter`] keeps the current prefix assembled in a
//! caller-owned buffer so sequential access only rewrites the suffix
//! portion when the row crosses into the next run.

use byteorder::{ByteOrder, LittleEndian};
use shaledb_core::key::common_prefix_len;
use shaledb_core::{Result, ShaleError};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

const HEADER_LEN: usize = 12;

/// Builds a prefix bytes column from sorted prefixes.
#[derive(Debug)]
pub struct PrefixBytesBuilder {
    /// Distinct prefixes, concatenated in full.
    data: Vec<u8>,
    /// Slot boundaries into `data`, one past each slot.
    offsets: Vec<u32>,
    /// First row of each slot's run.
    start_rows: Vec<u32>,
    rows: usize,
    max_len: usize,
}

impl Default for PrefixBytesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PrefixBytesBuilder {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            offsets: vec![0],
            start_rows: Vec::new(),
            rows: 0,
            max_len: 0,
        }
    }

    /// Appends the next row's prefix.
    ///
    /// `shared_with_prev` is the number of leading bytes known to match
    /// the previous row's prefix; when it covers the whole of `prefix`
    /// the row joins the previous run instead of opening a new slot.
    pub fn put(&mut self, prefix: &[u8], shared_with_prev: usize) {
        let joins_run = self.rows > 0
            && shared_with_prev >= prefix.len()
            && self.last_prefix().len() == prefix.len();
        if joins_run {
            debug_assert_eq!(self.last_prefix(), prefix);
        } else {
            self.start_rows.push(self.rows as u32);
            self.data.extend_from_slice(prefix);
            self.offsets.push(self.data.len() as u32);
            self.max_len = self.max_len.max(prefix.len());
        }
        self.rows += 1;
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn slots(&self) -> usize {
        self.start_rows.len()
    }

    /// The most recently appended prefix. Panics when empty.
    #[inline]
    pub fn last_prefix(&self) -> &[u8] {
        let slot = self.start_rows.len() - 1;
        &self.data[self.offsets[slot] as usize..self.offsets[slot + 1] as usize]
    }

    fn slot_prefix(&self, slot: usize) -> &[u8] {
        &self.data[self.offsets[slot] as usize..self.offsets[slot + 1] as usize]
    }

    /// Prefix of `row`, resolving the run it belongs to.
    pub fn get_row(&self, row: usize) -> &[u8] {
        debug_assert!(row < self.rows);
        let slot = self.start_rows.partition_point(|&s| s as usize <= row) - 1;
        self.slot_prefix(slot)
    }

    /// Longest prefix common to all slots. With sorted input this is the
    /// common prefix of the first and last slot.
    fn shared_len(&self) -> usize {
        match self.slots() {
            0 => 0,
            1 => self.slot_prefix(0).len(),
            n => common_prefix_len(self.slot_prefix(0), self.slot_prefix(n - 1)),
        }
    }

    pub fn reset(&mut self) {
        self.data.clear();
        self.offsets.clear();
        self.offsets.push(0);
        self.start_rows.clear();
        self.rows = 0;
        self.max_len = 0;
    }

    /// Serialized end offset for `rows` rows starting at `offset`.
    pub fn size(&self, rows: usize, offset: u32) -> u32 {
        debug_assert_eq!(rows, self.rows);
        let slots = self.slots();
        let shared = self.shared_len();
        let stripped = self.data.len() - slots * shared;
        let size = HEADER_LEN + slots * 4 + (slots + 1) * 4 + shared + stripped;
        offset + size as u32
    }

    /// Serializes the column into `buf` at `offset`; returns the end
    /// offset.
    pub fn finish(&self, rows: usize, offset: u32, buf: &mut [u8]) -> u32 {
        debug_assert_eq!(rows, self.rows);
        let slots = self.slots();
        let shared = self.shared_len();
        let start = offset as usize;
        LittleEndian::write_u32(&mut buf[start..start + 4], slots as u32);
        LittleEndian::write_u32(&mut buf[start + 4..start + 8], self.max_len as u32);
        LittleEndian::write_u32(&mut buf[start + 8..start + 12], shared as u32);
        let mut pos = start + HEADER_LEN;
        for &row in &self.start_rows {
            LittleEndian::write_u32(&mut buf[pos..pos + 4], row);
            pos += 4;
        }
        for (slot, &off) in self.offsets.iter().enumerate() {
            let stripped_off = off as usize - slot * shared;
            LittleEndian::write_u32(&mut buf[pos..pos + 4], stripped_off as u32);
            pos += 4;
        }
        if slots > 0 {
            buf[pos..pos + shared].copy_from_slice(&self.data[..shared]);
            pos += shared;
            for slot in 0..slots {
                let suffix = &self.slot_prefix(slot)[shared..];
                buf[pos..pos + suffix.len()].copy_from_slice(suffix);
                pos += suffix.len();
            }
        }
        pos as u32
    }

    pub fn write_debug(&self, w: &mut dyn fmt::Write, rows: usize) -> fmt::Result {
        let mut shown = 0;
        for slot in 0..self.slots() {
            if shown >= rows {
                break;
            }
            if slot > 0 {
                write!(w, " ")?;
            }
            write!(
                w,
                "{:?}@{}",
                String::from_utf8_lossy(self.slot_prefix(slot)),
                self.start_rows[slot]
            )?;
            shown += 1;
        }
        Ok(())
    }
}

/// Read-only view over a serialized prefix bytes column.
#[derive(Debug, Clone)]
pub struct PrefixBytesReader {
    data: Arc<[u8]>,
    slots: usize,
    max_len: usize,
    shared: Range<usize>,
    start_rows: usize,
    offsets: usize,
    payload: Range<usize>,
    rows: usize,
}

impl PrefixBytesReader {
    pub(crate) fn new(data: Arc<[u8]>, col: Range<usize>, rows: usize) -> Result<Self> {
        if col.len() < HEADER_LEN || col.end > data.len() {
            return Err(ShaleError::Corruption(format!(
                "prefix column region {} bytes, header needs {HEADER_LEN}",
                col.len()
            )));
        }
        let slots = LittleEndian::read_u32(&data[col.start..col.start + 4]) as usize;
        let max_len = LittleEndian::read_u32(&data[col.start + 4..col.start + 8]) as usize;
        let shared_len = LittleEndian::read_u32(&data[col.start + 8..col.start + 12]) as usize;
        if rows > 0 && slots == 0 {
            return Err(ShaleError::Corruption(
                "prefix column has rows but no slots".to_string(),
            ));
        }
        let tables = slots
            .checked_mul(8)
            .and_then(|t| t.checked_add(HEADER_LEN + 4))
            .and_then(|t| t.checked_add(shared_len))
            .ok_or_else(|| ShaleError::Corruption("prefix column header overflow".to_string()))?;
        if tables > col.len() {
            return Err(ShaleError::Corruption(format!(
                "prefix column region {} bytes too short for {slots} slots",
                col.len()
            )));
        }
        let start_rows = col.start + HEADER_LEN;
        let offsets = start_rows + slots * 4;
        let shared_start = offsets + (slots + 1) * 4;
        let payload_start = shared_start + shared_len;
        let reader = Self {
            data,
            slots,
            max_len,
            shared: shared_start..shared_start + shared_len,
            start_rows,
            offsets,
            payload: payload_start..col.end,
            rows,
        };
        // Start rows must begin at zero and strictly increase; offsets
        // must be monotone and cover the payload exactly.
        let mut prev_row = 0;
        for slot in 0..slots {
            let row = reader.start_row(slot);
            if row >= rows || (slot == 0 && row != 0) || (slot > 0 && row <= prev_row) {
                return Err(ShaleError::Corruption(format!(
                    "prefix column start row {row} at slot {slot} invalid"
                )));
            }
            prev_row = row;
        }
        let mut prev_off = 0;
        let mut longest = shared_len;
        for slot in 0..=slots {
            let off = reader.offset(slot);
            if off < prev_off || off > reader.payload.len() {
                return Err(ShaleError::Corruption(format!(
                    "prefix column offset {off} at slot {slot} out of order"
                )));
            }
            longest = longest.max(shared_len + (off - prev_off));
            prev_off = off;
        }
        if prev_off != reader.payload.len() {
            return Err(ShaleError::Corruption(format!(
                "prefix column payload {} bytes, offsets cover {prev_off}",
                reader.payload.len()
            )));
        }
        // Iteration buffers are sized from max_len; it must cover every
        // reconstructed prefix.
        if slots > 0 && max_len < longest {
            return Err(ShaleError::Corruption(format!(
                "prefix column max length {max_len} below longest prefix {longest}"
            )));
        }
        Ok(reader)
    }

    pub(crate) fn empty() -> Self {
        Self {
            data: Arc::from(Vec::new()),
            slots: 0,
            max_len: 0,
            shared: 0..0,
            start_rows: 0,
            offsets: 0,
            payload: 0..0,
            rows: 0,
        }
    }

    #[inline]
    fn offset(&self, slot: usize) -> usize {
        let pos = self.offsets + slot * 4;
        LittleEndian::read_u32(&self.data[pos..pos + 4]) as usize
    }

    #[inline]
    fn start_row(&self, slot: usize) -> usize {
        let pos = self.start_rows + slot * 4;
        LittleEndian::read_u32(&self.data[pos..pos + 4]) as usize
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Longest prefix shared by every row in the block.
    #[inline]
    pub fn shared_prefix(&self) -> &[u8] {
        &self.data[self.shared.start..self.shared.end]
    }

    /// Length of the longest prefix in the block.
    #[inline]
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    #[inline]
    fn slot_suffix(&self, slot: usize) -> &[u8] {
        let start = self.payload.start + self.offset(slot);
        let end = self.payload.start + self.offset(slot + 1);
        &self.data[start..end]
    }

    /// Resolves the slot whose run contains `row`.
    pub fn slot_for_row(&self, row: usize) -> usize {
        debug_assert!(row < self.rows);
        // Greatest slot whose start row is <= row.
        let mut l = 0;
        let mut u = self.slots;
        while l < u {
            let h = (l + u) >> 1;
            if self.start_row(h) <= row {
                l = h + 1;
            } else {
                u = h;
            }
        }
        l - 1
    }

    /// Compares the full prefix of `slot` against `prefix`.
    fn cmp_slot(&self, slot: usize, prefix: &[u8]) -> Ordering {
        let shared = self.shared_prefix();
        let n = shared.len().min(prefix.len());
        match shared[..n].cmp(&prefix[..n]) {
            Ordering::Equal => {}
            ord => return ord,
        }
        if prefix.len() < shared.len() {
            return Ordering::Greater;
        }
        self.slot_suffix(slot).cmp(&prefix[shared.len()..])
    }

    /// Compares the prefix stored for `row` against `prefix`.
    pub fn compare_row_prefix(&self, row: usize, prefix: &[u8]) -> Ordering {
        self.cmp_slot(self.slot_for_row(row), prefix)
    }

    /// Finds the first row whose prefix is >= `prefix`.
    ///
    /// Returns `(row, equal)` where `row` is the start of the matching
    /// run (or `rows` when every prefix is smaller) and `equal` reports
    /// an exact match.
    pub fn search(&self, prefix: &[u8]) -> (usize, bool) {
        // First slot with prefix >= query; invariant f(l-1)=false, f(u)=true.
        let mut l = 0;
        let mut u = self.slots;
        while l < u {
            let h = (l + u) >> 1;
            if self.cmp_slot(h, prefix) == Ordering::Less {
                l = h + 1;
            } else {
                u = h;
            }
        }
        if l == self.slots {
            return (self.rows, false);
        }
        (self.start_row(l), self.cmp_slot(l, prefix) == Ordering::Equal)
    }

    /// Creates an iterator whose buffer holds `capacity` bytes, with the
    /// shared prefix pre-assembled.
    pub fn iter_with_capacity(&self, capacity: usize) -> PrefixBytesIter {
        let shared = self.shared_prefix();
        let mut buf = vec![0u8; capacity.max(shared.len())];
        buf[..shared.len()].copy_from_slice(shared);
        PrefixBytesIter {
            buf,
            prefix_len: shared.len(),
            row: 0,
            slot: 0,
        }
    }

    /// Positions `it` on `row`, rewriting the suffix portion of the
    /// assembled prefix.
    pub fn set_at(&self, it: &mut PrefixBytesIter, row: usize) {
        let slot = self.slot_for_row(row);
        self.load_slot(it, slot);
        it.row = row;
    }

    /// Advances `it` to the next row, reloading the suffix only when the
    /// row crosses into the next run.
    pub fn set_next(&self, it: &mut PrefixBytesIter) {
        let next = it.row + 1;
        debug_assert!(next < self.rows);
        if it.slot + 1 < self.slots && self.start_row(it.slot + 1) == next {
            self.load_slot(it, it.slot + 1);
        }
        it.row = next;
    }

    fn load_slot(&self, it: &mut PrefixBytesIter, slot: usize) {
        let shared_len = self.shared.len();
        let suffix = self.slot_suffix(slot);
        it.buf[shared_len..shared_len + suffix.len()].copy_from_slice(suffix);
        it.prefix_len = shared_len + suffix.len();
        it.slot = slot;
    }
}

/// Iterator state for sequential prefix reconstruction.
///
/// The buffer is sized by the creator for the longest materialized key;
/// the key seeker appends suffix bytes past `prefix_len` in place, so
/// slices returned from materialization alias this buffer and must be
/// copied before the iterator moves again.
#[derive(Debug)]
pub struct PrefixBytesIter {
    pub(crate) buf: Vec<u8>,
    pub(crate) prefix_len: usize,
    pub(crate) row: usize,
    pub(crate) slot: usize,
}

impl PrefixBytesIter {
    /// The prefix currently assembled in the buffer.
    #[inline]
    pub fn prefix(&self) -> &[u8] {
        &self.buf[..self.prefix_len]
    }

    /// Row the iterator is positioned on.
    #[inline]
    pub fn row(&self) -> usize {
        self.row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(prefixes: &[&[u8]]) -> PrefixBytesBuilder {
        let mut b = PrefixBytesBuilder::new();
        let mut prev: Option<Vec<u8>> = None;
        for p in prefixes {
            let shared = match &prev {
                Some(q) if q.as_slice() == *p => p.len(),
                Some(q) => common_prefix_len(q, p),
                None => 0,
            };
            b.put(p, shared);
            prev = Some(p.to_vec());
        }
        b
    }

    fn reader_from(b: &PrefixBytesBuilder) -> PrefixBytesReader {
        let size = b.size(b.rows(), 0) as usize;
        let mut buf = vec![0u8; size];
        let end = b.finish(b.rows(), 0, &mut buf);
        assert_eq!(end as usize, size);
        PrefixBytesReader::new(Arc::from(buf), 0..size, b.rows()).unwrap()
    }

    #[test]
    fn test_dedup_into_slots() {
        let b = build(&[b"apple", b"apple", b"apple", b"apricot", b"banana", b"banana"]);
        assert_eq!(b.rows(), 6);
        assert_eq!(b.slots(), 3);
        assert_eq!(b.get_row(0), b"apple");
        assert_eq!(b.get_row(2), b"apple");
        assert_eq!(b.get_row(3), b"apricot");
        assert_eq!(b.get_row(5), b"banana");
    }

    #[test]
    fn test_shared_prefix_stripping() {
        let b = build(&[b"block-aa", b"block-ab", b"block-b"]);
        let r = reader_from(&b);
        assert_eq!(r.shared_prefix(), b"block-");
        assert_eq!(r.slot_suffix(0), b"aa");
        assert_eq!(r.slot_suffix(2), b"b");
    }

    #[test]
    fn test_single_slot_shares_everything() {
        let b = build(&[b"only", b"only"]);
        let r = reader_from(&b);
        assert_eq!(r.shared_prefix(), b"only");
        assert_eq!(r.slots(), 1);
        assert!(r.slot_suffix(0).is_empty());
    }

    #[test]
    fn test_search() {
        let b = build(&[b"aa", b"aa", b"ab", b"ca"]);
        let r = reader_from(&b);
        assert_eq!(r.search(b"aa"), (0, true));
        assert_eq!(r.search(b"ab"), (2, true));
        assert_eq!(r.search(b"ca"), (3, true));
        // Misses land on the next run start.
        assert_eq!(r.search(b"a"), (0, false));
        assert_eq!(r.search(b"aab"), (2, false));
        assert_eq!(r.search(b"b"), (3, false));
        assert_eq!(r.search(b"cb"), (4, false));
    }

    #[test]
    fn test_search_shorter_and_longer_than_shared() {
        let b = build(&[b"shard-01", b"shard-02"]);
        let r = reader_from(&b);
        assert_eq!(r.search(b"shard"), (0, false));
        assert_eq!(r.search(b"shard-011"), (1, false));
        assert_eq!(r.search(b"t"), (2, false));
    }

    #[test]
    fn test_iter_sequential() {
        let prefixes: [&[u8]; 5] = [b"k-aa", b"k-aa", b"k-ab", b"k-ab", b"k-b"];
        let b = build(&prefixes);
        let r = reader_from(&b);
        let mut it = r.iter_with_capacity(r.max_len() + 14);
        r.set_at(&mut it, 0);
        assert_eq!(it.prefix(), b"k-aa");
        for (row, want) in prefixes.iter().enumerate().skip(1) {
            r.set_next(&mut it);
            assert_eq!(it.prefix(), *want, "row {row}");
            assert_eq!(it.row(), row);
        }
    }

    #[test]
    fn test_iter_random_access() {
        let b = build(&[b"aa", b"ab", b"ab", b"zz"]);
        let r = reader_from(&b);
        let mut it = r.iter_with_capacity(r.max_len() + 14);
        r.set_at(&mut it, 3);
        assert_eq!(it.prefix(), b"zz");
        r.set_at(&mut it, 1);
        assert_eq!(it.prefix(), b"ab");
        r.set_at(&mut it, 0);
        assert_eq!(it.prefix(), b"aa");
    }

    #[test]
    fn test_corrupt_start_rows_rejected() {
        let b = build(&[b"aa", b"bb"]);
        let size = b.size(2, 0) as usize;
        let mut buf = vec![0u8; size];
        b.finish(2, 0, &mut buf);
        // First start row must be zero.
        buf[HEADER_LEN] = 1;
        let len = buf.len();
        assert!(PrefixBytesReader::new(Arc::from(buf), 0..len, 2).is_err());
    }
}

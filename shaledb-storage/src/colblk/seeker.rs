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

//! MVCC Key Seeker
//!
//! Bound to one finished key block, the seeker answers ordered lookups
//! with a two-level search: a lexicographic binary search over the
//! deduplicated prefix column, then an MVCC-ordered (or untyped
//! lexicographic) search across the equal-prefix run, whose end the
//! prefix-changed bit set locates in O(run words).
//!
//! Seekers are pooled process-wide. [`KeySeeker::release`] clears every
//! column binding before the instance becomes reachable again, dropping
//! the block `Arc` so the backing bytes can be reclaimed.

use byteorder::{BigEndian, ByteOrder};
use parking_lot::Mutex;
use shaledb_core::key;
use shaledb_core::Result;
use std::cmp::Ordering;

use super::bitmap::BitmapReader;
use super::block::KeyBlockReader;
use super::prefix_bytes::{PrefixBytesIter, PrefixBytesReader};
use super::raw_bytes::RawBytesReader;
use super::schema::{COL_MVCC_LOGICAL, COL_MVCC_WALL_TIME, COL_PREFIX, COL_UNTYPED_VERSION};
use super::uint::UintReader;
use super::KeySeeker;

static SEEKER_POOL: Mutex<Vec<Box<MvccKeySeeker>>> = Mutex::new(Vec::new());

/// Key seeker for the MVCC key schema.
pub struct MvccKeySeeker {
    prefixes: PrefixBytesReader,
    wall_times: UintReader,
    logical_times: UintReader,
    untyped_versions: RawBytesReader,
    prefix_changed: BitmapReader,
}

impl Default for MvccKeySeeker {
    fn default() -> Self {
        Self {
            prefixes: PrefixBytesReader::empty(),
            wall_times: UintReader::empty(),
            logical_times: UintReader::empty(),
            untyped_versions: RawBytesReader::empty(),
            prefix_changed: BitmapReader::empty(),
        }
    }
}

impl MvccKeySeeker {
    /// Takes a seeker from the process-wide pool, allocating when the
    /// pool is empty. The instance must be bound with
    /// [`KeySeeker::init`] before use.
    pub fn acquire() -> Box<dyn KeySeeker> {
        match SEEKER_POOL.lock().pop() {
            Some(seeker) => seeker,
            None => Box::<MvccKeySeeker>::default(),
        }
    }

    #[inline]
    fn is_bare_row(&self, row: usize) -> bool {
        self.wall_times.at(row) == 0
            && self.logical_times.at(row) == 0
            && self.untyped_versions.at(row).is_empty()
    }

    /// Finds the first row at `index` or later carrying the same prefix
    /// as `index` and a suffix >= `seek_suffix`, or the next row with a
    /// different prefix when no such row exists.
    fn seek_ge_on_suffix(&self, index: usize, seek_suffix: &[u8]) -> usize {
        let run_end = self.prefix_changed.seek_set_bit_ge(index + 1);
        let (seek_wall, seek_logical) = match seek_suffix.len() {
            // No suffix: the smallest possible key for this prefix. This
            // is the common case of seeking to the newest version.
            0 => return index,
            key::SUFFIX_LEN_WALL => (BigEndian::read_u64(&seek_suffix[..8]), 0),
            key::SUFFIX_LEN_WALL_LOGICAL | key::SUFFIX_LEN_LEGACY => (
                BigEndian::read_u64(&seek_suffix[..8]),
                BigEndian::read_u32(&seek_suffix[8..12]),
            ),
            _ => {
                // Untyped suffix: ascending search over the untyped
                // column. Rows holding MVCC versions store an empty cell
                // there and order before any untyped seek suffix.
                //
                // f(i) = key at i >= seek key; f(l-1) == false, f(u) == true.
                let mut l = index;
                let mut u = run_end;
                while l < u {
                    let h = (l + u) >> 1;
                    if self.untyped_versions.at(h) >= seek_suffix {
                        u = h;
                    } else {
                        l = h + 1;
                    }
                }
                return l;
            }
        };
        let mut l = index;
        let mut u = run_end;
        // A bare key can only sit at the run start and sorts before every
        // versioned key, so the descending-timestamp predicate below must
        // never see it.
        if l < u && self.is_bare_row(l) {
            l += 1;
        }
        // Versions are stored newest first.
        //
        // f(i) = key at i >= seek key; f(l-1) == false, f(u) == true.
        while l < u {
            let h = (l + u) >> 1;
            let h_wall = self.wall_times.at(h);
            if h_wall < seek_wall
                || (h_wall == seek_wall && self.logical_times.at(h) as u32 <= seek_logical)
            {
                u = h;
            } else {
                l = h + 1;
            }
        }
        l
    }
}

impl KeySeeker for MvccKeySeeker {
    fn init(&mut self, block: &KeyBlockReader) -> Result<()> {
        self.prefixes = block.prefix_bytes(COL_PREFIX).clone();
        self.wall_times = block.uints(COL_MVCC_WALL_TIME).clone();
        self.logical_times = block.uints(COL_MVCC_LOGICAL).clone();
        self.untyped_versions = block.raw_bytes(COL_UNTYPED_VERSION).clone();
        self.prefix_changed = block.prefix_changed().clone();
        Ok(())
    }

    fn is_lower_bound(&self, engine_key: &[u8], synthetic_suffix: Option<&[u8]>) -> bool {
        if self.prefixes.rows() == 0 {
            return false;
        }
        let decoded = key::decode_engine_key(engine_key);
        match self.prefixes.compare_row_prefix(0, decoded.prefix) {
            Ordering::Less => return false,
            Ordering::Greater => return true,
            Ordering::Equal => {}
        }
        let query_suffix = &engine_key[decoded.prefix.len() + 1..];
        if let Some(suffix) = synthetic_suffix {
            return key::compare_suffixes(suffix, query_suffix) != Ordering::Less;
        }
        if !decoded.untyped_suffix.is_empty() {
            debug_assert!(
                self.wall_times.at(0) == 0 || self.untyped_versions.at(0).is_empty(),
                "row 0 carries both a timestamp and an untyped suffix"
            );
            return self.untyped_versions.at(0).cmp(decoded.untyped_suffix) != Ordering::Less;
        }
        let query_ts = (decoded.wall_time, decoded.logical_time);
        if query_ts == (0, 0) {
            // A bare query is the smallest key with this prefix.
            return true;
        }
        let first_ts = (self.wall_times.at(0), self.logical_times.at(0) as u32);
        if first_ts == (0, 0) {
            // An untyped first row sorts after any MVCC query; a bare one
            // sorts before every versioned query.
            return !self.untyped_versions.at(0).is_empty();
        }
        // Newer versions are smaller keys, so the first key is >= the
        // query exactly when its timestamp is <= the query's.
        first_ts <= query_ts
    }

    fn seek_ge(&self, engine_key: &[u8], bound_row: usize, search_dir: i8) -> (usize, bool) {
        let si = key::split(engine_key);
        let (row, equal) = self.prefixes.search(&engine_key[..si - 1]);
        let (mut row, equal) = if equal {
            (self.seek_ge_on_suffix(row, &engine_key[si..]), true)
        } else {
            (row, false)
        };
        if search_dir >= 0 {
            row = row.max(bound_row);
        }
        (row, equal)
    }

    fn materialize_user_key<'a>(
        &self,
        iter: &'a mut PrefixBytesIter,
        prev_row: Option<usize>,
        row: usize,
    ) -> &'a [u8] {
        match prev_row {
            Some(prev) if prev + 1 == row => self.prefixes.set_next(iter),
            _ => self.prefixes.set_at(iter, row),
        }
        let p = iter.prefix_len;
        iter.buf[p] = key::SENTINEL;
        let wall = self.wall_times.at(row);
        let logical = self.logical_times.at(row) as u32;
        if wall == 0 && logical == 0 {
            // Not an MVCC key; the untyped region (if any) is stored
            // verbatim, trailing length byte included.
            let untyped = self.untyped_versions.at(row);
            if untyped.is_empty() {
                return &iter.buf[..p + 1];
            }
            let end = p + 1 + untyped.len();
            iter.buf[p + 1..end].copy_from_slice(untyped);
            return &iter.buf[..end];
        }
        BigEndian::write_u64(&mut iter.buf[p + 1..p + 9], wall);
        if logical == 0 {
            iter.buf[p + 9] = key::SUFFIX_LEN_WALL as u8;
            return &iter.buf[..p + 1 + key::SUFFIX_LEN_WALL];
        }
        BigEndian::write_u32(&mut iter.buf[p + 9..p + 13], logical);
        iter.buf[p + 13] = key::SUFFIX_LEN_WALL_LOGICAL as u8;
        &iter.buf[..p + 1 + key::SUFFIX_LEN_WALL_LOGICAL]
    }

    fn materialize_user_key_with_synthetic_suffix<'a>(
        &self,
        iter: &'a mut PrefixBytesIter,
        suffix: &[u8],
        prev_row: Option<usize>,
        row: usize,
    ) -> &'a [u8] {
        match prev_row {
            Some(prev) if prev + 1 == row => self.prefixes.set_next(iter),
            _ => self.prefixes.set_at(iter, row),
        }
        let p = iter.prefix_len;
        let end = p + 1 + suffix.len();
        iter.buf[p] = key::SENTINEL;
        iter.buf[p + 1..end].copy_from_slice(suffix);
        &iter.buf[..end]
    }

    fn release(mut self: Box<Self>) {
        *self = MvccKeySeeker::default();
        SEEKER_POOL.lock().push(self);
    }
}

#[cfg(test)]
mod tests {
    use super::super::block::KeyBlockWriter;
    use super::super::schema::MVCC_KEY_SCHEMA;
    use super::*;

    fn mvcc_key(prefix: &[u8], wall: u64, logical: u32) -> Vec<u8> {
        let mut k = Vec::new();
        key::encode_mvcc_key(&mut k, prefix, wall, logical);
        k
    }

    fn untyped_key(prefix: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut k = Vec::new();
        key::encode_untyped_key(&mut k, prefix, payload);
        k
    }

    fn block_of(keys: &[Vec<u8>]) -> KeyBlockReader {
        let mut w = KeyBlockWriter::new(&MVCC_KEY_SCHEMA);
        for k in keys {
            w.add(k);
        }
        KeyBlockReader::new(w.finish(), &MVCC_KEY_SCHEMA).unwrap()
    }

    fn seeker_for(block: &KeyBlockReader) -> Box<dyn KeySeeker> {
        let mut s = MvccKeySeeker::acquire();
        s.init(block).unwrap();
        s
    }

    #[test]
    fn test_seek_ge_prefix_miss() {
        let block = block_of(&[mvcc_key(b"bb", 5, 0), mvcc_key(b"dd", 5, 0)]);
        let s = seeker_for(&block);
        assert_eq!(s.seek_ge(&mvcc_key(b"aa", 0, 0), 0, 0), (0, false));
        assert_eq!(s.seek_ge(&mvcc_key(b"cc", 0, 0), 0, 0), (1, false));
        assert_eq!(s.seek_ge(&mvcc_key(b"zz", 0, 0), 0, 0), (2, false));
        s.release();
    }

    #[test]
    fn test_seek_ge_mvcc_versions() {
        let block = block_of(&[
            mvcc_key(b"k", 200, 0),
            mvcc_key(b"k", 150, 0),
            mvcc_key(b"k", 100, 0),
        ]);
        let s = seeker_for(&block);
        // Seeking at a timestamp between versions lands on the next
        // older one.
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 175, 0), 0, 0), (1, true));
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 250, 0), 0, 0), (0, true));
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 150, 0), 0, 0), (1, true));
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 50, 0), 0, 0), (3, true));
        // A bare seek key is the smallest with the prefix.
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 0, 0), 0, 0), (0, true));
        s.release();
    }

    #[test]
    fn test_seek_ge_skips_bare_run_start() {
        let block = block_of(&[
            mvcc_key(b"k", 0, 0),
            mvcc_key(b"k", 300, 0),
            mvcc_key(b"k", 200, 0),
            mvcc_key(b"z", 9, 0),
        ]);
        let s = seeker_for(&block);
        // The bare row sorts before every versioned key and must not
        // satisfy a timestamped seek.
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 250, 0), 0, 0), (2, true));
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 400, 0), 0, 0), (1, true));
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 100, 0), 0, 0), (3, true));
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 0, 0), 0, 0), (0, true));
        s.release();
    }

    #[test]
    fn test_seek_ge_bound_row() {
        let block = block_of(&[
            mvcc_key(b"a", 5, 0),
            mvcc_key(b"b", 5, 0),
            mvcc_key(b"c", 5, 0),
        ]);
        let s = seeker_for(&block);
        // With a forward hint the result never precedes the bound row.
        assert_eq!(s.seek_ge(&mvcc_key(b"a", 5, 0), 1, 0), (1, true));
        // A backward hint leaves the result alone.
        assert_eq!(s.seek_ge(&mvcc_key(b"a", 5, 0), 1, -1), (0, true));
        s.release();
    }

    #[test]
    fn test_is_lower_bound_prefixes() {
        let block = block_of(&[mvcc_key(b"mm", 10, 0)]);
        let s = seeker_for(&block);
        assert!(s.is_lower_bound(&mvcc_key(b"aa", 99, 0), None));
        assert!(!s.is_lower_bound(&mvcc_key(b"zz", 1, 0), None));
        s.release();
    }

    #[test]
    fn test_is_lower_bound_mvcc() {
        let block = block_of(&[mvcc_key(b"k", 100, 0)]);
        let s = seeker_for(&block);
        // Newer queries sort below the first key.
        assert!(s.is_lower_bound(&mvcc_key(b"k", 200, 0), None));
        assert!(s.is_lower_bound(&mvcc_key(b"k", 100, 0), None));
        assert!(!s.is_lower_bound(&mvcc_key(b"k", 50, 0), None));
        // A bare query is the smallest key with the prefix.
        assert!(s.is_lower_bound(&mvcc_key(b"k", 0, 0), None));
        s.release();
    }

    #[test]
    fn test_is_lower_bound_logical() {
        let block = block_of(&[mvcc_key(b"k", 10, 5)]);
        let s = seeker_for(&block);
        assert!(s.is_lower_bound(&mvcc_key(b"k", 10, 9), None));
        assert!(s.is_lower_bound(&mvcc_key(b"k", 10, 5), None));
        assert!(!s.is_lower_bound(&mvcc_key(b"k", 10, 2), None));
        s.release();
    }

    #[test]
    fn test_is_lower_bound_untyped() {
        let block = block_of(&[untyped_key(b"u", b"vM")]);
        let s = seeker_for(&block);
        assert!(s.is_lower_bound(&untyped_key(b"u", b"vA"), None));
        assert!(s.is_lower_bound(&untyped_key(b"u", b"vM"), None));
        assert!(!s.is_lower_bound(&untyped_key(b"u", b"vZ"), None));
        s.release();
    }

    #[test]
    fn test_is_lower_bound_synthetic_suffix() {
        let block = block_of(&[mvcc_key(b"k", 100, 0)]);
        let s = seeker_for(&block);
        // The synthetic suffix stands in for the stored one.
        let synthetic_key = mvcc_key(b"k", 500, 0);
        let synthetic = &synthetic_key[2..];
        assert!(s.is_lower_bound(&mvcc_key(b"k", 600, 0), Some(synthetic)));
        assert!(!s.is_lower_bound(&mvcc_key(b"k", 400, 0), Some(synthetic)));
        s.release();
    }

    #[test]
    fn test_release_and_reacquire() {
        let block = block_of(&[mvcc_key(b"k", 1, 0)]);
        let s = seeker_for(&block);
        s.release();
        // Pooled instances come back cleared and rebindable; other tests
        // share the pool, so only behavior is asserted here.
        let mut s = MvccKeySeeker::acquire();
        s.init(&block).unwrap();
        assert_eq!(s.seek_ge(&mvcc_key(b"k", 1, 0), 0, 0), (0, true));
        s.release();
    }
}

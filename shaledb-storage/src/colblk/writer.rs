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

//! MVCC Key Writer
//!
//! Consumes engine keys in sorted order during block construction,
//! decomposing each into the four key columns. The writer also reports
//! how each key relates to the previous row ([`KeyWriter::compare_prev`])
//! so the block container can maintain the prefix-changed bit set and
//! drive prefix-compression decisions.

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

use shaledb_core::key;

use super::prefix_bytes::PrefixBytesBuilder;
use super::raw_bytes::RawBytesBuilder;
use super::schema::{
    COL_MVCC_LOGICAL, COL_MVCC_WALL_TIME, COL_PREFIX, COL_UNTYPED_VERSION, COLUMN_COUNT,
    MVCC_KEY_SCHEMA,
};
use super::uint::UintBuilder;
use super::{DataType, KeyComparison, KeyWriter};

/// Key writer for the MVCC key schema.
pub struct MvccKeyWriter {
    prefixes: PrefixBytesBuilder,
    wall_times: UintBuilder,
    logical_times: UintBuilder,
    untyped_versions: RawBytesBuilder,
    /// Suffix region of the most recently appended key, kept so
    /// `compare_prev` can order equal-prefix keys without re-decoding
    /// column state.
    prev_suffix: SmallVec<[u8; 16]>,
}

impl Default for MvccKeyWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MvccKeyWriter {
    pub fn new() -> Self {
        Self {
            prefixes: PrefixBytesBuilder::new(),
            wall_times: UintBuilder::new(),
            logical_times: UintBuilder::with_zero_default(),
            untyped_versions: RawBytesBuilder::new(),
            prev_suffix: SmallVec::new(),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.prefixes.rows()
    }
}

impl KeyWriter for MvccKeyWriter {
    fn compare_prev(&self, engine_key: &[u8]) -> KeyComparison {
        let prefix_len = key::split(engine_key);
        if self.prefixes.rows() == 0 {
            return KeyComparison {
                prefix_len,
                common_prefix_len: 0,
                user_key_comparison: Ordering::Greater,
            };
        }
        let last = self.prefixes.last_prefix();
        let common = key::common_prefix_len(last, &engine_key[..prefix_len - 1]);
        if common == prefix_len - 1 && last.len() == common {
            // The whole prefix matches; count the sentinel as shared and
            // fall through to suffix order.
            return KeyComparison {
                prefix_len,
                common_prefix_len: prefix_len,
                user_key_comparison: key::compare_suffixes(
                    &engine_key[prefix_len..],
                    &self.prev_suffix,
                ),
            };
        }
        // The prefixes diverge. When the previous prefix is exhausted the
        // new key strictly extends it; otherwise the first diverging byte
        // decides. A shorter new prefix diverges at its sentinel, which no
        // prefix byte can equal, so the same comparison covers that case.
        let user_key_comparison = if last.len() == common {
            Ordering::Greater
        } else {
            engine_key[common].cmp(&last[common])
        };
        KeyComparison {
            prefix_len,
            common_prefix_len: common,
            user_key_comparison,
        }
    }

    fn write_key(
        &mut self,
        row: usize,
        engine_key: &[u8],
        prefix_len: usize,
        shared_with_prev: usize,
    ) {
        debug_assert_eq!(row, self.prefixes.rows());
        debug_assert_eq!(prefix_len, key::split(engine_key));
        let decoded = key::decode_engine_key(engine_key);
        self.prev_suffix.clear();
        self.prev_suffix.extend_from_slice(&engine_key[prefix_len..]);
        // When the previous prefix matched entirely, shared_with_prev
        // counts its sentinel too; clamp back to the prefix proper.
        self.prefixes
            .put(decoded.prefix, shared_with_prev.min(decoded.prefix.len()));
        self.wall_times.set(row, decoded.wall_time);
        // The logical column has an implicit zero default; storing only
        // non-zero values lets all-zero columns collapse.
        if decoded.logical_time > 0 {
            self.logical_times.set(row, decoded.logical_time as u64);
        }
        self.untyped_versions.put(decoded.untyped_suffix);
    }

    fn materialize_key(&self, dst: &mut Vec<u8>, row: usize) {
        dst.extend_from_slice(self.prefixes.get_row(row));
        dst.push(key::SENTINEL);
        let untyped = self.untyped_versions.get(row);
        if !untyped.is_empty() {
            // The stored untyped region already carries its length byte.
            dst.extend_from_slice(untyped);
            return;
        }
        key::append_mvcc_suffix(
            dst,
            self.wall_times.get(row),
            self.logical_times.get(row) as u32,
        );
    }

    fn num_columns(&self) -> usize {
        COLUMN_COUNT
    }

    fn data_type(&self, col: usize) -> DataType {
        MVCC_KEY_SCHEMA.column_types[col]
    }

    fn size(&self, rows: usize, offset: u32) -> u32 {
        let offset = self.prefixes.size(rows, offset);
        let offset = self.wall_times.size(rows, offset);
        let offset = self.logical_times.size(rows, offset);
        self.untyped_versions.size(rows, offset)
    }

    fn finish(&self, col: usize, rows: usize, offset: u32, buf: &mut [u8]) -> u32 {
        match col {
            COL_PREFIX => self.prefixes.finish(rows, offset, buf),
            COL_MVCC_WALL_TIME => self.wall_times.finish(rows, offset, buf),
            COL_MVCC_LOGICAL => self.logical_times.finish(rows, offset, buf),
            COL_UNTYPED_VERSION => self.untyped_versions.finish(rows, offset, buf),
            _ => panic!("unknown key column: {col}"),
        }
    }

    fn reset(&mut self) {
        self.prefixes.reset();
        self.wall_times.reset();
        self.logical_times.reset();
        self.untyped_versions.reset();
        self.prev_suffix.clear();
    }

    fn write_debug(&self, w: &mut dyn fmt::Write, rows: usize) -> fmt::Result {
        write!(w, "prefixes: ")?;
        self.prefixes.write_debug(w, rows)?;
        writeln!(w)?;
        write!(w, "wall times: ")?;
        self.wall_times.write_debug(w, rows)?;
        writeln!(w)?;
        write!(w, "logical times: ")?;
        self.logical_times.write_debug(w, rows)?;
        writeln!(w)?;
        write!(w, "untyped versions: ")?;
        self.untyped_versions.write_debug(w, rows)?;
        writeln!(w)
    }
}

#[cfg(test)]
mod tests {
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

    fn write_all(writer: &mut MvccKeyWriter, keys: &[Vec<u8>]) {
        for (row, k) in keys.iter().enumerate() {
            let kcmp = writer.compare_prev(k);
            writer.write_key(row, k, kcmp.prefix_len, kcmp.common_prefix_len);
        }
    }

    #[test]
    fn test_compare_prev_first_key() {
        let writer = MvccKeyWriter::new();
        let kcmp = writer.compare_prev(&mvcc_key(b"abc", 5, 0));
        assert_eq!(kcmp.prefix_len, 4);
        assert_eq!(kcmp.common_prefix_len, 0);
        assert_eq!(kcmp.user_key_comparison, Ordering::Greater);
        assert!(!kcmp.prefix_equal());
    }

    #[test]
    fn test_compare_prev_diverging_prefix() {
        let mut writer = MvccKeyWriter::new();
        write_all(&mut writer, &[mvcc_key(b"aaa", 5, 0)]);
        let kcmp = writer.compare_prev(&mvcc_key(b"aab", 5, 0));
        assert_eq!(kcmp.common_prefix_len, 2);
        assert_eq!(kcmp.user_key_comparison, Ordering::Greater);
        assert!(!kcmp.prefix_equal());
    }

    #[test]
    fn test_compare_prev_extending_prefix() {
        let mut writer = MvccKeyWriter::new();
        write_all(&mut writer, &[mvcc_key(b"ab", 5, 0)]);
        let kcmp = writer.compare_prev(&mvcc_key(b"abc", 5, 0));
        assert_eq!(kcmp.common_prefix_len, 2);
        assert_eq!(kcmp.user_key_comparison, Ordering::Greater);
    }

    #[test]
    fn test_compare_prev_shorter_prefix_is_less() {
        let mut writer = MvccKeyWriter::new();
        write_all(&mut writer, &[mvcc_key(b"abc", 5, 0)]);
        let kcmp = writer.compare_prev(&mvcc_key(b"ab", 5, 0));
        assert_eq!(kcmp.common_prefix_len, 2);
        assert_eq!(kcmp.user_key_comparison, Ordering::Less);
    }

    #[test]
    fn test_compare_prev_equal_prefix_orders_by_suffix() {
        let mut writer = MvccKeyWriter::new();
        write_all(&mut writer, &[mvcc_key(b"k", 200, 0)]);

        // Older timestamp sorts after the newer one.
        let kcmp = writer.compare_prev(&mvcc_key(b"k", 150, 0));
        assert_eq!(kcmp.common_prefix_len, 2);
        assert!(kcmp.prefix_equal());
        assert_eq!(kcmp.user_key_comparison, Ordering::Greater);

        let kcmp = writer.compare_prev(&mvcc_key(b"k", 300, 0));
        assert_eq!(kcmp.user_key_comparison, Ordering::Less);

        let kcmp = writer.compare_prev(&mvcc_key(b"k", 200, 0));
        assert_eq!(kcmp.user_key_comparison, Ordering::Equal);
    }

    #[test]
    fn test_materialize_round_trip() {
        let keys = vec![
            mvcc_key(b"a", 0, 0),
            mvcc_key(b"a", 9, 0),
            mvcc_key(b"b", 300, 0),
            mvcc_key(b"b", 200, 5),
            untyped_key(b"c", b"vX"),
        ];
        let mut writer = MvccKeyWriter::new();
        write_all(&mut writer, &keys);
        for (row, k) in keys.iter().enumerate() {
            let mut out = Vec::new();
            writer.materialize_key(&mut out, row);
            assert_eq!(&out, k, "row {row}");
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut writer = MvccKeyWriter::new();
        write_all(&mut writer, &[mvcc_key(b"k", 5, 1)]);
        writer.reset();
        assert_eq!(writer.rows(), 0);
        let kcmp = writer.compare_prev(&mvcc_key(b"a", 1, 0));
        assert_eq!(kcmp.user_key_comparison, Ordering::Greater);
        assert_eq!(kcmp.common_prefix_len, 0);
    }

    #[test]
    fn test_write_debug_lists_columns() {
        let mut writer = MvccKeyWriter::new();
        write_all(&mut writer, &[mvcc_key(b"k", 5, 1)]);
        let mut out = String::new();
        writer.write_debug(&mut out, 1).unwrap();
        assert!(out.contains("prefixes:"));
        assert!(out.contains("wall times:"));
        assert!(out.contains("logical times:"));
        assert!(out.contains("untyped versions:"));
    }
}

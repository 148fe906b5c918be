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

//! Columnar Key Blocks
//!
//! Immutable data blocks that store sorted engine keys decomposed into
//! typed columns instead of opaque concatenated byte strings. Each key
//! contributes one row across four parallel columns:
//!
//! | Column          | Type         | Encoding                          |
//! |-----------------|--------------|-----------------------------------|
//! | user-key prefix | prefix bytes | deduplicated, shared-prefix strip |
//! | MVCC wall time  | uint         | delta-from-base, width reduced    |
//! | MVCC logical    | uint         | implicit-zero default             |
//! | untyped version | raw bytes    | offset-addressed, empty collapsed |
//!
//! Alongside the columns the block carries a prefix-changed bit set
//! marking the first row of every equal-prefix run, which lets the
//! seeker bound the MVCC version search without re-reading the prefix
//! column.
//!
//! ## Module Structure
//!
//! - `bitmap.rs`: the per-row bit set
//! - `uint.rs`, `raw_bytes.rs`, `prefix_bytes.rs`: column codecs
//! - `block.rs`: the block container (header, bit set, column payloads)
//! - `schema.rs`: the MVCC key schema descriptor
//! - `writer.rs`: the key writer driven during block construction
//! - `seeker.rs`: the pooled key seeker servicing ordered lookups

pub mod bitmap;
pub mod block;
pub mod prefix_bytes;
pub mod raw_bytes;
pub mod schema;
pub mod seeker;
pub mod uint;
pub mod writer;

pub use bitmap::{BitmapBuilder, BitmapReader};
pub use block::{KeyBlockReader, KeyBlockWriter};
pub use prefix_bytes::{PrefixBytesBuilder, PrefixBytesIter, PrefixBytesReader};
pub use raw_bytes::{RawBytesBuilder, RawBytesReader};
pub use schema::{
    KeySchema, COLUMN_COUNT, COL_MVCC_LOGICAL, COL_MVCC_WALL_TIME, COL_PREFIX,
    COL_UNTYPED_VERSION, MVCC_KEY_SCHEMA,
};
pub use seeker::MvccKeySeeker;
pub use uint::{UintBuilder, UintReader};
pub use writer::MvccKeyWriter;

use shaledb_core::Result;
use std::cmp::Ordering;
use std::fmt;

/// Logical type of a column, used by the block container to route
/// per-column calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Sorted, deduplicated byte strings with shared-prefix stripping.
    PrefixBytes,
    /// Unsigned 64-bit integers.
    Uint,
    /// Variable-length raw byte strings.
    Bytes,
}

/// What a key writer learned by comparing an incoming key against the
/// most recently appended row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyComparison {
    /// Length of the key's prefix region, sentinel included.
    pub prefix_len: usize,
    /// Leading bytes shared with the previous row's prefix; counts the
    /// sentinel when the entire prefix matches.
    pub common_prefix_len: usize,
    /// Total order of the key relative to the previous row.
    pub user_key_comparison: Ordering,
}

impl KeyComparison {
    /// True when the key's prefix equals the previous row's prefix.
    #[inline]
    pub fn prefix_equal(&self) -> bool {
        self.prefix_len == self.common_prefix_len
    }
}

/// Writer half of a key schema: consumes sorted keys during block
/// construction and owns one builder per column.
pub trait KeyWriter {
    /// Compares `key` against the most recently appended row without
    /// modifying any state. For the first key returns `Greater` with no
    /// shared bytes.
    fn compare_prev(&self, key: &[u8]) -> KeyComparison;

    /// Appends `key` as row `row`. `prefix_len` and `shared_with_prev`
    /// come from the [`KeyComparison`] the caller obtained for this key.
    fn write_key(&mut self, row: usize, key: &[u8], prefix_len: usize, shared_with_prev: usize);

    /// Reconstructs row `row`'s key from the column builders, appending
    /// the bytes to `dst`.
    fn materialize_key(&self, dst: &mut Vec<u8>, row: usize);

    fn num_columns(&self) -> usize;

    fn data_type(&self, col: usize) -> DataType;

    /// Serialized end offset of all columns for `rows` rows, given the
    /// first column starts at `offset`.
    fn size(&self, rows: usize, offset: u32) -> u32;

    /// Serializes column `col` into `buf` at `offset`; returns the end
    /// offset. Columns are finished in index order.
    fn finish(&self, col: usize, rows: usize, offset: u32, buf: &mut [u8]) -> u32;

    /// Clears all builders for reuse on the next block.
    fn reset(&mut self);

    /// Human-readable dump of the first `rows` rows of every column.
    fn write_debug(&self, w: &mut dyn fmt::Write, rows: usize) -> fmt::Result;
}

/// Reader half of a key schema: bound to one finished block, services
/// ordered lookups and key materialization for the enclosing iterator.
pub trait KeySeeker {
    /// Binds the seeker to `block`'s column views.
    fn init(&mut self, block: &KeyBlockReader) -> Result<()>;

    /// Reports whether the block's first key is >= `key` under the
    /// engine comparator. When `synthetic_suffix` is supplied it stands
    /// in for the first row's stored suffix.
    fn is_lower_bound(&self, key: &[u8], synthetic_suffix: Option<&[u8]>) -> bool;

    /// Finds the smallest row whose key is >= `key`, returning the row
    /// and whether the key's prefix exactly matches a stored prefix.
    ///
    /// `bound_row` and `search_dir` are advisory: when `search_dir >= 0`
    /// the caller asserts the result does not precede `bound_row`.
    fn seek_ge(&self, key: &[u8], bound_row: usize, search_dir: i8) -> (usize, bool);

    /// Reconstructs row `row`'s key in `iter`'s buffer and returns the
    /// assembled bytes, which alias that buffer. Passing the previous
    /// row position enables the sequential fast path.
    fn materialize_user_key<'a>(
        &self,
        iter: &'a mut PrefixBytesIter,
        prev_row: Option<usize>,
        row: usize,
    ) -> &'a [u8];

    /// Like [`KeySeeker::materialize_user_key`] but appends `suffix`
    /// instead of the stored suffix columns.
    fn materialize_user_key_with_synthetic_suffix<'a>(
        &self,
        iter: &'a mut PrefixBytesIter,
        suffix: &[u8],
        prev_row: Option<usize>,
        row: usize,
    ) -> &'a [u8];

    /// Clears all column bindings and returns the seeker to its pool.
    /// Call exactly once, after copying out any materialized slices.
    fn release(self: Box<Self>);
}

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

//! Engine Key Format
//!
//! An engine key is the byte-string form of a user-visible key together
//! with an optional version suffix:
//!
//! ```text
//! <user-key-prefix> 0x00 [<suffix bytes>] <suffix-length-byte>
//!
//! suffix region forms (length byte counts the region including itself):
//!   (empty)                                  bare prefix, no version
//!   [wall: 8B BE] [0x09]                     MVCC, logical counter zero
//!   [wall: 8B BE] [logical: 4B BE] [0x0d]    MVCC with logical counter
//!   [wall] [logical] [flag: 1B] [0x0e]       legacy MVCC form; the flag
//!                                            byte is ignored and dropped
//!                                            on re-encoding
//!   [payload: s >= 1 bytes] [s+1]            untyped version
//! ```
//!
//! The `0x00` sentinel separates prefix from suffix; prefixes must not
//! contain it (producer responsibility). Because the trailing length byte
//! is self-describing, splitting a key never scans for the sentinel.
//!
//! ## Ordering
//!
//! Engine keys order by prefix bytes first. For equal prefixes, a bare
//! prefix sorts before any versioned key; MVCC versions order by
//! *descending* `(wall_time, logical)` so the newest version of a key is
//! encountered first by a forward scan; untyped versions order by
//! ascending region bytes.

use byteorder::{BigEndian, ByteOrder};
use std::cmp::Ordering;
use std::fmt;

/// Separator between the user-key prefix and the version suffix.
pub const SENTINEL: u8 = 0x00;

/// Suffix region length of an MVCC version with a zero logical counter.
pub const SUFFIX_LEN_WALL: usize = 9;

/// Suffix region length of an MVCC version carrying a logical counter.
pub const SUFFIX_LEN_WALL_LOGICAL: usize = 13;

/// Suffix region length of the legacy MVCC form with a trailing flag byte.
pub const SUFFIX_LEN_LEGACY: usize = 14;

/// Longest suffix region an MVCC version re-encodes to (canonical form).
pub const MVCC_SUFFIX_MAX_LEN: usize = SUFFIX_LEN_WALL_LOGICAL;

/// An MVCC version timestamp: wall clock plus logical counter.
///
/// The natural `Ord` is ascending on `(wall_time, logical)`; version
/// ordering inside a block (newest first) is the block's concern, not
/// this type's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MvccTimestamp {
    pub wall_time: u64,
    pub logical: u32,
}

impl MvccTimestamp {
    pub const fn new(wall_time: u64, logical: u32) -> Self {
        Self { wall_time, logical }
    }

    /// True when both components are zero, i.e. the key carries no
    /// MVCC version at all.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.wall_time == 0 && self.logical == 0
    }
}

impl fmt::Display for MvccTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.wall_time, self.logical)
    }
}

/// An engine key decomposed into its logical fields.
///
/// Exactly one of the following holds: `untyped_suffix` is non-empty
/// (and both timestamps are zero), the timestamp is non-zero (and
/// `untyped_suffix` is empty), or the key is a bare prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedKey<'a> {
    /// User-key prefix, without the sentinel.
    pub prefix: &'a [u8],
    /// Untyped suffix region, including its trailing length byte; empty
    /// for MVCC and bare-prefix keys. Kept whole so materialization can
    /// append it verbatim.
    pub untyped_suffix: &'a [u8],
    pub wall_time: u64,
    pub logical_time: u32,
}

/// Returns the length of the prefix region of `key`, sentinel included.
///
/// Assumes a well-formed engine key; malformed inputs are the producer's
/// responsibility and are only checked under debug assertions.
#[inline]
pub fn split(key: &[u8]) -> usize {
    debug_assert!(!key.is_empty(), "empty engine key");
    let suffix_len = key[key.len() - 1] as usize;
    debug_assert!(suffix_len < key.len(), "suffix length byte out of range");
    let prefix_len = key.len() - suffix_len;
    debug_assert_eq!(key[prefix_len - 1], SENTINEL, "missing sentinel separator");
    prefix_len
}

/// Decomposes `key` into prefix, untyped suffix, and MVCC timestamp.
///
/// Suffix regions of length 9, 13, and 14 are MVCC; any other non-zero
/// length is untyped. Note that an untyped version whose payload happens
/// to be 8, 12, or 13 bytes is indistinguishable from an MVCC version on
/// the wire; producers must not create such versions.
#[inline]
pub fn decode_engine_key(key: &[u8]) -> DecodedKey<'_> {
    let prefix_len = split(key);
    let prefix = &key[..prefix_len - 1];
    let suffix = &key[prefix_len..];
    match suffix.len() {
        0 => DecodedKey {
            prefix,
            untyped_suffix: &[],
            wall_time: 0,
            logical_time: 0,
        },
        SUFFIX_LEN_WALL => DecodedKey {
            prefix,
            untyped_suffix: &[],
            wall_time: BigEndian::read_u64(&suffix[..8]),
            logical_time: 0,
        },
        SUFFIX_LEN_WALL_LOGICAL | SUFFIX_LEN_LEGACY => DecodedKey {
            prefix,
            untyped_suffix: &[],
            wall_time: BigEndian::read_u64(&suffix[..8]),
            logical_time: BigEndian::read_u32(&suffix[8..12]),
        },
        _ => DecodedKey {
            prefix,
            untyped_suffix: suffix,
            wall_time: 0,
            logical_time: 0,
        },
    }
}

/// Appends the canonical MVCC suffix region for `(wall_time, logical)`.
///
/// Appends nothing when both components are zero (the bare-prefix form
/// has no suffix region at all). The legacy flag byte is never written.
pub fn append_mvcc_suffix(dst: &mut Vec<u8>, wall_time: u64, logical: u32) {
    if wall_time == 0 && logical == 0 {
        return;
    }
    let mut buf = [0u8; SUFFIX_LEN_WALL_LOGICAL];
    BigEndian::write_u64(&mut buf[..8], wall_time);
    if logical == 0 {
        buf[8] = SUFFIX_LEN_WALL as u8;
        dst.extend_from_slice(&buf[..SUFFIX_LEN_WALL]);
    } else {
        BigEndian::write_u32(&mut buf[8..12], logical);
        buf[12] = SUFFIX_LEN_WALL_LOGICAL as u8;
        dst.extend_from_slice(&buf);
    }
}

/// Appends a full MVCC engine key: prefix, sentinel, version suffix.
pub fn encode_mvcc_key(dst: &mut Vec<u8>, prefix: &[u8], wall_time: u64, logical: u32) {
    debug_assert!(!prefix.contains(&SENTINEL), "prefix contains sentinel byte");
    dst.extend_from_slice(prefix);
    dst.push(SENTINEL);
    append_mvcc_suffix(dst, wall_time, logical);
}

/// Appends an engine key with an untyped version payload.
///
/// The payload must be non-empty and at most 254 bytes so its region
/// length fits the trailing byte.
pub fn encode_untyped_key(dst: &mut Vec<u8>, prefix: &[u8], payload: &[u8]) {
    debug_assert!(!prefix.contains(&SENTINEL), "prefix contains sentinel byte");
    debug_assert!(!payload.is_empty() && payload.len() <= 254);
    dst.extend_from_slice(prefix);
    dst.push(SENTINEL);
    dst.extend_from_slice(payload);
    dst.push(payload.len() as u8 + 1);
}

/// Length of the longest common prefix of `a` and `b`.
#[inline]
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    let n = a.len().min(b.len());
    let mut i = 0;
    while i < n && a[i] == b[i] {
        i += 1;
    }
    i
}

#[inline]
fn is_mvcc_suffix(suffix: &[u8]) -> bool {
    matches!(
        suffix.len(),
        SUFFIX_LEN_WALL | SUFFIX_LEN_WALL_LOGICAL | SUFFIX_LEN_LEGACY
    )
}

#[inline]
fn decode_mvcc_suffix(suffix: &[u8]) -> MvccTimestamp {
    let wall_time = BigEndian::read_u64(&suffix[..8]);
    let logical = if suffix.len() >= SUFFIX_LEN_WALL_LOGICAL {
        BigEndian::read_u32(&suffix[8..12])
    } else {
        0
    };
    MvccTimestamp { wall_time, logical }
}

/// Compares two suffix regions under the engine ordering.
///
/// The empty region (bare prefix) sorts before everything. Two MVCC
/// regions order by descending `(wall_time, logical)`. Two untyped
/// regions order by ascending bytes. An MVCC region sorts before any
/// untyped region of the same prefix; the seek paths rely on this kind
/// ordering (see DESIGN.md).
pub fn compare_suffixes(a: &[u8], b: &[u8]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => match (is_mvcc_suffix(a), is_mvcc_suffix(b)) {
            (true, true) => {
                let ats = decode_mvcc_suffix(a);
                let bts = decode_mvcc_suffix(b);
                // Descending: the newer version is the smaller key.
                (bts.wall_time, bts.logical).cmp(&(ats.wall_time, ats.logical))
            }
            (false, false) => a.cmp(b),
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
        },
    }
}

/// Total order on engine keys: prefix bytes first, then suffix regions.
///
/// This is the reference comparator the columnar codec's seek paths must
/// agree with.
pub fn compare_engine_keys(a: &[u8], b: &[u8]) -> Ordering {
    let ap = split(a);
    let bp = split(b);
    match a[..ap - 1].cmp(&b[..bp - 1]) {
        Ordering::Equal => compare_suffixes(&a[ap..], &b[bp..]),
        ord => ord,
    }
}

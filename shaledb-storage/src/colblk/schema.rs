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

//! MVCC Key Schema
//!
//! Names the four columns an engine key decomposes into and the
//! factories for the writer and seeker that understand them. The block
//! container is schema-driven and routes per-column calls through this
//! descriptor.

use super::seeker::MvccKeySeeker;
use super::writer::MvccKeyWriter;
use super::{DataType, KeySeeker, KeyWriter};

/// Column index of the user-key prefix.
pub const COL_PREFIX: usize = 0;
/// Column index of the MVCC wall time.
pub const COL_MVCC_WALL_TIME: usize = 1;
/// Column index of the MVCC logical counter.
pub const COL_MVCC_LOGICAL: usize = 2;
/// Column index of the untyped version suffix.
pub const COL_UNTYPED_VERSION: usize = 3;
/// Number of key columns.
pub const COLUMN_COUNT: usize = 4;

/// A key schema: column layout plus writer/seeker constructors.
pub struct KeySchema {
    pub column_types: &'static [DataType; COLUMN_COUNT],
    pub new_key_writer: fn() -> Box<dyn KeyWriter>,
    pub new_key_seeker: fn() -> Box<dyn KeySeeker>,
}

fn new_mvcc_key_writer() -> Box<dyn KeyWriter> {
    Box::new(MvccKeyWriter::new())
}

fn new_mvcc_key_seeker() -> Box<dyn KeySeeker> {
    MvccKeySeeker::acquire()
}

/// The engine's MVCC key schema.
pub static MVCC_KEY_SCHEMA: KeySchema = KeySchema {
    column_types: &[
        DataType::PrefixBytes,
        DataType::Uint,
        DataType::Uint,
        DataType::Bytes,
    ],
    new_key_writer: new_mvcc_key_writer,
    new_key_seeker: new_mvcc_key_seeker,
};

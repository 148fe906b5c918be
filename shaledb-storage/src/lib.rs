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

//! ShaleDB Storage
//!
//! Storage-layer building blocks for the log-structured merge tree.
//! This crate currently provides the columnar key block codec
//! ([`colblk`]): immutable sorted-key blocks that decompose engine keys
//! into typed columns and serve binary-searched lookups without
//! materializing every row.

pub mod colblk;

pub use colblk::{
    KeyBlockReader, KeyBlockWriter, KeySchema, KeySeeker, KeyWriter, MVCC_KEY_SCHEMA,
};

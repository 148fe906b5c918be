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

//! ShaleDB Core
//!
//! Fundamental types shared across the ShaleDB storage engine:
//!
//! - **Error taxonomy**: the crate-wide [`ShaleError`] and [`Result`]
//!   alias.
//! - **Engine key format**: decomposition and composition of the
//!   prefix/suffix key layout used by the sorted key/value store,
//!   including MVCC version timestamps ([`key`]).

pub mod error;
pub mod key;

pub use error::{Result, ShaleError};

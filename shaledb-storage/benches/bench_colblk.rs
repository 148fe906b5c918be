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

//! Columnar Key Block Benchmarks
//!
//! Measures the three hot paths of the key block codec:
//!
//! | Path | Parameters |
//! |------|------------|
//! | write | keys per block |
//! | seek  | random existing keys |
//! | scan  | sequential materialization |
//!
//! Run with: `cargo bench -p shaledb-storage --bench bench_colblk`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use shaledb_core::key;
use shaledb_storage::colblk::{
    KeyBlockReader, KeyBlockWriter, KeySeeker, MvccKeySeeker, MVCC_KEY_SCHEMA,
};

fn generate_keys(prefixes: usize, versions_per_prefix: usize) -> Vec<Vec<u8>> {
    let mut keys = Vec::with_capacity(prefixes * versions_per_prefix);
    for p in 0..prefixes {
        let prefix = format!("table/{p:08}");
        for v in 0..versions_per_prefix {
            let wall = 1_000_000 - (v as u64) * 1_000;
            let mut k = Vec::new();
            key::encode_mvcc_key(&mut k, prefix.as_bytes(), wall, 0);
            keys.push(k);
        }
    }
    keys
}

fn bench_block_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("colblk/write");
    for prefixes in [64usize, 512] {
        let keys = generate_keys(prefixes, 4);
        group.throughput(Throughput::Elements(keys.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(keys.len()), &keys, |b, keys| {
            let mut w = KeyBlockWriter::new(&MVCC_KEY_SCHEMA);
            b.iter(|| {
                w.reset();
                for k in keys {
                    w.add(k);
                }
                black_box(w.finish())
            });
        });
    }
    group.finish();
}

fn bench_seek_ge(c: &mut Criterion) {
    let mut group = c.benchmark_group("colblk/seek");
    for prefixes in [64usize, 512] {
        let keys = generate_keys(prefixes, 4);
        let mut w = KeyBlockWriter::new(&MVCC_KEY_SCHEMA);
        for k in &keys {
            w.add(k);
        }
        let block = KeyBlockReader::new(w.finish(), &MVCC_KEY_SCHEMA).unwrap();
        let mut s = MvccKeySeeker::acquire();
        s.init(&block).unwrap();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        group.bench_with_input(BenchmarkId::from_parameter(keys.len()), &keys, |b, keys| {
            b.iter(|| {
                let q = &keys[rng.gen_range(0..keys.len())];
                black_box(s.seek_ge(q, 0, 0))
            });
        });
        s.release();
    }
    group.finish();
}

fn bench_sequential_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("colblk/scan");
    let keys = generate_keys(256, 4);
    let mut w = KeyBlockWriter::new(&MVCC_KEY_SCHEMA);
    for k in &keys {
        w.add(k);
    }
    let block = KeyBlockReader::new(w.finish(), &MVCC_KEY_SCHEMA).unwrap();
    let mut s = MvccKeySeeker::acquire();
    s.init(&block).unwrap();
    group.throughput(Throughput::Elements(keys.len() as u64));
    group.bench_function(BenchmarkId::from_parameter(keys.len()), |b| {
        b.iter(|| {
            let mut it = block.key_iter();
            for row in 0..block.rows() {
                black_box(s.materialize_user_key(&mut it, row.checked_sub(1), row));
            }
        });
    });
    s.release();
    group.finish();
}

criterion_group!(benches, bench_block_write, bench_seek_ge, bench_sequential_scan);
criterion_main!(benches);

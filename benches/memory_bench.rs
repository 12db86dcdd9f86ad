// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use usfx::core::cpu::cache::page_hash;
use usfx::core::system::System;

fn bus_access_benchmark(c: &mut Criterion) {
    c.bench_function("word_read", |b| {
        let mut system = System::new();
        system.write_word(0x8000_0100, 0xCAFE_BABE);

        b.iter(|| {
            black_box(system.read_word(black_box(0x8000_0100)));
        });
    });

    c.bench_function("word_write", |b| {
        let mut system = System::new();

        b.iter(|| {
            system.write_word(black_box(0x8000_0100), black_box(0x1234_5678));
        });
    });

    c.bench_function("byte_read", |b| {
        let mut system = System::new();
        system.write_word(0x8000_0100, 0xCAFE_BABE);

        b.iter(|| {
            black_box(system.read_byte(black_box(0x8000_0102)));
        });
    });

    c.bench_function("translated_word_read", |b| {
        let mut system = System::new();
        system.map_tlb_range(true, 0x0010_0000, 0x0010_1000, 0x0000_4000);
        system.write_word(0x0010_0000, 0xCAFE_BABE);

        b.iter(|| {
            black_box(system.read_word(black_box(0x0010_0000)));
        });
    });
}

fn block_cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_cache");

    group.bench_function("fetch_hit", |b| {
        let mut system = System::new();
        system.write_word(0x8000_0008, 0x03E0_0008); // jr $31
        system.fetch_block(0x8000_0000).unwrap();

        b.iter(|| {
            black_box(system.fetch_block(black_box(0x8000_0000)).unwrap());
        });
    });

    group.bench_function("fetch_after_invalidate", |b| {
        let mut system = System::new();
        system.write_word(0x8000_0008, 0x03E0_0008);

        b.iter(|| {
            system.invalidate_page(0x8000_0000);
            black_box(system.fetch_block(black_box(0x8000_0000)).unwrap());
        });
    });

    group.bench_function("store_hash_check", |b| {
        let mut system = System::new();
        system.write_word(0x8000_0008, 0x03E0_0008);
        system.fetch_block(0x8000_0000).unwrap();

        b.iter(|| {
            system.write_word(0x8000_0100, 0x0000_0000);
            system.invalidate_on_store(black_box(0x8000_0100));
        });
    });

    group.finish();
}

fn page_hash_benchmark(c: &mut Criterion) {
    c.bench_function("page_hash_4k", |b| {
        let page = vec![0xA5u8; 0x1000];
        b.iter(|| {
            black_box(page_hash(black_box(&page)));
        });
    });
}

criterion_group!(
    benches,
    bus_access_benchmark,
    block_cache_benchmark,
    page_hash_benchmark
);
criterion_main!(benches);

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

//! End-to-end translation behavior through the session surface:
//! mapping round trips, code-page invalidation, aliasing, and the
//! decode boundary cases.

use usfx::core::cpu::cache::BLOCK_WORDS;
use usfx::core::cpu::ops::Op;
use usfx::core::system::System;

/// j <own address>, encoded for the last word of the first page
const JUMP_TO_SELF_AT_0FFC: u32 = 0x0800_0000 | (0x0FFC >> 2) as u32;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_page_tail_block_shape() {
    init_logging();
    let mut system = System::new();

    // Four nops at 0xFEC..0xFF8 (RDRAM is already zeroed), then an
    // unconditional jump-to-self in the page's last word.
    system.write_word(0x8000_0FFC, JUMP_TO_SELF_AT_0FFC);

    let block = system
        .fetch_block(0x8000_0FEC)
        .expect("allocation")
        .expect("no fault in the direct window");

    // Five executable slots, then the end-of-block sentinels.
    for i in 0x3FB..0x3FF {
        assert_eq!(block.code[i].op, Op::Nop);
    }
    assert_eq!(block.code[0x3FF].op, Op::J);
    assert_eq!(block.code[BLOCK_WORDS].op, Op::EndBlock);
    assert_eq!(block.code[BLOCK_WORDS + 1].op, Op::EndBlock);
}

#[test]
fn test_store_forces_redecode() {
    init_logging();
    let mut system = System::new();
    system.write_word(0x8000_0FFC, JUMP_TO_SELF_AT_0FFC);

    let block = system.fetch_block(0x8000_0FEC).unwrap().unwrap();
    assert_eq!(block.code[0x3FB].op, Op::Nop);

    // Overwrite the first word of the page and report the store.
    system.write_word(0x8000_0000, 0x2401_0005); // addiu $1, $0, 5
    system.invalidate_on_store(0x8000_0000);

    // The next fetch anywhere in the page sees the new content. The
    // re-decode is whole-page: the block is rebuilt from scratch and
    // decoded forward from the fetched address.
    let block = system.fetch_block(0x8000_0000).unwrap().unwrap();
    assert_eq!(block.code[0].op, Op::Addiu);
    assert_eq!(block.code[0x3FF].op, Op::J);
}

#[test]
fn test_content_preserving_store_keeps_block() {
    init_logging();
    let mut system = System::new();
    system.write_word(0x8000_0FFC, JUMP_TO_SELF_AT_0FFC);
    system.fetch_block(0x8000_0FEC).unwrap().unwrap();

    // Rewrite the same value; the page hash is unchanged.
    system.write_word(0x8000_0FFC, JUMP_TO_SELF_AT_0FFC);
    system.invalidate_on_store(0x8000_0FFC);

    let block = system.fetch_block(0x8000_0FEC).unwrap().unwrap();
    assert_eq!(block.code[0x3FF].op, Op::J);
}

#[test]
fn test_byte_lane_after_word_store() {
    init_logging();
    let mut system = System::new();
    system.write_word(0x8000_0000, 0x1234_5678);
    assert_eq!(system.read_byte(0x8000_0001), 0x56);
}

#[test]
fn test_mapping_round_trip() {
    init_logging();
    let mut system = System::new();
    system.map_tlb_range(true, 0x0010_0000, 0x0010_4000, 0x0000_8000);

    for offset in (0..0x4000).step_by(0x1000) {
        assert_eq!(
            system.translate_for_read(0x0010_0000 + offset),
            0x8000_8000 + offset
        );
        assert!(system.take_fault().is_none());
    }

    system.unmap_tlb_range(0x0010_0000, 0x0010_4000);
    for offset in (0..0x4000).step_by(0x1000) {
        assert_eq!(system.translate_for_read(0x0010_0000 + offset), 0);
        assert!(system.take_fault().is_some());
    }
}

#[test]
fn test_aliases_share_invalidation_state() {
    init_logging();
    let mut system = System::new();
    // Two virtual windows onto the same physical page
    system.map_tlb_range(true, 0x0010_0000, 0x0010_1000, 0x0000_4000);
    system.map_tlb_range(true, 0x0020_0000, 0x0020_1000, 0x0000_4000);

    system.write_word(0x0010_0000, 0x2401_0005);
    let block = system.fetch_block(0x0010_0000).unwrap().unwrap();
    assert_eq!(block.code[0].op, Op::Addiu);

    // A store through the other alias invalidates the shared entry.
    system.write_word(0x0020_0000, 0x3401_0005); // ori $1, $0, 5
    system.invalidate_on_store(0x0020_0000);

    let block = system.fetch_block(0x0010_0000).unwrap().unwrap();
    assert_eq!(block.code[0].op, Op::Ori);
}

#[test]
fn test_redecode_is_idempotent() {
    init_logging();
    let mut system = System::new();
    system.write_word(0x8000_0000, 0x2401_0005);
    system.write_word(0x8000_0004, 0x0341_0825); // or $1, $26, $1
    system.write_word(0x8000_0008, 0x03E0_0008); // jr $31
    system.write_word(0x8000_0FFC, JUMP_TO_SELF_AT_0FFC);

    let first: Vec<_> = system
        .fetch_block(0x8000_0000)
        .unwrap()
        .unwrap()
        .code
        .clone();

    system.invalidate_page(0x8000_0000);

    let second = &system.fetch_block(0x8000_0000).unwrap().unwrap().code;
    assert_eq!(&first, second);
}

#[test]
fn test_unmap_then_identical_remap_keeps_block() {
    init_logging();
    let mut system = System::new();
    system.map_tlb_range(true, 0x0010_0000, 0x0010_1000, 0x0000_4000);
    system.write_word(0x0010_0000, 0x2401_0005);
    system.fetch_block(0x0010_0000).unwrap().unwrap();

    system.unmap_tlb_range(0x0010_0000, 0x0010_1000);
    system.map_tlb_range(true, 0x0010_0000, 0x0010_1000, 0x0000_4000);

    // Backing bytes are unchanged, so the block revived; a store that
    // changes content must still invalidate it.
    system.write_word(0x0010_0000, 0x3401_0005);
    system.invalidate_on_store(0x0010_0000);
    let block = system.fetch_block(0x0010_0000).unwrap().unwrap();
    assert_eq!(block.code[0].op, Op::Ori);
}

#[test]
fn test_unmapped_fetch_parks_fault() {
    init_logging();
    let mut system = System::new();
    let result = system.fetch_block(0x0040_0000).unwrap();
    assert!(result.is_none());

    let fault = system.take_fault().expect("fetch fault pending");
    assert_eq!(fault.vaddr, 0x0040_0000);
}

#[test]
fn test_fetch_past_rom_end_decodes_filler() {
    init_logging();
    let mut system = System::new();
    system.set_rom(vec![0u8; 0x1000]).unwrap();

    // One page past the image, still inside the ROM window
    let block = system.fetch_block(0x9000_1000).unwrap().unwrap();
    assert_ne!(block.code[0].op, Op::NotTranslated);
}

#[test]
fn test_malformed_map_requests_are_ignored() {
    init_logging();
    let mut system = System::new();

    // Direct-window endpoints are not mappable; the request is skipped
    // and direct-window translation still works as pass-through.
    system.map_tlb_range(true, 0x8000_0000, 0x8000_1000, 0);
    assert_eq!(system.translate_for_read(0x8000_0010), 0x8000_0010);
    assert!(system.take_fault().is_none());

    // Physical base outside the RAM window
    system.map_tlb_range(true, 0x0010_0000, 0x0010_1000, 0x2000_0000);
    assert_eq!(system.translate_for_read(0x0010_0000), 0);
    assert!(system.take_fault().is_some());
}

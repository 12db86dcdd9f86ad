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

//! Translated-block cache
//!
//! One [`TranslatedBlock`] per 4 KiB physical code page. Blocks are
//! indexed by canonical physical page number, so the cached and uncached
//! views of a page, and every TLB alias onto it, share one entry and one
//! validity state.
//!
//! Validity is tracked with a whole-page content hash computed when the
//! page is decoded. A store into the page recomputes the hash and compares;
//! a mismatch marks the block invalid, and the re-decode happens lazily on
//! the next fetch into the page. The common case, code that never modifies
//! itself, therefore costs one hash per store into a code page and nothing
//! more.
//!
//! Decoding is lazy at slot granularity too: a block starts out with every
//! slot untranslated, and a fetch landing on an untranslated slot decodes
//! forward from there until an unconditional transfer (plus its delay
//! slot) or the end of the page, then appends end-of-block sentinels.

use crate::core::cpu::decode::{decode_delay_slot, decode_word, DecodeContext};
use crate::core::cpu::ops::{Op, TranslatedInsn};
use crate::core::error::{EmulatorError, Result};
use crate::core::memory::tlb::TLB_PAGE_SIZE;
use crate::core::memory::PHYS_MASK;

/// Instruction words in one page block
pub const BLOCK_WORDS: usize = (TLB_PAGE_SIZE / 4) as usize;

/// Slots allocated per block: every word, plus room for the sentinels a
/// decode ending at the last word appends
pub const BLOCK_SLOTS: usize = (BLOCK_WORDS + 1) + (BLOCK_WORDS >> 2);

/// Cacheable physical pages (the 512 MiB physical space, 4 KiB pages)
pub const CACHE_PAGES: usize = (PHYS_MASK as usize + 1) >> 12;

/// MurmurHash2 over one page of backing bytes, seed 0
///
/// The exact function matters: block validity survives across map/unmap
/// cycles by comparing hashes stored at different times, so every caller
/// must agree on the value.
pub fn page_hash(data: &[u8]) -> u32 {
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h: u32 = data.len() as u32;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}

/// Decoded form of one 4 KiB code page
#[derive(Debug)]
pub struct TranslatedBlock {
    /// Virtual address of the page's first word
    pub start: u32,
    /// Virtual address one past the page's last word
    pub end: u32,
    /// Content hash of the backing bytes at decode time
    pub hash: u32,
    /// Instruction slots, one per word plus sentinel room
    pub code: Vec<TranslatedInsn>,
}

impl TranslatedBlock {
    /// Allocate an empty block with every slot untranslated
    ///
    /// # Errors
    ///
    /// `BlockAllocation` when the slot buffer cannot be reserved. Fatal
    /// for the session; the caller must not retry.
    fn allocate(page: usize) -> Result<Self> {
        let mut code = Vec::new();
        code.try_reserve_exact(BLOCK_SLOTS).map_err(|_| {
            log::error!("failed to allocate a translation buffer for page 0x{:05X}", page);
            EmulatorError::BlockAllocation { page }
        })?;
        code.resize(BLOCK_SLOTS, TranslatedInsn::meta(Op::NotTranslated));
        Ok(Self {
            start: 0,
            end: 0,
            hash: 0,
            code,
        })
    }

    /// Re-anchor the block at `vaddr`'s page, hash the backing bytes and
    /// decode from the fetch offset
    fn rebuild(&mut self, vaddr: u32, backing: &[u8]) {
        self.start = vaddr & !(TLB_PAGE_SIZE - 1);
        self.end = self.start + TLB_PAGE_SIZE;
        self.hash = page_hash(backing);
        self.code.fill(TranslatedInsn::meta(Op::NotTranslated));
        self.decode_from(((vaddr & (TLB_PAGE_SIZE - 1)) >> 2) as usize, backing);
        log::debug!(
            "decoded block 0x{:08X}..0x{:08X} hash=0x{:08X}",
            self.start,
            self.end,
            self.hash
        );
    }

    /// Decode forward from `start_offset` until a transfer ends the run
    ///
    /// Stops after an unconditional jump and its delay slot, after ERET,
    /// or at the page's last word, then appends two end-of-block
    /// sentinels. Never touches slots past the allocated count.
    fn decode_from(&mut self, start_offset: usize, backing: &[u8]) {
        debug_assert_eq!(backing.len(), TLB_PAGE_SIZE as usize);

        let mut i = start_offset;
        loop {
            let word = word_of(backing, i);
            let ctx = DecodeContext {
                addr: self.start + (i as u32) * 4,
                block_start: self.start,
                block_end: self.end,
                next_is_nop: i + 1 < BLOCK_WORDS && word_of(backing, i + 1) == 0,
            };
            let insn = decode_word(word, &ctx);
            let op = insn.op;
            self.code[i] = insn;
            i += 1;

            if op == Op::Eret || i >= BLOCK_WORDS {
                break;
            }
            if matches!(op, Op::J | Op::Jr) {
                let ctx = DecodeContext {
                    addr: self.start + (i as u32) * 4,
                    block_start: self.start,
                    block_end: self.end,
                    next_is_nop: false,
                };
                self.code[i] = decode_delay_slot(word_of(backing, i), &ctx);
                i += 1;
                break;
            }
        }

        self.code[i] = TranslatedInsn::meta(Op::EndBlock);
        self.code[i + 1] = TranslatedInsn::meta(Op::EndBlock);
    }

    /// Number of leading slots holding decoded instructions (excludes
    /// untranslated slots and sentinels); test and diagnostics helper
    pub fn decoded_len(&self) -> usize {
        self.code
            .iter()
            .take_while(|insn| !matches!(insn.op, Op::NotTranslated | Op::EndBlock))
            .count()
    }
}

#[inline(always)]
fn word_of(backing: &[u8], i: usize) -> u32 {
    let o = i * 4;
    u32::from_be_bytes([backing[o], backing[o + 1], backing[o + 2], backing[o + 3]])
}

/// The per-session cache of translated blocks
pub struct BlockCache {
    blocks: Vec<Option<Box<TranslatedBlock>>>,
    invalid: Box<[bool]>,
}

impl BlockCache {
    pub fn new() -> Self {
        let mut blocks = Vec::new();
        blocks.resize_with(CACHE_PAGES, || None);
        Self {
            blocks,
            invalid: vec![false; CACHE_PAGES].into_boxed_slice(),
        }
    }

    /// Canonical cache index for a physical address
    #[inline(always)]
    fn page_index(paddr: u32) -> usize {
        ((paddr & PHYS_MASK) >> 12) as usize
    }

    /// Fetch the block covering `paddr`, building or re-decoding as needed
    ///
    /// `vaddr` anchors the instruction addresses recorded in the block;
    /// `backing` is the page's current backing bytes.
    ///
    /// # Errors
    ///
    /// Only `BlockAllocation`, and only on first contact with a page.
    pub fn fetch(
        &mut self,
        paddr: u32,
        vaddr: u32,
        backing: &[u8],
    ) -> Result<&TranslatedBlock> {
        let index = Self::page_index(paddr);
        let was_absent = self.blocks[index].is_none();

        let block = match &mut self.blocks[index] {
            Some(block) => block,
            slot => slot.insert(Box::new(TranslatedBlock::allocate(index)?)),
        };

        if was_absent || self.invalid[index] {
            block.rebuild(vaddr, backing);
            self.invalid[index] = false;
        } else {
            let offset = ((paddr & (TLB_PAGE_SIZE - 1)) >> 2) as usize;
            if matches!(block.code[offset].op, Op::NotTranslated | Op::EndBlock) {
                block.decode_from(offset, backing);
            }
        }

        Ok(block)
    }

    /// Is the block for `paddr` present and believed valid?
    pub fn is_valid(&self, paddr: u32) -> bool {
        let index = Self::page_index(paddr);
        self.blocks[index].is_some() && !self.invalid[index]
    }

    /// React to a store into `paddr`'s page
    ///
    /// Recomputes the page hash and invalidates on mismatch. Pages with
    /// no decoded block cost nothing.
    pub fn invalidate_on_store(&mut self, paddr: u32, backing: &[u8]) {
        let index = Self::page_index(paddr);
        if self.invalid[index] {
            return;
        }
        if let Some(block) = &self.blocks[index] {
            if page_hash(backing) != block.hash {
                self.invalid[index] = true;
                log::debug!("store invalidated code page 0x{:05X}", index);
            }
        }
    }

    /// Unconditionally invalidate `paddr`'s page (CACHE op, diagnostics)
    pub fn invalidate_page(&mut self, paddr: u32) {
        let index = Self::page_index(paddr);
        if self.blocks[index].is_some() {
            self.invalid[index] = true;
        }
    }

    /// A mapping covering `paddr` was torn down
    ///
    /// Called before the TLB entries are cleared. A still-valid block
    /// snapshots the current backing hash so a later identical mapping can
    /// revive it; an already-invalid block loses its hash and will always
    /// re-decode.
    pub fn on_code_page_unmapped(&mut self, paddr: u32, backing: &[u8]) {
        let index = Self::page_index(paddr);
        if let Some(block) = &mut self.blocks[index] {
            if self.invalid[index] {
                block.hash = 0;
            } else {
                block.hash = page_hash(backing);
                self.invalid[index] = true;
            }
        }
    }

    /// A mapping covering `paddr` was established
    ///
    /// Called after the TLB entries are written. Revives the block when
    /// the new backing bytes still match the snapshotted hash.
    pub fn on_code_page_mapped(&mut self, paddr: u32, backing: &[u8]) {
        let index = Self::page_index(paddr);
        if let Some(block) = &self.blocks[index] {
            if self.invalid[index] && block.hash != 0 && page_hash(backing) == block.hash {
                self.invalid[index] = false;
                log::debug!("revived code page 0x{:05X} after remap", index);
            }
        }
    }

    /// Drop every block (system reset)
    pub fn reset(&mut self) {
        for slot in &mut self.blocks {
            *slot = None;
        }
        self.invalid.fill(false);
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cpu::ops::BranchDisposition;

    const PAGE: usize = TLB_PAGE_SIZE as usize;

    fn page_with(words: &[(usize, u32)]) -> Vec<u8> {
        let mut page = vec![0u8; PAGE];
        for &(index, word) in words {
            page[index * 4..index * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        page
    }

    #[test]
    fn test_hash_is_deterministic() {
        let page = page_with(&[(0, 0x1234_5678), (100, 0xDEAD_BEEF)]);
        assert_eq!(page_hash(&page), page_hash(&page));
    }

    #[test]
    fn test_hash_sees_every_byte() {
        let page = page_with(&[]);
        let base = page_hash(&page);
        for index in [0usize, 1, 2048, PAGE - 1] {
            let mut changed = page.clone();
            changed[index] ^= 1;
            assert_ne!(page_hash(&changed), base, "byte {index} not hashed");
        }
    }

    #[test]
    fn test_hash_tail_bytes() {
        // Lengths that exercise the 1..3 byte tail path
        assert_ne!(page_hash(&[0xAB]), page_hash(&[0xAC]));
        assert_ne!(page_hash(&[0xAB, 0xCD]), page_hash(&[0xAB, 0xCE]));
        assert_ne!(page_hash(&[1, 2, 3]), page_hash(&[1, 2, 4]));
    }

    #[test]
    fn test_fetch_decodes_straight_line_code() {
        let mut cache = BlockCache::new();
        // addiu $1, $0, 5 ; addiu $2, $0, 7 ; jr $31 ; nop
        let page = page_with(&[
            (0, 0x2401_0005),
            (1, 0x2402_0007),
            (2, 0x03E0_0008),
            (3, 0x0000_0000),
        ]);

        let block = cache.fetch(0x0000_0000, 0x8000_0000, &page).unwrap();
        assert_eq!(block.start, 0x8000_0000);
        assert_eq!(block.code[0].op, Op::Addiu);
        assert_eq!(block.code[1].op, Op::Addiu);
        assert_eq!(block.code[2].op, Op::Jr);
        assert_eq!(block.code[3].op, Op::Nop);
        // Sentinels directly after the delay slot
        assert_eq!(block.code[4].op, Op::EndBlock);
        assert_eq!(block.code[5].op, Op::EndBlock);
    }

    #[test]
    fn test_fetch_mid_page_decodes_lazily() {
        let mut cache = BlockCache::new();
        // Code island at word 0x200: ori $1, $0, 1 ; jr $31 ; nop
        let page = page_with(&[
            (0x200, 0x3401_0001),
            (0x201, 0x03E0_0008),
            (0x202, 0x0000_0000),
        ]);

        let block = cache.fetch(0x0000_0800, 0x8000_0800, &page).unwrap();
        assert_eq!(block.code[0x200].op, Op::Ori);
        assert_eq!(block.code[0x201].op, Op::Jr);
        // Slot 0 was never fetched, so it stays untranslated
        assert_eq!(block.code[0].op, Op::NotTranslated);

        // A later fetch at the page head decodes forward from slot 0
        let block = cache.fetch(0x0000_0000, 0x8000_0000, &page).unwrap();
        assert_ne!(block.code[0].op, Op::NotTranslated);
    }

    #[test]
    fn test_decode_stops_at_page_boundary() {
        let mut cache = BlockCache::new();
        // Four nops then a jump-to-self in the page's last word
        let jump_to_last = 0x0800_0000 | ((0x0FFC >> 2) as u32);
        let page = page_with(&[(0x3FF, jump_to_last)]);

        let block = cache.fetch(0x0000_0FEC, 0x8000_0FEC, &page).unwrap();
        // Five executable slots: offsets 0x3FB..=0x3FF
        for i in 0x3FB..0x3FF {
            assert_eq!(block.code[i].op, Op::Nop);
        }
        assert_eq!(block.code[0x3FF].op, Op::J);
        assert_eq!(block.code[0x3FF].branch, BranchDisposition::Out);
        assert_eq!(block.code[BLOCK_WORDS].op, Op::EndBlock);
        assert_eq!(block.code[BLOCK_WORDS + 1].op, Op::EndBlock);
        assert!(block.code.len() >= BLOCK_WORDS + 2);
    }

    #[test]
    fn test_store_invalidates_on_content_change() {
        let mut cache = BlockCache::new();
        let mut page = page_with(&[(0, 0x2401_0005)]);
        cache.fetch(0, 0x8000_0000, &page).unwrap();
        assert!(cache.is_valid(0));

        // Store that does not change content keeps the block valid
        cache.invalidate_on_store(0x0000_0010, &page);
        assert!(cache.is_valid(0));

        // Content-changing store invalidates
        page[0] = 0x30;
        cache.invalidate_on_store(0x0000_0000, &page);
        assert!(!cache.is_valid(0));

        // Next fetch re-decodes the new content
        let block = cache.fetch(0, 0x8000_0000, &page).unwrap();
        assert_eq!(block.code[0].op, Op::Andi);
    }

    #[test]
    fn test_mirror_aliases_share_one_entry() {
        let mut cache = BlockCache::new();
        let page = page_with(&[(0, 0x2401_0005)]);
        cache.fetch(0x0000_0000, 0x8000_0000, &page).unwrap();

        // The uncached view hits the same entry
        assert!(cache.is_valid(0x2000_0000 & PHYS_MASK));
        cache.invalidate_page(0x2000_0000);
        assert!(!cache.is_valid(0x0000_0000));
    }

    #[test]
    fn test_unmap_then_identical_map_revives() {
        let mut cache = BlockCache::new();
        let page = page_with(&[(0, 0x2401_0005)]);
        cache.fetch(0x0000_2000, 0x0001_0000, &page).unwrap();

        cache.on_code_page_unmapped(0x0000_2000, &page);
        assert!(!cache.is_valid(0x0000_2000));

        cache.on_code_page_mapped(0x0000_2000, &page);
        assert!(cache.is_valid(0x0000_2000));
    }

    #[test]
    fn test_unmap_then_changed_map_stays_invalid() {
        let mut cache = BlockCache::new();
        let mut page = page_with(&[(0, 0x2401_0005)]);
        cache.fetch(0x0000_2000, 0x0001_0000, &page).unwrap();

        cache.on_code_page_unmapped(0x0000_2000, &page);
        page[7] ^= 0xFF;
        cache.on_code_page_mapped(0x0000_2000, &page);
        assert!(!cache.is_valid(0x0000_2000));
    }

    #[test]
    fn test_invalid_page_loses_hash_on_unmap() {
        let mut cache = BlockCache::new();
        let page = page_with(&[(0, 0x2401_0005)]);
        cache.fetch(0x0000_2000, 0x0001_0000, &page).unwrap();

        cache.invalidate_page(0x0000_2000);
        cache.on_code_page_unmapped(0x0000_2000, &page);
        // Hash was zeroed, so an identical remap cannot revive the page
        cache.on_code_page_mapped(0x0000_2000, &page);
        assert!(!cache.is_valid(0x0000_2000));
    }

    #[test]
    fn test_reset_drops_blocks() {
        let mut cache = BlockCache::new();
        let page = page_with(&[(0, 0x2401_0005)]);
        cache.fetch(0, 0x8000_0000, &page).unwrap();
        cache.reset();
        assert!(!cache.is_valid(0));
    }
}

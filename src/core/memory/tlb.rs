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

//! TLB address translator
//!
//! Maps 4 KiB virtual pages to physical pages with a per-page writable
//! flag. The table is flat: one entry per virtual page over the whole 4 GiB
//! space, indexed by `vaddr >> 12`, so a lookup is one load.
//!
//! # Address classes
//!
//! The direct window `0x8000_0000..0xC000_0000` (kseg0 and its uncached
//! mirror kseg1) never goes through the TLB; those addresses are their own
//! physical addresses. Everything below `0x8000_0000` and at or above
//! `0xC000_0000` is translated.
//!
//! # Entry packing
//!
//! A mapped entry holds `0x8000_0000 | (physical & 0xFFFF_F000) | flags`.
//! Translated physical addresses always carry the RAM-window bias in bit 31,
//! so that bit doubles as the valid flag; an unmapped page is all zeroes.
//!
//! # Faults
//!
//! A miss, or a write against a read-only page, produces a [`TlbFault`].
//! Faults are expected and frequent; the execution layer turns them into a
//! guest refill exception and resumes. They are never crate errors.

use bitflags::bitflags;

/// Bytes per TLB page (4 KiB)
pub const TLB_PAGE_SIZE: u32 = 0x1000;

/// Offset bits within one TLB page
pub const TLB_OFFSET_MASK: u32 = TLB_PAGE_SIZE - 1;

/// Page-number bits of a packed entry (includes the bias bit 31)
pub const TLB_ADDRESS_MASK: u32 = 0xFFFF_F000;

/// Number of 4 KiB pages covering the 4 GiB virtual space
pub const TLB_PAGES_COUNT: usize = 1 << 20;

bitflags! {
    /// Flag bits of a packed TLB entry
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TlbFlags: u32 {
        /// Entry maps a page (bit 31 of the biased physical base)
        const VALID = 0x8000_0000;
        /// Guest stores through this page are permitted
        const WRITABLE = 0x0000_0001;
    }
}

/// One packed per-page descriptor
///
/// Either fully valid or the unmapped sentinel, never partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbEntry(u32);

impl TlbEntry {
    /// The unmapped sentinel
    pub const UNMAPPED: TlbEntry = TlbEntry(0);

    #[inline(always)]
    pub fn is_mapped(self) -> bool {
        TlbFlags::from_bits_truncate(self.0).contains(TlbFlags::VALID)
    }

    #[inline(always)]
    pub fn is_writable(self) -> bool {
        TlbFlags::from_bits_truncate(self.0).contains(TlbFlags::WRITABLE)
    }

    /// Biased physical base of the mapped page (bits 31..12)
    #[inline(always)]
    pub fn page_base(self) -> u32 {
        self.0 & TLB_ADDRESS_MASK
    }
}

/// What an access intends to do with the translated address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Write,
    CodeFetch,
}

/// A translation fault
///
/// Recoverable by design: the execution layer delivers it as a TLB refill
/// exception and the faulting access observes the sentinel result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlbFault {
    /// Faulting virtual address
    pub vaddr: u32,
    /// Intent of the faulting access
    pub intent: AccessIntent,
}

/// Is this address subject to TLB translation at all?
///
/// kseg0/kseg1 (`0x8000_0000..0xC000_0000`) bypass the TLB.
#[inline(always)]
pub fn is_translated(addr: u32) -> bool {
    !(0x8000_0000..0xC000_0000).contains(&addr)
}

/// The TLB lookup table
///
/// Owned by the address space; map/unmap callers above this level are
/// responsible for keeping the block cache in step (see
/// [`crate::core::system::System`]).
pub struct Tlb {
    entries: Box<[TlbEntry]>,
}

impl Tlb {
    /// Create a TLB with every page unmapped
    pub fn new() -> Self {
        Self {
            entries: vec![TlbEntry::UNMAPPED; TLB_PAGES_COUNT].into_boxed_slice(),
        }
    }

    /// Reset every page to the unmapped sentinel (system reset)
    pub fn reset(&mut self) {
        self.entries.fill(TlbEntry::UNMAPPED);
    }

    /// Descriptor for the page containing `vaddr`
    #[inline(always)]
    pub fn entry(&self, vaddr: u32) -> TlbEntry {
        self.entries[(vaddr >> 12) as usize]
    }

    /// Map `[vstart, vend)` to physical pages starting at `pstart`
    ///
    /// Malformed requests (physical base outside the legal RAM window,
    /// empty range, endpoints in the untranslated window) are skipped
    /// without error: the permissive best-effort policy of hardware
    /// loaders. Well-formed requests overwrite any previous mapping.
    pub fn map(&mut self, writable: bool, vstart: u32, vend: u32, pstart: u32) {
        if pstart >= 0x2000_0000
            || vstart >= vend
            || !is_translated(vstart)
            || !is_translated(vend)
        {
            log::warn!(
                "skipping unmappable TLB request v=0x{:08X}..0x{:08X} p=0x{:08X}",
                vstart,
                vend,
                pstart
            );
            return;
        }

        let mut phys = 0x8000_0000 | (pstart & TLB_ADDRESS_MASK);
        if writable {
            phys |= TlbFlags::WRITABLE.bits();
        }

        let mut addr = vstart;
        while addr < vend {
            self.entries[(addr >> 12) as usize] = TlbEntry(phys);
            phys = phys.wrapping_add(TLB_PAGE_SIZE);
            match addr.checked_add(TLB_PAGE_SIZE) {
                Some(next) => addr = next,
                None => break,
            }
        }
        log::debug!(
            "TLB map v=0x{:08X}..0x{:08X} -> p=0x{:08X} writable={}",
            vstart,
            vend,
            pstart,
            writable
        );
    }

    /// Unmap every page covering `[vstart, vend)`
    pub fn unmap(&mut self, vstart: u32, vend: u32) {
        let mut addr = vstart;
        while addr < vend {
            self.entries[(addr >> 12) as usize] = TlbEntry::UNMAPPED;
            match addr.checked_add(TLB_PAGE_SIZE) {
                Some(next) => addr = next,
                None => break,
            }
        }
        log::debug!("TLB unmap v=0x{:08X}..0x{:08X}", vstart, vend);
    }

    /// Translate a virtual address
    ///
    /// Addresses in the direct window pass through unchanged. Translated
    /// addresses combine the entry's physical base with the page offset.
    ///
    /// # Errors
    ///
    /// Returns a [`TlbFault`] on a miss or on a write intent against a
    /// non-writable page. The fault is a value, not an `EmulatorError`.
    #[inline]
    pub fn translate(&self, vaddr: u32, intent: AccessIntent) -> Result<u32, TlbFault> {
        if !is_translated(vaddr) {
            return Ok(vaddr);
        }

        let entry = self.entry(vaddr);
        if !entry.is_mapped() || (intent == AccessIntent::Write && !entry.is_writable()) {
            return Err(TlbFault { vaddr, intent });
        }

        Ok(entry.page_base() | (vaddr & TLB_OFFSET_MASK))
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

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

//! Session context
//!
//! One [`System`] is one independent emulation session: the address
//! space, the block cache and the pending-fault slot, with no ambient
//! global state anywhere. Two sessions never observe each other.
//!
//! The access surface deliberately never fails for guest-visible
//! reasons. A translation fault parks a [`TlbFault`] in the pending slot
//! and the access completes with the sentinel result (reads see zero,
//! writes are dropped); the execution layer drains the slot with
//! [`System::take_fault`] and delivers the guest exception. Only
//! session-fatal conditions surface as [`crate::core::error::EmulatorError`].

use crate::core::config::SessionConfig;
use crate::core::cpu::cache::{BlockCache, TranslatedBlock};
use crate::core::error::{EmulatorError, Result};
use crate::core::memory::ports::DeviceRegisters;
use crate::core::memory::tlb::{AccessIntent, TlbFault, TLB_PAGE_SIZE};
use crate::core::memory::AddressSpace;
use std::path::Path;

/// One emulation session
///
/// # Example
///
/// ```
/// use usfx::core::system::System;
///
/// let mut system = System::new();
/// system.write_word(0x8000_0000, 0x1234_5678);
/// assert_eq!(system.read_byte(0x8000_0001), 0x56);
/// ```
pub struct System {
    bus: AddressSpace,
    cache: BlockCache,
    pending_fault: Option<TlbFault>,
}

impl System {
    /// Create a session with the default configuration
    pub fn new() -> Self {
        Self::with_config(&SessionConfig::default())
    }

    /// Create a session from an explicit configuration
    pub fn with_config(config: &SessionConfig) -> Self {
        Self {
            bus: AddressSpace::new(config),
            cache: BlockCache::new(),
            pending_fault: None,
        }
    }

    /// Create a session with peripheral register banks attached
    pub fn with_devices(config: &SessionConfig, devices: Box<dyn DeviceRegisters>) -> Self {
        Self {
            bus: AddressSpace::with_devices(config, devices),
            cache: BlockCache::new(),
            pending_fault: None,
        }
    }

    /// Build a session from a configuration, loading its ROM if one is set
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let mut system = Self::with_config(config);
        if let Some(path) = &config.rom_path {
            system.load_rom(path)?;
        }
        Ok(system)
    }

    fn record_fault(&mut self, fault: TlbFault) {
        log::trace!(
            "translation fault at 0x{:08X} ({:?})",
            fault.vaddr,
            fault.intent
        );
        self.pending_fault = Some(fault);
    }

    /// Take the pending translation fault, if any
    ///
    /// The execution layer calls this after an access to deliver the
    /// guest exception; taking clears the slot.
    pub fn take_fault(&mut self) -> Option<TlbFault> {
        self.pending_fault.take()
    }

    // ------------------------------------------------------------------
    // Load/store surface
    // ------------------------------------------------------------------

    /// Read a word; a faulting access reads zero
    pub fn read_word(&mut self, vaddr: u32) -> u32 {
        match self.bus.try_read_word(vaddr) {
            Ok(value) => value,
            Err(fault) => {
                self.record_fault(fault);
                0
            }
        }
    }

    /// Write a word; a faulting access is dropped
    pub fn write_word(&mut self, vaddr: u32, value: u32) {
        if let Err(fault) = self.bus.try_write_word(vaddr, value) {
            self.record_fault(fault);
        }
    }

    /// Write a word under an explicit byte mask
    pub fn write_word_masked(&mut self, vaddr: u32, value: u32, mask: u32) {
        if let Err(fault) = self.bus.try_write_word_masked(vaddr, value, mask) {
            self.record_fault(fault);
        }
    }

    /// Read a byte; a faulting access reads zero
    pub fn read_byte(&mut self, vaddr: u32) -> u8 {
        match self.bus.try_read_byte(vaddr) {
            Ok(value) => value,
            Err(fault) => {
                self.record_fault(fault);
                0
            }
        }
    }

    /// Write a byte; a faulting access is dropped
    pub fn write_byte(&mut self, vaddr: u32, value: u8) {
        if let Err(fault) = self.bus.try_write_byte(vaddr, value) {
            self.record_fault(fault);
        }
    }

    /// Read a halfword; a faulting access reads zero
    pub fn read_halfword(&mut self, vaddr: u32) -> u16 {
        match self.bus.try_read_halfword(vaddr) {
            Ok(value) => value,
            Err(fault) => {
                self.record_fault(fault);
                0
            }
        }
    }

    /// Write a halfword; a faulting access is dropped
    pub fn write_halfword(&mut self, vaddr: u32, value: u16) {
        if let Err(fault) = self.bus.try_write_halfword(vaddr, value) {
            self.record_fault(fault);
        }
    }

    /// Read a doubleword; a faulting access reads zero
    pub fn read_doubleword(&mut self, vaddr: u32) -> u64 {
        match self.bus.try_read_doubleword(vaddr) {
            Ok(value) => value,
            Err(fault) => {
                self.record_fault(fault);
                0
            }
        }
    }

    /// Write a doubleword; a faulting access is dropped
    pub fn write_doubleword(&mut self, vaddr: u32, value: u64) {
        if let Err(fault) = self.bus.try_write_doubleword(vaddr, value) {
            self.record_fault(fault);
        }
    }

    /// Raw physical address for a read-class bulk access, zero on fault
    pub fn translate_for_read(&mut self, vaddr: u32) -> u32 {
        match self.bus.translate_for_read(vaddr) {
            Ok(paddr) => paddr,
            Err(fault) => {
                self.record_fault(fault);
                0
            }
        }
    }

    /// Raw physical address for a write-class bulk access, zero on fault
    pub fn translate_for_write(&mut self, vaddr: u32) -> u32 {
        match self.bus.translate_for_write(vaddr) {
            Ok(paddr) => paddr,
            Err(fault) => {
                self.record_fault(fault);
                0
            }
        }
    }

    // ------------------------------------------------------------------
    // TLB management
    // ------------------------------------------------------------------

    /// Map a virtual range and re-derive code-page validity under it
    pub fn map_tlb_range(&mut self, writable: bool, vstart: u32, vend: u32, pstart: u32) {
        self.bus.tlb.map(writable, vstart, vend, pstart);
        // Entries exist now; revive blocks whose backing still matches
        let mut vaddr = vstart & !(TLB_PAGE_SIZE - 1);
        while vaddr < vend {
            if let Ok(paddr) = self.bus.tlb.translate(vaddr, AccessIntent::CodeFetch) {
                if let Some(backing) = self.bus.fetch_backing(paddr) {
                    self.cache.on_code_page_mapped(paddr, backing);
                }
            }
            match vaddr.checked_add(TLB_PAGE_SIZE) {
                Some(next) => vaddr = next,
                None => break,
            }
        }
    }

    /// Unmap a virtual range, snapshotting code-page state first
    ///
    /// The cache walk must happen while the entries still exist; clearing
    /// them first would orphan the physical pages.
    pub fn unmap_tlb_range(&mut self, vstart: u32, vend: u32) {
        let mut vaddr = vstart & !(TLB_PAGE_SIZE - 1);
        while vaddr < vend {
            if let Ok(paddr) = self.bus.tlb.translate(vaddr, AccessIntent::CodeFetch) {
                if let Some(backing) = self.bus.fetch_backing(paddr) {
                    self.cache.on_code_page_unmapped(paddr, backing);
                }
            }
            match vaddr.checked_add(TLB_PAGE_SIZE) {
                Some(next) => vaddr = next,
                None => break,
            }
        }
        self.bus.tlb.unmap(vstart, vend);
    }

    /// Clear every TLB entry
    pub fn reset_tlb(&mut self) {
        self.bus.tlb.reset();
    }

    // ------------------------------------------------------------------
    // Block cache surface
    // ------------------------------------------------------------------

    /// Re-derive code-page validity after a store at `vaddr`
    ///
    /// Called by the dispatch loop after guest stores. Cheap when the
    /// target page holds no decoded code.
    pub fn invalidate_on_store(&mut self, vaddr: u32) {
        let paddr = match self.bus.translate_for_read(vaddr) {
            Ok(paddr) => paddr,
            // The store itself already faulted; nothing reached memory
            Err(_) => return,
        };
        if let Some(backing) = self.bus.fetch_backing(paddr) {
            self.cache.invalidate_on_store(paddr, backing);
        }
    }

    /// Unconditionally invalidate the code page at `vaddr` (CACHE op)
    pub fn invalidate_page(&mut self, vaddr: u32) {
        if let Ok(paddr) = self.bus.translate_for_read(vaddr) {
            self.cache.invalidate_page(paddr);
        }
    }

    /// Fetch the translated block covering `vaddr`
    ///
    /// `Ok(None)` means the fetch took a translation fault; the fault is
    /// pending and the execution layer should deliver it and retry.
    ///
    /// # Errors
    ///
    /// `BlockAllocation` when a block buffer cannot be allocated and
    /// `NoExecutableBacking` when the physical target has no memory
    /// behind it. Both are session-fatal.
    pub fn fetch_block(&mut self, vaddr: u32) -> Result<Option<&TranslatedBlock>> {
        let paddr = match self.bus.tlb.translate(vaddr, AccessIntent::CodeFetch) {
            Ok(paddr) => paddr,
            Err(fault) => {
                self.record_fault(fault);
                return Ok(None);
            }
        };
        let backing = self
            .bus
            .fetch_backing(paddr)
            .ok_or(EmulatorError::NoExecutableBacking { address: paddr })?;
        let block = self.cache.fetch(paddr, vaddr, backing)?;
        Ok(Some(block))
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Load a cart ROM image into the bus window
    pub fn load_rom(&mut self, path: &Path) -> Result<()> {
        self.bus.load_rom(path)
    }

    /// Bind an in-memory ROM image (test and embedding convenience)
    pub fn set_rom(&mut self, image: Vec<u8>) -> Result<()> {
        self.bus.set_rom(image)
    }

    /// Reset to power-on state; the loaded ROM is retained
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cache.reset();
        self.pending_fault = None;
        log::info!("session reset");
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

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

//! Address space and I/O bus
//!
//! The bus carves the 4 GiB space into 64 KiB segments and binds a
//! read/write handler pair to each segment once, at construction. Every
//! access indexes the table by `addr >> 16` and dispatches on the handler
//! tag, so routing is one load and one match, never a search.
//!
//! Each hardware region is registered twice: at its cached address and at
//! the uncached mirror `addr | 0x2000_0000`, so kseg0/kseg1 aliasing falls
//! out of the table rather than per-access arithmetic.
//!
//! Word access is the primitive. Sub-word reads fetch the containing
//! aligned word and extract the lane with shift `((addr & 3) ^ 3) * 8` for
//! bytes and `((addr & 2) ^ 2) * 8` for halfwords; sub-word writes merge
//! through a byte mask, `(old & !mask) | (value & mask)`. Doubleword
//! accesses are two sequential word accesses, high word first.
//!
//! Unmapped segments are serviced by a handler like any other: reads
//! return zero and writes are discarded, so a stray guest access never
//! stalls the session.

pub mod ports;
pub mod tlb;

use crate::core::config::{SessionConfig, RDRAM_MAX_SIZE};
use crate::core::error::{EmulatorError, Result};
use crate::core::memory::ports::{DeviceRegisters, NullDevices, Port};
use crate::core::memory::tlb::{AccessIntent, Tlb, TlbFault, TLB_PAGE_SIZE};
use std::path::Path;

/// Bytes covered by one segment of the dispatch table
pub const SEGMENT_SIZE: u32 = 0x1_0000;

/// Number of segments covering the 4 GiB space
pub const SEGMENTS_COUNT: usize = 0x1_0000;

/// Physical address bits (the cached/uncached distinction lives above these)
pub const PHYS_MASK: u32 = 0x1FFF_FFFF;

/// First segment of the RDRAM window (physical 0x0000_0000, cached view)
const RDRAM_SEGMENT: usize = 0x8000;

/// First segment of the cart ROM window (physical 0x1000_0000, cached view)
const ROM_SEGMENT: usize = 0x9000;

/// Physical base of the cart ROM window
pub const ROM_PHYS_BASE: u32 = 0x1000_0000;

/// Largest loadable ROM image (the ROM window ends where PIF begins)
pub const ROM_MAX_SIZE: usize = 0x0FC0_0000;

/// Segment offset of the uncached mirror (`addr | 0x2000_0000`)
const MIRROR_SEGMENT: usize = 0x2000;

/// Backing store an access is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// No device decodes this range: reads 0, writes discarded
    Nothing,
    /// Main RDRAM
    Rdram,
    /// Cart ROM image (read side only)
    CartRom,
    /// A hardware controller's register bank
    Ports(Port),
}

/// Handler pair for one 64 KiB segment
#[derive(Debug, Clone, Copy)]
struct Segment {
    read: Handler,
    write: Handler,
}

const UNMAPPED_SEGMENT: Segment = Segment {
    read: Handler::Nothing,
    write: Handler::Nothing,
};

/// Fixed device register windows, by cached-view segment index
const MEMORY_MAP: &[(usize, Port)] = &[
    (0x83F0, Port::RdramRegs),
    (0x8400, Port::RspMem),
    (0x8404, Port::RspRegs),
    (0x8408, Port::RspRegs2),
    (0x8410, Port::DpcRegs),
    (0x8420, Port::DpsRegs),
    (0x8430, Port::MiRegs),
    (0x8440, Port::ViRegs),
    (0x8450, Port::AiRegs),
    (0x8460, Port::PiRegs),
    (0x8470, Port::RiRegs),
    (0x8480, Port::SiRegs),
    (0x8500, Port::DdRegs),
    (0x9FC0, Port::PifRam),
];

/// The segmented address space of one session
///
/// Owns RDRAM, the loaded cart ROM image, the dispatch table and the TLB.
/// Virtual accessors (`try_read_*`/`try_write_*`) translate first and
/// surface faults as values; the session context above this turns a fault
/// into a pending guest exception and substitutes the sentinel result.
///
/// # Example
///
/// ```
/// use usfx::core::memory::AddressSpace;
/// use usfx::core::config::SessionConfig;
///
/// let mut bus = AddressSpace::new(&SessionConfig::default());
/// bus.try_write_word(0x8000_0000, 0x1234_5678).unwrap();
/// assert_eq!(bus.try_read_byte(0x8000_0001).unwrap(), 0x56);
/// ```
pub struct AddressSpace {
    segments: Box<[Segment]>,
    rdram: Vec<u8>,
    rom: Vec<u8>,
    filler: Box<[u8]>,
    devices: Box<dyn DeviceRegisters>,
    pub(crate) tlb: Tlb,
}

impl AddressSpace {
    /// Create an address space with no peripherals attached
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_devices(config, Box::new(NullDevices))
    }

    /// Create an address space routing register windows to `devices`
    pub fn with_devices(config: &SessionConfig, devices: Box<dyn DeviceRegisters>) -> Self {
        let rdram_size = config.rdram_size.min(RDRAM_MAX_SIZE);
        let mut space = Self {
            segments: vec![UNMAPPED_SEGMENT; SEGMENTS_COUNT].into_boxed_slice(),
            rdram: vec![0u8; rdram_size],
            rom: Vec::new(),
            filler: build_filler_page(),
            devices,
            tlb: Tlb::new(),
        };
        space.rebuild_segments();
        log::debug!("address space up: rdram={:#x} bytes", rdram_size);
        space
    }

    /// Register one handler pair at `segment` and its uncached mirror
    fn register(&mut self, segment: usize, read: Handler, write: Handler) {
        self.segments[segment] = Segment { read, write };
        self.segments[segment | MIRROR_SEGMENT] = Segment { read, write };
    }

    /// Rebind the whole dispatch table from current RDRAM/ROM sizes
    fn rebuild_segments(&mut self) {
        self.segments.fill(UNMAPPED_SEGMENT);

        let rdram_segments = self.rdram.len().div_ceil(SEGMENT_SIZE as usize);
        for i in 0..rdram_segments {
            self.register(RDRAM_SEGMENT + i, Handler::Rdram, Handler::Rdram);
        }

        // ROM is read-only on the bus; the write side stays unmapped
        let rom_segments = self.rom.len().div_ceil(SEGMENT_SIZE as usize);
        for i in 0..rom_segments {
            self.register(ROM_SEGMENT + i, Handler::CartRom, Handler::Nothing);
        }

        // Device windows last so they win over any overlapping range
        for &(segment, port) in MEMORY_MAP {
            self.register(segment, Handler::Ports(port), Handler::Ports(port));
        }
    }

    /// Load a cart ROM image from disk and bind its bus window
    ///
    /// # Errors
    ///
    /// `RomNotFound` if the path does not exist, `RomTooLarge` if the image
    /// does not fit the ROM window, `Io` for any other read failure.
    pub fn load_rom(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(EmulatorError::RomNotFound(path.display().to_string()));
        }
        let image = std::fs::read(path)?;
        log::info!("loaded ROM image: {} ({} bytes)", path.display(), image.len());
        self.set_rom(image)
    }

    /// Bind an in-memory ROM image to the bus window
    pub fn set_rom(&mut self, image: Vec<u8>) -> Result<()> {
        if image.len() > ROM_MAX_SIZE {
            return Err(EmulatorError::RomTooLarge {
                limit: ROM_MAX_SIZE,
                got: image.len(),
            });
        }
        self.rom = image;
        self.rebuild_segments();
        Ok(())
    }

    /// Reset to power-on state: RDRAM zeroed, TLB cleared, ROM retained
    pub fn reset(&mut self) {
        self.rdram.fill(0);
        self.tlb.reset();
        self.rebuild_segments();
        log::debug!("address space reset");
    }

    /// Read the aligned word containing physical address `paddr`
    pub fn read_physical_word(&mut self, paddr: u32) -> u32 {
        let segment = self.segments[(paddr >> 16) as usize];
        match segment.read {
            Handler::Nothing => {
                log::trace!("unmapped read at 0x{:08X} -> 0", paddr);
                0
            }
            Handler::Rdram => {
                let offset = (paddr & PHYS_MASK & !3) as usize;
                word_at(&self.rdram, offset)
            }
            Handler::CartRom => {
                let offset = ((paddr & PHYS_MASK & !3) - ROM_PHYS_BASE) as usize;
                word_at(&self.rom, offset)
            }
            Handler::Ports(port) => self.devices.read_port(port, paddr & !3),
        }
    }

    /// Write `value` under `mask` into the aligned word at `paddr`
    pub fn write_physical_word(&mut self, paddr: u32, value: u32, mask: u32) {
        let segment = self.segments[(paddr >> 16) as usize];
        match segment.write {
            Handler::Nothing => {
                log::trace!("unmapped write at 0x{:08X} discarded", paddr);
            }
            Handler::Rdram => {
                let offset = (paddr & PHYS_MASK & !3) as usize;
                let old = word_at(&self.rdram, offset);
                put_word(&mut self.rdram, offset, (old & !mask) | (value & mask));
            }
            // ROM segments never bind a writable handler, so CartRom on the
            // write side is unreachable; route it like Nothing anyway.
            Handler::CartRom => {
                log::trace!("write into ROM window at 0x{:08X} discarded", paddr);
            }
            Handler::Ports(port) => self.devices.write_port(port, paddr & !3, value, mask),
        }
    }

    /// Translate `vaddr` for a read-class access
    #[inline]
    pub fn translate_for_read(&self, vaddr: u32) -> std::result::Result<u32, TlbFault> {
        self.tlb.translate(vaddr, AccessIntent::Read)
    }

    /// Translate `vaddr` for a write-class access
    #[inline]
    pub fn translate_for_write(&self, vaddr: u32) -> std::result::Result<u32, TlbFault> {
        self.tlb.translate(vaddr, AccessIntent::Write)
    }

    /// Read a word at a virtual address
    pub fn try_read_word(&mut self, vaddr: u32) -> std::result::Result<u32, TlbFault> {
        let paddr = self.tlb.translate(vaddr, AccessIntent::Read)?;
        Ok(self.read_physical_word(paddr))
    }

    /// Write a full word at a virtual address
    pub fn try_write_word(&mut self, vaddr: u32, value: u32) -> std::result::Result<(), TlbFault> {
        self.try_write_word_masked(vaddr, value, 0xFFFF_FFFF)
    }

    /// Write a word under an explicit byte mask at a virtual address
    pub fn try_write_word_masked(
        &mut self,
        vaddr: u32,
        value: u32,
        mask: u32,
    ) -> std::result::Result<(), TlbFault> {
        let paddr = self.tlb.translate(vaddr, AccessIntent::Write)?;
        self.write_physical_word(paddr, value, mask);
        Ok(())
    }

    /// Read one byte at a virtual address
    pub fn try_read_byte(&mut self, vaddr: u32) -> std::result::Result<u8, TlbFault> {
        let shift = ((vaddr & 3) ^ 3) * 8;
        let word = self.try_read_word(vaddr)?;
        Ok(((word << shift) >> 24) as u8)
    }

    /// Write one byte at a virtual address
    pub fn try_write_byte(&mut self, vaddr: u32, value: u8) -> std::result::Result<(), TlbFault> {
        let shift = ((vaddr & 3) ^ 3) * 8;
        let lane = ((value as u32) << 24) >> shift;
        let mask = 0xFF00_0000u32 >> shift;
        self.try_write_word_masked(vaddr, lane, mask)
    }

    /// Read one halfword at a virtual address
    pub fn try_read_halfword(&mut self, vaddr: u32) -> std::result::Result<u16, TlbFault> {
        let shift = ((vaddr & 2) ^ 2) * 8;
        let word = self.try_read_word(vaddr)?;
        Ok(((word << shift) >> 16) as u16)
    }

    /// Write one halfword at a virtual address
    pub fn try_write_halfword(
        &mut self,
        vaddr: u32,
        value: u16,
    ) -> std::result::Result<(), TlbFault> {
        let shift = ((vaddr & 2) ^ 2) * 8;
        let lane = ((value as u32) << 16) >> shift;
        let mask = 0xFFFF_0000u32 >> shift;
        self.try_write_word_masked(vaddr, lane, mask)
    }

    /// Read a doubleword as two word accesses, high word first
    pub fn try_read_doubleword(&mut self, vaddr: u32) -> std::result::Result<u64, TlbFault> {
        let base = vaddr & !7;
        let high = self.try_read_word(base)?;
        let low = self.try_read_word(base | 4)?;
        Ok(((high as u64) << 32) | low as u64)
    }

    /// Write a doubleword as two word accesses, high word first
    pub fn try_write_doubleword(
        &mut self,
        vaddr: u32,
        value: u64,
    ) -> std::result::Result<(), TlbFault> {
        let base = vaddr & !7;
        self.try_write_word(base, (value >> 32) as u32)?;
        self.try_write_word(base | 4, value as u32)
    }

    /// Executable backing bytes for the 4 KiB page containing `paddr`
    ///
    /// RDRAM and cart ROM pages return their live backing slice. A fetch
    /// past the end of the ROM image returns the filler pattern page, the
    /// same forward-progress policy unmapped reads get. `None` means the
    /// address has no executable backing at all (a session-fatal condition
    /// for the caller).
    pub fn fetch_backing(&self, paddr: u32) -> Option<&[u8]> {
        let page = (paddr & PHYS_MASK & !(TLB_PAGE_SIZE - 1)) as usize;
        let page_len = TLB_PAGE_SIZE as usize;

        if page + page_len <= self.rdram.len() {
            return Some(&self.rdram[page..page + page_len]);
        }
        if page >= ROM_PHYS_BASE as usize {
            let offset = page - ROM_PHYS_BASE as usize;
            if offset + page_len <= self.rom.len() {
                return Some(&self.rom[offset..offset + page_len]);
            }
            // ROM overrun: the filler pattern keeps fetch loops alive
            let slot = page & (self.filler.len() - 1);
            return Some(&self.filler[slot..slot + page_len]);
        }
        None
    }

    /// Current RDRAM size in bytes
    pub fn rdram_size(&self) -> usize {
        self.rdram.len()
    }

    /// Loaded ROM image size in bytes (zero when none is bound)
    pub fn rom_size(&self) -> usize {
        self.rom.len()
    }
}

/// Big-endian word at `offset`, zero past the end of the backing store
#[inline(always)]
fn word_at(bytes: &[u8], offset: usize) -> u32 {
    match bytes.get(offset..offset + 4) {
        Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
        None => 0,
    }
}

/// Store a big-endian word at `offset`, discarding past-the-end stores
#[inline(always)]
fn put_word(bytes: &mut [u8], offset: usize, value: u32) {
    if let Some(b) = bytes.get_mut(offset..offset + 4) {
        b.copy_from_slice(&value.to_be_bytes());
    }
}

/// One 64 KiB segment of recognizable pattern words, `(o << 16) | o`
fn build_filler_page() -> Box<[u8]> {
    let mut page = vec![0u8; SEGMENT_SIZE as usize];
    for (offset, chunk) in page.chunks_exact_mut(4).enumerate() {
        let o = (offset * 4) as u32;
        chunk.copy_from_slice(&((o << 16) | o).to_be_bytes());
    }
    page.into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> AddressSpace {
        AddressSpace::new(&SessionConfig::default())
    }

    #[test]
    fn test_word_round_trip() {
        let mut bus = bus();
        bus.try_write_word(0x8000_0100, 0xCAFE_BABE).unwrap();
        assert_eq!(bus.try_read_word(0x8000_0100).unwrap(), 0xCAFE_BABE);
    }

    #[test]
    fn test_byte_lane_convention() {
        let mut bus = bus();
        bus.try_write_word(0x8000_0000, 0x1234_5678).unwrap();

        assert_eq!(bus.try_read_byte(0x8000_0001).unwrap(), 0x56);
        assert_eq!(bus.try_read_byte(0x8000_0000).unwrap(), 0x78);
        assert_eq!(bus.try_read_byte(0x8000_0002).unwrap(), 0x34);
        assert_eq!(bus.try_read_byte(0x8000_0003).unwrap(), 0x12);
    }

    #[test]
    fn test_byte_write_read_symmetry() {
        let mut bus = bus();
        for lane in 0..4 {
            let addr = 0x8000_0200 + lane;
            bus.try_write_byte(addr, 0xA0 + lane as u8).unwrap();
            assert_eq!(bus.try_read_byte(addr).unwrap(), 0xA0 + lane as u8);
        }
        // The four lanes land in distinct parts of one word
        let word = bus.try_read_word(0x8000_0200).unwrap();
        let mut seen: Vec<u8> = word.to_be_bytes().to_vec();
        seen.sort_unstable();
        assert_eq!(seen, vec![0xA0, 0xA1, 0xA2, 0xA3]);
    }

    #[test]
    fn test_halfword_lane_convention() {
        let mut bus = bus();
        bus.try_write_word(0x8000_0010, 0x1234_5678).unwrap();
        assert_eq!(bus.try_read_halfword(0x8000_0010).unwrap(), 0x5678);
        assert_eq!(bus.try_read_halfword(0x8000_0012).unwrap(), 0x1234);

        bus.try_write_halfword(0x8000_0012, 0xBEEF).unwrap();
        assert_eq!(bus.try_read_halfword(0x8000_0012).unwrap(), 0xBEEF);
        assert_eq!(bus.try_read_halfword(0x8000_0010).unwrap(), 0x5678);
    }

    #[test]
    fn test_doubleword_high_word_first() {
        let mut bus = bus();
        bus.try_write_doubleword(0x8000_0040, 0x0123_4567_89AB_CDEF)
            .unwrap();
        assert_eq!(bus.try_read_word(0x8000_0040).unwrap(), 0x0123_4567);
        assert_eq!(bus.try_read_word(0x8000_0044).unwrap(), 0x89AB_CDEF);
        assert_eq!(
            bus.try_read_doubleword(0x8000_0040).unwrap(),
            0x0123_4567_89AB_CDEF
        );
    }

    #[test]
    fn test_masked_write_merges() {
        let mut bus = bus();
        bus.try_write_word(0x8000_0020, 0xFFFF_FFFF).unwrap();
        bus.try_write_word_masked(0x8000_0020, 0x1200_0034, 0xFF00_00FF)
            .unwrap();
        assert_eq!(bus.try_read_word(0x8000_0020).unwrap(), 0x12FF_FF34);
    }

    #[test]
    fn test_uncached_mirror_aliases_rdram() {
        let mut bus = bus();
        bus.try_write_word(0x8000_0300, 0x0BAD_F00D).unwrap();
        assert_eq!(bus.try_read_word(0xA000_0300).unwrap(), 0x0BAD_F00D);

        bus.try_write_word(0xA000_0304, 0x600D_CAFE).unwrap();
        assert_eq!(bus.try_read_word(0x8000_0304).unwrap(), 0x600D_CAFE);
    }

    #[test]
    fn test_unmapped_reads_zero_writes_discarded() {
        let mut bus = bus();
        // Past RDRAM, before the device windows
        assert_eq!(bus.try_read_word(0x8090_0000).unwrap(), 0);
        bus.try_write_word(0x8090_0000, 0xDEAD_BEEF).unwrap();
        assert_eq!(bus.try_read_word(0x8090_0000).unwrap(), 0);
    }

    #[test]
    fn test_rom_window_is_read_only() {
        let mut bus = bus();
        bus.set_rom(vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88])
            .unwrap();
        assert_eq!(bus.try_read_word(0x9000_0000).unwrap(), 0x1122_3344);
        assert_eq!(bus.try_read_word(0xB000_0004).unwrap(), 0x5566_7788);

        bus.try_write_word(0x9000_0000, 0).unwrap();
        assert_eq!(bus.try_read_word(0x9000_0000).unwrap(), 0x1122_3344);
    }

    #[test]
    fn test_rom_too_large_rejected() {
        let mut bus = bus();
        let err = bus.set_rom(vec![0u8; ROM_MAX_SIZE + 1]).unwrap_err();
        assert!(matches!(err, EmulatorError::RomTooLarge { .. }));
    }

    #[test]
    fn test_fetch_backing_rdram_page() {
        let mut bus = bus();
        bus.try_write_word(0x8000_1000, 0xAABB_CCDD).unwrap();
        let page = bus.fetch_backing(0x0000_1000).unwrap();
        assert_eq!(page.len(), TLB_PAGE_SIZE as usize);
        assert_eq!(&page[0..4], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn test_fetch_backing_rom_overrun_uses_filler() {
        let mut bus = bus();
        bus.set_rom(vec![0u8; 0x2000]).unwrap();
        let page = bus.fetch_backing(ROM_PHYS_BASE + 0x3000).unwrap();
        // Pattern word at page offset 0: o = 0x3000
        assert_eq!(&page[0..4], &0x3000_3000u32.to_be_bytes());
    }

    #[test]
    fn test_fetch_backing_none_for_dead_space() {
        let bus = AddressSpace::new(&SessionConfig {
            rdram_size: 0x40_0000,
            rom_path: None,
        });
        assert!(bus.fetch_backing(0x0040_0000).is_none());
    }

    #[test]
    fn test_translated_access_through_tlb() {
        let mut bus = bus();
        bus.tlb.map(true, 0x0001_0000, 0x0001_1000, 0x0000_2000);

        bus.try_write_word(0x0001_0010, 0x5151_5151).unwrap();
        assert_eq!(bus.try_read_word(0x8000_2010).unwrap(), 0x5151_5151);

        let fault = bus.try_read_word(0x0002_0000).unwrap_err();
        assert_eq!(fault.vaddr, 0x0002_0000);
    }
}

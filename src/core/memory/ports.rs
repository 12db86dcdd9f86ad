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

//! Device register ports
//!
//! The bus decodes which hardware controller an address belongs to; what the
//! controller's registers *do* is the business of the execution layer. This
//! module defines the [`Port`] tags the bus dispatches on and the
//! [`DeviceRegisters`] trait a register implementation plugs in through.
//!
//! The bundled [`NullDevices`] implementation reads zero and discards
//! writes, which is enough to keep guest code making forward progress when
//! no peripherals are attached.

/// Register bank of one hardware controller
///
/// One variant per register window in the physical memory map. The bus
/// routes an access to the owning controller; the register offset stays in
/// the address passed along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// RDRAM interface registers (0x83F0_0000)
    RdramRegs,
    /// RSP data/instruction memory (0x8400_0000)
    RspMem,
    /// RSP control registers (0x8404_0000)
    RspRegs,
    /// RSP PC/IMEM BIST registers (0x8408_0000)
    RspRegs2,
    /// RDP command registers (0x8410_0000)
    DpcRegs,
    /// RDP span registers (0x8420_0000)
    DpsRegs,
    /// MIPS interface registers (0x8430_0000)
    MiRegs,
    /// Video interface registers (0x8440_0000)
    ViRegs,
    /// Audio interface registers (0x8450_0000)
    AiRegs,
    /// Peripheral interface registers (0x8460_0000)
    PiRegs,
    /// RDRAM interface (RI) registers (0x8470_0000)
    RiRegs,
    /// Serial interface registers (0x8480_0000)
    SiRegs,
    /// 64DD registers (0x8500_0000)
    DdRegs,
    /// PIF RAM (0x9FC0_0000)
    PifRam,
}

/// Register access for the hardware controllers behind the bus
///
/// Implemented by the execution layer's peripheral set. Addresses arrive
/// untranslated-from-the-segment's point of view: the full physical address
/// of the access, so an implementation can mask out its own offset exactly
/// the way the hardware decodes it.
///
/// Writes carry the same byte mask the bus uses internally, so sub-word
/// register writes are expressible without a read-modify-write round trip.
pub trait DeviceRegisters {
    /// Read a word from a controller register bank
    fn read_port(&mut self, port: Port, addr: u32) -> u32;

    /// Write a word (under `mask`) to a controller register bank
    fn write_port(&mut self, port: Port, addr: u32, value: u32, mask: u32);
}

/// Device set with no peripherals attached
///
/// Reads return zero, writes are discarded. Used by default so the memory
/// core is testable in isolation.
#[derive(Debug, Default)]
pub struct NullDevices;

impl DeviceRegisters for NullDevices {
    fn read_port(&mut self, port: Port, addr: u32) -> u32 {
        log::trace!("port read {:?} at 0x{:08X} -> 0", port, addr);
        0
    }

    fn write_port(&mut self, port: Port, addr: u32, value: u32, mask: u32) {
        log::trace!(
            "port write {:?} at 0x{:08X} = 0x{:08X} (mask 0x{:08X}, ignored)",
            port,
            addr,
            value,
            mask
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_devices_read_zero() {
        let mut devices = NullDevices;
        assert_eq!(devices.read_port(Port::ViRegs, 0x8440_0010), 0);
    }

    #[test]
    fn test_null_devices_write_discarded() {
        let mut devices = NullDevices;
        devices.write_port(Port::AiRegs, 0x8450_0000, 0xDEAD_BEEF, 0xFFFF_FFFF);
        assert_eq!(devices.read_port(Port::AiRegs, 0x8450_0000), 0);
    }
}

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

//! Core emulation components
//!
//! This module contains the substrate the execution layer is built on:
//! - Address space / I/O bus (segmented dispatch, RDRAM, cart ROM)
//! - TLB address translator
//! - Translated-block cache and the MIPS word decoder feeding it
//! - Session context tying the above together

pub mod config;
pub mod cpu;
pub mod error;
pub mod memory;
pub mod system;

// Re-export commonly used types
pub use config::SessionConfig;
pub use cpu::cache::{BlockCache, TranslatedBlock};
pub use error::{EmulatorError, Result};
pub use memory::tlb::{AccessIntent, TlbFault};
pub use memory::AddressSpace;
pub use system::System;

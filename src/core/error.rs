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

/// Emulator error types
use thiserror::Error;

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Main error type for the emulator
///
/// Only conditions the session cannot recover from are errors. Translation
/// faults are frequent and recoverable; they travel through the session's
/// pending-exception slot (see [`crate::core::memory::tlb::TlbFault`]),
/// never through this type.
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("ROM file not found: {0}")]
    RomNotFound(String),

    #[error("ROM image too large: {got} bytes (limit {limit})")]
    RomTooLarge { limit: usize, got: usize },

    #[error("couldn't allocate a translation buffer for page 0x{page:05X}")]
    BlockAllocation { page: usize },

    #[error("no executable backing for physical address 0x{address:08X}")]
    NoExecutableBacking { address: u32 },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

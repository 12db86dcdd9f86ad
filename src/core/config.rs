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

//! Session configuration
//!
//! One [`SessionConfig`] describes how a renderer session is set up before
//! any guest code runs: how much RDRAM the virtual console has and,
//! optionally, where the cart ROM image comes from. The config can be built
//! in code or loaded from a TOML file.

use crate::core::error::{EmulatorError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Largest RDRAM configuration the console supports (8 MiB, expansion pak)
pub const RDRAM_MAX_SIZE: usize = 0x80_0000;

/// Configuration for one renderer session
///
/// # Example
///
/// ```
/// use usfx::core::config::SessionConfig;
///
/// let config = SessionConfig::default();
/// assert_eq!(config.rdram_size, 0x80_0000);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// RDRAM size in bytes
    ///
    /// Values above the 8 MiB hardware maximum are clamped, matching the
    /// permissive behavior of the original loader.
    pub rdram_size: usize,

    /// Optional path to a cart ROM image loaded at session creation
    pub rom_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rdram_size: RDRAM_MAX_SIZE,
            rom_path: None,
        }
    }
}

impl SessionConfig {
    /// Load a configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `EmulatorError::Io` if the file cannot be read and
    /// `EmulatorError::Config` if it is not valid TOML for this schema.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: SessionConfig =
            toml::from_str(&text).map_err(|e| EmulatorError::Config(e.to_string()))?;
        Ok(config.clamped())
    }

    /// Clamp out-of-range values to what the hardware supports
    pub fn clamped(mut self) -> Self {
        if self.rdram_size > RDRAM_MAX_SIZE {
            log::warn!(
                "rdram_size {:#x} exceeds hardware maximum, clamping to {:#x}",
                self.rdram_size,
                RDRAM_MAX_SIZE
            );
            self.rdram_size = RDRAM_MAX_SIZE;
        }
        self
    }
}

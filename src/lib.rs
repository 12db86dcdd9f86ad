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

//! USF renderer core library
//!
//! This library provides the memory-and-execution substrate for a USF
//! (Nintendo 64 Sound Format) renderer: the segmented I/O bus, the
//! TLB-based address translator, and the translated-block cache that
//! together decide where every fetched or stored byte lives and whether
//! previously translated guest code is still valid.
//!
//! Instruction execution, peripheral register behavior, USF container
//! parsing and audio output live in external collaborators built on top
//! of this crate.
//!
//! # Example
//!
//! ```
//! use usfx::core::system::System;
//!
//! let mut system = System::new();
//!
//! // Store a word through the bus, read one byte lane back
//! system.write_word(0x8000_0000, 0x1234_5678);
//! assert_eq!(system.read_byte(0x8000_0001), 0x56);
//! ```

pub mod core;

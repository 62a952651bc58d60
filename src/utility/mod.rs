// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Utility module for common helpers used throughout the project

pub mod ini;
pub mod maths;

// Re-exports for use in other modules
pub use ini::IniFile;
pub use maths::round_to_significant_digits;

// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! SRU descriptor.
//!
//! The sensor-rig-unit descriptor tells the gateway what the legacy logger
//! on the other side of the Modbus link expects: how many analog, counter
//! and coder words make up the register line and whether the compatibility
//! shim register is prepended. It lives in `modbus.ini` so the logger
//! toolchain can edit it:
//!
//! ```ini
//! [exlog]
//! compatibilitylayer=1
//!
//! [exlogmapping]
//! nbanalogsin=64
//! nbanalogsout=0
//! nbcounters=8
//! nbalarms=4
//! ```

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use log::{error, info};

use crate::utility::IniFile;

/// Layout of the register line the paired logger expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SruDescriptor {
    /// Compatibility mode: prepend a zero shim register so analog data
    /// starts at register 1, and suppress write-single-coil echoes.
    pub compatibility_mode: bool,
    pub n_analog_in: usize,
    pub n_analog_out: usize,
    pub n_counters: usize,
    pub n_coders: usize,
    pub n_alarms: usize,
}

impl Default for SruDescriptor {
    fn default() -> Self {
        Self {
            compatibility_mode: true,
            n_analog_in: 64,
            n_analog_out: 0,
            n_counters: 8,
            n_coders: 0,
            n_alarms: 4,
        }
    }
}

impl SruDescriptor {
    /// Input registers the mapped data occupies: one word per analog, two
    /// per coder, three per counter. The compatibility shim is not counted.
    pub fn input_register_count(&self) -> usize {
        self.n_analog_in + self.n_analog_out + 2 * self.n_coders + 3 * self.n_counters
    }

    /// Length of a published register line, shim included.
    pub fn published_line_len(&self) -> usize {
        self.input_register_count() + usize::from(self.compatibility_mode)
    }

    /// Read the descriptor from an INI file. Missing or malformed keys fall
    /// back to the defaults with a logged diagnostic; a missing file yields
    /// the default descriptor.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let defaults = Self::default();
        let ini = match IniFile::load(path) {
            Ok(ini) => ini,
            Err(err) => {
                error!(target: "sru", "cannot read {path:?} ({err}), using defaults");
                return defaults;
            }
        };

        let descriptor = Self {
            compatibility_mode: ini.read_bool_or(
                "exlog",
                "compatibilitylayer",
                defaults.compatibility_mode,
            ),
            n_analog_in: ini.read_i64_or("exlogmapping", "nbanalogsin", defaults.n_analog_in as i64)
                as usize,
            n_analog_out: ini.read_i64_or(
                "exlogmapping",
                "nbanalogsout",
                defaults.n_analog_out as i64,
            ) as usize,
            n_counters: ini.read_i64_or("exlogmapping", "nbcounters", defaults.n_counters as i64)
                as usize,
            n_coders: ini.read_i64_or("exlogmapping", "nbcoders", defaults.n_coders as i64)
                as usize,
            n_alarms: ini.read_i64_or("exlogmapping", "nbalarms", defaults.n_alarms as i64)
                as usize,
        };
        info!(
            target: "sru",
            "SRU layout: {} input registers (+shim: {})",
            descriptor.input_register_count(),
            descriptor.compatibility_mode
        );
        descriptor
    }

    /// Write the descriptor back in INI form.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut ini = IniFile::new();
        ini.set_bool("exlog", "compatibilitylayer", self.compatibility_mode);
        ini.set_i64("exlogmapping", "nbanalogsin", self.n_analog_in as i64);
        ini.set_i64("exlogmapping", "nbanalogsout", self.n_analog_out as i64);
        ini.set_i64("exlogmapping", "nbcounters", self.n_counters as i64);
        ini.set_i64("exlogmapping", "nbcoders", self.n_coders as i64);
        ini.set_i64("exlogmapping", "nbalarms", self.n_alarms as i64);
        ini.save(path)
    }
}

/// Mutex-guarded descriptor shared between the bridge and the servers.
#[derive(Debug, Default)]
pub struct SharedSru {
    inner: Mutex<SruDescriptor>,
}

impl SharedSru {
    pub fn new(descriptor: SruDescriptor) -> Self {
        Self {
            inner: Mutex::new(descriptor),
        }
    }

    pub fn snapshot(&self) -> SruDescriptor {
        self.inner.lock().unwrap().clone()
    }

    pub fn replace(&self, descriptor: SruDescriptor) {
        *self.inner.lock().unwrap() = descriptor;
    }

    pub fn compatibility_mode(&self) -> bool {
        self.inner.lock().unwrap().compatibility_mode
    }
}

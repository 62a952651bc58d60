// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! DAQ module definitions.
//!
//! A [`ModuleDefinition`] describes one physical module in the rack: its
//! model, channel layout and physical ranges. Definitions persist as
//! `<MODEL>_<slot>.ini` files next to the gateway so field technicians can
//! adjust them; the control channel's `listInifiles` command enumerates
//! exactly these files.

use std::path::Path;

use anyhow::Result;
use log::info;

use crate::utility::IniFile;

/// Direction of a module's channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleIo {
    Input,
    Output,
}

impl ModuleIo {
    fn code(&self) -> i64 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
        }
    }

    fn from_code(code: i64) -> Self {
        if code == 1 {
            Self::Output
        } else {
            Self::Input
        }
    }
}

/// Edge a counter channel counts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEdge {
    Rising,
    Falling,
}

/// Static description of one rack module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDefinition {
    /// Rack alias, e.g. `Mod1`.
    pub alias: String,
    /// Hardware model, e.g. `NI9208`.
    pub model: String,
    /// Slot number in the chassis; part of the ini file name.
    pub slot: u16,
    pub io: ModuleIo,
    pub channel_names: Vec<String>,
    /// Physical range of the channels, in `unit`.
    pub min_value: f64,
    pub max_value: f64,
    pub unit: String,
    /// Present on counter modules only.
    pub counter_edge: Option<CounterEdge>,
}

impl ModuleDefinition {
    /// 16-channel ±20 mA current input module.
    pub fn ni9208(alias: &str, slot: u16) -> Self {
        Self {
            alias: alias.to_string(),
            model: "NI9208".to_string(),
            slot,
            io: ModuleIo::Input,
            channel_names: (0..16).map(|i| format!("/ai{i}")).collect(),
            min_value: -0.020,
            max_value: 0.020,
            unit: "A".to_string(),
            counter_edge: None,
        }
    }

    /// 4-channel ±10 V voltage input module.
    pub fn ni9239(alias: &str, slot: u16) -> Self {
        Self {
            alias: alias.to_string(),
            model: "NI9239".to_string(),
            slot,
            io: ModuleIo::Input,
            channel_names: (0..4).map(|i| format!("/ai{i}")).collect(),
            min_value: -10.0,
            max_value: 10.0,
            unit: "V".to_string(),
            counter_edge: None,
        }
    }

    /// 8-channel digital input module.
    pub fn ni9411(alias: &str, slot: u16) -> Self {
        Self {
            alias: alias.to_string(),
            model: "NI9411".to_string(),
            slot,
            io: ModuleIo::Input,
            channel_names: (0..8).map(|i| format!("/port0/line{i}")).collect(),
            min_value: 0.0,
            max_value: 1.0,
            unit: "".to_string(),
            counter_edge: None,
        }
    }

    /// 8-channel edge-counter module, counting rising fronts.
    pub fn ni9423(alias: &str, slot: u16) -> Self {
        Self {
            alias: alias.to_string(),
            model: "NI9423".to_string(),
            slot,
            io: ModuleIo::Input,
            channel_names: (0..4).map(|i| format!("/ctr{i}")).collect(),
            min_value: 0.0,
            max_value: u32::MAX as f64,
            unit: "ticks".to_string(),
            counter_edge: Some(CounterEdge::Rising),
        }
    }

    /// 4-channel relay output module.
    pub fn ni9481(alias: &str, slot: u16) -> Self {
        Self {
            alias: alias.to_string(),
            model: "NI9481".to_string(),
            slot,
            io: ModuleIo::Output,
            channel_names: (0..4).map(|i| format!("/port0/line{i}")).collect(),
            min_value: 0.0,
            max_value: 1.0,
            unit: "".to_string(),
            counter_edge: None,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channel_names.len()
    }

    /// File name this definition persists under, e.g. `NI9208_2.ini`.
    /// The pattern is what `listInifiles` matches.
    pub fn ini_file_name(&self) -> String {
        format!("{}_{}.ini", self.model, self.slot)
    }

    /// Write the definition as an INI document.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut ini = IniFile::new();
        ini.set_str("Modules", "moduleName", &self.model);
        ini.set_str("Modules", "Alias", &self.alias);
        ini.set_i64("Modules", "slot", self.slot as i64);
        ini.set_i64("Modules", "io", self.io.code());
        ini.set_str("Modules", "unit", &self.unit);
        ini.set_i64("Channels", "NumberOfChannels", self.channel_count() as i64);
        ini.set_f64("Channels", "min", self.min_value);
        ini.set_f64("Channels", "max", self.max_value);
        for (i, name) in self.channel_names.iter().enumerate() {
            ini.set_str("Channels", &format!("Channel{i}"), name);
        }
        match self.counter_edge {
            Some(CounterEdge::Rising) => ini.set_i64("Counters", "edgeCountingMode", 0),
            Some(CounterEdge::Falling) => ini.set_i64("Counters", "edgeCountingMode", 1),
            None => {}
        }
        ini.save(path)
    }

    /// Read a definition back from an INI document.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let ini = IniFile::load(path.as_ref())?;
        let channel_count = ini.read_i64_or("Channels", "NumberOfChannels", 0) as usize;
        let channel_names = (0..channel_count)
            .map(|i| ini.read_str_or("Channels", &format!("Channel{i}"), &format!("/ai{i}")))
            .collect();
        let counter_edge = match ini.get_str("Counters", "edgeCountingMode") {
            Some("1") => Some(CounterEdge::Falling),
            Some(_) => Some(CounterEdge::Rising),
            None => None,
        };

        let definition = Self {
            alias: ini.read_str_or("Modules", "Alias", ""),
            model: ini.read_str_or("Modules", "moduleName", ""),
            slot: ini.read_i64_or("Modules", "slot", 0) as u16,
            io: ModuleIo::from_code(ini.read_i64_or("Modules", "io", 0)),
            channel_names,
            min_value: ini.read_f64_or("Channels", "min", 0.0),
            max_value: ini.read_f64_or("Channels", "max", 0.0),
            unit: ini.read_str_or("Modules", "unit", ""),
            counter_edge,
        };
        info!(
            target: "daq",
            "loaded module definition {} ({}, {} channels)",
            definition.alias,
            definition.model,
            definition.channel_count()
        );
        Ok(definition)
    }
}

/// The reference rack layout: two current modules, one voltage module, one
/// counter module, one relay module.
pub fn default_rack() -> Vec<ModuleDefinition> {
    vec![
        ModuleDefinition::ni9208("Mod1", 1),
        ModuleDefinition::ni9208("Mod2", 2),
        ModuleDefinition::ni9239("Mod3", 3),
        ModuleDefinition::ni9423("Mod4", 4),
        ModuleDefinition::ni9481("Mod6", 6),
    ]
}

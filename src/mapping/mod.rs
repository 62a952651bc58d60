// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! CSV mapping plans.
//!
//! `mapping.csv` links physical channels to a linear rescale and a location
//! in the Modbus register map, one semicolon-separated row per entry:
//!
//! ```text
//! index;module_type;module;channel;min_source;max_source;min_dest;max_dest;modbus_channel
//! ```
//!
//! `alarmsMapping.csv` routes Modbus coil addresses to digital-output lines:
//!
//! ```text
//! index;module;alarm_role;channel;modbus_coil_channel
//! ```
//!
//! A field that fails to parse logs a diagnostic and skips that row; the
//! rest of the file is always processed. Alarm rows are all-or-nothing.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Instant;

use log::{error, warn};

/// Kind of channel a mapping row addresses. The numeric codes are the CSV
/// wire format shared with the legacy tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    AnalogCurrent,
    AnalogVoltage,
    DigitalInput,
    DigitalOutput,
    Counter,
    Coder,
}

impl ModuleType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::AnalogCurrent),
            1 => Some(Self::AnalogVoltage),
            2 => Some(Self::DigitalInput),
            3 => Some(Self::DigitalOutput),
            4 => Some(Self::Counter),
            5 => Some(Self::Coder),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::AnalogCurrent => 0,
            Self::AnalogVoltage => 1,
            Self::DigitalInput => 2,
            Self::DigitalOutput => 3,
            Self::Counter => 4,
            Self::Coder => 5,
        }
    }

    /// How many consecutive input registers the entry occupies: analogs and
    /// digitals publish one word, coders two (hi/lo), counters three
    /// (frequency, hi, lo).
    pub fn register_width(&self) -> usize {
        match self {
            Self::Counter => 3,
            Self::Coder => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AnalogCurrent => "analog current",
            Self::AnalogVoltage => "analog voltage",
            Self::DigitalInput => "digital input",
            Self::DigitalOutput => "digital output",
            Self::Counter => "counter",
            Self::Coder => "coder",
        };
        write!(f, "{name}")
    }
}

/// One row of the mapping plan, immutable after load except for the counter
/// runtime state, which the acquisition driver owns.
#[derive(Debug, Clone)]
pub struct MappingEntry {
    pub index: i32,
    pub module_type: ModuleType,
    pub module: String,
    pub channel: String,
    pub min_source: f64,
    pub max_source: f64,
    pub min_dest: u16,
    pub max_dest: u16,
    pub modbus_channel: usize,

    // Counter tracking; not part of the CSV.
    pub current_time: Instant,
    pub previous_time: Instant,
    pub current_value: u32,
    pub previous_value: u32,
}

impl MappingEntry {
    pub fn new(
        index: i32,
        module_type: ModuleType,
        module: String,
        channel: String,
        min_source: f64,
        max_source: f64,
        min_dest: u16,
        max_dest: u16,
        modbus_channel: usize,
    ) -> Self {
        let now = Instant::now();
        Self {
            index,
            module_type,
            module,
            channel,
            min_source,
            max_source,
            min_dest,
            max_dest,
            modbus_channel,
            current_time: now,
            previous_time: now,
            current_value: 0,
            previous_value: 0,
        }
    }

    pub fn register_width(&self) -> usize {
        self.module_type.register_width()
    }

    /// Rescale a source value through this entry's ranges.
    pub fn rescale(&self, value: f64) -> u16 {
        linear_rescale_u16(
            value,
            self.min_source,
            self.max_source,
            self.min_dest,
            self.max_dest,
        )
    }

    /// One counter acquisition step: ingest a raw 32-bit count at `now` and
    /// produce the three registers `[frequency, hi, lo]`.
    ///
    /// The frequency is counts per whole second since the previous step,
    /// rescaled through the entry's ranges; zero when no full second has
    /// elapsed. The raw count is split into its high and low words.
    pub fn counter_tick(&mut self, raw: u32, now: Instant) -> [u16; 3] {
        self.current_time = now;
        self.current_value = raw;

        let delta_t = now.duration_since(self.previous_time).as_secs();
        let frequency_value = if delta_t > 0 {
            let delta_c = self.current_value.wrapping_sub(self.previous_value);
            delta_c as f64 / delta_t as f64
        } else {
            0.0
        };

        let frequency = self.rescale(frequency_value);
        let high = (raw >> 16) as u16;
        let low = (raw & 0xFFFF) as u16;

        self.previous_time = self.current_time;
        self.previous_value = self.current_value;

        [frequency, high, low]
    }

    /// Render the entry back to its CSV form.
    pub fn to_csv_line(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{};{}",
            self.index,
            self.module_type.code(),
            self.module,
            self.channel,
            self.min_source,
            self.max_source,
            self.min_dest,
            self.max_dest,
            self.modbus_channel
        )
    }
}

/// One row of the alarm plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmMappingEntry {
    pub index: i32,
    pub module: String,
    pub alarm_role: String,
    pub channel: String,
    pub modbus_coil_channel: u16,
}

/// Linearly rescale `value` from `[min_source, max_source]` to
/// `[min_dest, max_dest]`, clamped to the destination range and truncated to
/// a 16-bit word. Any arithmetic fault yields `min_dest` with a logged error.
pub fn linear_rescale_u16(
    value: f64,
    min_source: f64,
    max_source: f64,
    min_dest: u16,
    max_dest: u16,
) -> u16 {
    let scale = (max_dest as f64 - min_dest as f64) / (max_source - min_source);
    let mapped = min_dest as f64 + scale * (value - min_source);

    if !mapped.is_finite() {
        error!(
            target: "mapping",
            "rescale fault for value {value} over [{min_source}, {max_source}], returning {min_dest}"
        );
        return min_dest;
    }

    mapped.clamp(min_dest as f64, max_dest as f64) as u16
}

fn parse_field<T: std::str::FromStr>(
    token: Option<&str>,
    name: &str,
    line_no: usize,
    file: &str,
) -> Option<T>
where
    T::Err: fmt::Display,
{
    match token {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    target: "mapping",
                    "{file}:{line_no}: failed to parse '{name}' value {raw:?}: {err}"
                );
                None
            }
        },
        None => {
            warn!(target: "mapping", "{file}:{line_no}: missing '{name}' value");
            None
        }
    }
}

fn parse_mapping_line(line: &str, line_no: usize, file: &str) -> Option<MappingEntry> {
    let mut fields = line.split(';');

    let index: i32 = parse_field(fields.next(), "index", line_no, file)?;
    let type_code: i32 = parse_field(fields.next(), "module_type", line_no, file)?;
    let module_type = match ModuleType::from_code(type_code) {
        Some(t) => t,
        None => {
            warn!(
                target: "mapping",
                "{file}:{line_no}: unknown module_type code {type_code}"
            );
            return None;
        }
    };
    let module: String = parse_field(fields.next(), "module", line_no, file)?;
    let channel: String = parse_field(fields.next(), "channel", line_no, file)?;
    let min_source: f64 = parse_field(fields.next(), "min_source", line_no, file)?;
    let max_source: f64 = parse_field(fields.next(), "max_source", line_no, file)?;
    let min_dest: u16 = parse_field(fields.next(), "min_dest", line_no, file)?;
    let max_dest: u16 = parse_field(fields.next(), "max_dest", line_no, file)?;
    let modbus_channel: usize = parse_field(fields.next(), "modbus_channel", line_no, file)?;

    Some(MappingEntry::new(
        index,
        module_type,
        module,
        channel,
        min_source,
        max_source,
        min_dest,
        max_dest,
        modbus_channel,
    ))
}

/// Parse a mapping plan. Malformed rows are skipped with a diagnostic; the
/// file is never aborted.
pub fn parse_mapping(contents: &str, file: &str) -> Vec<MappingEntry> {
    let mut entries = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(entry) = parse_mapping_line(line, i + 1, file) {
            entries.push(entry);
        }
    }
    entries
}

/// Load a mapping plan from disk. A missing file logs an error and yields an
/// empty plan.
pub fn load_mapping<P: AsRef<Path>>(path: P) -> Vec<MappingEntry> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(contents) => parse_mapping(&contents, &path.to_string_lossy()),
        Err(err) => {
            error!(target: "mapping", "failed to open mapping file {path:?}: {err}");
            Vec::new()
        }
    }
}

/// Write a mapping plan back to disk in its CSV form.
pub fn save_mapping<P: AsRef<Path>>(path: P, entries: &[MappingEntry]) -> std::io::Result<()> {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.to_csv_line());
        out.push('\n');
    }
    fs::write(path, out)
}

fn parse_alarm_line(line: &str, line_no: usize, file: &str) -> Option<AlarmMappingEntry> {
    let mut fields = line.split(';');

    let index: i32 = parse_field(fields.next(), "index", line_no, file)?;
    let module: String = parse_field(fields.next(), "module", line_no, file)?;
    let alarm_role: String = parse_field(fields.next(), "alarm_role", line_no, file)?;
    let channel: String = parse_field(fields.next(), "channel", line_no, file)?;
    let modbus_coil_channel: u16 =
        parse_field(fields.next(), "modbus_coil_channel", line_no, file)?;

    Some(AlarmMappingEntry {
        index,
        module,
        alarm_role,
        channel,
        modbus_coil_channel,
    })
}

/// Parse an alarm plan. All five fields of a row must parse for the row to
/// be accepted.
pub fn parse_alarm_mapping(contents: &str, file: &str) -> Vec<AlarmMappingEntry> {
    let mut entries = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(entry) = parse_alarm_line(line, i + 1, file) {
            entries.push(entry);
        }
    }
    entries
}

/// Load an alarm plan from disk.
pub fn load_alarm_mapping<P: AsRef<Path>>(path: P) -> Vec<AlarmMappingEntry> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(contents) => parse_alarm_mapping(&contents, &path.to_string_lossy()),
        Err(err) => {
            error!(target: "mapping", "failed to open alarm mapping file {path:?}: {err}");
            Vec::new()
        }
    }
}

/// Check the plan invariants against the register bank size: source range
/// ordering, destination range ordering, and register fit. Violations are
/// logged; the offending entries are dropped.
pub fn validate_entries(entries: Vec<MappingEntry>, register_count: usize) -> Vec<MappingEntry> {
    entries
        .into_iter()
        .filter(|entry| {
            if entry.min_source >= entry.max_source {
                error!(
                    target: "mapping",
                    "entry {}: min_source {} is not below max_source {}",
                    entry.index, entry.min_source, entry.max_source
                );
                return false;
            }
            if entry.min_dest > entry.max_dest {
                error!(
                    target: "mapping",
                    "entry {}: min_dest {} exceeds max_dest {}",
                    entry.index, entry.min_dest, entry.max_dest
                );
                return false;
            }
            if entry.modbus_channel + entry.register_width() > register_count {
                error!(
                    target: "mapping",
                    "entry {}: registers {}..{} do not fit in a bank of {register_count}",
                    entry.index,
                    entry.modbus_channel,
                    entry.modbus_channel + entry.register_width()
                );
                return false;
            }
            true
        })
        .collect()
}

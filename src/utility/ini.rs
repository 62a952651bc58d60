// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Minimal INI file object.
//!
//! The SRU descriptor consumed by the legacy logger toolchain lives in
//! `modbus.ini`; this module reads and writes that format. Sections keep
//! their file order so a load/save cycle preserves the layout. Values are
//! stored as strings and converted on access; a value that fails to convert
//! falls back to the caller-supplied default with a logged diagnostic.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;

/// An in-memory INI document: ordered sections of ordered key/value pairs.
#[derive(Debug, Clone, Default)]
pub struct IniFile {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl IniFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an INI document from a string.
    ///
    /// Lines starting with `;` or `#` are comments. Keys encountered before
    /// any section header land in an unnamed section (empty name).
    pub fn parse(contents: &str) -> Self {
        let mut ini = Self::new();
        let mut current = String::new();

        for raw_line in contents.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                current = line[1..line.len() - 1].trim().to_string();
                ini.section_mut(&current);
                continue;
            }
            if let Some(eq) = line.find('=') {
                let key = line[..eq].trim().to_string();
                let value = line[eq + 1..].trim().to_string();
                ini.set_str(&current, &key, &value);
            } else {
                warn!(target: "ini", "skipping malformed ini line: {raw_line}");
            }
        }
        ini
    }

    /// Load a document from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read ini file {:?}", path.as_ref()))?;
        Ok(Self::parse(&contents))
    }

    /// Serialize the document back to INI text.
    pub fn to_ini_string(&self) -> String {
        let mut out = String::new();
        for (name, keys) in &self.sections {
            if !name.is_empty() {
                out.push_str(&format!("[{name}]\n"));
            }
            for (key, value) in keys {
                out.push_str(&format!("{key}={value}\n"));
            }
            out.push('\n');
        }
        out
    }

    /// Write the document to disk.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_ini_string())
            .with_context(|| format!("failed to write ini file {:?}", path.as_ref()))
    }

    fn section(&self, name: &str) -> Option<&Vec<(String, String)>> {
        self.sections
            .iter()
            .find(|(s, _)| s.eq_ignore_ascii_case(name))
            .map(|(_, keys)| keys)
    }

    fn section_mut(&mut self, name: &str) -> &mut Vec<(String, String)> {
        if let Some(idx) = self
            .sections
            .iter()
            .position(|(s, _)| s.eq_ignore_ascii_case(name))
        {
            return &mut self.sections[idx].1;
        }
        self.sections.push((name.to_string(), Vec::new()));
        &mut self.sections.last_mut().unwrap().1
    }

    /// Raw string lookup.
    pub fn get_str(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Insert or replace a value.
    pub fn set_str(&mut self, section: &str, key: &str, value: &str) {
        let keys = self.section_mut(section);
        if let Some(entry) = keys.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            entry.1 = value.to_string();
        } else {
            keys.push((key.to_string(), value.to_string()));
        }
    }

    pub fn set_bool(&mut self, section: &str, key: &str, value: bool) {
        self.set_str(section, key, if value { "1" } else { "0" });
    }

    pub fn set_i64(&mut self, section: &str, key: &str, value: i64) {
        self.set_str(section, key, &value.to_string());
    }

    pub fn set_f64(&mut self, section: &str, key: &str, value: f64) {
        self.set_str(section, key, &value.to_string());
    }

    /// Boolean read with fallback. Accepts 1/0, true/false, yes/no, on/off.
    pub fn read_bool_or(&self, section: &str, key: &str, default: bool) -> bool {
        match self.get_str(section, key) {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    warn!(
                        target: "ini",
                        "[{section}] {key}: cannot parse {other:?} as bool, using {default}"
                    );
                    default
                }
            },
            None => {
                warn!(target: "ini", "[{section}] {key}: missing, using {default}");
                default
            }
        }
    }

    /// Integer read with fallback.
    pub fn read_i64_or(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.get_str(section, key).map(str::parse::<i64>) {
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                warn!(
                    target: "ini",
                    "[{section}] {key}: cannot parse as integer ({err}), using {default}"
                );
                default
            }
            None => {
                warn!(target: "ini", "[{section}] {key}: missing, using {default}");
                default
            }
        }
    }

    /// Floating-point read with fallback.
    pub fn read_f64_or(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.get_str(section, key).map(str::parse::<f64>) {
            Some(Ok(value)) => value,
            Some(Err(err)) => {
                warn!(
                    target: "ini",
                    "[{section}] {key}: cannot parse as float ({err}), using {default}"
                );
                default
            }
            None => {
                warn!(target: "ini", "[{section}] {key}: missing, using {default}");
                default
            }
        }
    }

    /// String read with fallback.
    pub fn read_str_or(&self, section: &str, key: &str, default: &str) -> String {
        match self.get_str(section, key) {
            Some(value) => value.to_string(),
            None => {
                warn!(target: "ini", "[{section}] {key}: missing, using {default:?}");
                default.to_string()
            }
        }
    }
}

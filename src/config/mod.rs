// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the gateway.
//!
//! The application configuration is YAML-backed (`config.yaml`). A missing
//! file is replaced with defaults written to disk; a file that fails to
//! deserialize produces a `.sample.yaml` next to it for the operator to edit
//! and an error. Command-line arguments override individual values after
//! loading.
//!
//! The SRU descriptor is deliberately *not* part of the YAML document: the
//! legacy logger toolchain edits it in INI form (`modbus.ini`, see
//! [`sru`]), and the `paths` section points at it.

pub mod acquisition;
pub mod control;
pub mod modbus;
pub mod simulation;
pub mod sru;
pub mod utils;

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

// Re-export all types for the public API
pub use acquisition::{AcquisitionConfig, NotchConfig, SamplerConfig, SamplerSignal};
pub use control::ControlConfig;
pub use modbus::ModbusConfig;
pub use simulation::SimulationConfig;
pub use sru::{SharedSru, SruDescriptor};
pub use utils::validate_specific_rules;

/// File locations the gateway consumes, constructed once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub modbus_ini: String,
    pub mapping_file: String,
    pub alarms_mapping_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            modbus_ini: "./modbus.ini".to_string(),
            mapping_file: "./mapping.csv".to_string(),
            alarms_mapping_file: "./alarmsMapping.csv".to_string(),
        }
    }
}

/// Root configuration structure for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Acquisition driver and sampling worker settings.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Modbus/TCP server settings.
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// TLS control channel settings.
    #[serde(default)]
    pub control: ControlConfig,

    /// Simulation driver settings.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// File locations (SRU INI, mapping plans).
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Write a pristine sample configuration next to a broken one so the
    /// operator has something to start from.
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let sample_path = path.as_ref().with_extension("sample.yaml");
        if let Some(parent) = sample_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create parent directory for {sample_path:?}")
                })?;
            }
        }
        Self::default().save_to_file(&sample_path)?;
        error!(
            "sample configuration written to {:?}; please edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load the configuration from a file, writing defaults if it is absent.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("configuration file {path:?} not found, creating defaults");
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("loading configuration from {path:?}");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {path:?}"))?;

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("configuration deserialization error: {err}");
                if let Err(sample_err) = Self::create_sample_config(path) {
                    error!("failed to create sample config: {sample_err}");
                }
                return Err(anyhow::anyhow!(
                    "failed to deserialize configuration from {}: {err}",
                    path.display()
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("configuration validation error: {err}");
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("failed to serialize configuration to YAML")?;
        let mut file = File::create(path.as_ref())
            .with_context(|| format!("failed to create config file {:?}", path.as_ref()))?;
        file.write_all(yaml.as_bytes())
            .with_context(|| format!("failed to write configuration to {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Apply command-line overrides on top of the loaded file.
    pub fn apply_args(
        &mut self,
        modbus_address: Option<String>,
        modbus_port: Option<u16>,
        control_port: Option<u16>,
        simulate: bool,
    ) {
        if let Some(address) = modbus_address {
            debug!("overriding modbus address from command line: {address}");
            self.modbus.address = address;
        }
        if let Some(port) = modbus_port {
            debug!("overriding modbus port from command line: {port}");
            self.modbus.port = port;
        }
        if let Some(port) = control_port {
            debug!("overriding control port from command line: {port}");
            self.control.port = port;
        }
        if simulate {
            debug!("simulation autostart requested from command line");
            self.simulation.autostart = true;
            self.acquisition.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_round_trip() {
        let config = Config::default();
        let yaml = serde_yml::to_string(&config).unwrap();
        let back: Config = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(back.modbus.port, config.modbus.port);
        assert_eq!(back.acquisition.samplers.len(), 3);
        assert_eq!(back.paths.mapping_file, "./mapping.csv");
    }

    #[test]
    fn apply_args_overrides_selected_fields() {
        let mut config = Config::default();
        config.apply_args(Some("127.0.0.1".into()), Some(1502), Some(9000), true);
        assert_eq!(config.modbus.address, "127.0.0.1");
        assert_eq!(config.modbus.port, 1502);
        assert_eq!(config.control.port, 9000);
        assert!(config.simulation.autostart);
        assert!(!config.acquisition.enabled);
    }
}

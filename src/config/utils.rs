// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration validation beyond what deserialization enforces.

use anyhow::{bail, Result};

use super::Config;

/// Validate the rules serde cannot express: identifier ranges, port
/// plausibility, sampler sanity. Violations abort startup.
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    if !(0..=255).contains(&config.modbus.unit_id) {
        bail!(
            "modbus.unit_id {} is outside [0, 255]",
            config.modbus.unit_id
        );
    }
    if config.modbus.max_connections == 0 {
        bail!("modbus.max_connections must be at least 1");
    }
    if config.control.enabled && config.control.port == 0 {
        bail!("control.port must be non-zero");
    }
    for sampler in &config.acquisition.samplers {
        if sampler.module.is_empty() {
            bail!("a sampler has an empty module alias");
        }
        if sampler.channel_count == 0 || sampler.samples_per_channel == 0 {
            bail!(
                "sampler {} needs at least one channel and one sample per burst",
                sampler.module
            );
        }
        if sampler.sample_rate_hz <= 0.0 {
            bail!(
                "sampler {} has a non-positive sample rate",
                sampler.module
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_specific_rules(&Config::default()).is_ok());
    }

    #[test]
    fn out_of_range_unit_id_is_rejected() {
        let mut config = Config::default();
        config.modbus.unit_id = 256;
        assert!(validate_specific_rules(&config).is_err());
        config.modbus.unit_id = -1;
        assert!(validate_specific_rules(&config).is_err());
    }

    #[test]
    fn degenerate_sampler_is_rejected() {
        let mut config = Config::default();
        config.acquisition.samplers[0].sample_rate_hz = 0.0;
        assert!(validate_specific_rules(&config).is_err());
    }
}

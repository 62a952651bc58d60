// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition settings: the mapping-driven acquisition driver cadence and
//! the per-module sampling worker definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::daq::{BurstSpec, SignalRange};

/// Signal class of a sampler, with its physical range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SamplerSignal {
    Current { min_amps: f64, max_amps: f64 },
    Voltage { min_volts: f64, max_volts: f64 },
}

/// Mains-hum notch stage settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotchConfig {
    /// Center frequency to attenuate, typically 50 or 60 Hz.
    pub frequency_hz: f64,
    /// Attenuation depth in (0, 1); closer to 0 is deeper.
    pub gain_at_notch: f64,
    /// Notch width; higher is narrower.
    pub q: f64,
}

/// One sampling worker: which module it owns and how it reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Module alias, e.g. `Mod1`.
    pub module: String,
    pub signal: SamplerSignal,
    pub channel_count: usize,
    pub sample_rate_hz: f64,
    /// Burst size per channel. The voltage default of 5581 is deliberately
    /// prime; keep it configurable.
    pub samples_per_channel: usize,
    pub timeout_secs: f64,
    /// Mains-hum notch; absent means the stage is inactive.
    #[serde(default)]
    pub notch: Option<NotchConfig>,
    /// Low-pass cutoff in Hz; absent means the filter stage is inactive.
    #[serde(default)]
    pub lowpass_cutoff_hz: Option<f64>,
    /// Two-point rolling window against the previous snapshot.
    #[serde(default)]
    pub rolling_window: bool,
    #[serde(default = "default_max_task_retries")]
    pub max_task_retries: u32,
}

fn default_max_task_retries() -> u32 {
    5
}

impl SamplerConfig {
    /// 16-channel 4–20 mA module sampled at 31.25 Hz, 7 samples per burst.
    pub fn current_module(module: &str) -> Self {
        Self {
            module: module.to_string(),
            signal: SamplerSignal::Current {
                min_amps: 0.004,
                max_amps: 0.020,
            },
            channel_count: 16,
            sample_rate_hz: 31.25,
            samples_per_channel: 7,
            timeout_secs: 1.0,
            notch: None,
            lowpass_cutoff_hz: None,
            rolling_window: false,
            max_task_retries: default_max_task_retries(),
        }
    }

    /// 4-channel 0–10 V module oversampled at 50 kHz, 5581 samples per
    /// burst, rolling window on.
    pub fn voltage_module(module: &str) -> Self {
        Self {
            module: module.to_string(),
            signal: SamplerSignal::Voltage {
                min_volts: 0.0,
                max_volts: 10.0,
            },
            channel_count: 4,
            sample_rate_hz: 50_000.0,
            samples_per_channel: 5581,
            timeout_secs: 2.0,
            notch: None,
            lowpass_cutoff_hz: None,
            rolling_window: true,
            max_task_retries: default_max_task_retries(),
        }
    }

    /// Burst specification handed to the hardware capability.
    pub fn burst_spec(&self) -> BurstSpec {
        let signal = match self.signal {
            SamplerSignal::Current { min_amps, max_amps } => SignalRange::Current {
                min_amps,
                max_amps,
            },
            SamplerSignal::Voltage {
                min_volts,
                max_volts,
            } => SignalRange::Voltage {
                min_volts,
                max_volts,
            },
        };
        BurstSpec {
            module: self.module.clone(),
            channel_count: self.channel_count,
            samples_per_channel: self.samples_per_channel,
            sample_rate_hz: self.sample_rate_hz,
            signal,
            timeout: Duration::from_secs_f64(self.timeout_secs),
        }
    }
}

/// Acquisition section of the application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Start the acquisition driver at daemon launch.
    pub enabled: bool,
    /// Acquisition driver cadence in milliseconds.
    pub interval_ms: u64,
    /// One-shot read timeout for mapping-driven reads, in seconds.
    pub read_timeout_secs: f64,
    /// Sampling workers to spawn.
    pub samplers: Vec<SamplerConfig>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 125,
            read_timeout_secs: 10.0,
            samplers: vec![
                SamplerConfig::current_module("Mod1"),
                SamplerConfig::current_module("Mod2"),
                SamplerConfig::voltage_module("Mod3"),
            ],
        }
    }
}

impl AcquisitionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.read_timeout_secs)
    }
}

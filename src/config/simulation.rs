// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulation driver settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Simulation section of the application configuration.
///
/// The synthesized analog channels follow
/// `v = amplitude * sin(2π/period_ticks * k) + offset` with per-channel
/// uniform noise of ±`noise_ratio`, rescaled from [0, 100] into the full
/// 16-bit register span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Start the simulation driver at daemon launch instead of acquisition.
    pub autostart: bool,
    /// Simulation driver cadence in milliseconds.
    pub interval_ms: u64,
    pub amplitude: f64,
    pub offset: f64,
    pub period_ticks: f64,
    pub noise_ratio: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            autostart: false,
            interval_ms: 250,
            amplitude: 50.0,
            offset: 50.0,
            period_ticks: 1000.0,
            noise_ratio: 0.1,
        }
    }
}

impl SimulationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

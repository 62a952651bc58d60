// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Hardware capability boundary.
//!
//! The rest of the crate never talks to a native driver directly; it programs
//! against [`DaqHardware`]. The production implementation wraps the vendor
//! driver and lives outside this repository; [`simulated::SimulatedDaq`]
//! backs tests and hardware-less operation.
//!
//! The capability does raw I/O only. Filtering, averaging and register
//! mapping all live downstream in the sampling pipeline and the bridge.

pub mod modules;
pub mod simulated;

use std::time::Duration;

use thiserror::Error;

pub use modules::{default_rack, ModuleDefinition, ModuleIo};
pub use simulated::{RelayWrite, SimulatedDaq};

/// Failures surfaced by a DAQ capability.
#[derive(Debug, Error)]
pub enum DaqError {
    #[error("failed to create acquisition task: {0}")]
    TaskCreate(String),

    #[error("failed to create channel {channel} on {module}: {reason}")]
    ChannelCreate {
        module: String,
        channel: String,
        reason: String,
    },

    #[error("failed to configure sample clock: {0}")]
    SampleClock(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("unknown module {0}")]
    UnknownModule(String),
}

/// Signal class and physical range of a burst acquisition.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalRange {
    Current { min_amps: f64, max_amps: f64 },
    Voltage { min_volts: f64, max_volts: f64 },
}

/// Everything needed to set up a periodic burst read on one module:
/// the channel span, the sample clock and the per-read timeout.
#[derive(Debug, Clone)]
pub struct BurstSpec {
    pub module: String,
    pub channel_count: usize,
    pub samples_per_channel: usize,
    pub sample_rate_hz: f64,
    pub signal: SignalRange,
    pub timeout: Duration,
}

/// Opaque handle to a configured burst task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BurstTask(pub(crate) u64);

/// The DAQ capability.
///
/// Implementations serialize access per operation domain (voltage, current,
/// counters, alarms) so that task setup and teardown cannot interleave with
/// reads on the same surface. Tasks are not shared across threads; each
/// sampling worker owns the tasks it creates.
pub trait DaqHardware: Send + Sync {
    /// Aliases of the modules physically present in the rack.
    fn plugged_modules(&self) -> Vec<String>;

    /// Create a burst task covering all channels of one module.
    fn create_burst_task(&self, spec: &BurstSpec) -> Result<BurstTask, DaqError>;

    /// Run one burst: start the task, read every sample, stop the task.
    /// The result is grouped by channel: `channel_count * samples_per_channel`
    /// values with channel `i` occupying `[i*samples, (i+1)*samples)`.
    fn read_burst(&self, task: &BurstTask) -> Result<Vec<f64>, DaqError>;

    /// Tear a burst task down after a failure or at worker shutdown.
    fn clear_burst_task(&self, task: &BurstTask);

    /// One-shot analog current read, in amperes.
    fn read_current(&self, module: &str, channel: &str, timeout: Duration)
        -> Result<f64, DaqError>;

    /// One-shot analog voltage read, in volts.
    fn read_voltage(&self, module: &str, channel: &str, timeout: Duration)
        -> Result<f64, DaqError>;

    /// One-shot 32-bit edge-counter read.
    fn read_counter(&self, module: &str, channel: &str, timeout: Duration)
        -> Result<u32, DaqError>;

    /// Reset an edge counter to zero.
    fn reset_counter(&self, module: &str, channel: &str) -> Result<(), DaqError>;

    /// Drive a digital output line (relay, alarm).
    fn set_relay(&self, module: &str, channel: &str, state: bool) -> Result<(), DaqError>;
}

/// Reject empty module or channel identifiers before touching the driver.
pub(crate) fn check_endpoint(module: &str, channel: &str) -> Result<(), DaqError> {
    if module.is_empty() {
        return Err(DaqError::Precondition("empty module alias".into()));
    }
    if channel.is_empty() {
        return Err(DaqError::Precondition("empty channel name".into()));
    }
    Ok(())
}

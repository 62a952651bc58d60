// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated DAQ capability.
//!
//! Stands in for the native driver in tests and on machines without a rack.
//! Channel values are programmable; relay writes are journaled so tests can
//! assert exactly which lines were driven. Failure injection covers the
//! worker retry paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use log::debug;

use super::{check_endpoint, BurstSpec, BurstTask, DaqError, DaqHardware, SignalRange};

/// One journaled digital-output write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayWrite {
    pub module: String,
    pub channel: String,
    pub state: bool,
}

#[derive(Default)]
struct RelayDomain {
    states: HashMap<(String, String), bool>,
    journal: Vec<RelayWrite>,
}

/// In-memory DAQ rack.
///
/// Each operation domain sits behind its own mutex, mirroring the discipline
/// the production wrapper applies to the vendor driver.
pub struct SimulatedDaq {
    modules: Vec<String>,
    currents: Mutex<HashMap<(String, String), f64>>,
    voltages: Mutex<HashMap<(String, String), f64>>,
    counters: Mutex<HashMap<(String, String), u32>>,
    relays: Mutex<RelayDomain>,
    burst_tasks: Mutex<HashMap<u64, BurstSpec>>,
    next_task_id: AtomicU64,
    fail_task_creations: AtomicU32,
    fail_burst_reads: AtomicU32,
}

impl SimulatedDaq {
    pub fn new(modules: Vec<String>) -> Self {
        Self {
            modules,
            currents: Mutex::new(HashMap::new()),
            voltages: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
            relays: Mutex::new(RelayDomain::default()),
            burst_tasks: Mutex::new(HashMap::new()),
            next_task_id: AtomicU64::new(1),
            fail_task_creations: AtomicU32::new(0),
            fail_burst_reads: AtomicU32::new(0),
        }
    }

    /// The reference rack layout from [`super::modules::default_rack`]:
    /// two current modules, one voltage module, one counter module, one
    /// relay module.
    pub fn with_default_rack() -> Self {
        Self::new(
            super::modules::default_rack()
                .into_iter()
                .map(|module| module.alias)
                .collect(),
        )
    }

    fn key(module: &str, channel: &str) -> (String, String) {
        (module.to_string(), channel.to_string())
    }

    fn check_module(&self, module: &str) -> Result<(), DaqError> {
        if self.modules.iter().any(|m| m == module) {
            Ok(())
        } else {
            Err(DaqError::UnknownModule(module.to_string()))
        }
    }

    /// Program the value a current channel reads back, in amperes.
    pub fn set_current(&self, module: &str, channel: &str, amps: f64) {
        self.currents
            .lock()
            .unwrap()
            .insert(Self::key(module, channel), amps);
    }

    /// Program the value a voltage channel reads back, in volts.
    pub fn set_voltage(&self, module: &str, channel: &str, volts: f64) {
        self.voltages
            .lock()
            .unwrap()
            .insert(Self::key(module, channel), volts);
    }

    /// Program an edge-counter value.
    pub fn set_counter(&self, module: &str, channel: &str, count: u32) {
        self.counters
            .lock()
            .unwrap()
            .insert(Self::key(module, channel), count);
    }

    /// Current state of a relay line, if it was ever driven.
    pub fn relay_state(&self, module: &str, channel: &str) -> Option<bool> {
        self.relays
            .lock()
            .unwrap()
            .states
            .get(&Self::key(module, channel))
            .copied()
    }

    /// Drain the journal of digital-output writes.
    pub fn take_relay_journal(&self) -> Vec<RelayWrite> {
        std::mem::take(&mut self.relays.lock().unwrap().journal)
    }

    /// Make the next `count` task creations fail, for retry-path tests.
    pub fn fail_next_task_creations(&self, count: u32) {
        self.fail_task_creations.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` burst reads fail.
    pub fn fail_next_burst_reads(&self, count: u32) {
        self.fail_burst_reads.store(count, Ordering::SeqCst);
    }

    fn consume_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn burst_base_value(&self, spec: &BurstSpec, channel: usize) -> f64 {
        let channel_name = format!("/ai{channel}");
        match spec.signal {
            SignalRange::Current { min_amps, max_amps } => self
                .currents
                .lock()
                .unwrap()
                .get(&Self::key(&spec.module, &channel_name))
                .copied()
                .unwrap_or((min_amps + max_amps) / 2.0),
            SignalRange::Voltage {
                min_volts,
                max_volts,
            } => self
                .voltages
                .lock()
                .unwrap()
                .get(&Self::key(&spec.module, &channel_name))
                .copied()
                .unwrap_or((min_volts + max_volts) / 2.0),
        }
    }
}

impl DaqHardware for SimulatedDaq {
    fn plugged_modules(&self) -> Vec<String> {
        self.modules.clone()
    }

    fn create_burst_task(&self, spec: &BurstSpec) -> Result<BurstTask, DaqError> {
        if spec.module.is_empty() {
            return Err(DaqError::Precondition("empty module alias".into()));
        }
        self.check_module(&spec.module)?;
        if Self::consume_failure(&self.fail_task_creations) {
            return Err(DaqError::TaskCreate("injected task-creation failure".into()));
        }
        if spec.sample_rate_hz <= 0.0 {
            return Err(DaqError::SampleClock(format!(
                "invalid sample rate {} Hz",
                spec.sample_rate_hz
            )));
        }

        let id = self.next_task_id.fetch_add(1, Ordering::SeqCst);
        self.burst_tasks.lock().unwrap().insert(id, spec.clone());
        debug!(target: "daq_sim", "created burst task {id} for {}", spec.module);
        Ok(BurstTask(id))
    }

    fn read_burst(&self, task: &BurstTask) -> Result<Vec<f64>, DaqError> {
        let spec = self
            .burst_tasks
            .lock()
            .unwrap()
            .get(&task.0)
            .cloned()
            .ok_or_else(|| DaqError::Read(format!("no such burst task {}", task.0)))?;

        if Self::consume_failure(&self.fail_burst_reads) {
            return Err(DaqError::Read("injected burst-read failure".into()));
        }

        // Pace the loop like a finite-sample clock would, capped at 10 ms.
        let burst_duration = spec.samples_per_channel as f64 / spec.sample_rate_hz;
        std::thread::sleep(Duration::from_secs_f64(burst_duration.min(0.01)));

        let mut buffer = Vec::with_capacity(spec.channel_count * spec.samples_per_channel);
        for channel in 0..spec.channel_count {
            let base = self.burst_base_value(&spec, channel);
            for _ in 0..spec.samples_per_channel {
                buffer.push(base);
            }
        }
        Ok(buffer)
    }

    fn clear_burst_task(&self, task: &BurstTask) {
        self.burst_tasks.lock().unwrap().remove(&task.0);
        debug!(target: "daq_sim", "cleared burst task {}", task.0);
    }

    fn read_current(
        &self,
        module: &str,
        channel: &str,
        _timeout: Duration,
    ) -> Result<f64, DaqError> {
        check_endpoint(module, channel)?;
        self.check_module(module)?;
        let currents = self.currents.lock().unwrap();
        Ok(currents
            .get(&Self::key(module, channel))
            .copied()
            .unwrap_or(0.012))
    }

    fn read_voltage(
        &self,
        module: &str,
        channel: &str,
        _timeout: Duration,
    ) -> Result<f64, DaqError> {
        check_endpoint(module, channel)?;
        self.check_module(module)?;
        let voltages = self.voltages.lock().unwrap();
        Ok(voltages
            .get(&Self::key(module, channel))
            .copied()
            .unwrap_or(5.0))
    }

    fn read_counter(
        &self,
        module: &str,
        channel: &str,
        _timeout: Duration,
    ) -> Result<u32, DaqError> {
        check_endpoint(module, channel)?;
        self.check_module(module)?;
        let counters = self.counters.lock().unwrap();
        Ok(counters.get(&Self::key(module, channel)).copied().unwrap_or(0))
    }

    fn reset_counter(&self, module: &str, channel: &str) -> Result<(), DaqError> {
        check_endpoint(module, channel)?;
        self.check_module(module)?;
        self.counters
            .lock()
            .unwrap()
            .insert(Self::key(module, channel), 0);
        Ok(())
    }

    fn set_relay(&self, module: &str, channel: &str, state: bool) -> Result<(), DaqError> {
        check_endpoint(module, channel)?;
        self.check_module(module)?;
        let mut relays = self.relays.lock().unwrap();
        relays.states.insert(Self::key(module, channel), state);
        relays.journal.push(RelayWrite {
            module: module.to_string(),
            channel: channel.to_string(),
            state,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_reads_return_programmed_values() {
        let daq = SimulatedDaq::with_default_rack();
        daq.set_current("Mod1", "/ai0", 0.016);
        assert_eq!(
            daq.read_current("Mod1", "/ai0", Duration::from_secs(1)).unwrap(),
            0.016
        );
        daq.set_counter("Mod4", "/ctr0", 123);
        assert_eq!(
            daq.read_counter("Mod4", "/ctr0", Duration::from_secs(1)).unwrap(),
            123
        );
    }

    #[test]
    fn empty_identifiers_are_precondition_failures() {
        let daq = SimulatedDaq::with_default_rack();
        let err = daq.read_current("", "/ai0", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DaqError::Precondition(_)));
        let err = daq.set_relay("Mod6", "", true).unwrap_err();
        assert!(matches!(err, DaqError::Precondition(_)));
    }

    #[test]
    fn relay_writes_are_journaled() {
        let daq = SimulatedDaq::with_default_rack();
        daq.set_relay("Mod6", "/port0/line0", true).unwrap();
        daq.set_relay("Mod6", "/port0/line1", false).unwrap();
        let journal = daq.take_relay_journal();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal[0].channel, "/port0/line0");
        assert!(journal[0].state);
        assert_eq!(daq.relay_state("Mod6", "/port0/line1"), Some(false));
        assert!(daq.take_relay_journal().is_empty());
    }

    #[test]
    fn burst_read_groups_by_channel() {
        let daq = SimulatedDaq::with_default_rack();
        daq.set_current("Mod1", "/ai1", 0.02);
        let spec = BurstSpec {
            module: "Mod1".into(),
            channel_count: 2,
            samples_per_channel: 3,
            sample_rate_hz: 1000.0,
            signal: SignalRange::Current {
                min_amps: 0.004,
                max_amps: 0.020,
            },
            timeout: Duration::from_secs(1),
        };
        let task = daq.create_burst_task(&spec).unwrap();
        let burst = daq.read_burst(&task).unwrap();
        assert_eq!(burst.len(), 6);
        assert_eq!(burst[0], 0.012); // channel 0 default mid-scale
        assert_eq!(burst[3], 0.02); // channel 1 programmed
        daq.clear_burst_task(&task);
        assert!(daq.read_burst(&task).is_err());
    }

    #[test]
    fn injected_failures_surface_then_clear() {
        let daq = SimulatedDaq::with_default_rack();
        daq.fail_next_task_creations(1);
        let spec = BurstSpec {
            module: "Mod1".into(),
            channel_count: 1,
            samples_per_channel: 1,
            sample_rate_hz: 10.0,
            signal: SignalRange::Current {
                min_amps: 0.004,
                max_amps: 0.020,
            },
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            daq.create_burst_task(&spec),
            Err(DaqError::TaskCreate(_))
        ));
        assert!(daq.create_burst_task(&spec).is_ok());
    }
}

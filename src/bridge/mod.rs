// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Bridge between the DAQ side and the Modbus register map.
//!
//! The bridge owns the mapping plan and the two periodic drivers:
//!
//! - the **acquisition driver** (8 Hz) walks the mapping entries, reads
//!   hardware, rescales into the register line and publishes it;
//! - the **simulation driver** (4 Hz) synthesizes plausible analog, counter,
//!   coder and relay patterns for exercising clients without a rack.
//!
//! The two are mutually exclusive: starting one stops the other. Starting a
//! driver that is already running is a no-op reporting success, and each
//! start clears its buffers so no stale line is republished.

pub mod alarm;
pub mod timer;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::{error, warn};
use rand::Rng;

use crate::config::simulation::SimulationConfig;
use crate::config::sru::{SharedSru, SruDescriptor};
use crate::daq::{DaqError, DaqHardware};
use crate::mapping::{linear_rescale_u16, MappingEntry, ModuleType};
use crate::registers::RegisterMap;
use crate::sampling::{CircularHistory, HISTORY_DEPTH};

pub use alarm::{AlarmRouter, CoilSink};
pub use timer::PeriodicDriver;

/// Module alias and channel pattern of the relay module used by the
/// simulation's round-robin.
const SIM_RELAY_MODULE: &str = "Mod6";
const SIM_RELAY_STEPS: u8 = 4;

#[derive(Debug, Default)]
struct SimulationState {
    tick: u64,
    counter_value: u32,
    coder_value: u32,
    alarm_step: u8,
}

/// The acquisition/simulation engine.
pub struct DaqModbusBridge {
    hardware: Arc<dyn DaqHardware>,
    registers: Arc<RegisterMap>,
    sru: Arc<SharedSru>,
    mapping: Mutex<Vec<MappingEntry>>,
    real_line: Mutex<Vec<u16>>,
    simulation_history: CircularHistory<Vec<u16>>,
    sim_state: Mutex<SimulationState>,
    simulate_driver: Mutex<PeriodicDriver>,
    acquisition_driver: Mutex<PeriodicDriver>,
    sim_config: SimulationConfig,
    read_timeout: Duration,
}

impl DaqModbusBridge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hardware: Arc<dyn DaqHardware>,
        registers: Arc<RegisterMap>,
        sru: Arc<SharedSru>,
        mapping: Vec<MappingEntry>,
        sim_config: SimulationConfig,
        acquisition_interval: Duration,
        read_timeout: Duration,
    ) -> Arc<Self> {
        let simulate_driver = PeriodicDriver::new("simulation", sim_config.interval());
        let acquisition_driver = PeriodicDriver::new("acquisition", acquisition_interval);
        Arc::new(Self {
            hardware,
            registers,
            sru,
            mapping: Mutex::new(mapping),
            real_line: Mutex::new(Vec::new()),
            simulation_history: CircularHistory::new(HISTORY_DEPTH),
            sim_state: Mutex::new(SimulationState::default()),
            simulate_driver: Mutex::new(simulate_driver),
            acquisition_driver: Mutex::new(acquisition_driver),
            sim_config,
            read_timeout,
        })
    }

    pub fn simulation_active(&self) -> bool {
        self.simulate_driver.lock().unwrap().is_active()
    }

    pub fn acquisition_active(&self) -> bool {
        self.acquisition_driver.lock().unwrap().is_active()
    }

    /// Recent simulation lines, oldest first.
    pub fn simulation_history(&self) -> Vec<Vec<u16>> {
        self.simulation_history.copy()
    }

    /// Mutate the mapping plan. Counter runtime state lives inside the
    /// entries, so tests use this to preload it.
    pub fn edit_mapping<F: FnOnce(&mut Vec<MappingEntry>)>(&self, edit: F) {
        edit(&mut self.mapping.lock().unwrap());
    }

    /// Start the simulation driver, stopping acquisition first. Returns
    /// `true` when the driver is running afterwards; an already running
    /// simulation is a no-op success.
    pub fn start_simulation(self: &Arc<Self>) -> bool {
        // Lock order: simulation before acquisition, everywhere.
        let mut sim = self.simulate_driver.lock().unwrap();
        let mut acq = self.acquisition_driver.lock().unwrap();
        if sim.is_active() {
            return true;
        }
        acq.stop();
        self.simulation_history.clear();

        let bridge = Arc::downgrade(self);
        sim.start(move || {
            if let Some(bridge) = bridge.upgrade() {
                bridge.simulation_tick();
            }
        });
        true
    }

    pub fn stop_simulation(&self) {
        self.simulate_driver.lock().unwrap().stop();
    }

    /// Start the acquisition driver, stopping simulation first. The register
    /// line is cleared and resized from the SRU descriptor so no stale data
    /// survives a restart.
    pub fn start_acquisition(self: &Arc<Self>) -> bool {
        let mut sim = self.simulate_driver.lock().unwrap();
        let mut acq = self.acquisition_driver.lock().unwrap();
        if acq.is_active() {
            return true;
        }
        sim.stop();

        let line_len = self.sru.snapshot().input_register_count();
        let mut line = self.real_line.lock().unwrap();
        line.clear();
        line.resize(line_len, 0);
        drop(line);

        let bridge = Arc::downgrade(self);
        acq.start(move || {
            if let Some(bridge) = bridge.upgrade() {
                bridge.acquisition_tick();
            }
        });
        true
    }

    pub fn stop_acquisition(&self) {
        self.acquisition_driver.lock().unwrap().stop();
    }

    // ---- simulation -----------------------------------------------------

    /// One simulation tick. Emission order: analogs, counters, coders, then
    /// the register publish, then relays. Failures are logged per step; the
    /// tick always completes.
    pub fn simulation_tick(&self) {
        let sru = self.sru.snapshot();
        let mut sim = self.sim_state.lock().unwrap();
        let mut line: Vec<u16> = Vec::with_capacity(sru.published_line_len());

        self.simulate_analog_inputs(&sru, &sim, &mut line);
        Self::simulate_counters(&sru, &mut sim, &mut line);
        Self::simulate_coders(&sru, &mut sim, &mut line);

        self.registers.remap_input_registers(&line);
        self.simulation_history.push(line);

        self.simulate_relays(&sru, &mut sim);

        // The tick counter wraps just below u64::MAX.
        sim.tick = sim.tick.wrapping_add(1) % u64::MAX;
    }

    fn simulate_analog_inputs(&self, sru: &SruDescriptor, sim: &SimulationState, line: &mut Vec<u16>) {
        let cfg = &self.sim_config;
        let omega = 2.0 * std::f64::consts::PI / cfg.period_ticks;
        let sine_value = cfg.amplitude * (omega * sim.tick as f64).sin() + cfg.offset;

        if sru.compatibility_mode {
            // The legacy logger expects channel data to start at register 1.
            line.push(0);
        }

        let mut rng = rand::rng();
        for _ in 0..sru.n_analog_in {
            let noise = rng.random_range(-cfg.noise_ratio..=cfg.noise_ratio);
            let noisy = sine_value * (1.0 + noise);
            line.push(linear_rescale_u16(noisy, 0.0, 100.0, 0, 65535));
        }
    }

    fn simulate_counters(sru: &SruDescriptor, sim: &mut SimulationState, line: &mut Vec<u16>) {
        for _ in 0..sru.n_counters {
            // Fixed synthetic frequency word; 0..65535 spans 0..3000 Hz on
            // the rig, so 32768 reads back as mid-scale.
            line.push(32768);
            sim.counter_value = sim.counter_value.wrapping_add(1);
            line.push((sim.counter_value >> 16) as u16);
            line.push((sim.counter_value & 0xFFFF) as u16);
        }
    }

    fn simulate_coders(sru: &SruDescriptor, sim: &mut SimulationState, line: &mut Vec<u16>) {
        for _ in 0..sru.n_coders {
            if sim.tick % 4 == 0 {
                sim.coder_value = sim.coder_value.wrapping_add(1);
            }
            line.push((sim.coder_value >> 16) as u16);
            line.push((sim.coder_value & 0xFFFF) as u16);
        }
    }

    fn simulate_relays(&self, sru: &SruDescriptor, sim: &mut SimulationState) {
        for i in 0..sru.n_alarms {
            let channel = format!("/port0/line{i}");
            let state = sim.alarm_step as usize == i;
            if let Err(err) = self.hardware.set_relay(SIM_RELAY_MODULE, &channel, state) {
                error!(
                    target: "bridge",
                    "simulation could not drive relay {SIM_RELAY_MODULE}:{channel}: {err}"
                );
            }
        }
        sim.alarm_step = (sim.alarm_step + 1) % SIM_RELAY_STEPS;
    }

    // ---- acquisition ----------------------------------------------------

    /// One acquisition tick: mapping entries in file order, then the
    /// register publish. Errors are caught here, at the tick boundary.
    pub fn acquisition_tick(&self) {
        if let Err(err) = self.try_acquire() {
            error!(target: "bridge", "acquisition tick failed: {err}");
        }
    }

    fn try_acquire(&self) -> Result<(), DaqError> {
        let mut mapping = self.mapping.lock().unwrap();
        let mut line = self.real_line.lock().unwrap();

        // Track the SRU layout; a descriptor change resizes the line on the
        // next tick.
        let line_len = self.sru.snapshot().input_register_count();
        if line.len() != line_len {
            line.clear();
            line.resize(line_len, 0);
        }

        for entry in mapping.iter_mut() {
            match entry.module_type {
                ModuleType::AnalogCurrent | ModuleType::AnalogVoltage => {
                    let value = if entry.module_type == ModuleType::AnalogCurrent {
                        self.hardware
                            .read_current(&entry.module, &entry.channel, self.read_timeout)?
                    } else {
                        self.hardware
                            .read_voltage(&entry.module, &entry.channel, self.read_timeout)?
                    };
                    let scaled = entry.rescale(value);
                    Self::write_line(&mut line, entry.modbus_channel, &[scaled]);
                }
                ModuleType::Counter => {
                    // A failed counter read logs and proceeds with zero.
                    let raw = match self.hardware.read_counter(
                        &entry.module,
                        &entry.channel,
                        self.read_timeout,
                    ) {
                        Ok(raw) => raw,
                        Err(err) => {
                            error!(
                                target: "bridge",
                                "counter read {}:{} failed: {err}",
                                entry.module, entry.channel
                            );
                            0
                        }
                    };
                    let regs = entry.counter_tick(raw, Instant::now());
                    Self::write_line(&mut line, entry.modbus_channel, &regs);
                }
                // Reserved: not driven from the acquisition path.
                ModuleType::Coder | ModuleType::DigitalInput | ModuleType::DigitalOutput => {}
            }
        }

        self.registers.remap_input_registers(&line);
        Ok(())
    }

    fn write_line(line: &mut [u16], start: usize, values: &[u16]) {
        if start + values.len() > line.len() {
            warn!(
                target: "bridge",
                "register line write {start}..{} out of bounds (len {})",
                start + values.len(),
                line.len()
            );
            return;
        }
        line[start..start + values.len()].copy_from_slice(values);
    }
}

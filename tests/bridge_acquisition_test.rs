// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end acquisition scenarios: mapping rows driven against the
//! simulated rack, checked at the register map.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_daqbridge::bridge::DaqModbusBridge;
use rust_daqbridge::config::simulation::SimulationConfig;
use rust_daqbridge::config::sru::{SharedSru, SruDescriptor};
use rust_daqbridge::daq::{DaqHardware, SimulatedDaq};
use rust_daqbridge::mapping::parse_mapping;
use rust_daqbridge::registers::RegisterMap;

fn sru_without_shim() -> SruDescriptor {
    SruDescriptor {
        compatibility_mode: false,
        ..Default::default()
    }
}

fn build_bridge(
    sru: SruDescriptor,
    mapping_csv: &str,
) -> (Arc<DaqModbusBridge>, Arc<SimulatedDaq>, Arc<RegisterMap>) {
    let daq = Arc::new(SimulatedDaq::with_default_rack());
    let registers = Arc::new(RegisterMap::for_sru(&sru));
    let mapping = parse_mapping(mapping_csv, "test-mapping.csv");
    let bridge = DaqModbusBridge::new(
        Arc::clone(&daq) as Arc<dyn DaqHardware>,
        Arc::clone(&registers),
        Arc::new(SharedSru::new(sru)),
        mapping,
        SimulationConfig::default(),
        Duration::from_millis(125),
        Duration::from_secs(1),
    );
    (bridge, daq, registers)
}

#[test]
fn analog_mapping_lands_midscale_reading_in_its_register() {
    // 4..20 mA input mapped onto the full 16-bit span at register 10.
    let (bridge, daq, registers) =
        build_bridge(sru_without_shim(), "0;0;Mod1;/ai0;0.004;0.020;0;65535;10\n");
    daq.set_current("Mod1", "/ai0", 0.012);

    bridge.acquisition_tick();

    let line = registers.read_input_registers(0, 16).unwrap();
    assert!(
        (32767i32 - line[10] as i32).abs() <= 1,
        "register 10 holds {} instead of ~32767",
        line[10]
    );
    // Registers before the mapped one stay untouched.
    assert!(line[..10].iter().all(|&r| r == 0));
}

#[test]
fn counter_mapping_publishes_frequency_and_split_words() {
    let (bridge, daq, registers) =
        build_bridge(sru_without_shim(), "1;4;Mod4;/ctr0;0;3000;0;65535;20\n");

    // First tick: raw count 100, baseline.
    daq.set_counter("Mod4", "/ctr0", 100);
    bridge.acquisition_tick();

    // Pretend a whole second elapsed, then the count reaches 400.
    bridge.edit_mapping(|entries| {
        entries[0].previous_time = Instant::now() - Duration::from_secs(1);
    });
    daq.set_counter("Mod4", "/ctr0", 400);
    bridge.acquisition_tick();

    let regs = registers.read_input_registers(20, 3).unwrap();
    // 300 counts over one second, rescaled from 0..3000 to 0..65535.
    assert_eq!(regs[0], 6553);
    assert_eq!(regs[1], 0);
    assert_eq!(regs[2], 400);
}

#[test]
fn voltage_mapping_uses_the_voltage_read_path() {
    let (bridge, daq, registers) =
        build_bridge(sru_without_shim(), "2;1;Mod3;/ai0;0;10;0;65535;5\n");
    daq.set_voltage("Mod3", "/ai0", 2.5);

    bridge.acquisition_tick();

    let regs = registers.read_input_registers(5, 1).unwrap();
    assert!((16383i32 - regs[0] as i32).abs() <= 1);
}

#[test]
fn coder_and_digital_rows_are_inert_on_this_path() {
    let (bridge, _daq, registers) = build_bridge(
        sru_without_shim(),
        "3;5;Mod5;/ctr0;0;100;0;65535;0\n4;2;Mod1;/port0/line0;0;1;0;1;2\n",
    );
    bridge.acquisition_tick();
    let regs = registers.read_input_registers(0, 4).unwrap();
    assert_eq!(regs, vec![0, 0, 0, 0]);
}

#[test]
fn simulation_and_acquisition_exclude_each_other() {
    let (bridge, _daq, _registers) = build_bridge(sru_without_shim(), "");

    assert!(bridge.start_simulation());
    assert!(bridge.simulation_active());
    assert!(!bridge.acquisition_active());

    assert!(bridge.start_acquisition());
    assert!(bridge.acquisition_active());
    assert!(
        !bridge.simulation_active(),
        "starting acquisition must stop the simulation driver"
    );

    bridge.stop_acquisition();
    assert!(!bridge.acquisition_active());
}

#[test]
fn simulation_line_has_shim_and_counter_block() {
    let sru = SruDescriptor {
        compatibility_mode: true,
        n_analog_in: 4,
        n_analog_out: 0,
        n_counters: 2,
        n_coders: 0,
        n_alarms: 4,
    };
    let (bridge, _daq, registers) = build_bridge(sru, "");

    bridge.simulation_tick();

    // shim + 4 analogs + 2 * [freq, hi, lo]
    let line = registers.read_input_registers(0, 11).unwrap();
    assert_eq!(line[0], 0, "compatibility shim must force register 0 to 0");
    assert_eq!(line[5], 32768);
    assert_eq!(line[8], 32768);
    // Two counters share the monotonic source: first gets 1, second 2.
    assert_eq!(line[7], 1);
    assert_eq!(line[10], 2);
}

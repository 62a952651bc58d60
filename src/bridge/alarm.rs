// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Alarm routing: Modbus coil addresses to physical digital-output lines.

use std::sync::Arc;

use log::{error, info};

use crate::daq::DaqHardware;
use crate::mapping::AlarmMappingEntry;

/// The one capability the Modbus server needs from the acquisition side:
/// turn a coil write into a relay command.
pub trait CoilSink: Send + Sync {
    fn set_coil(&self, addr: u16, state: bool);
}

/// Routes coil addresses through the alarm map to the hardware capability.
pub struct AlarmRouter {
    alarms: Vec<AlarmMappingEntry>,
    hardware: Arc<dyn DaqHardware>,
}

impl AlarmRouter {
    pub fn new(alarms: Vec<AlarmMappingEntry>, hardware: Arc<dyn DaqHardware>) -> Self {
        info!(target: "alarms", "alarm map loaded with {} entries", alarms.len());
        Self { alarms, hardware }
    }

    pub fn entries(&self) -> &[AlarmMappingEntry] {
        &self.alarms
    }
}

impl CoilSink for AlarmRouter {
    /// A coil write is valid only when its address appears in the alarm
    /// map; anything else is dropped with a logged error and no hardware
    /// call is made.
    fn set_coil(&self, addr: u16, state: bool) {
        let Some(entry) = self
            .alarms
            .iter()
            .find(|entry| entry.modbus_coil_channel == addr)
        else {
            error!(target: "alarms", "relay not found in alarm map for coil {addr}");
            return;
        };

        if let Err(err) = self
            .hardware
            .set_relay(&entry.module, &entry.channel, state)
        {
            error!(
                target: "alarms",
                "failed to drive relay {}:{} for coil {addr}: {err}",
                entry.module, entry.channel
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daq::SimulatedDaq;

    fn buzzer_entry() -> AlarmMappingEntry {
        AlarmMappingEntry {
            index: 0,
            module: "Mod6".into(),
            alarm_role: "Buzzer".into(),
            channel: "/port0/line0".into(),
            modbus_coil_channel: 8,
        }
    }

    #[test]
    fn mapped_coil_drives_exactly_one_relay() {
        let daq = Arc::new(SimulatedDaq::with_default_rack());
        let router = AlarmRouter::new(vec![buzzer_entry()], Arc::clone(&daq) as _);

        router.set_coil(8, true);
        let journal = daq.take_relay_journal();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].module, "Mod6");
        assert_eq!(journal[0].channel, "/port0/line0");
        assert!(journal[0].state);
    }

    #[test]
    fn unmapped_coil_causes_no_hardware_call() {
        let daq = Arc::new(SimulatedDaq::with_default_rack());
        let router = AlarmRouter::new(vec![buzzer_entry()], Arc::clone(&daq) as _);

        router.set_coil(9, true);
        assert!(daq.take_relay_journal().is_empty());
    }
}

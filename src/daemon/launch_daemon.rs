// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Management Module
//!
//! Wires the gateway together and supervises its services:
//!
//! - the sampling workers (one thread per module)
//! - the Modbus/TCP server
//! - the TLS control server
//! - the acquisition or simulation driver
//! - a heartbeat for health monitoring
//!
//! Startup failures of the network surfaces (listener bind, TLS context,
//! register-map allocation) abort the launch; the process exits non-zero.
//! Shutdown flips the shared running flag, stops the drivers and workers,
//! and aborts the server tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time;

use crate::bridge::{AlarmRouter, CoilSink, DaqModbusBridge};
use crate::config::sru::{SharedSru, SruDescriptor};
use crate::config::Config;
use crate::control::ControlServer;
use crate::daq::{DaqHardware, SimulatedDaq};
use crate::mapping::{load_alarm_mapping, load_mapping, validate_entries};
use crate::modbus::{ModbusServerSettings, ModbusTcpServer};
use crate::registers::RegisterMap;
use crate::sampling::{ModuleSnapshot, SamplingWorker, WorkerHandle};

/// Supervises the gateway's tasks and owns their lifetimes.
pub struct Daemon {
    tasks: Vec<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    workers: Vec<WorkerHandle>,
    snapshots: HashMap<String, Arc<ModuleSnapshot>>,
    bridge: Option<Arc<DaqModbusBridge>>,
}

impl Daemon {
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            workers: Vec::new(),
            snapshots: HashMap::new(),
            bridge: None,
        }
    }

    /// The bridge, once launched.
    pub fn bridge(&self) -> Option<Arc<DaqModbusBridge>> {
        self.bridge.clone()
    }

    /// Snapshot of a sampled module, once launched.
    pub fn snapshot(&self, module: &str) -> Option<Arc<ModuleSnapshot>> {
        self.snapshots.get(module).cloned()
    }

    /// Launch every configured service.
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        // The production build wraps the native driver here; this tree
        // ships the simulated rack.
        let hardware: Arc<dyn DaqHardware> = Arc::new(SimulatedDaq::with_default_rack());
        let modules = hardware.plugged_modules();
        info!("DAQ capability ready, modules: {}", modules.join(", "));

        let sru_descriptor = SruDescriptor::load(&config.paths.modbus_ini);
        let registers = Arc::new(RegisterMap::for_sru(&sru_descriptor));
        let sru = Arc::new(SharedSru::new(sru_descriptor));

        let mapping = validate_entries(
            load_mapping(&config.paths.mapping_file),
            registers.input_register_len(),
        );
        info!("mapping plan: {} entries", mapping.len());
        let alarms = load_alarm_mapping(&config.paths.alarms_mapping_file);
        let alarm_router = Arc::new(AlarmRouter::new(alarms, Arc::clone(&hardware)));

        let bridge = DaqModbusBridge::new(
            Arc::clone(&hardware),
            Arc::clone(&registers),
            Arc::clone(&sru),
            mapping,
            config.simulation.clone(),
            config.acquisition.interval(),
            config.acquisition.read_timeout(),
        );

        self.start_sampling_workers(config, &hardware);

        if config.modbus.enabled {
            self.start_modbus_server(config, &registers, &alarm_router, &sru)
                .await?;
        }

        if config.control.enabled {
            self.start_control_server(config, &hardware, &bridge).await?;
        }

        self.start_heartbeat();

        if config.simulation.autostart {
            info!("starting in simulation mode");
            bridge.start_simulation();
        } else if config.acquisition.enabled {
            info!("starting acquisition");
            bridge.start_acquisition();
        }

        self.bridge = Some(bridge);
        Ok(())
    }

    fn start_sampling_workers(&mut self, config: &Config, hardware: &Arc<dyn DaqHardware>) {
        for sampler in &config.acquisition.samplers {
            let snapshot = Arc::new(ModuleSnapshot::new());
            self.snapshots
                .insert(sampler.module.clone(), Arc::clone(&snapshot));
            let worker =
                SamplingWorker::new(Arc::clone(hardware), snapshot, sampler.clone());
            self.workers.push(worker.spawn());
        }
    }

    async fn start_modbus_server(
        &mut self,
        config: &Config,
        registers: &Arc<RegisterMap>,
        alarm_router: &Arc<AlarmRouter>,
        sru: &Arc<SharedSru>,
    ) -> Result<()> {
        let settings = ModbusServerSettings {
            address: config.modbus.address.clone(),
            port: config.modbus.port,
            max_connections: config.modbus.max_connections,
            // Validated against [0, 255] at configuration load.
            unit_id: config.modbus.unit_id as u8,
        };
        let server = ModbusTcpServer::new(
            Arc::clone(registers),
            Arc::clone(alarm_router) as Arc<dyn CoilSink>,
            Arc::clone(sru),
            settings,
        );
        let listener = server.bind().await?;
        self.tasks.push(tokio::spawn(server.run(listener)));
        Ok(())
    }

    async fn start_control_server(
        &mut self,
        config: &Config,
        hardware: &Arc<dyn DaqHardware>,
        bridge: &Arc<DaqModbusBridge>,
    ) -> Result<()> {
        let server = ControlServer::new(
            config.control.clone(),
            Arc::clone(hardware),
            Arc::clone(bridge),
        );
        let acceptor = server.load_tls_acceptor()?;
        let listener = server.bind().await?;
        self.tasks.push(tokio::spawn(server.run(listener, acceptor)));
        Ok(())
    }

    /// Periodic liveness log line; an external monitor can watch for it.
    fn start_heartbeat(&mut self) {
        let running = Arc::clone(&self.running);
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                debug!("daemon heartbeat: running");
                time::sleep(Duration::from_secs(60)).await;
            }
        });
        self.tasks.push(task);
    }

    /// Signal every service to stop and tear the blocking parts down.
    pub fn shutdown(&mut self) {
        info!("shutting down daemon services");
        self.running.store(false, Ordering::SeqCst);

        if let Some(bridge) = &self.bridge {
            bridge.stop_simulation();
            bridge.stop_acquisition();
        }
        for worker in &mut self.workers {
            worker.stop();
        }
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Wait for the aborted tasks to wind down.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match tokio::time::timeout(Duration::from_secs(10), task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_cancelled() => {}
                Ok(Err(err)) => error!("task panicked: {err}"),
                Err(_) => warn!("task did not stop within the timeout, may be hung"),
            }
        }
        Ok(())
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

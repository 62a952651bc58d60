// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Rust DAQ Bridge Library
//!
//! A gateway that continuously samples a rack of data-acquisition modules
//! (analog current and voltage channels, 32-bit edge counters, quadrature
//! coders, digital outputs) and exposes their values to industrial clients
//! over Modbus/TCP, with a TLS-protected command channel for one-shot reads,
//! driver control, file transfer and diagnostics.
//!
//! ## Main Components
//!
//! - **Daq**: The hardware capability boundary and its simulation backend
//! - **Sampling**: Per-module workers publishing filtered, oversampled snapshots
//! - **Preprocessing**: Low-pass and rolling-window filters for the sampling pipeline
//! - **Mapping**: CSV-driven plans rescaling sensor readings into the register map
//! - **Registers**: The Modbus-facing register and coil banks
//! - **Modbus**: The Modbus/TCP server with relay-routed coil writes
//! - **Bridge**: The engine tying acquisition and simulation to the register map
//! - **Control**: The TLS line-command server
//! - **Daemon**: Orchestration of all of the above
//!
//! ## Binaries
//!
//! - **main**: the gateway daemon
//! - **modbus_client**: a small Modbus client for poking at a running gateway

/// Bridge between the acquisition side and the Modbus register map.
///
/// Hosts the mapping engine drive, the periodic simulation and acquisition
/// drivers, and the alarm router that turns coil writes into relay commands.
pub mod bridge;

/// Configuration handling for the gateway.
///
/// The application configuration is YAML-backed; the SRU descriptor consumed
/// by the legacy logger toolchain stays in INI format.
pub mod config;

/// TLS command channel: line protocol, command dispatch, file transfer.
pub mod control;

/// Hardware capability boundary.
///
/// Defines the `DaqHardware` trait the rest of the crate programs against and
/// a simulated implementation used for tests and hardware-less operation.
pub mod daq;

/// Daemon management: launching, supervising and shutting down all services.
pub mod daemon;

/// CSV mapping plans and the linear rescale into 16-bit registers.
pub mod mapping;

/// Modbus/TCP wire format and server.
pub mod modbus;

/// Signal preprocessing for the sampling pipeline.
pub mod preprocessing;

/// Modbus-facing register and coil banks.
pub mod registers;

/// Snapshot buffers and per-module sampling workers.
pub mod sampling;

/// Small shared utilities (INI files, numeric helpers).
pub mod utility;

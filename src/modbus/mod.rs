// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus/TCP: wire format and server.
//!
//! The server handles the standard data-access function codes from the
//! register map and gives two codes special treatment: Write Single Coil
//! (0x05) and Write Multiple Coils (0x0F) are relay commands routed to the
//! alarm map rather than state changes. In SRU compatibility mode the 0x05
//! echo is suppressed, matching the legacy logger on the other end.

pub mod frame;
pub mod server;

pub use server::{ModbusServerSettings, ModbusTcpServer};

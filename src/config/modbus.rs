// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus/TCP server settings.

use serde::{Deserialize, Serialize};

/// Modbus section of the application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    /// Modbus unit (slave) identifier. Validated against [0, 255].
    pub unit_id: i64,
    /// Simultaneous client ceiling; further connections are refused.
    pub max_connections: usize,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0".to_string(),
            port: 502,
            unit_id: 1,
            max_connections: 25,
        }
    }
}

impl ModbusConfig {
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

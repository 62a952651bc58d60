// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! TLS control channel settings.

use serde::{Deserialize, Serialize};

/// Control section of the application configuration.
///
/// TLS is mandatory on this channel; the certificate and private key are
/// PEM files loaded at startup from the configured paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
    pub cert_file: String,
    pub key_file: String,
    pub max_clients: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0".to_string(),
            port: 8222,
            cert_file: "./daqbridge.crt".to_string(),
            key_file: "./daqbridge.key".to_string(),
            max_clients: 100,
        }
    }
}

impl ControlConfig {
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

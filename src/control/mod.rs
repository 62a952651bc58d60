// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! TLS control channel.
//!
//! A line-delimited ASCII protocol over mandatory TLS: one command per
//! `\n`-terminated line, fields separated by `;`, at most 256 bytes and 20
//! tokens per line. Commands cover one-shot reads, driver control, file
//! transfer and diagnostics; replies are `ACK`, `NACK: <reason>` or a value.

pub mod commands;
pub mod server;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub use commands::{dispatch, tokenize, CommandContext};
pub use server::ControlServer;

/// Peer roster of the control channel, keyed by connection id.
#[derive(Debug, Default)]
pub struct ClientRoster {
    inner: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
}

impl ClientRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer, returning its connection id.
    pub fn add(&self, ip: String) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().unwrap().insert(id, ip);
        id
    }

    pub fn remove(&self, id: u64) {
        self.inner.lock().unwrap().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Semicolon-joined list of connected peer IPs.
    pub fn joined_ips(&self) -> String {
        let inner = self.inner.lock().unwrap();
        let mut ips: Vec<&str> = inner.values().map(String::as_str).collect();
        ips.sort_unstable();
        ips.join(";")
    }
}

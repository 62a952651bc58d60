// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon management: wiring, supervision and shutdown of every service.

pub mod launch_daemon;

pub use launch_daemon::Daemon;

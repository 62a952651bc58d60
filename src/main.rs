// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the DAQ to Modbus/TCP gateway
mod bridge;
mod config;
mod control;
mod daemon;
mod daq;
mod mapping;
mod modbus;
mod preprocessing;
mod registers;
mod sampling;
mod utility;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use config::Config;
use log::info;
use tokio::signal;

/// Industrial DAQ rack to Modbus/TCP gateway
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Modbus server address
    #[arg(long)]
    modbus_address: Option<String>,

    /// Modbus server port
    #[arg(long)]
    modbus_port: Option<u16>,

    /// TLS control server port
    #[arg(long)]
    control_port: Option<u16>,

    /// Start in simulation mode instead of acquisition
    #[arg(long, default_value_t = false)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // Load configuration
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let mut config = Config::from_file(&config_path)?;

    // Apply command line overrides
    config.apply_args(
        args.modbus_address.clone(),
        args.modbus_port,
        args.control_port,
        args.simulate,
    );
    config::validate_specific_rules(&config)?;

    info!("starting gateway daemon");
    let mut daemon = daemon::Daemon::new();

    // Launch all configured services; a bind or TLS failure aborts here
    // and the process exits non-zero.
    daemon.launch(&config).await?;

    // Wait for termination signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal, terminating daemon");
            daemon.shutdown();
            daemon.join().await?;
        }
        Err(err) => {
            eprintln!("error waiting for shutdown signal: {err}");
        }
    }

    Ok(())
}

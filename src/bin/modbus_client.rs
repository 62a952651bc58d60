// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Small Modbus client for poking at a running gateway: reads a span of
//! input registers and, optionally, fires a write-single-coil relay command.

use clap::Parser;
use std::error::Error;
use tokio::time::Duration;
use tokio_modbus::prelude::*;

/// Modbus client for reading gateway input registers
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Starting input register address
    #[clap(long, default_value = "0")]
    input_register: u16,

    /// Number of registers to read
    #[clap(long, default_value = "16")]
    quantity: u16,

    /// Write this coil address before reading (relay trigger)
    #[clap(long)]
    write_coil: Option<u16>,

    /// State for --write-coil
    #[clap(long, default_value_t = true)]
    coil_state: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();
    let socket_addr = format!("{}:{}", args.address, args.port).parse()?;
    println!("Connecting to Modbus server at {socket_addr}");

    let mut ctx = tcp::connect_slave(socket_addr, Slave(1)).await?;

    if let Some(coil) = args.write_coil {
        println!("Writing coil {} = {}", coil, args.coil_state);
        // In SRU compatibility mode the gateway does not echo this write;
        // a timeout here is expected, not an error.
        match tokio::time::timeout(
            Duration::from_secs(1),
            ctx.write_single_coil(coil, args.coil_state),
        )
        .await
        {
            Ok(Ok(Ok(()))) => println!("Coil write acknowledged"),
            Ok(Ok(Err(exception))) => println!("Coil write rejected: {exception}"),
            Ok(Err(err)) => println!("Coil write transport error: {err}"),
            Err(_) => println!("No echo within 1s; compatibility mode suppresses it"),
        }
    }

    println!(
        "Reading {} input registers starting at address {}",
        args.quantity, args.input_register
    );
    let response = ctx
        .read_input_registers(args.input_register, args.quantity)
        .await??;

    for (i, value) in response.iter().enumerate() {
        let register = args.input_register + i as u16;
        println!("Register {register}: {value} (0x{value:04X})");
    }

    ctx.disconnect().await?;
    Ok(())
}

// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Control-channel command parsing and dispatch.
//!
//! | Command | Args | Effect |
//! |---|---|---|
//! | `readCurrent` | module;channel_index | one-shot current read, value in A |
//! | `readVoltage` | module;channel_index | one-shot voltage read, value in V |
//! | `startModbusSimulation` | — | start simulation, stop acquisition |
//! | `stopModbusSimulation` | — | stop simulation |
//! | `startModbusAcquisition` | — | start acquisition, stop simulation |
//! | `stopModbusAcquisition` | — | stop acquisition |
//! | `uploadToClient` | filename | stream `Size:N` then N raw bytes |
//! | `downloadFromClient` | filename;size | receive `size` bytes into the file |
//! | `clientList` | — | semicolon-joined connected peer IPs |
//! | `listInifiles` | — | local files matching `^NI.*_[0-9]+\.ini$` |

use std::sync::Arc;
use std::time::Duration;

use log::{error, warn};
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::bridge::DaqModbusBridge;
use crate::control::ClientRoster;
use crate::daq::DaqHardware;

/// Hard ceiling on tokens per command line.
pub const MAX_TOKENS: usize = 20;
/// One-shot reads through the control channel wait this long on hardware.
const ONE_SHOT_TIMEOUT: Duration = Duration::from_secs(10);
/// File transfer chunk size.
const TRANSFER_CHUNK: usize = 1024;

const NACK_INVALID_FORMAT: &str = "NACK: Invalid command format";

/// Everything a command handler may need.
#[derive(Clone)]
pub struct CommandContext {
    pub hardware: Arc<dyn DaqHardware>,
    pub bridge: Arc<DaqModbusBridge>,
    pub roster: Arc<ClientRoster>,
}

/// Split a command line on `;`. A trailing empty token (line ending in `;`)
/// is dropped. More than [`MAX_TOKENS`] tokens means the line is rejected.
pub fn tokenize(input: &str) -> Option<Vec<String>> {
    let mut tokens: Vec<String> = input.split(';').map(String::from).collect();
    if tokens.last().is_some_and(String::is_empty) {
        tokens.pop();
    }
    if tokens.len() > MAX_TOKENS {
        return None;
    }
    Some(tokens)
}

/// Dispatch one command line. File-transfer commands exchange raw bytes on
/// `stream` mid-command; the returned string is always sent afterwards.
pub async fn dispatch<S>(context: &CommandContext, stream: &mut S, line: &str) -> String
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let Some(tokens) = tokenize(line) else {
        return NACK_INVALID_FORMAT.to_string();
    };
    if tokens.is_empty() || tokens.len() > 3 {
        return NACK_INVALID_FORMAT.to_string();
    }
    let command = tokens[0].trim();

    if command.starts_with("readCurrent") {
        read_analog(context, &tokens, AnalogKind::Current).await
    } else if command.starts_with("readVoltage") {
        read_analog(context, &tokens, AnalogKind::Voltage).await
    } else if command.starts_with("startModbusSimulation") {
        drive_command(context, &tokens, DriveAction::StartSimulation).await
    } else if command.starts_with("stopModbusSimulation") {
        drive_command(context, &tokens, DriveAction::StopSimulation).await
    } else if command.starts_with("startModbusAcquisition") {
        drive_command(context, &tokens, DriveAction::StartAcquisition).await
    } else if command.starts_with("stopModbusAcquisition") {
        drive_command(context, &tokens, DriveAction::StopAcquisition).await
    } else if command.starts_with("uploadToClient") {
        upload_to_client(stream, &tokens).await
    } else if command.starts_with("downloadFromClient") {
        download_from_client(stream, &tokens).await
    } else if command.starts_with("clientList") {
        context.roster.joined_ips()
    } else if command.starts_with("listInifiles") {
        list_ini_files()
    } else {
        warn!(target: "control", "unknown command {command:?}");
        format!("unknown command {command}")
    }
}

enum AnalogKind {
    Current,
    Voltage,
}

async fn read_analog(context: &CommandContext, tokens: &[String], kind: AnalogKind) -> String {
    if tokens.len() != 3 {
        return NACK_INVALID_FORMAT.to_string();
    }
    let module = tokens[1].trim().to_string();
    let channel_index: u32 = match tokens[2].trim().parse() {
        Ok(index) => index,
        Err(_) => return format!("NACK: cannot convert {} to a channel index", tokens[2]),
    };
    let channel = format!("/ai{channel_index}");

    let hardware = Arc::clone(&context.hardware);
    let result = tokio::task::spawn_blocking(move || match kind {
        AnalogKind::Current => hardware.read_current(&module, &channel, ONE_SHOT_TIMEOUT),
        AnalogKind::Voltage => hardware.read_voltage(&module, &channel, ONE_SHOT_TIMEOUT),
    })
    .await;

    match result {
        Ok(Ok(value)) => format!("{value:.6}"),
        Ok(Err(err)) => format!("NACK:{err}"),
        Err(err) => {
            error!(target: "control", "one-shot read task failed: {err}");
            format!("NACK:{err}")
        }
    }
}

enum DriveAction {
    StartSimulation,
    StopSimulation,
    StartAcquisition,
    StopAcquisition,
}

async fn drive_command(
    context: &CommandContext,
    tokens: &[String],
    action: DriveAction,
) -> String {
    if tokens.len() != 1 {
        return NACK_INVALID_FORMAT.to_string();
    }
    // Driver start/stop joins the peer driver thread; keep that off the
    // async executor.
    let bridge = Arc::clone(&context.bridge);
    let result = tokio::task::spawn_blocking(move || match action {
        DriveAction::StartSimulation => bridge.start_simulation(),
        DriveAction::StopSimulation => {
            bridge.stop_simulation();
            true
        }
        DriveAction::StartAcquisition => bridge.start_acquisition(),
        DriveAction::StopAcquisition => {
            bridge.stop_acquisition();
            true
        }
    })
    .await;

    match result {
        Ok(true) => "ACK".to_string(),
        Ok(false) => "NACK: Impossible to start modbus driver".to_string(),
        Err(err) => format!("NACK:{err}"),
    }
}

/// `uploadToClient;filename`: the server streams `Size:N` then the N raw
/// file bytes, then the final ACK.
async fn upload_to_client<S>(stream: &mut S, tokens: &[String]) -> String
where
    S: AsyncWrite + Unpin + Send,
{
    if tokens.len() != 2 {
        return "NACK: Incorrect download command format".to_string();
    }
    let contents = match tokio::fs::read(tokens[1].trim()).await {
        Ok(contents) => contents,
        Err(_) => return "NACK: Unable to open file for reading".to_string(),
    };

    let size_line = format!("Size:{}", contents.len());
    if stream.write_all(size_line.as_bytes()).await.is_err() {
        return "NACK: File transfer incomplete".to_string();
    }
    for chunk in contents.chunks(TRANSFER_CHUNK) {
        if stream.write_all(chunk).await.is_err() {
            return "NACK: File transfer incomplete".to_string();
        }
    }
    "ACK: File download successful".to_string()
}

/// `downloadFromClient;filename;size`: the server receives exactly `size`
/// bytes and writes them to the file.
async fn download_from_client<S>(stream: &mut S, tokens: &[String]) -> String
where
    S: AsyncRead + Unpin + Send,
{
    if tokens.len() != 3 {
        return "NACK: Incorrect upload command format".to_string();
    }
    let expected: u64 = match tokens[2].trim().parse() {
        Ok(size) => size,
        Err(_) => return "NACK: Invalid file size".to_string(),
    };

    let mut received: Vec<u8> = Vec::with_capacity(expected as usize);
    let mut chunk = [0u8; TRANSFER_CHUNK];
    while (received.len() as u64) < expected {
        let remaining = (expected - received.len() as u64) as usize;
        let want = remaining.min(TRANSFER_CHUNK);
        match stream.read(&mut chunk[..want]).await {
            Ok(0) => break,
            Ok(n) => received.extend_from_slice(&chunk[..n]),
            Err(_) => break,
        }
    }

    if received.len() as u64 != expected {
        return "NACK: File transfer incomplete".to_string();
    }
    if tokio::fs::write(tokens[1].trim(), &received).await.is_err() {
        return "NACK: Unable to open file for writing".to_string();
    }
    "ACK: File upload successful".to_string()
}

/// Local files matching the NI module descriptor pattern.
fn list_ini_files() -> String {
    let pattern = Regex::new(r"^NI.*_[0-9]+\.ini$").expect("hard-coded regex");
    let Ok(entries) = std::fs::read_dir(".") else {
        error!(target: "control", "could not open the working directory");
        return String::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            pattern.is_match(&name).then_some(name)
        })
        .collect();
    names.sort_unstable();
    names.join(";")
}

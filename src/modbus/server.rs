// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus/TCP server.
//!
//! One listener task accepts clients up to the connection ceiling; each
//! accepted socket gets its own task that decodes ADUs in arrival order and
//! dispatches them. Standard data-access codes are served from the register
//! map; write-coil codes are relay commands routed to the [`CoilSink`].
//!
//! A burst of Write Single Coil requests on one connection is drained
//! strictly in order: the loop goes straight back to the socket after each
//! 0x05, which is what the paired legacy logger expects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::bridge::CoilSink;
use crate::config::sru::SharedSru;
use crate::modbus::frame::{self, Request};
use crate::registers::{Exception, RegisterMap};

/// Reference connection ceiling.
pub const NB_CONNECTION: usize = 25;

/// Settings the server needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct ModbusServerSettings {
    pub address: String,
    pub port: u16,
    pub max_connections: usize,
    pub unit_id: u8,
}

impl Default for ModbusServerSettings {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 502,
            max_connections: NB_CONNECTION,
            unit_id: 1,
        }
    }
}

/// What the dispatcher decided to do with one request.
enum Action {
    Respond(Vec<u8>),
    NoResponse,
}

/// The server: register map + coil sink + client roster.
pub struct ModbusTcpServer {
    registers: Arc<RegisterMap>,
    coil_sink: Arc<dyn CoilSink>,
    sru: Arc<SharedSru>,
    settings: ModbusServerSettings,
    roster: Mutex<HashMap<u64, String>>,
    next_connection_id: AtomicU64,
    active_connections: AtomicUsize,
}

impl ModbusTcpServer {
    pub fn new(
        registers: Arc<RegisterMap>,
        coil_sink: Arc<dyn CoilSink>,
        sru: Arc<SharedSru>,
        settings: ModbusServerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            registers,
            coil_sink,
            sru,
            settings,
            roster: Mutex::new(HashMap::new()),
            next_connection_id: AtomicU64::new(1),
            active_connections: AtomicUsize::new(0),
        })
    }

    /// Bind the listener. Failing to bind is fatal to startup.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.settings.address, self.settings.port);
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("modbus server cannot listen on {addr}"))
    }

    /// Peer IPs of the connected clients.
    pub fn client_list(&self) -> Vec<String> {
        self.roster.lock().unwrap().values().cloned().collect()
    }

    fn broadcast_client_list(&self) {
        let roster = self.roster.lock().unwrap();
        let mut message = format!("cli:Connected Clients: {}", roster.len());
        for (id, ip) in roster.iter() {
            message.push_str(&format!("\nSocket {id}: {ip}"));
        }
        info!(target: "modbus_server", "{message}");
    }

    /// Accept loop. Runs until the listener task is aborted.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        info!(
            target: "modbus_server",
            "modbus server listening on {}:{} (max {} clients, unit id {})",
            self.settings.address, self.settings.port,
            self.settings.max_connections, self.settings.unit_id
        );
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    // Accept errors are transient; log and keep serving.
                    error!(target: "modbus_server", "accept failed: {err}");
                    continue;
                }
            };

            if self.active_connections.load(Ordering::SeqCst) >= self.settings.max_connections {
                warn!(
                    target: "modbus_server",
                    "refusing client {peer}: connection ceiling of {} reached",
                    self.settings.max_connections
                );
                drop(stream);
                continue;
            }

            let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
            self.active_connections.fetch_add(1, Ordering::SeqCst);
            self.roster
                .lock()
                .unwrap()
                .insert(id, peer.ip().to_string());
            self.broadcast_client_list();

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = server.serve_connection(stream, id).await {
                    debug!(target: "modbus_server", "connection {id} ended: {err}");
                }
                server.roster.lock().unwrap().remove(&id);
                server.active_connections.fetch_sub(1, Ordering::SeqCst);
                server.broadcast_client_list();
            });
        }
    }

    /// Read ADUs off one connection in arrival order and dispatch them.
    async fn serve_connection(&self, mut stream: TcpStream, id: u64) -> Result<()> {
        let mut header_buf = [0u8; frame::MBAP_HEADER_LEN];
        let mut pdu_buf = vec![0u8; frame::MAX_ADU_LENGTH];

        loop {
            // A zero-byte read surfaces as UnexpectedEof here: the client
            // closed, so the connection is removed from the roster.
            if let Err(err) = stream.read_exact(&mut header_buf).await {
                debug!(target: "modbus_server", "connection {id} closed: {err}");
                return Ok(());
            }
            let (header, pdu_len) = match frame::parse_mbap(&header_buf) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(target: "modbus_server", "connection {id}: bad MBAP header: {err}");
                    return Ok(());
                }
            };
            let pdu = &mut pdu_buf[..pdu_len];
            stream
                .read_exact(pdu)
                .await
                .with_context(|| format!("connection {id}: truncated PDU"))?;

            let request = match frame::parse_request(pdu) {
                Ok(request) => request,
                Err(err) => {
                    warn!(target: "modbus_server", "connection {id}: malformed PDU: {err}");
                    return Ok(());
                }
            };

            match self.handle_request(request) {
                Action::Respond(response_pdu) => {
                    let adu = frame::encode_adu(&header, &response_pdu);
                    stream.write_all(&adu).await?;
                }
                Action::NoResponse => {}
            }
            // Loop straight back to the socket: a 0x05 burst is drained in
            // arrival order before this task yields to anything else on
            // this connection.
        }
    }

    fn exception(function: u8, exception: Exception) -> Action {
        error!(target: "modbus_server", "function {function:#04x}: {exception}");
        Action::Respond(frame::encode_exception(function, exception.code()))
    }

    fn handle_request(&self, request: Request) -> Action {
        match request {
            Request::ReadCoils { addr, quantity } => {
                match self.registers.read_coils(addr, quantity) {
                    Ok(bits) => Action::Respond(frame::encode_bits_response(
                        frame::FC_READ_COILS,
                        &bits,
                    )),
                    Err(e) => Self::exception(frame::FC_READ_COILS, e),
                }
            }
            Request::ReadDiscreteInputs { addr, quantity } => {
                match self.registers.read_discrete_inputs(addr, quantity) {
                    Ok(bits) => Action::Respond(frame::encode_bits_response(
                        frame::FC_READ_DISCRETE_INPUTS,
                        &bits,
                    )),
                    Err(e) => Self::exception(frame::FC_READ_DISCRETE_INPUTS, e),
                }
            }
            Request::ReadHoldingRegisters { addr, quantity } => {
                match self.registers.read_holding_registers(addr, quantity) {
                    Ok(values) => Action::Respond(frame::encode_registers_response(
                        frame::FC_READ_HOLDING_REGISTERS,
                        &values,
                    )),
                    Err(e) => Self::exception(frame::FC_READ_HOLDING_REGISTERS, e),
                }
            }
            Request::ReadInputRegisters { addr, quantity } => {
                match self.registers.read_input_registers(addr, quantity) {
                    Ok(values) => Action::Respond(frame::encode_registers_response(
                        frame::FC_READ_INPUT_REGISTERS,
                        &values,
                    )),
                    Err(e) => Self::exception(frame::FC_READ_INPUT_REGISTERS, e),
                }
            }
            Request::WriteSingleCoil { addr, state } => self.handle_write_single_coil(addr, state),
            Request::WriteMultipleCoils { addr, states } => {
                // Routed like a burst of single-coil writes. The legacy
                // logger never waits for a 0x0F response, and none is sent.
                for (offset, state) in states.iter().enumerate() {
                    self.coil_sink.set_coil(addr + offset as u16, *state);
                }
                Action::NoResponse
            }
            Request::WriteSingleRegister { addr, value } => {
                match self.registers.write_holding_register(addr, value) {
                    Ok(()) => Action::Respond(frame::encode_write_single_register_response(
                        addr, value,
                    )),
                    Err(e) => Self::exception(frame::FC_WRITE_SINGLE_REGISTER, e),
                }
            }
            Request::WriteMultipleRegisters { addr, values } => {
                match self.registers.write_holding_registers(addr, &values) {
                    Ok(()) => Action::Respond(frame::encode_write_multiple_registers_response(
                        addr,
                        values.len() as u16,
                    )),
                    Err(e) => Self::exception(frame::FC_WRITE_MULTIPLE_REGISTERS, e),
                }
            }
            Request::Unsupported { function } => {
                Self::exception(function, Exception::IllegalFunction)
            }
        }
    }

    /// 0x05 is a relay trigger: route it to the alarm map first, then echo,
    /// unless SRU compatibility mode is on, in which case the reply is
    /// suppressed entirely.
    fn handle_write_single_coil(&self, addr: u16, state: bool) -> Action {
        self.coil_sink.set_coil(addr, state);

        if self.sru.compatibility_mode() {
            return Action::NoResponse;
        }

        match self.registers.set_coil(addr, state) {
            Ok(()) => Action::Respond(frame::encode_write_single_coil_response(addr, state)),
            Err(e) => Self::exception(frame::FC_WRITE_SINGLE_COIL, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::sru::SruDescriptor;

    struct RecordingSink {
        writes: Mutex<Vec<(u16, bool)>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                writes: Mutex::new(Vec::new()),
            })
        }
    }

    impl CoilSink for RecordingSink {
        fn set_coil(&self, addr: u16, state: bool) {
            self.writes.lock().unwrap().push((addr, state));
        }
    }

    fn test_server(compatibility: bool) -> (Arc<ModbusTcpServer>, Arc<RecordingSink>) {
        let sru = SruDescriptor {
            compatibility_mode: compatibility,
            ..Default::default()
        };
        let registers = Arc::new(RegisterMap::for_sru(&sru));
        let sink = RecordingSink::new();
        let server = ModbusTcpServer::new(
            registers,
            Arc::clone(&sink) as Arc<dyn CoilSink>,
            Arc::new(SharedSru::new(sru)),
            ModbusServerSettings::default(),
        );
        (server, sink)
    }

    #[test]
    fn write_single_coil_routes_and_echoes_without_compatibility() {
        let (server, sink) = test_server(false);
        let action = server.handle_request(Request::WriteSingleCoil {
            addr: 8,
            state: true,
        });
        assert_eq!(sink.writes.lock().unwrap().as_slice(), &[(8, true)]);
        match action {
            Action::Respond(pdu) => {
                assert_eq!(pdu, vec![0x05, 0x00, 0x08, 0xFF, 0x00]);
            }
            Action::NoResponse => panic!("expected an echo"),
        }
        // The echoed state lands in the coil bank.
        assert_eq!(server.registers.read_coils(8, 1).unwrap(), vec![true]);
    }

    #[test]
    fn write_single_coil_reply_is_suppressed_in_compatibility_mode() {
        let (server, sink) = test_server(true);
        let action = server.handle_request(Request::WriteSingleCoil {
            addr: 8,
            state: true,
        });
        assert_eq!(sink.writes.lock().unwrap().as_slice(), &[(8, true)]);
        assert!(matches!(action, Action::NoResponse));
    }

    #[test]
    fn write_multiple_coils_routes_each_bit() {
        let (server, sink) = test_server(true);
        let action = server.handle_request(Request::WriteMultipleCoils {
            addr: 8,
            states: vec![true, true],
        });
        assert!(matches!(action, Action::NoResponse));
        assert_eq!(
            sink.writes.lock().unwrap().as_slice(),
            &[(8, true), (9, true)]
        );
    }

    #[test]
    fn unsupported_function_yields_illegal_function() {
        let (server, _sink) = test_server(false);
        match server.handle_request(Request::Unsupported { function: 0x2B }) {
            Action::Respond(pdu) => assert_eq!(pdu, vec![0xAB, 0x01]),
            Action::NoResponse => panic!("expected an exception"),
        }
    }
}

// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Control-channel tests.
//!
//! Command dispatch and the line loop are exercised over an in-memory
//! duplex stream; the TLS path is exercised for real with a certificate
//! minted on the fly.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use rust_daqbridge::bridge::DaqModbusBridge;
use rust_daqbridge::config::simulation::SimulationConfig;
use rust_daqbridge::config::sru::{SharedSru, SruDescriptor};
use rust_daqbridge::config::ControlConfig;
use rust_daqbridge::control::server::{handle_client_lines, MAX_LINE_LEN};
use rust_daqbridge::control::{ClientRoster, CommandContext, ControlServer};
use rust_daqbridge::daq::{DaqHardware, SimulatedDaq};
use rust_daqbridge::registers::RegisterMap;

fn test_context() -> (CommandContext, Arc<SimulatedDaq>, Arc<DaqModbusBridge>) {
    let daq = Arc::new(SimulatedDaq::with_default_rack());
    let sru = SruDescriptor {
        compatibility_mode: false,
        n_analog_in: 4,
        n_analog_out: 0,
        n_counters: 1,
        n_coders: 0,
        n_alarms: 4,
    };
    let registers = Arc::new(RegisterMap::for_sru(&sru));
    let bridge = DaqModbusBridge::new(
        Arc::clone(&daq) as Arc<dyn DaqHardware>,
        registers,
        Arc::new(SharedSru::new(sru)),
        Vec::new(),
        SimulationConfig {
            interval_ms: 20,
            ..Default::default()
        },
        Duration::from_millis(20),
        Duration::from_secs(1),
    );
    let context = CommandContext {
        hardware: Arc::clone(&daq) as Arc<dyn DaqHardware>,
        bridge: Arc::clone(&bridge),
        roster: Arc::new(ClientRoster::new()),
    };
    (context, daq, bridge)
}

/// Run the client line loop over a duplex pipe, returning the client end.
fn spawn_line_loop(context: CommandContext) -> tokio::io::DuplexStream {
    let (client, mut server_side) = tokio::io::duplex(8 * 1024);
    tokio::spawn(async move {
        let _ = handle_client_lines(&context, &mut server_side).await;
    });
    client
}

async fn read_reply(stream: &mut tokio::io::DuplexStream, len: usize) -> String {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.expect("reply bytes");
    String::from_utf8(buf).expect("utf8 reply")
}

#[tokio::test]
async fn read_current_returns_the_programmed_value() {
    let (context, daq, _bridge) = test_context();
    daq.set_current("Mod1", "/ai3", 0.0165);

    let mut client = spawn_line_loop(context);
    client.write_all(b"readCurrent;Mod1;3\n").await.unwrap();
    let reply = read_reply(&mut client, "0.016500".len()).await;
    assert_eq!(reply, "0.016500");
}

#[tokio::test]
async fn malformed_commands_are_nacked() {
    let (context, _daq, _bridge) = test_context();
    let mut client = spawn_line_loop(context);

    client.write_all(b"readCurrent;Mod1\n").await.unwrap();
    let reply = read_reply(&mut client, "NACK: Invalid command format".len()).await;
    assert_eq!(reply, "NACK: Invalid command format");

    client.write_all(b"startModbusSimulation;extra\n").await.unwrap();
    let reply = read_reply(&mut client, "NACK: Invalid command format".len()).await;
    assert_eq!(reply, "NACK: Invalid command format");
}

#[tokio::test]
async fn unknown_commands_report_themselves() {
    let (context, _daq, _bridge) = test_context();
    let mut client = spawn_line_loop(context);

    client.write_all(b"fooBar\n").await.unwrap();
    let reply = read_reply(&mut client, "unknown command fooBar".len()).await;
    assert_eq!(reply, "unknown command fooBar");
}

#[tokio::test]
async fn simulation_then_acquisition_toggle_over_the_command_channel() {
    let (context, _daq, bridge) = test_context();
    let mut client = spawn_line_loop(context);

    client.write_all(b"startModbusSimulation\n").await.unwrap();
    assert_eq!(read_reply(&mut client, 3).await, "ACK");
    assert!(bridge.simulation_active());

    client.write_all(b"startModbusAcquisition\n").await.unwrap();
    assert_eq!(read_reply(&mut client, 3).await, "ACK");
    assert!(bridge.acquisition_active());
    assert!(
        !bridge.simulation_active(),
        "acquisition start must stop the simulation driver"
    );

    client.write_all(b"stopModbusAcquisition\n").await.unwrap();
    assert_eq!(read_reply(&mut client, 3).await, "ACK");
    assert!(!bridge.acquisition_active());
}

#[tokio::test]
async fn file_upload_streams_size_then_bytes() {
    let (context, _daq, _bridge) = test_context();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    tokio::fs::write(&path, b"hello world").await.unwrap();

    let mut client = spawn_line_loop(context);
    let command = format!("uploadToClient;{}\n", path.display());
    client.write_all(command.as_bytes()).await.unwrap();

    let expected = "Size:11hello worldACK: File download successful";
    let reply = read_reply(&mut client, expected.len()).await;
    assert_eq!(reply, expected);
}

#[tokio::test]
async fn file_download_receives_exactly_size_bytes() {
    let (context, _daq, _bridge) = test_context();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("incoming.bin");

    let mut client = spawn_line_loop(context);
    let command = format!("downloadFromClient;{};5\n", path.display());
    client.write_all(command.as_bytes()).await.unwrap();
    // Give the handler time to enter the raw-byte read before the payload.
    time::sleep(Duration::from_millis(50)).await;
    client.write_all(b"hello").await.unwrap();

    let reply = read_reply(&mut client, "ACK: File upload successful".len()).await;
    assert_eq!(reply, "ACK: File upload successful");
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hello");
}

#[tokio::test]
async fn over_long_line_is_rejected_and_the_connection_dropped() {
    let (context, _daq, _bridge) = test_context();
    let mut client = spawn_line_loop(context);

    // 257 bytes and no delimiter.
    let flood = vec![b'a'; MAX_LINE_LEN + 1];
    client.write_all(&flood).await.unwrap();

    let reply = read_reply(&mut client, "NACK: command rejected".len()).await;
    assert_eq!(reply, "NACK: command rejected");

    // The server side hangs up afterwards.
    let mut buf = [0u8; 8];
    let n = client.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn list_inifiles_reports_module_definition_files() {
    use rust_daqbridge::daq::ModuleDefinition;

    // Module definitions live next to the gateway binary; drop one into the
    // working directory under its canonical name.
    let definition = ModuleDefinition::ni9239("ModT", 9901);
    let file_name = definition.ini_file_name();
    definition.save(&file_name).unwrap();

    let (context, _daq, _bridge) = test_context();
    let mut client = spawn_line_loop(context);
    client.write_all(b"listInifiles\n").await.unwrap();

    let mut buf = vec![0u8; 256];
    let n = client.read(&mut buf).await.unwrap();
    let reply = String::from_utf8_lossy(&buf[..n]).into_owned();
    std::fs::remove_file(&file_name).unwrap();

    assert!(
        reply.split(';').any(|name| name == file_name),
        "expected {file_name} in {reply:?}"
    );
}

#[tokio::test]
async fn client_list_reflects_the_roster() {
    let (context, _daq, _bridge) = test_context();
    context.roster.add("192.168.1.10".into());
    context.roster.add("192.168.1.11".into());

    let mut client = spawn_line_loop(context);
    client.write_all(b"clientList\n").await.unwrap();
    let expected = "192.168.1.10;192.168.1.11";
    assert_eq!(read_reply(&mut client, expected.len()).await, expected);
}

// ---- full TLS round trip -------------------------------------------------

struct TlsFixture {
    config: ControlConfig,
    connector: tokio_rustls::TlsConnector,
    _dir: tempfile::TempDir,
}

/// Mint a self-signed certificate, write the PEM pair to disk, and build a
/// client connector trusting exactly that certificate.
fn tls_fixture(port: u16) -> TlsFixture {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
        .expect("generate certificate");
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("control.crt");
    let key_path = dir.path().join("control.key");
    std::fs::write(&cert_path, certified.cert.pem()).unwrap();
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

    let mut roots = rustls::RootCertStore::empty();
    roots.add(certified.cert.der().clone()).unwrap();
    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    TlsFixture {
        config: ControlConfig {
            enabled: true,
            address: "127.0.0.1".into(),
            port,
            cert_file: cert_path.to_string_lossy().into_owned(),
            key_file: key_path.to_string_lossy().into_owned(),
            max_clients: 4,
        },
        connector: tokio_rustls::TlsConnector::from(Arc::new(client_config)),
        _dir: dir,
    }
}

#[tokio::test]
async fn tls_round_trip_and_roster_bookkeeping() -> Result<(), Box<dyn std::error::Error>> {
    let (context, daq, bridge) = test_context();
    daq.set_current("Mod1", "/ai0", 0.0100);
    let fixture = tls_fixture(0);

    let server = ControlServer::new(
        fixture.config.clone(),
        Arc::clone(&context.hardware),
        Arc::clone(&bridge),
    );
    let roster = server.roster();
    let acceptor = server.load_tls_acceptor()?;
    let listener = server.bind().await?;
    let addr = listener.local_addr()?;
    tokio::spawn(server.run(listener, acceptor));
    time::sleep(Duration::from_millis(50)).await;

    let stream = TcpStream::connect(addr).await?;
    let server_name = rustls::pki_types::ServerName::try_from("localhost")?;
    let mut tls = fixture.connector.connect(server_name, stream).await?;
    time::sleep(Duration::from_millis(50)).await;
    assert_eq!(roster.len(), 1, "handshaked client must enter the roster");

    tls.write_all(b"readCurrent;Mod1;0\n").await?;
    let mut buf = vec![0u8; "0.010000".len()];
    tls.read_exact(&mut buf).await?;
    assert_eq!(String::from_utf8(buf)?, "0.010000");

    // Over-long line: rejected, connection closed, roster shrinks.
    tls.write_all(&vec![b'b'; MAX_LINE_LEN + 4]).await?;
    let mut reply = vec![0u8; "NACK: command rejected".len()];
    tls.read_exact(&mut reply).await?;
    assert_eq!(String::from_utf8(reply)?, "NACK: command rejected");

    time::sleep(Duration::from_millis(100)).await;
    assert_eq!(roster.len(), 0, "rejected client must leave the roster");
    Ok(())
}

#[tokio::test]
async fn plain_tcp_client_fails_the_handshake_and_stays_off_the_roster(
) -> Result<(), Box<dyn std::error::Error>> {
    let (context, _daq, bridge) = test_context();
    let fixture = tls_fixture(0);

    let server = ControlServer::new(
        fixture.config.clone(),
        Arc::clone(&context.hardware),
        bridge,
    );
    let roster = server.roster();
    let acceptor = server.load_tls_acceptor()?;
    let listener = server.bind().await?;
    let addr = listener.local_addr()?;
    tokio::spawn(server.run(listener, acceptor));
    time::sleep(Duration::from_millis(50)).await;

    // Speak plaintext at a TLS endpoint.
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(b"clientList\n").await?;
    let mut buf = [0u8; 64];
    let n = time::timeout(Duration::from_secs(1), stream.read(&mut buf))
        .await?
        .unwrap_or(0);
    assert_eq!(n, 0, "handshake failure must close the socket");
    assert_eq!(roster.len(), 0);
    Ok(())
}

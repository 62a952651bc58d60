// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-daqbridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! TLS control server.
//!
//! One acceptor task, one task per client. TLS is mandatory: the PEM
//! certificate and key load at startup and a failed handshake closes the
//! socket before the peer ever enters the roster.

use std::fs::File;
use std::io::BufReader;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::bridge::DaqModbusBridge;
use crate::config::ControlConfig;
use crate::control::commands::{dispatch, CommandContext};
use crate::control::ClientRoster;
use crate::daq::DaqHardware;

/// Hard ceiling on one command line, delimiter included.
pub const MAX_LINE_LEN: usize = 256;

const NACK_REJECTED: &[u8] = b"NACK: command rejected";

/// The TLS control server.
pub struct ControlServer {
    config: ControlConfig,
    context: CommandContext,
    active_clients: AtomicUsize,
}

impl ControlServer {
    pub fn new(
        config: ControlConfig,
        hardware: Arc<dyn DaqHardware>,
        bridge: Arc<DaqModbusBridge>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            context: CommandContext {
                hardware,
                bridge,
                roster: Arc::new(ClientRoster::new()),
            },
            active_clients: AtomicUsize::new(0),
        })
    }

    pub fn roster(&self) -> Arc<ClientRoster> {
        Arc::clone(&self.context.roster)
    }

    /// Load the PEM certificate chain and private key. Failure here is
    /// fatal to startup: the control channel never runs without TLS.
    pub fn load_tls_acceptor(&self) -> Result<TlsAcceptor> {
        let cert_file = File::open(&self.config.cert_file)
            .with_context(|| format!("cannot open certificate {:?}", self.config.cert_file))?;
        let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
            .collect::<std::result::Result<_, _>>()
            .context("failed to parse certificate PEM")?;

        let key_file = File::open(&self.config.key_file)
            .with_context(|| format!("cannot open private key {:?}", self.config.key_file))?;
        let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
            .context("failed to parse private key PEM")?
            .context("no private key found in PEM file")?;

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("invalid certificate/key pair")?;
        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.socket_addr_string();
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("control server cannot listen on {addr}"))
    }

    /// Accept loop. Runs until the task is aborted.
    pub async fn run(self: Arc<Self>, listener: TcpListener, acceptor: TlsAcceptor) {
        info!(
            target: "control",
            "control server listening on {} (TLS, max {} clients)",
            self.config.socket_addr_string(),
            self.config.max_clients
        );
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(target: "control", "accept failed: {err}");
                    continue;
                }
            };

            if self.active_clients.load(Ordering::SeqCst) >= self.config.max_clients {
                warn!(target: "control", "refusing client {peer}: client ceiling reached");
                drop(stream);
                continue;
            }

            let server = Arc::clone(&self);
            let acceptor = acceptor.clone();
            self.active_clients.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                // Handshake failure closes the socket; the peer never
                // enters the roster.
                match acceptor.accept(stream).await {
                    Ok(mut tls_stream) => {
                        let id = server.context.roster.add(peer.ip().to_string());
                        info!(target: "control", "client {peer} connected");
                        if let Err(err) =
                            handle_client_lines(&server.context, &mut tls_stream).await
                        {
                            debug!(target: "control", "client {peer} errored: {err}");
                        }
                        // One graceful TLS shutdown attempt per client.
                        let _ = tls_stream.shutdown().await;
                        server.context.roster.remove(id);
                        info!(target: "control", "client {peer} disconnected");
                    }
                    Err(err) => {
                        warn!(target: "control", "TLS handshake with {peer} failed: {err}");
                    }
                }
                server.active_clients.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }
}

/// Per-client line loop, generic over the stream so tests can drive it over
/// an in-memory duplex.
///
/// Complete lines are dispatched in arrival order. Leftover bytes beyond
/// [`MAX_LINE_LEN`] without a delimiter get `NACK: command rejected` and the
/// connection is dropped.
pub async fn handle_client_lines<S>(context: &CommandContext, stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut accumulated: Vec<u8> = Vec::new();
    let mut chunk = [0u8; MAX_LINE_LEN];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) => return Ok(()), // graceful disconnect
            Ok(n) => n,
            Err(err) => return Err(err.into()),
        };
        accumulated.extend_from_slice(&chunk[..n]);

        while let Some(pos) = accumulated.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = accumulated.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes[..line_bytes.len() - 1])
                .trim_end_matches('\r')
                .to_string();
            let response = dispatch(context, stream, &line).await;
            stream.write_all(response.as_bytes()).await?;
            stream.flush().await?;
        }

        if accumulated.len() > MAX_LINE_LEN {
            stream.write_all(NACK_REJECTED).await?;
            stream.flush().await?;
            return Ok(()); // disconnect the offender
        }
    }
}

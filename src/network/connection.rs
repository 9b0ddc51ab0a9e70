//! Per-connection read loop: frames inbound bytes into lines, dispatches them
//! through the command registry, and drains a dedicated writer task for
//! outbound lines.
//!
//! There is no explicit write lock anywhere in this path. The writer task is
//! the sole consumer of the connection's `mpsc` channel, so every line queued
//! via `ConnectionHandle::send`/`send_raw` is written out in the order it was
//! queued, from however many handler tasks raced to queue it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::HandlerError;
use crate::handlers::{disconnect, Context, Registry, SharedState};
use crate::proto::{InboundLine, LineFramer};
use crate::state::{Connection, ConnectionHandle};
use crate::telemetry::CommandTimer;

const READ_BUF_SIZE: usize = 4096;

/// Drives one accepted TCP connection end to end: registration, command
/// dispatch, and teardown.
pub struct ConnectionDriver {
    stream: TcpStream,
    remote_addr: SocketAddr,
    shared: SharedState,
    registry: Arc<Registry>,
}

impl ConnectionDriver {
    pub fn new(
        stream: TcpStream,
        remote_addr: SocketAddr,
        shared: SharedState,
        registry: Arc<Registry>,
    ) -> Self {
        ConnectionDriver {
            stream,
            remote_addr,
            shared,
            registry,
        }
    }

    /// Run the connection to completion. Never returns an error: every
    /// failure mode (bad input, backend outage, handler error) is turned into
    /// an IRC-visible reply or a clean disconnect instead of propagating.
    pub async fn run(self) {
        let remote_host = self.remote_addr.ip().to_string();
        let (read_half, mut write_half) = self.stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let handle = ConnectionHandle::new(remote_host.clone(), tx);
        let conn_id = handle.id;

        let writer = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
            let _ = write_half.shutdown().await;
        });

        let mut conn = Connection::new(remote_host, handle);
        let mut reader = read_half;
        let mut framer = LineFramer::new();
        let mut buf = [0u8; READ_BUF_SIZE];

        let reason = loop {
            match reader.read(&mut buf).await {
                Ok(0) => break "Connection closed".to_string(),
                Err(e) => break format!("Read error: {e}"),
                Ok(n) => {
                    framer.feed(&buf[..n]);
                    if let Some(quit_reason) = self.drain_lines(&mut conn, &mut framer).await {
                        break quit_reason;
                    }
                }
            }
        };

        let mut ctx = Context {
            conn: &mut conn,
            shared: &self.shared,
        };
        disconnect(&mut ctx, reason).await;

        drop(ctx);
        let _ = writer.await;
        debug!(%conn_id, "connection driver finished");
    }

    /// Pop every complete line currently buffered and dispatch it. Returns
    /// `Some(reason)` once a handler signals the connection should close.
    async fn drain_lines(&self, conn: &mut Connection, framer: &mut LineFramer) -> Option<String> {
        while let Some(line) = framer.next_line() {
            if line.is_empty() {
                continue;
            }
            conn.touch();
            let Some(inbound) = InboundLine::parse(&line) else {
                continue;
            };
            let mut ctx = Context {
                conn,
                shared: &self.shared,
            };
            if let Some(reason) = self.dispatch(&mut ctx, inbound).await {
                return Some(reason);
            }
        }
        None
    }

    /// Look up and run one command. Returns `Some(reason)` when the
    /// connection should terminate (an explicit `QUIT`, or a reply gate
    /// failure that warrants it).
    async fn dispatch(&self, ctx: &mut Context<'_>, inbound: InboundLine) -> Option<String> {
        let server = ctx.server_name().to_string();
        let nick = ctx.nick_or_star();

        let Some(handler) = self.registry.get(&inbound.command) else {
            if let Some(reply) =
                HandlerError::UnknownCommand(inbound.command.clone()).to_irc_reply(&server, &nick, &inbound.command)
            {
                ctx.conn.handle.send(&reply);
            }
            return None;
        };

        if handler.needs_registration() && !ctx.conn.is_registered() {
            if let Some(reply) =
                HandlerError::NotRegistered.to_irc_reply(&server, &nick, &inbound.command)
            {
                ctx.conn.handle.send(&reply);
            }
            return None;
        }

        let timer = CommandTimer::new(inbound.command.clone());
        let result = handler.execute(ctx, &inbound.args).await;

        match result {
            Ok(()) => None,
            Err(HandlerError::Quit(reason)) => Some(reason.unwrap_or_else(|| "Client Quit".to_string())),
            Err(err) => {
                timer.record_error(err.error_code());
                if let Some(reply) = err.to_irc_reply(&server, &nick, &inbound.command) {
                    ctx.conn.handle.send(&reply);
                }
                None
            }
        }
    }
}

//! Gateway - TCP listener that accepts incoming connections.
//!
//! The Gateway binds to a socket and spawns one `ConnectionDriver` task per
//! incoming client. It carries no per-connection state of its own; every
//! connection after accept is independent.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, instrument};

use crate::handlers::{Registry, SharedState};
use crate::network::ConnectionDriver;

/// The Gateway accepts incoming TCP connections and spawns drivers.
pub struct Gateway {
    listener: TcpListener,
    shared: SharedState,
    registry: Arc<Registry>,
}

impl Gateway {
    /// Bind the gateway to the specified address.
    pub async fn bind(
        addr: SocketAddr,
        shared: SharedState,
        registry: Arc<Registry>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Gateway listening");
        Ok(Self { listener, shared, registry })
    }

    /// The address actually bound, useful when `bind` was given port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener
            .local_addr()
            .expect("bound listener always has a local address")
    }

    /// Run the gateway, accepting connections forever. Returns only on a
    /// fatal accept-loop error; individual connection failures are isolated
    /// to their own spawned task and never propagate here.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!(%addr, "Connection accepted");

                    let shared = self.shared.clone();
                    let registry = Arc::clone(&self.registry);

                    tokio::spawn(async move {
                        let driver = ConnectionDriver::new(stream, addr, shared, registry);
                        driver.run().await;
                        info!(%addr, "Connection closed");
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

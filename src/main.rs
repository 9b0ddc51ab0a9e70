//! tenantircd binary entry point: CLI parsing, config load, tracing init, and
//! process wiring around the library's `Gateway`.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};

use tenantircd::config::Config;
use tenantircd::handlers::{Registry, SharedState};
use tenantircd::network::Gateway;
use tenantircd::state::{TenantAwareRegistry, TenantRegistry};
use tenantircd::{backend, http, metrics};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {flag}");
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    }
}

/// Wait for either Ctrl-C or (on unix) SIGTERM; either is a clean shutdown.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = Config::load(Path::new(&config_path)).map_err(|e| {
        eprintln!("ERROR: Failed to load config from {config_path}: {e}");
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!(
        server = %config.server.name,
        network = %config.server.network,
        listen = %config.listen.address,
        backend = %config.backend.base_url,
        "Starting tenantircd"
    );

    metrics::init();

    if config.server.metrics_port != 0 {
        let port = config.server.metrics_port;
        tokio::spawn(async move {
            http::run_http_server(port).await;
        });
    }

    let backend = backend::BackendClient::new(
        config.backend.base_url.clone(),
        config.backend.request_timeout(),
    );

    let shared = SharedState {
        server_name: Arc::from(config.server.name.as_str()),
        network_name: Arc::from(config.server.network.as_str()),
        tenants: Arc::new(TenantRegistry::new()),
        tenant_aware: Arc::new(TenantAwareRegistry::new()),
        backend: Arc::new(backend),
        limits: Arc::new(config.limits.clone()),
    };

    let registry = Arc::new(Registry::new());

    let gateway = match Gateway::bind(config.listen.address, shared, registry).await {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(address = %config.listen.address, error = %e, "Failed to bind listener");
            return Err(anyhow::anyhow!("failed to bind {}: {e}", config.listen.address));
        }
    };

    tokio::select! {
        result = gateway.run() => {
            if let Err(e) = result {
                error!(error = %e, "Gateway accept loop terminated");
                return Err(anyhow::anyhow!("gateway accept loop failed: {e}"));
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, exiting");
        }
    }

    Ok(())
}

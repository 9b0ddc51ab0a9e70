//! tenantircd - multi-tenant IRC-protocol bridge to a record-oriented HTTP backend.
//!
//! The binary (`src/main.rs`) is a thin wrapper around this library: it parses
//! the CLI, loads config, and wires up the pieces declared here. Integration
//! tests drive the same `network::Gateway` the binary does, bound to an
//! ephemeral port, rather than spawning a subprocess.

pub mod backend;
pub mod config;
pub mod error;
pub mod functions;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod network;
pub mod proto;
pub mod state;
pub mod telemetry;
pub mod validation;

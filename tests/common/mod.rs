//! Shared integration test harness: an in-process `Gateway` on an ephemeral
//! port plus a `wiremock` stand-in for the backend it talks to.

#![allow(dead_code)]

pub mod client;
pub mod server;

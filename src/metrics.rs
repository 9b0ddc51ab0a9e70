//! Prometheus metrics collection for tenantircd.
//!
//! Provides production-ready observability via Prometheus metrics exposed on
//! an HTTP endpoint. Tracks server health, message throughput, function
//! dispatcher usage, and tenant/channel/user population.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    // ========================================================================
    // Counters (monotonic increasing)
    // ========================================================================

    /// Total IRC messages successfully sent to clients (fan-out units, not lines).
    pub static ref MESSAGES_SENT: IntCounter = IntCounter::new(
        "irc_messages_sent_total",
        "Total messages sent"
    ).unwrap();

    /// Total commands dispatched to a handler.
    pub static ref COMMANDS_PROCESSED: IntCounter = IntCounter::new(
        "irc_commands_processed_total",
        "Total commands processed"
    ).unwrap();

    /// Total commands that returned an error reply.
    pub static ref COMMAND_ERRORS: IntCounter = IntCounter::new(
        "irc_command_errors_total",
        "Total commands that errored"
    ).unwrap();

    /// Total `!`-prefixed function invocations dispatched from channel messages.
    pub static ref FUNCTION_CALLS: IntCounter = IntCounter::new(
        "irc_function_calls_total",
        "Total function dispatcher invocations"
    ).unwrap();

    /// Total backend HTTP calls that returned an error.
    pub static ref BACKEND_ERRORS: IntCounter = IntCounter::new(
        "irc_backend_errors_total",
        "Total backend requests that errored"
    ).unwrap();

    // ========================================================================
    // Gauges (can increase/decrease)
    // ========================================================================

    /// Currently connected (registered) users, summed across all tenants.
    pub static ref CONNECTED_USERS: IntGauge = IntGauge::new(
        "irc_connected_users",
        "Currently connected users"
    ).unwrap();

    /// Currently active tenants.
    pub static ref ACTIVE_TENANTS: IntGauge = IntGauge::new(
        "irc_active_tenants",
        "Currently active tenants"
    ).unwrap();

    /// Currently active channels, summed across all tenants.
    pub static ref ACTIVE_CHANNELS: IntGauge = IntGauge::new(
        "irc_active_channels",
        "Active channels"
    ).unwrap();

    /// Command handling latency, in seconds.
    pub static ref COMMAND_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "irc_command_duration_seconds",
            "Command handler execution time in seconds"
        )
    ).unwrap();
}

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    REGISTRY.register(Box::new(MESSAGES_SENT.clone())).unwrap();
    REGISTRY.register(Box::new(COMMANDS_PROCESSED.clone())).unwrap();
    REGISTRY.register(Box::new(COMMAND_ERRORS.clone())).unwrap();
    REGISTRY.register(Box::new(FUNCTION_CALLS.clone())).unwrap();
    REGISTRY.register(Box::new(BACKEND_ERRORS.clone())).unwrap();
    REGISTRY.register(Box::new(CONNECTED_USERS.clone())).unwrap();
    REGISTRY.register(Box::new(ACTIVE_TENANTS.clone())).unwrap();
    REGISTRY.register(Box::new(ACTIVE_CHANNELS.clone())).unwrap();
    REGISTRY
        .register(Box::new(COMMAND_DURATION_SECONDS.clone()))
        .unwrap();
}

/// Record a completed command's handling duration.
pub fn record_command(_command: &str, duration_secs: f64) {
    COMMANDS_PROCESSED.inc();
    COMMAND_DURATION_SECONDS.observe(duration_secs);
}

/// Record a command that ended in an error reply.
pub fn record_command_error(_command: &str, _error: &str) {
    COMMAND_ERRORS.inc();
}

/// Record a broadcast fan-out: one observation per recipient reached.
pub fn record_fanout(recipients: usize) {
    MESSAGES_SENT.inc_by(recipients as u64);
}

/// Record a `!`-function dispatcher invocation.
pub fn record_function_call() {
    FUNCTION_CALLS.inc();
}

/// Record a backend HTTP call that returned an error.
pub fn record_backend_error() {
    BACKEND_ERRORS.inc();
}

/// Gather all metrics and encode them in Prometheus text format.
///
/// Returns a string suitable for HTTP response on `/metrics` endpoint.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_command_increments_counter_and_histogram() {
        let before = COMMANDS_PROCESSED.get();
        record_command("PING", 0.01);
        assert_eq!(COMMANDS_PROCESSED.get(), before + 1);
    }

    #[test]
    fn record_fanout_adds_recipient_count() {
        let before = MESSAGES_SENT.get();
        record_fanout(3);
        assert_eq!(MESSAGES_SENT.get(), before + 3);
    }
}

//! IRC-aware structured tracing: spans carrying command/channel/nick context,
//! plus a `CommandTimer` guard that feeds [`crate::metrics`] on drop.
//!
//! Correlates logs across command processing, channel operations, and
//! message routing without needing every call site to thread raw strings
//! through `tracing::info!` by hand.

#![allow(dead_code)]

use std::time::Instant;
use tracing::{span, Level, Span};

/// IRC-specific trace context for structured logging.
#[derive(Debug, Clone, Default)]
pub struct IrcTraceContext {
    /// The IRC command being processed (e.g., "PRIVMSG", "JOIN").
    pub command: Option<String>,
    /// Target channel, if applicable.
    pub channel: Option<String>,
    /// Source nickname.
    pub source_nick: Option<String>,
    /// Target nickname (for PRIVMSG/NOTICE to users).
    pub target_nick: Option<String>,
    /// Tenant this operation belongs to.
    pub tenant: Option<String>,
    /// Client remote address.
    pub client_ip: Option<String>,
}

impl IrcTraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_source_nick(mut self, nick: impl Into<String>) -> Self {
        self.source_nick = Some(nick.into());
        self
    }

    pub fn with_target_nick(mut self, nick: impl Into<String>) -> Self {
        self.target_nick = Some(nick.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Create a tracing span from this context.
    pub fn into_span(self) -> Span {
        let command = self.command.as_deref().unwrap_or("unknown");
        span!(
            Level::INFO,
            "irc.command",
            command = command,
            channel = self.channel.as_deref(),
            source_nick = self.source_nick.as_deref(),
            target_nick = self.target_nick.as_deref(),
            tenant = self.tenant.as_deref(),
            client_ip = self.client_ip.as_deref(),
        )
    }
}

/// Guard for timing command execution and recording metrics. Records command
/// latency when dropped, regardless of how the handler returned.
pub struct CommandTimer {
    command: String,
    start: Instant,
}

impl CommandTimer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            start: Instant::now(),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop the timer and record an error label alongside the duration.
    pub fn record_error(self, error: &str) {
        crate::metrics::record_command_error(&self.command, error);
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_command(&self.command, duration);
    }
}

/// Create an IRC-aware tracing span for a command.
pub fn create_irc_span(command: &str, channel: Option<&str>, source_nick: Option<&str>) -> Span {
    let mut ctx = IrcTraceContext::new().with_command(command);
    if let Some(ch) = channel {
        ctx = ctx.with_channel(ch);
    }
    if let Some(nick) = source_nick {
        ctx = ctx.with_source_nick(nick);
    }
    ctx.into_span()
}

/// Create a span for channel operations.
pub fn create_channel_span(channel: &str, operation: &str) -> Span {
    span!(
        Level::DEBUG,
        "irc.channel",
        channel = channel,
        operation = operation,
    )
}

/// Create a span for message routing with fan-out tracking. Also records the
/// fan-out width as a metric, since this is the one place that knows it.
pub fn create_message_span(channel: &str, sender: &str, recipients: usize) -> Span {
    crate::metrics::record_fanout(recipients);
    span!(
        Level::DEBUG,
        "irc.message",
        channel = channel,
        sender = sender,
        recipients = recipients,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_context_builder() {
        let ctx = IrcTraceContext::new()
            .with_command("PRIVMSG")
            .with_channel("#test")
            .with_source_nick("alice")
            .with_target_nick("bob")
            .with_tenant("acme");

        assert_eq!(ctx.command.as_deref(), Some("PRIVMSG"));
        assert_eq!(ctx.channel.as_deref(), Some("#test"));
        assert_eq!(ctx.source_nick.as_deref(), Some("alice"));
        assert_eq!(ctx.target_nick.as_deref(), Some("bob"));
        assert_eq!(ctx.tenant.as_deref(), Some("acme"));
    }

    #[test]
    fn test_command_timer() {
        let timer = CommandTimer::new("TEST");
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.elapsed_secs();
        assert!(elapsed >= 0.01);
        drop(timer);
    }
}

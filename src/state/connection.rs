//! Per-socket connection state: the writer facade and the pre-registration
//! identity fields gated by the registration state machine.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::proto::Message;
use crate::state::user::AccessLevel;

/// Cheap, cloneable write-side handle to a connection's socket. Every outbound
/// line for this connection goes through `tx`, which is drained exclusively by
/// that connection's dedicated writer task — the channel itself is the single
/// write-serialization point (no explicit write mutex needed; see design notes
/// on the concurrency model).
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub remote_host: String,
    tx: mpsc::UnboundedSender<String>,
    caps: Arc<RwLock<HashSet<String>>>,
}

impl ConnectionHandle {
    pub fn new(remote_host: String, tx: mpsc::UnboundedSender<String>) -> Self {
        ConnectionHandle {
            id: Uuid::new_v4(),
            remote_host,
            tx,
            caps: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.caps.read().contains(cap)
    }

    pub fn enabled_capabilities(&self) -> Vec<String> {
        self.caps.read().iter().cloned().collect()
    }

    pub fn enable_capability(&self, cap: &str) {
        self.caps.write().insert(cap.to_string());
    }

    pub fn disable_capability(&self, cap: &str) {
        self.caps.write().remove(cap);
    }

    /// Render `msg` for this recipient (applying the `server-time` tag if the
    /// recipient has enabled it) and queue it on the writer task. A closed
    /// receiver means the connection is already gone; silently drop.
    pub fn send(&self, msg: &Message) {
        let line = msg.render_line(self.has_capability("server-time"));
        let _ = self.tx.send(line);
    }

    pub fn send_raw(&self, line: String) {
        let _ = self.tx.send(line);
    }
}

/// Registration state machine: `New -> CapNegotiating? -> Authenticating -> Registered -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegState {
    New,
    CapNegotiating,
    Authenticating,
    Registered,
    Closed,
}

/// Mutable per-socket state owned by the connection's read-loop task. Holds
/// the pre-registration identity fields; once registration completes a `User`
/// owns them logically, but `Connection` keeps its own copies for quick
/// write-path access (mirroring the nickname/tenant the handlers need without
/// re-locking the `User`).
pub struct Connection {
    pub id: Uuid,
    pub remote_host: String,
    pub handle: ConnectionHandle,
    pub state: RegState,
    pub cap_negotiating: bool,
    pub nickname: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
    pub tenant_name: Option<String>,
    pub access: Option<AccessLevel>,
    pub token: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Connection {
    pub fn new(remote_host: String, handle: ConnectionHandle) -> Self {
        let now = Utc::now();
        Connection {
            id: handle.id,
            remote_host,
            handle,
            state: RegState::New,
            cap_negotiating: false,
            nickname: None,
            username: None,
            realname: None,
            tenant_name: None,
            access: None,
            token: None,
            connected_at: now,
            last_activity: now,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.state == RegState::Registered
    }

    /// Registration completes once identity + auth are present and the
    /// client isn't mid capability-negotiation.
    pub fn ready_to_register(&self) -> bool {
        !self.cap_negotiating
            && self.nickname.is_some()
            && self.username.is_some()
            && self.token.is_some()
    }

    pub fn nick_or_star(&self) -> String {
        self.nickname.clone().unwrap_or_else(|| "*".to_string())
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handle() -> ConnectionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ConnectionHandle::new("127.0.0.1".into(), tx)
    }

    #[test]
    fn not_ready_until_cap_negotiation_ends() {
        let mut conn = Connection::new("127.0.0.1".into(), test_handle());
        conn.nickname = Some("alice".into());
        conn.username = Some("root".into());
        conn.token = Some("T".into());
        conn.cap_negotiating = true;
        assert!(!conn.ready_to_register());
        conn.cap_negotiating = false;
        assert!(conn.ready_to_register());
    }

    #[test]
    fn nick_or_star_defaults_to_star() {
        let conn = Connection::new("127.0.0.1".into(), test_handle());
        assert_eq!(conn.nick_or_star(), "*");
    }
}

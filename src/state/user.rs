//! User identity: `tenant:username`, access level, capabilities, channel set.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::connection::ConnectionHandle;

/// Authorization tier returned by backend login; determines default channel role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Read,
    Edit,
    Full,
    Root,
}

impl AccessLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "root" => Some(Self::Root),
            "full" => Some(Self::Full),
            "edit" => Some(Self::Edit),
            "read" => Some(Self::Read),
            _ => None,
        }
    }

    /// Whether this access level satisfies a schema's `describe` permission
    /// gate for elevated operations (kick fallback, forcejoin/forcepart).
    pub fn is_at_least_edit(self) -> bool {
        self >= Self::Edit
    }
}

/// One per authenticated identity within a tenant. `identity()` (`tenant:username`)
/// is the globally-unique key; nickname is unique only within the tenant.
pub struct User {
    pub tenant: String,
    pub username: String,
    inner: Mutex<UserInner>,
}

struct UserInner {
    nickname: String,
    realname: String,
    access: AccessLevel,
    away: Option<String>,
    modes: HashSet<char>,
    channels: HashSet<String>,
    nick_history: Vec<String>,
    created_at: DateTime<Utc>,
    connection: Option<ConnectionHandle>,
}

impl User {
    pub fn new(
        tenant: impl Into<String>,
        username: impl Into<String>,
        nickname: impl Into<String>,
        realname: impl Into<String>,
        access: AccessLevel,
        connection: ConnectionHandle,
    ) -> Self {
        let nickname = nickname.into();
        User {
            tenant: tenant.into(),
            username: username.into(),
            inner: Mutex::new(UserInner {
                nickname: nickname.clone(),
                realname: realname.into(),
                access,
                away: None,
                modes: HashSet::new(),
                channels: HashSet::new(),
                nick_history: vec![nickname],
                created_at: Utc::now(),
                connection: Some(connection),
            }),
        }
    }

    pub fn identity(&self) -> String {
        format!("{}:{}", self.tenant, self.username)
    }

    pub fn nickname(&self) -> String {
        self.inner.lock().nickname.clone()
    }

    pub fn realname(&self) -> String {
        self.inner.lock().realname.clone()
    }

    pub fn access(&self) -> AccessLevel {
        self.inner.lock().access
    }

    pub fn away(&self) -> Option<String> {
        self.inner.lock().away.clone()
    }

    pub fn set_away(&self, reason: Option<String>) {
        self.inner.lock().away = reason;
    }

    /// Rename in place, recording the old nick in history (union/append-only,
    /// deduplicated so repeated renames to the same nick don't pollute it).
    pub fn rename(&self, new_nick: &str) {
        let mut inner = self.inner.lock();
        inner.nickname = new_nick.to_string();
        if !inner.nick_history.iter().any(|n| n == new_nick) {
            inner.nick_history.push(new_nick.to_string());
        }
    }

    pub fn nick_history(&self) -> Vec<String> {
        self.inner.lock().nick_history.clone()
    }

    pub fn channels(&self) -> Vec<String> {
        self.inner.lock().channels.iter().cloned().collect()
    }

    pub fn is_on_channel(&self, channel: &str) -> bool {
        self.inner.lock().channels.contains(channel)
    }

    pub fn add_channel(&self, channel: impl Into<String>) {
        self.inner.lock().channels.insert(channel.into());
    }

    pub fn remove_channel(&self, channel: &str) {
        self.inner.lock().channels.remove(channel);
    }

    pub fn has_mode(&self, m: char) -> bool {
        self.inner.lock().modes.contains(&m)
    }

    pub fn modes(&self) -> HashSet<char> {
        self.inner.lock().modes.clone()
    }

    pub fn apply_mode(&self, add: bool, m: char) {
        let mut inner = self.inner.lock();
        if add {
            inner.modes.insert(m);
        } else {
            inner.modes.remove(&m);
        }
    }

    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.inner.lock().connection.clone()
    }

    pub fn set_connection(&self, handle: Option<ConnectionHandle>) {
        self.inner.lock().connection = handle;
    }

    /// `nick!username@tenant`, as used in every server-emitted line naming
    /// this user (the tenant name stands in for "host").
    pub fn prefix(&self) -> crate::proto::Prefix {
        crate::proto::Prefix::User {
            nick: self.nickname(),
            user: self.username.clone(),
            host: self.tenant.clone(),
        }
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.connection()
            .map(|c| c.has_capability(cap))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::connection::ConnectionHandle;
    use tokio::sync::mpsc;

    fn test_handle() -> ConnectionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        ConnectionHandle::new("127.0.0.1".into(), tx)
    }

    #[test]
    fn access_level_ordering() {
        assert!(AccessLevel::Root > AccessLevel::Full);
        assert!(AccessLevel::Full > AccessLevel::Edit);
        assert!(AccessLevel::Edit > AccessLevel::Read);
    }

    #[test]
    fn rename_appends_history_without_duplicates() {
        let user = User::new(
            "acme",
            "root",
            "alice",
            "Alice",
            AccessLevel::Root,
            test_handle(),
        );
        user.rename("alice2");
        user.rename("alice2");
        assert_eq!(user.nick_history(), vec!["alice", "alice2"]);
    }

    #[test]
    fn identity_is_tenant_colon_username() {
        let user = User::new(
            "acme",
            "root",
            "alice",
            "Alice",
            AccessLevel::Root,
            test_handle(),
        );
        assert_eq!(user.identity(), "acme:root");
    }
}

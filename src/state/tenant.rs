//! Tenant isolation boundary, the top-level registry, and the process-global
//! tenant-aware fan-out plane.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::proto::Message;
use crate::state::channel::Channel;
use crate::state::connection::ConnectionHandle;
use crate::state::user::User;

/// One per tenant-name. Owns its Users and Channels; cross-tenant lookups
/// never succeed through this type's API — every accessor is scoped to
/// `self`.
pub struct Tenant {
    pub name: String,
    pub created_at: DateTime<Utc>,
    inner: Mutex<TenantInner>,
}

struct TenantInner {
    users_by_nick: HashMap<String, Arc<User>>,
    users_by_conn: HashMap<Uuid, Arc<User>>,
    channels: HashMap<String, Arc<Channel>>,
    last_activity: DateTime<Utc>,
}

impl Tenant {
    fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Tenant {
            name: name.into(),
            created_at: now,
            inner: Mutex::new(TenantInner {
                users_by_nick: HashMap::new(),
                users_by_conn: HashMap::new(),
                channels: HashMap::new(),
                last_activity: now,
            }),
        }
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().users_by_nick.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user_count() == 0
    }

    pub fn touch(&self) {
        self.inner.lock().last_activity = Utc::now();
    }

    /// Insert a freshly-registered user, keyed by its current nickname and
    /// connection id. Fails (returns `false`) if the nickname is already
    /// taken within this tenant — the nickname->User index must stay
    /// injective.
    pub fn insert_user(&self, conn_id: Uuid, user: Arc<User>) -> bool {
        let nick = user.nickname();
        let mut inner = self.inner.lock();
        if inner.users_by_nick.contains_key(&nick) {
            return false;
        }
        inner.users_by_nick.insert(nick, user.clone());
        inner.users_by_conn.insert(conn_id, user);
        inner.last_activity = Utc::now();
        true
    }

    pub fn rename_user(&self, old_nick: &str, new_nick: &str, user: Arc<User>) -> bool {
        let mut inner = self.inner.lock();
        if inner.users_by_nick.contains_key(new_nick) {
            return false;
        }
        inner.users_by_nick.remove(old_nick);
        inner.users_by_nick.insert(new_nick.to_string(), user);
        true
    }

    pub fn user_by_nick(&self, nick: &str) -> Option<Arc<User>> {
        self.inner.lock().users_by_nick.get(nick).cloned()
    }

    pub fn user_by_conn(&self, conn_id: Uuid) -> Option<Arc<User>> {
        self.inner.lock().users_by_conn.get(&conn_id).cloned()
    }

    pub fn nick_in_use(&self, nick: &str) -> bool {
        self.inner.lock().users_by_nick.contains_key(nick)
    }

    pub fn remove_user(&self, conn_id: Uuid, nick: &str) {
        let mut inner = self.inner.lock();
        inner.users_by_conn.remove(&conn_id);
        inner.users_by_nick.remove(nick);
    }

    pub fn get_or_create_channel(
        &self,
        name: &str,
        created_by: &str,
    ) -> (Arc<Channel>, bool) {
        let mut inner = self.inner.lock();
        if let Some(chan) = inner.channels.get(name) {
            return (chan.clone(), false);
        }
        let chan = Arc::new(Channel::new(name, self.name.clone(), created_by));
        inner.channels.insert(name.to_string(), chan.clone());
        (chan, true)
    }

    pub fn channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.inner.lock().channels.get(name).cloned()
    }

    /// Garbage-collect a channel if it has become empty. Safe to call
    /// speculatively after any member removal. Returns whether the channel
    /// was actually removed.
    pub fn gc_channel_if_empty(&self, name: &str) -> bool {
        let mut inner = self.inner.lock();
        if let Some(chan) = inner.channels.get(name) {
            if chan.is_empty() {
                inner.channels.remove(name);
                return true;
            }
        }
        false
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.inner.lock().channels.keys().cloned().collect()
    }
}

/// Top-level map of tenant-name -> Tenant. Creates tenants lazily on first
/// user and destroys them (implicitly, via `Arc` drop) once the last user
/// leaves and the caller stops holding a reference.
#[derive(Default)]
pub struct TenantRegistry {
    tenants: DashMap<String, Arc<Tenant>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tenant, creating it if this is its first reference.
    /// `bool` is `true` iff this call created the tenant (used to trigger
    /// the `TENANTJOIN` lifecycle notification).
    pub fn get_or_create(&self, name: &str) -> (Arc<Tenant>, bool) {
        if let Some(existing) = self.tenants.get(name) {
            return (existing.clone(), false);
        }
        let tenant = Arc::new(Tenant::new(name));
        self.tenants.insert(name.to_string(), tenant.clone());
        (tenant, true)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tenant>> {
        self.tenants.get(name).map(|t| t.clone())
    }

    /// Remove a tenant from the registry if it currently has no users.
    /// Returns `true` if this call removed it (used to trigger `TENANTPART`).
    pub fn remove_if_empty(&self, name: &str) -> bool {
        let should_remove = self
            .tenants
            .get(name)
            .map(|t| t.is_empty())
            .unwrap_or(false);
        if should_remove {
            self.tenants.remove(name);
        }
        should_remove
    }

    pub fn tenant_names(&self) -> Vec<String> {
        self.tenants.iter().map(|e| e.key().clone()).collect()
    }
}

/// Process-global set of connections that enabled `tenant-aware`. A single
/// process-wide lock; callers snapshot and release before fanning out so no
/// lock is held while writing sockets.
#[derive(Default)]
pub struct TenantAwareRegistry {
    connections: Mutex<HashMap<Uuid, ConnectionHandle>>,
}

impl TenantAwareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handle: ConnectionHandle) {
        self.connections.lock().insert(handle.id, handle);
    }

    pub fn remove(&self, id: Uuid) {
        self.connections.lock().remove(&id);
    }

    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.lock().values().cloned().collect()
    }

    pub fn broadcast(&self, msg: &Message) {
        for handle in self.snapshot() {
            handle.send(msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::user::AccessLevel;
    use tokio::sync::mpsc;

    fn test_user(tenant: &str, nick: &str) -> Arc<User> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle::new("127.0.0.1".into(), tx);
        Arc::new(User::new(
            tenant,
            nick,
            nick,
            "Real Name",
            AccessLevel::Root,
            handle,
        ))
    }

    #[test]
    fn get_or_create_only_creates_once() {
        let registry = TenantRegistry::new();
        let (t1, created1) = registry.get_or_create("acme");
        let (t2, created2) = registry.get_or_create("acme");
        assert!(created1);
        assert!(!created2);
        assert!(Arc::ptr_eq(&t1, &t2));
    }

    #[test]
    fn nickname_injective_within_tenant() {
        let tenant = Tenant::new("acme");
        let user_a = test_user("acme", "alice");
        let user_b = test_user("acme", "alice");
        assert!(tenant.insert_user(Uuid::new_v4(), user_a));
        assert!(!tenant.insert_user(Uuid::new_v4(), user_b));
    }

    #[test]
    fn tenant_isolation_is_structural() {
        let registry = TenantRegistry::new();
        let (acme, _) = registry.get_or_create("acme");
        let (globex, _) = registry.get_or_create("globex");
        let alice = test_user("acme", "alice");
        acme.insert_user(Uuid::new_v4(), alice);
        assert!(acme.user_by_nick("alice").is_some());
        assert!(globex.user_by_nick("alice").is_none());
    }

    #[test]
    fn channel_gc_on_empty() {
        let tenant = Tenant::new("acme");
        let (chan, created) = tenant.get_or_create_channel("#users", "alice");
        assert!(created);
        chan.add_member("alice", crate::state::channel::RoleSet::OPERATOR);
        chan.remove_member("alice");
        tenant.gc_channel_if_empty("#users");
        assert!(tenant.channel("#users").is_none());
    }
}

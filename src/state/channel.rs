//! Channel state: membership, roles, topic, modes, and permission predicates.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Per-member role marks. Precedence for display/prefix purposes is
/// `@` (operator) > `%` (halfop) > `+` (voice).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSet {
    pub operator: bool,
    pub halfop: bool,
    pub voice: bool,
}

impl RoleSet {
    pub const OPERATOR: Self = RoleSet {
        operator: true,
        halfop: false,
        voice: false,
    };
    pub const VOICE: Self = RoleSet {
        operator: false,
        halfop: false,
        voice: true,
    };
    pub const NONE: Self = RoleSet {
        operator: false,
        halfop: false,
        voice: false,
    };

    /// Highest-precedence prefix char for NAMES rendering, or `None` if the
    /// member holds no role.
    pub fn prefix_char(&self) -> Option<char> {
        if self.operator {
            Some('@')
        } else if self.halfop {
            Some('%')
        } else if self.voice {
            Some('+')
        } else {
            None
        }
    }

    /// All prefix chars in precedence order, for `multi-prefix`.
    pub fn all_prefix_chars(&self) -> String {
        let mut s = String::new();
        if self.operator {
            s.push('@');
        }
        if self.halfop {
            s.push('%');
        }
        if self.voice {
            s.push('+');
        }
        s
    }

    pub fn has_op_or_higher(&self) -> bool {
        self.operator
    }

    pub fn has_voice_or_higher(&self) -> bool {
        self.operator || self.halfop || self.voice
    }
}

#[derive(Debug, Clone)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: DateTime<Utc>,
}

/// Cached aggregate metadata fetched from the backend when a schema channel
/// is first created.
#[derive(Debug, Clone)]
pub struct SchemaMeta {
    pub record_count: u64,
    pub min_created: Option<String>,
    pub max_created: Option<String>,
    pub max_updated: Option<String>,
}

/// One per `#name` within a tenant. `schema`/`record_id` decompose the name
/// at the first `/` after the leading `#`.
pub struct Channel {
    pub name: String,
    pub schema: String,
    pub record_id: Option<String>,
    pub tenant: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    inner: Mutex<ChannelInner>,
}

struct ChannelInner {
    members: HashMap<String, RoleSet>,
    topic: Option<Topic>,
    modes: std::collections::HashSet<char>,
    key: Option<String>,
    schema_meta: Option<SchemaMeta>,
}

impl Channel {
    /// Split `#schema[/recordId]` into its parts. Returns `None` if `name`
    /// doesn't start with `#`.
    pub fn parse_name(name: &str) -> Option<(String, Option<String>)> {
        let rest = name.strip_prefix('#')?;
        match rest.split_once('/') {
            Some((schema, record_id)) => Some((schema.to_string(), Some(record_id.to_string()))),
            None => Some((rest.to_string(), None)),
        }
    }

    pub fn new(name: impl Into<String>, tenant: impl Into<String>, created_by: impl Into<String>) -> Self {
        let name = name.into();
        let (schema, record_id) = Self::parse_name(&name).unwrap_or((name.clone(), None));
        Channel {
            name,
            schema,
            record_id,
            tenant: tenant.into(),
            created_at: Utc::now(),
            created_by: created_by.into(),
            inner: Mutex::new(ChannelInner {
                members: HashMap::new(),
                topic: None,
                modes: std::collections::HashSet::new(),
                key: None,
                schema_meta: None,
            }),
        }
    }

    pub fn is_record_channel(&self) -> bool {
        self.record_id.is_some()
    }

    pub fn schema_meta(&self) -> Option<SchemaMeta> {
        self.inner.lock().schema_meta.clone()
    }

    pub fn set_schema_meta(&self, meta: SchemaMeta) {
        self.inner.lock().schema_meta = Some(meta);
    }

    pub fn topic(&self) -> Option<Topic> {
        self.inner.lock().topic.clone()
    }

    pub fn set_topic(&self, text: Option<String>, set_by: &str) {
        let mut inner = self.inner.lock();
        inner.topic = text.map(|text| Topic {
            text,
            set_by: set_by.to_string(),
            set_at: Utc::now(),
        });
    }

    pub fn has_mode(&self, m: char) -> bool {
        self.inner.lock().modes.contains(&m)
    }

    pub fn modes(&self) -> std::collections::HashSet<char> {
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

    pub fn key(&self) -> Option<String> {
        self.inner.lock().key.clone()
    }

    pub fn set_key(&self, key: Option<String>) {
        let mut inner = self.inner.lock();
        if key.is_some() {
            inner.modes.insert('k');
        } else {
            inner.modes.remove(&'k');
        }
        inner.key = key;
    }

    pub fn member_count(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_count() == 0
    }

    pub fn role_of(&self, nick: &str) -> Option<RoleSet> {
        self.inner.lock().members.get(nick).copied()
    }

    pub fn is_member(&self, nick: &str) -> bool {
        self.inner.lock().members.contains_key(nick)
    }

    pub fn add_member(&self, nick: impl Into<String>, role: RoleSet) {
        self.inner.lock().members.insert(nick.into(), role);
    }

    pub fn remove_member(&self, nick: &str) {
        self.inner.lock().members.remove(nick);
    }

    /// Snapshot of `(nick, role)` pairs, for broadcast fan-out or NAMES.
    pub fn members_snapshot(&self) -> Vec<(String, RoleSet)> {
        self.inner
            .lock()
            .members
            .iter()
            .map(|(nick, role)| (nick.clone(), *role))
            .collect()
    }

    // -- Permission predicates --------------------------------------------

    pub fn can_send_message(&self, nick: &str) -> bool {
        let inner = self.inner.lock();
        let role = inner.members.get(nick).copied();
        if inner.modes.contains(&'m') && !role.map(|r| r.has_voice_or_higher()).unwrap_or(false) {
            return false;
        }
        if inner.modes.contains(&'n') && role.is_none() {
            return false;
        }
        true
    }

    pub fn can_set_topic(&self, nick: &str) -> bool {
        let inner = self.inner.lock();
        let role = inner.members.get(nick).copied();
        if inner.modes.contains(&'t') {
            role.map(|r| r.has_op_or_higher()).unwrap_or(false)
        } else {
            role.is_some()
        }
    }

    pub fn can_kick(&self, nick: &str) -> bool {
        self.role_of(nick)
            .map(|r| r.has_op_or_higher())
            .unwrap_or(false)
    }

    pub fn can_invite(&self, nick: &str) -> bool {
        let inner = self.inner.lock();
        let role = inner.members.get(nick).copied();
        if inner.modes.contains(&'i') {
            role.map(|r| r.has_op_or_higher()).unwrap_or(false)
        } else {
            role.is_some()
        }
    }

    pub fn can_join(&self, supplied_key: Option<&str>) -> Result<(), crate::error::ChannelError> {
        let inner = self.inner.lock();
        if inner.modes.contains(&'i') {
            return Err(crate::error::ChannelError::InviteOnly(String::new()));
        }
        if let Some(key) = &inner.key {
            if supplied_key != Some(key.as_str()) {
                return Err(crate::error::ChannelError::BadChannelKey(String::new()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schema_only_name() {
        let (schema, record_id) = Channel::parse_name("#users").unwrap();
        assert_eq!(schema, "users");
        assert_eq!(record_id, None);
    }

    #[test]
    fn parses_record_channel_name() {
        let (schema, record_id) = Channel::parse_name("#users/42").unwrap();
        assert_eq!(schema, "users");
        assert_eq!(record_id.as_deref(), Some("42"));
    }

    #[test]
    fn role_prefix_precedence() {
        let role = RoleSet {
            operator: true,
            halfop: true,
            voice: true,
        };
        assert_eq!(role.prefix_char(), Some('@'));
        assert_eq!(role.all_prefix_chars(), "@%+");
    }

    #[test]
    fn moderated_channel_blocks_non_voiced() {
        let chan = Channel::new("#users", "acme", "alice");
        chan.apply_mode(true, 'm');
        chan.add_member("alice", RoleSet::OPERATOR);
        chan.add_member("bob", RoleSet::NONE);
        assert!(chan.can_send_message("alice"));
        assert!(!chan.can_send_message("bob"));
    }

    #[test]
    fn empty_after_last_part() {
        let chan = Channel::new("#users", "acme", "alice");
        chan.add_member("alice", RoleSet::OPERATOR);
        assert!(!chan.is_empty());
        chan.remove_member("alice");
        assert!(chan.is_empty());
    }

    #[test]
    fn invite_only_blocks_join() {
        let chan = Channel::new("#users", "acme", "alice");
        chan.apply_mode(true, 'i');
        assert!(chan.can_join(None).is_err());
    }

    #[test]
    fn key_mismatch_blocks_join() {
        let chan = Channel::new("#users", "acme", "alice");
        chan.set_key(Some("secret".into()));
        assert!(chan.can_join(Some("wrong")).is_err());
        assert!(chan.can_join(Some("secret")).is_ok());
    }
}

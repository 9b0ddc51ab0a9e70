//! Command dispatch: the static table and the per-command handler trait.

mod channel;
mod messaging;
mod misc;
mod registration;

pub(crate) use channel::do_join;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::BackendClient;
use crate::config::LimitsConfig;
use crate::error::HandlerError;
use crate::state::{Connection, TenantAwareRegistry, TenantRegistry};

/// Shared, process-wide state every connection's handlers need access to.
/// Cheaply cloneable; every field is already `Arc`-backed internally or is
/// plain config data.
#[derive(Clone)]
pub struct SharedState {
    pub server_name: Arc<str>,
    pub network_name: Arc<str>,
    pub tenants: Arc<TenantRegistry>,
    pub tenant_aware: Arc<TenantAwareRegistry>,
    pub backend: Arc<BackendClient>,
    pub limits: Arc<LimitsConfig>,
}

/// Everything a handler needs for one command invocation.
pub struct Context<'a> {
    pub conn: &'a mut Connection,
    pub shared: &'a SharedState,
}

impl<'a> Context<'a> {
    pub fn server_name(&self) -> &str {
        &self.shared.server_name
    }

    pub fn nick_or_star(&self) -> String {
        self.conn.nick_or_star()
    }
}

pub type HandlerResult = Result<(), HandlerError>;

/// Resolve the current connection's tenant and user, for handlers that run
/// only once registered (registration is already enforced by the dispatch
/// gate; a missing tenant/user past that point is an internal inconsistency).
pub(crate) fn current_user(
    ctx: &Context<'_>,
) -> Result<(Arc<crate::state::Tenant>, Arc<crate::state::User>), HandlerError> {
    let tenant_name = ctx
        .conn
        .tenant_name
        .clone()
        .ok_or(HandlerError::NotRegistered)?;
    let tenant = ctx
        .shared
        .tenants
        .get(&tenant_name)
        .ok_or_else(|| HandlerError::Internal("tenant vanished".into()))?;
    let user = tenant
        .user_by_conn(ctx.conn.id)
        .ok_or_else(|| HandlerError::Internal("user vanished".into()))?;
    Ok((tenant, user))
}

/// Tear down a connection's tenant-side state: broadcast QUIT to every
/// channel the user is in (excluding the quitter), remove it from all
/// membership indices, gc empty channels, drop the tenant if it's now empty,
/// release the tenant-aware registry slot, and write the closing `ERROR`
/// line. Shared by the explicit `QUIT` handler and the read loop's implicit
/// disconnect path (socket EOF/error) so both go through one cleanup.
pub async fn disconnect(ctx: &mut Context<'_>, reason: String) {
    if let Some(tenant_name) = ctx.conn.tenant_name.clone() {
        if let Some(tenant) = ctx.shared.tenants.get(&tenant_name) {
            if let Some(user) = tenant.user_by_conn(ctx.conn.id) {
                let nick = user.nickname();
                let quit_msg = crate::proto::Message::new("QUIT")
                    .with_prefix(user.prefix())
                    .with_trailing(reason.clone());
                for chan_name in user.channels() {
                    if let Some(chan) = tenant.channel(&chan_name) {
                        for (member_nick, _) in chan.members_snapshot() {
                            if member_nick == nick {
                                continue;
                            }
                            if let Some(member) = tenant.user_by_nick(&member_nick) {
                                if let Some(handle) = member.connection() {
                                    handle.send(&quit_msg);
                                }
                            }
                        }
                        chan.remove_member(&nick);
                        if tenant.gc_channel_if_empty(&chan_name) {
                            crate::metrics::ACTIVE_CHANNELS.dec();
                        }
                    }
                }
                tenant.remove_user(ctx.conn.id, &nick);
                crate::metrics::CONNECTED_USERS.dec();
                if ctx.shared.tenants.remove_if_empty(&tenant_name) {
                    crate::metrics::ACTIVE_TENANTS.dec();
                    let msg = crate::proto::Message::new("TENANTPART")
                        .with_prefix(crate::proto::Prefix::Server(ctx.server_name().to_string()))
                        .with_params(vec![tenant_name]);
                    ctx.shared.tenant_aware.broadcast(&msg);
                }
            }
        }
    }
    ctx.shared.tenant_aware.remove(ctx.conn.id);
    ctx.conn
        .handle
        .send_raw(format!("ERROR :Closing connection: {reason}\r\n"));
}

/// A command handler: one per IRC verb. Flat and runtime-gated rather than
/// typestate-generic — this bridge's registration gate is a single bool
/// check, not a family of pre/post-registration trait hierarchies.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn needs_registration(&self) -> bool;
    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult;
}

/// Static `COMMAND -> handler` dispatch table, built once at startup.
pub struct Registry {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Box<dyn CommandHandler>> = HashMap::new();

        macro_rules! register {
            ($handler:expr) => {{
                let h = $handler;
                handlers.insert(h.name(), Box::new(h));
            }};
        }

        register!(registration::CapHandler);
        register!(registration::NickHandler);
        register!(registration::UserHandler);
        register!(registration::PingHandler);
        register!(registration::PongHandler);
        register!(registration::QuitHandler);

        register!(channel::JoinHandler);
        register!(channel::PartHandler);
        register!(channel::KickHandler);
        register!(channel::TopicHandler);
        register!(channel::InviteHandler);
        register!(channel::ModeHandler);
        register!(channel::ForceJoinHandler);
        register!(channel::ForcePartHandler);

        register!(messaging::PrivmsgHandler);
        register!(messaging::NoticeHandler);

        for h in misc::notimpl_handlers() {
            handlers.insert(h.name(), h);
        }

        Registry { handlers }
    }

    pub fn get(&self, command: &str) -> Option<&dyn CommandHandler> {
        self.handlers.get(command).map(|h| h.as_ref())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_core_commands() {
        let registry = Registry::new();
        for cmd in ["NICK", "USER", "JOIN", "PART", "PRIVMSG", "CAP", "QUIT"] {
            assert!(registry.get(cmd).is_some(), "missing handler for {cmd}");
        }
    }

    #[test]
    fn unknown_command_is_absent() {
        let registry = Registry::new();
        assert!(registry.get("BOGUS").is_none());
    }
}

//! CAP negotiation, the NICK/USER registration flow, PING/PONG, and QUIT.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::proto::{numerics, Message, Prefix};
use crate::state::{AccessLevel, RegState, User};
use crate::validation::is_valid_nickname;

use super::{CommandHandler, Context, HandlerResult};

const SUPPORTED_CAPS: &[&str] = &[
    "multi-prefix",
    "tenant-aware",
    "extended-join",
    "invite-notify",
    "server-time",
    "force-join",
    "force-part",
];

const DEFAULT_MOTD_LINES: &[&str] = &[
    "Welcome to tenantircd.",
    "Channels map to backend schemas and records.",
    "Use !help in a channel to list available functions.",
];

struct ParsedNick {
    nick: String,
    username: Option<String>,
    tenant: Option<String>,
}

fn parse_nick_arg(arg: &str) -> ParsedNick {
    if let Some(at_idx) = arg.find('@') {
        if let Some(bang_idx) = arg.find('!') {
            if bang_idx < at_idx {
                return ParsedNick {
                    nick: arg[..bang_idx].to_string(),
                    username: Some(arg[bang_idx + 1..at_idx].to_string()),
                    tenant: Some(arg[at_idx + 1..].to_string()),
                };
            }
        }
        let user = &arg[..at_idx];
        return ParsedNick {
            nick: user.to_string(),
            username: Some(user.to_string()),
            tenant: Some(arg[at_idx + 1..].to_string()),
        };
    }
    ParsedNick {
        nick: arg.to_string(),
        username: None,
        tenant: None,
    }
}

/// `username@tenant` plus trailing realname, from `USER username@tenant <mode> <unused> :realname`.
fn parse_user_args(args: &str) -> Option<(String, Option<String>, String)> {
    let (params, trailing) = match args.find(':') {
        Some(idx) => (&args[..idx], args[idx + 1..].to_string()),
        None => (args, String::new()),
    };
    let mut tokens = params.split_whitespace();
    let user_tenant = tokens.next()?;
    let (user, tenant) = match user_tenant.split_once('@') {
        Some((u, t)) => (u.to_string(), Some(t.to_string())),
        None => (user_tenant.to_string(), None),
    };
    Some((user, tenant, trailing))
}

/// Complete registration once nickname, username, and an auth token are all
/// present and the client isn't mid capability-negotiation (spec §4.3's
/// `AUTHENTICATING -> REGISTERED` row). Safe to call after any of
/// NICK/USER/CAP END; a no-op if not yet ready.
async fn attempt_register(ctx: &mut Context<'_>) -> HandlerResult {
    if ctx.conn.is_registered() || !ctx.conn.ready_to_register() {
        return Ok(());
    }
    let nick = ctx.conn.nickname.clone().unwrap();
    let username = ctx.conn.username.clone().unwrap();
    let tenant_name = ctx.conn.tenant_name.clone().unwrap();
    let access = ctx.conn.access.unwrap();
    let realname = ctx.conn.realname.clone().unwrap_or_default();

    let (tenant, created) = ctx.shared.tenants.get_or_create(&tenant_name);
    if tenant.nick_in_use(&nick) {
        return Err(HandlerError::NicknameInUse(nick));
    }

    let user = Arc::new(User::new(
        tenant_name.clone(),
        username,
        nick.clone(),
        realname,
        access,
        ctx.conn.handle.clone(),
    ));
    tenant.insert_user(ctx.conn.id, user.clone());
    tenant.touch();
    ctx.conn.state = RegState::Registered;
    crate::metrics::CONNECTED_USERS.inc();

    if created {
        crate::metrics::ACTIVE_TENANTS.inc();
        let msg = Message::new("TENANTJOIN")
            .with_prefix(Prefix::Server(ctx.server_name().to_string()))
            .with_params(vec![tenant_name.clone()]);
        ctx.shared.tenant_aware.broadcast(&msg);
    }

    let server = ctx.server_name().to_string();
    let network = ctx.shared.network_name.to_string();
    let greeting = format!("Welcome to the {network} {}", user.prefix());
    let handle = ctx.conn.handle.clone();
    handle.send(&Message::numeric_text(
        &server,
        numerics::RPL_WELCOME,
        &nick,
        greeting,
    ));
    handle.send(&Message::numeric_text(
        &server,
        numerics::RPL_YOURHOST,
        &nick,
        format!("Your host is {server}, running tenantircd"),
    ));
    handle.send(&Message::numeric_text(
        &server,
        numerics::RPL_CREATED,
        &nick,
        "This server was created recently",
    ));
    handle.send(&Message::numeric(
        &server,
        numerics::RPL_MYINFO,
        &nick,
        vec![server.clone()],
    ));
    handle.send(&Message::numeric_text(
        &server,
        numerics::RPL_MOTDSTART,
        &nick,
        format!("- {server} Message of the day - "),
    ));
    for line in DEFAULT_MOTD_LINES {
        handle.send(&Message::numeric_text(
            &server,
            numerics::RPL_MOTD,
            &nick,
            format!("- {line}"),
        ));
    }
    handle.send(&Message::numeric_text(
        &server,
        numerics::RPL_ENDOFMOTD,
        &nick,
        "End of /MOTD command",
    ));
    Ok(())
}

pub struct NickHandler;

#[async_trait]
impl CommandHandler for NickHandler {
    fn name(&self) -> &'static str {
        "NICK"
    }

    fn needs_registration(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let token = args.split_whitespace().next().unwrap_or("");
        if token.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }
        let parsed = parse_nick_arg(token);
        if !is_valid_nickname(&parsed.nick) {
            return Err(HandlerError::ErroneousNickname(parsed.nick));
        }

        if ctx.conn.is_registered() {
            let tenant_name = ctx
                .conn
                .tenant_name
                .clone()
                .ok_or_else(|| HandlerError::Internal("registered connection missing tenant".into()))?;
            let tenant = ctx
                .shared
                .tenants
                .get(&tenant_name)
                .ok_or_else(|| HandlerError::Internal("tenant vanished".into()))?;
            if tenant.nick_in_use(&parsed.nick) {
                return Err(HandlerError::NicknameInUse(parsed.nick));
            }
            let user = tenant
                .user_by_conn(ctx.conn.id)
                .ok_or_else(|| HandlerError::Internal("user vanished".into()))?;
            let old_nick = user.nickname();
            let old_prefix = user.prefix();
            user.rename(&parsed.nick);
            tenant.rename_user(&old_nick, &parsed.nick, user.clone());
            ctx.conn.nickname = Some(parsed.nick.clone());

            let msg = Message::new("NICK")
                .with_prefix(old_prefix)
                .with_trailing(parsed.nick.clone());
            ctx.conn.handle.send(&msg);
            for chan_name in user.channels() {
                if let Some(chan) = tenant.channel(&chan_name) {
                    let role = chan.role_of(&old_nick).unwrap_or_default();
                    chan.remove_member(&old_nick);
                    chan.add_member(parsed.nick.clone(), role);
                    for (member_nick, _) in chan.members_snapshot() {
                        if member_nick == parsed.nick {
                            continue;
                        }
                        if let Some(member) = tenant.user_by_nick(&member_nick) {
                            if let Some(handle) = member.connection() {
                                handle.send(&msg);
                            }
                        }
                    }
                }
            }
            return Ok(());
        }

        if let Some(tenant_name) = parsed.tenant {
            let username = parsed.username.unwrap();
            match ctx.shared.backend.login(&tenant_name, &username).await {
                Ok(result) => {
                    let access = AccessLevel::parse(&result.access).unwrap_or(AccessLevel::Read);
                    ctx.conn.nickname = Some(parsed.nick);
                    ctx.conn.username = Some(username);
                    ctx.conn.tenant_name = Some(tenant_name);
                    ctx.conn.access = Some(access);
                    ctx.conn.token = Some(result.token);
                }
                Err(e) => return Err(HandlerError::AuthFailed(e.to_string())),
            }
        } else {
            ctx.conn.nickname = Some(parsed.nick);
        }
        attempt_register(ctx).await
    }
}

pub struct UserHandler;

#[async_trait]
impl CommandHandler for UserHandler {
    fn name(&self) -> &'static str {
        "USER"
    }

    fn needs_registration(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        if ctx.conn.is_registered() {
            return Err(HandlerError::AlreadyRegistered);
        }
        let (username, tenant, realname) =
            parse_user_args(args).ok_or(HandlerError::NeedMoreParams)?;
        ctx.conn.realname = Some(realname);

        if ctx.conn.token.is_none() {
            let tenant_name = tenant.ok_or(HandlerError::NeedMoreParams)?;
            if ctx.conn.nickname.is_none() {
                return Err(HandlerError::NeedMoreParams);
            }
            match ctx.shared.backend.login(&tenant_name, &username).await {
                Ok(result) => {
                    let access = AccessLevel::parse(&result.access).unwrap_or(AccessLevel::Read);
                    ctx.conn.username = Some(username);
                    ctx.conn.tenant_name = Some(tenant_name);
                    ctx.conn.access = Some(access);
                    ctx.conn.token = Some(result.token);
                }
                Err(e) => return Err(HandlerError::AuthFailed(e.to_string())),
            }
        }
        attempt_register(ctx).await
    }
}

pub struct CapHandler;

#[async_trait]
impl CommandHandler for CapHandler {
    fn name(&self) -> &'static str {
        "CAP"
    }

    fn needs_registration(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let mut parts = args.splitn(2, ' ');
        let sub = parts.next().unwrap_or("").to_ascii_uppercase();
        let rest = parts.next().unwrap_or("").trim();
        let server = ctx.server_name().to_string();
        let nick = ctx.nick_or_star();

        match sub.as_str() {
            "LS" => {
                ctx.conn.cap_negotiating = true;
                if ctx.conn.state == RegState::New {
                    ctx.conn.state = RegState::CapNegotiating;
                }
                let msg = Message::new("CAP")
                    .with_prefix(Prefix::Server(server))
                    .with_params(vec![nick, "LS".into()])
                    .with_trailing(SUPPORTED_CAPS.join(" "));
                ctx.conn.handle.send(&msg);
            }
            "LIST" => {
                let enabled = ctx.conn.handle.enabled_capabilities().join(" ");
                let msg = Message::new("CAP")
                    .with_prefix(Prefix::Server(server))
                    .with_params(vec![nick, "LIST".into()])
                    .with_trailing(enabled);
                ctx.conn.handle.send(&msg);
            }
            "REQ" => {
                let requested: Vec<&str> = rest.trim_start_matches(':').split_whitespace().collect();
                let all_supported = requested.iter().all(|c| SUPPORTED_CAPS.contains(c));
                let verb = if all_supported { "ACK" } else { "NAK" };
                if all_supported {
                    for cap in &requested {
                        ctx.conn.handle.enable_capability(cap);
                    }
                }
                let msg = Message::new("CAP")
                    .with_prefix(Prefix::Server(server.clone()))
                    .with_params(vec![nick.clone(), verb.to_string()])
                    .with_trailing(requested.join(" "));
                ctx.conn.handle.send(&msg);

                if all_supported && requested.contains(&"tenant-aware") {
                    ctx.shared.tenant_aware.add(ctx.conn.handle.clone());
                    let names = ctx.shared.tenants.tenant_names().join(",");
                    let tenants_msg = Message::new("TENANTS")
                        .with_prefix(Prefix::Server(server))
                        .with_params(vec![nick])
                        .with_trailing(names);
                    ctx.conn.handle.send(&tenants_msg);
                }
            }
            "END" => {
                ctx.conn.cap_negotiating = false;
                attempt_register(ctx).await?;
            }
            _ => {}
        }
        Ok(())
    }
}

pub struct PingHandler;

#[async_trait]
impl CommandHandler for PingHandler {
    fn name(&self) -> &'static str {
        "PING"
    }

    fn needs_registration(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let token = args.trim_start_matches(':');
        let msg = Message::new("PONG")
            .with_prefix(Prefix::Server(ctx.server_name().to_string()))
            .with_trailing(token);
        ctx.conn.handle.send(&msg);
        Ok(())
    }
}

pub struct PongHandler;

#[async_trait]
impl CommandHandler for PongHandler {
    fn name(&self) -> &'static str {
        "PONG"
    }

    fn needs_registration(&self) -> bool {
        false
    }

    async fn execute(&self, _ctx: &mut Context<'_>, _args: &str) -> HandlerResult {
        Ok(())
    }
}

pub struct QuitHandler;

#[async_trait]
impl CommandHandler for QuitHandler {
    fn name(&self) -> &'static str {
        "QUIT"
    }

    fn needs_registration(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let reason = if args.is_empty() {
            "Client Quit".to_string()
        } else {
            args.trim_start_matches(':').to_string()
        };

        Err(HandlerError::Quit(Some(reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_extended_nick() {
        let parsed = parse_nick_arg("alice!root@acme");
        assert_eq!(parsed.nick, "alice");
        assert_eq!(parsed.username.as_deref(), Some("root"));
        assert_eq!(parsed.tenant.as_deref(), Some("acme"));
    }

    #[test]
    fn parses_user_at_tenant_form() {
        let parsed = parse_nick_arg("root@acme");
        assert_eq!(parsed.nick, "root");
        assert_eq!(parsed.username.as_deref(), Some("root"));
        assert_eq!(parsed.tenant.as_deref(), Some("acme"));
    }

    #[test]
    fn parses_bare_nick() {
        let parsed = parse_nick_arg("alice");
        assert_eq!(parsed.nick, "alice");
        assert_eq!(parsed.tenant, None);
    }

    #[test]
    fn parses_user_command_args() {
        let (user, tenant, realname) = parse_user_args("alice@acme * * :Alice Name").unwrap();
        assert_eq!(user, "alice");
        assert_eq!(tenant.as_deref(), Some("acme"));
        assert_eq!(realname, "Alice Name");
    }
}

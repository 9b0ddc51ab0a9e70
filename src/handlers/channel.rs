//! JOIN/PART/KICK/TOPIC/INVITE/MODE and their force-* variants.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BackendError, ChannelError, HandlerError};
use crate::proto::{numerics, Message};
use crate::state::{AccessLevel, Channel, RoleSet, SchemaMeta, Tenant, User};
use crate::validation::is_valid_channel_name;

use super::{current_user, CommandHandler, Context, HandlerResult};

fn send_channel_error(ctx: &mut Context<'_>, chan_name: &str, err: ChannelError) {
    let nick = ctx.nick_or_star();
    let msg = err.to_irc_reply(ctx.server_name(), &nick, chan_name);
    ctx.conn.handle.send(&msg);
}

fn default_role_for(access: AccessLevel, is_first_member: bool) -> RoleSet {
    match access {
        AccessLevel::Root | AccessLevel::Full => RoleSet::OPERATOR,
        AccessLevel::Edit if is_first_member => RoleSet::OPERATOR,
        AccessLevel::Edit => RoleSet::VOICE,
        AccessLevel::Read if is_first_member => RoleSet::OPERATOR,
        AccessLevel::Read => RoleSet::NONE,
    }
}

fn metadata_topic_text(meta: &SchemaMeta) -> String {
    format!(
        "{} records (created {}..{}, last updated {})",
        meta.record_count,
        meta.min_created.as_deref().unwrap_or("?"),
        meta.max_created.as_deref().unwrap_or("?"),
        meta.max_updated.as_deref().unwrap_or("?"),
    )
}

fn names_text(chan: &Channel, multi_prefix: bool) -> String {
    chan.members_snapshot()
        .iter()
        .map(|(nick, role)| {
            let prefix = if multi_prefix {
                role.all_prefix_chars()
            } else {
                role.prefix_char().map(|c| c.to_string()).unwrap_or_default()
            };
            format!("{prefix}{nick}")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn send_topic_and_names(ctx: &mut Context<'_>, chan: &Channel, nick: &str) {
    let server = ctx.server_name().to_string();
    match chan.topic() {
        Some(topic) => ctx.conn.handle.send(
            &Message::numeric(&server, numerics::RPL_TOPIC, nick, vec![chan.name.clone()])
                .with_trailing(topic.text),
        ),
        None => match chan.schema_meta() {
            Some(meta) => ctx.conn.handle.send(
                &Message::numeric(&server, numerics::RPL_TOPIC, nick, vec![chan.name.clone()])
                    .with_trailing(metadata_topic_text(&meta)),
            ),
            None => ctx.conn.handle.send(
                &Message::numeric(&server, numerics::RPL_NOTOPIC, nick, vec![chan.name.clone()])
                    .with_trailing("No topic is set"),
            ),
        },
    }
    let multi_prefix = ctx.conn.handle.has_capability("multi-prefix");
    ctx.conn.handle.send(&Message::numeric(
        &server,
        numerics::RPL_NAMREPLY,
        nick,
        vec!["=".to_string(), chan.name.clone()],
    ).with_trailing(names_text(chan, multi_prefix)));
    ctx.conn.handle.send(&Message::numeric(
        &server,
        numerics::RPL_ENDOFNAMES,
        nick,
        vec![chan.name.clone()],
    ).with_trailing("End of /NAMES list"));
}

fn join_message(chan_name: &str, user: &User, extended: bool) -> Message {
    let mut msg = Message::new("JOIN")
        .with_prefix(user.prefix())
        .with_params(vec![chan_name.to_string()]);
    if extended {
        msg = msg.with_trailing(user.realname());
        msg.params.push(user.identity());
    }
    msg
}

/// Validate backend accessibility for a join attempt and, for a freshly
/// created schema channel, cache aggregate metadata. Shared by JOIN and
/// FORCEJOIN.
async fn validate_and_prepare(
    ctx: &Context<'_>,
    chan: &Arc<Channel>,
    created: bool,
    token: &str,
) -> Result<(), ChannelError> {
    if created && !chan.is_record_channel() {
        if let Ok(meta) = ctx.shared.backend.fetch_schema_meta(token, &chan.schema).await {
            chan.set_schema_meta(meta);
        }
    }

    let result = if let Some(record_id) = &chan.record_id {
        ctx.shared
            .backend
            .get_data(token, &chan.schema, Some(record_id), None)
            .await
            .map(|_| ())
    } else {
        ctx.shared
            .backend
            .get_data(token, &chan.schema, None, Some(1))
            .await
            .map(|_| ())
    };

    result.map_err(|err| match err {
        BackendError::NotFound => ChannelError::AccessDenied("Record not found".into()),
        BackendError::Forbidden => ChannelError::AccessDenied("Access denied".into()),
        _ => ChannelError::AccessDenied("backend unreachable".into()),
    })
}

/// Perform a join on behalf of `acting_user` (the sender for JOIN, or the
/// forcejoin target for FORCEJOIN). Returns the `ChannelError` to render to
/// the *requester* on failure; the caller decides who that is.
pub(crate) async fn do_join(
    ctx: &mut Context<'_>,
    tenant: &Arc<Tenant>,
    acting_user: &Arc<User>,
    chan_name: &str,
    key: Option<&str>,
    token: &str,
) -> Result<(), ChannelError> {
    if !is_valid_channel_name(chan_name) {
        return Err(ChannelError::NoSuchChannel(chan_name.to_string()));
    }
    let nick = acting_user.nickname();
    let (chan, created) = tenant.get_or_create_channel(chan_name, &nick);
    if created {
        crate::metrics::ACTIVE_CHANNELS.inc();
    }

    if chan.is_member(&nick) {
        send_topic_and_names(ctx, &chan, &nick);
        return Ok(());
    }

    validate_and_prepare(ctx, &chan, created, token).await?;
    chan.can_join(key)?;

    let is_first_member = chan.is_empty();
    let role = default_role_for(acting_user.access(), is_first_member);
    chan.add_member(nick.clone(), role);
    acting_user.add_channel(chan_name.to_string());

    let joiner_extended = acting_user.has_capability("extended-join");
    let joiner_msg = join_message(chan_name, acting_user, joiner_extended);
    if let Some(handle) = acting_user.connection() {
        handle.send(&joiner_msg);
    }
    send_topic_and_names(ctx, &chan, &nick);

    for (member_nick, _) in chan.members_snapshot() {
        if member_nick == nick {
            continue;
        }
        if let Some(member) = tenant.user_by_nick(&member_nick) {
            if let Some(handle) = member.connection() {
                let extended = joiner_extended || member.has_capability("extended-join");
                handle.send(&join_message(chan_name, acting_user, extended));
            }
        }
    }
    Ok(())
}

pub struct JoinHandler;

#[async_trait]
impl CommandHandler for JoinHandler {
    fn name(&self) -> &'static str {
        "JOIN"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let mut tokens = args.split_whitespace();
        let chan_name = tokens.next().unwrap_or("").to_string();
        if chan_name.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }
        let key = tokens.next().map(str::to_string);
        let (tenant, user) = current_user(ctx)?;
        let token = ctx.conn.token.clone().unwrap_or_default();
        if let Err(err) = do_join(ctx, &tenant, &user, &chan_name, key.as_deref(), &token).await {
            send_channel_error(ctx, &chan_name, err);
        }
        Ok(())
    }
}

pub struct PartHandler;

#[async_trait]
impl CommandHandler for PartHandler {
    fn name(&self) -> &'static str {
        "PART"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let mut parts = args.splitn(2, ' ');
        let chan_name = parts.next().unwrap_or("").to_string();
        if chan_name.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }
        let reason = parts.next().map(|s| s.trim_start_matches(':').to_string());
        let (tenant, user) = current_user(ctx)?;
        let nick = user.nickname();
        let Some(chan) = tenant.channel(&chan_name) else {
            send_channel_error(ctx, &chan_name, ChannelError::NoSuchChannel(chan_name.clone()));
            return Ok(());
        };
        if !chan.is_member(&nick) {
            send_channel_error(ctx, &chan_name, ChannelError::NotOnChannel(chan_name.clone()));
            return Ok(());
        }
        let msg = Message::new("PART")
            .with_prefix(user.prefix())
            .with_params(vec![chan_name.clone()]);
        let msg = match &reason {
            Some(r) => msg.with_trailing(r.clone()),
            None => msg,
        };
        for (member_nick, _) in chan.members_snapshot() {
            if let Some(member) = tenant.user_by_nick(&member_nick) {
                if let Some(handle) = member.connection() {
                    handle.send(&msg);
                }
            }
        }
        chan.remove_member(&nick);
        user.remove_channel(&chan_name);
        if tenant.gc_channel_if_empty(&chan_name) {
            crate::metrics::ACTIVE_CHANNELS.dec();
        }
        Ok(())
    }
}

pub struct KickHandler;

#[async_trait]
impl CommandHandler for KickHandler {
    fn name(&self) -> &'static str {
        "KICK"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let mut parts = args.splitn(3, ' ');
        let chan_name = parts.next().unwrap_or("").to_string();
        let target_nick = parts.next().unwrap_or("").to_string();
        if chan_name.is_empty() || target_nick.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }
        let reason = parts.next().map(|s| s.trim_start_matches(':').to_string());
        let (tenant, user) = current_user(ctx)?;
        let nick = user.nickname();
        let Some(chan) = tenant.channel(&chan_name) else {
            send_channel_error(ctx, &chan_name, ChannelError::NoSuchChannel(chan_name.clone()));
            return Ok(());
        };
        if !chan.is_member(&nick) {
            send_channel_error(ctx, &chan_name, ChannelError::NotOnChannel(chan_name.clone()));
            return Ok(());
        }
        if !chan.can_kick(&nick) {
            let token = ctx.conn.token.clone().unwrap_or_default();
            let allowed = match ctx.shared.backend.describe_schema(&token, &chan.schema).await {
                Ok(desc) => desc
                    .get("access")
                    .and_then(serde_json::Value::as_str)
                    .and_then(AccessLevel::parse)
                    .map(AccessLevel::is_at_least_edit)
                    .unwrap_or(false),
                Err(_) => false,
            };
            if !allowed {
                send_channel_error(ctx, &chan_name, ChannelError::OperatorNeeded(chan_name.clone()));
                return Ok(());
            }
        }
        if !chan.is_member(&target_nick) {
            send_channel_error(ctx, &chan_name, ChannelError::NotOnChannel(chan_name.clone()));
            return Ok(());
        }
        let mut msg = Message::new("KICK")
            .with_prefix(user.prefix())
            .with_params(vec![chan_name.clone(), target_nick.clone()]);
        if let Some(r) = &reason {
            msg = msg.with_trailing(r.clone());
        }
        for (member_nick, _) in chan.members_snapshot() {
            if let Some(member) = tenant.user_by_nick(&member_nick) {
                if let Some(handle) = member.connection() {
                    handle.send(&msg);
                }
            }
        }
        chan.remove_member(&target_nick);
        if let Some(target) = tenant.user_by_nick(&target_nick) {
            target.remove_channel(&chan_name);
        }
        if tenant.gc_channel_if_empty(&chan_name) {
            crate::metrics::ACTIVE_CHANNELS.dec();
        }
        Ok(())
    }
}

pub struct TopicHandler;

#[async_trait]
impl CommandHandler for TopicHandler {
    fn name(&self) -> &'static str {
        "TOPIC"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let mut parts = args.splitn(2, ' ');
        let chan_name = parts.next().unwrap_or("").to_string();
        if chan_name.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }
        let text = parts.next().map(|s| s.trim_start_matches(':').to_string());
        let (tenant, user) = current_user(ctx)?;
        let nick = user.nickname();
        let Some(chan) = tenant.channel(&chan_name) else {
            send_channel_error(ctx, &chan_name, ChannelError::NoSuchChannel(chan_name.clone()));
            return Ok(());
        };
        match text {
            None => send_topic_and_names_topic_only(ctx, &chan, &nick),
            Some(text) => {
                if !chan.can_set_topic(&nick) {
                    send_channel_error(ctx, &chan_name, ChannelError::OperatorNeeded(chan_name.clone()));
                    return Ok(());
                }
                let cleared = text.is_empty();
                chan.set_topic(if cleared { None } else { Some(text.clone()) }, &nick);
                let msg = Message::new("TOPIC")
                    .with_prefix(user.prefix())
                    .with_params(vec![chan_name.clone()])
                    .with_trailing(text);
                for (member_nick, _) in chan.members_snapshot() {
                    if let Some(member) = tenant.user_by_nick(&member_nick) {
                        if let Some(handle) = member.connection() {
                            handle.send(&msg);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn send_topic_and_names_topic_only(ctx: &mut Context<'_>, chan: &Channel, nick: &str) {
    let server = ctx.server_name().to_string();
    match chan.topic() {
        Some(topic) => ctx.conn.handle.send(
            &Message::numeric(&server, numerics::RPL_TOPIC, nick, vec![chan.name.clone()])
                .with_trailing(topic.text),
        ),
        None => ctx.conn.handle.send(
            &Message::numeric(&server, numerics::RPL_NOTOPIC, nick, vec![chan.name.clone()])
                .with_trailing("No topic is set"),
        ),
    }
}

pub struct InviteHandler;

#[async_trait]
impl CommandHandler for InviteHandler {
    fn name(&self) -> &'static str {
        "INVITE"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let mut tokens = args.split_whitespace();
        let target_nick = tokens.next().unwrap_or("").to_string();
        let chan_name = tokens.next().unwrap_or("").to_string();
        if target_nick.is_empty() || chan_name.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }
        let (tenant, user) = current_user(ctx)?;
        let nick = user.nickname();
        let Some(chan) = tenant.channel(&chan_name) else {
            send_channel_error(ctx, &chan_name, ChannelError::NoSuchChannel(chan_name.clone()));
            return Ok(());
        };
        if !chan.can_invite(&nick) {
            send_channel_error(ctx, &chan_name, ChannelError::OperatorNeeded(chan_name.clone()));
            return Ok(());
        }
        let Some(target) = tenant.user_by_nick(&target_nick) else {
            return Err(HandlerError::NoSuchNick(target_nick));
        };
        let invite_msg = Message::new("INVITE")
            .with_prefix(user.prefix())
            .with_params(vec![target_nick.clone(), chan_name.clone()]);
        if let Some(handle) = target.connection() {
            handle.send(&invite_msg);
        }
        let server = ctx.server_name().to_string();
        ctx.conn.handle.send(&Message::numeric(
            &server,
            numerics::RPL_INVITING,
            &nick,
            vec![target_nick.clone(), chan_name.clone()],
        ));
        for (member_nick, _) in chan.members_snapshot() {
            if member_nick == target_nick {
                continue;
            }
            if let Some(member) = tenant.user_by_nick(&member_nick) {
                if member.has_capability("invite-notify") {
                    if let Some(handle) = member.connection() {
                        handle.send(&invite_msg);
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct ModeHandler;

#[async_trait]
impl CommandHandler for ModeHandler {
    fn name(&self) -> &'static str {
        "MODE"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let mut tokens = args.split_whitespace();
        let target = tokens.next().unwrap_or("").to_string();
        if target.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }
        let (tenant, user) = current_user(ctx)?;
        let nick = user.nickname();
        let server = ctx.server_name().to_string();

        if target == nick {
            match tokens.next() {
                None => {
                    let modes: String = user.modes().into_iter().collect();
                    ctx.conn.handle.send(&Message::numeric_text(
                        &server,
                        numerics::RPL_UMODEIS,
                        &nick,
                        format!("+{modes}"),
                    ));
                }
                Some(modestring) => {
                    apply_modestring(modestring, |add, c| user.apply_mode(add, c));
                }
            }
            return Ok(());
        }

        let Some(chan) = tenant.channel(&target) else {
            send_channel_error(ctx, &target, ChannelError::NoSuchChannel(target.clone()));
            return Ok(());
        };
        match tokens.next() {
            None => {
                let modes: String = chan.modes().into_iter().collect();
                ctx.conn.handle.send(&Message::numeric(
                    &server,
                    numerics::RPL_CHANNELMODEIS,
                    &nick,
                    vec![target.clone(), format!("+{modes}")],
                ));
                ctx.conn.handle.send(&Message::numeric(
                    &server,
                    numerics::RPL_CREATIONTIME,
                    &nick,
                    vec![target.clone(), chan.created_at.timestamp().to_string()],
                ));
            }
            Some(modestring) => {
                let key_param = tokens.next().map(str::to_string);
                apply_modestring(modestring, |add, c| {
                    if c == 'k' {
                        chan.set_key(if add { key_param.clone() } else { None });
                    } else {
                        chan.apply_mode(add, c);
                    }
                });
                let mut msg = Message::new("MODE")
                    .with_prefix(user.prefix())
                    .with_params(vec![target.clone(), modestring.to_string()]);
                if let Some(key) = &key_param {
                    msg.params.push(key.clone());
                }
                for (member_nick, _) in chan.members_snapshot() {
                    if let Some(member) = tenant.user_by_nick(&member_nick) {
                        if let Some(handle) = member.connection() {
                            handle.send(&msg);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn apply_modestring(modestring: &str, mut apply: impl FnMut(bool, char)) {
    let mut adding = true;
    for c in modestring.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            other => apply(adding, other),
        }
    }
}

pub struct ForceJoinHandler;

#[async_trait]
impl CommandHandler for ForceJoinHandler {
    fn name(&self) -> &'static str {
        "FORCEJOIN"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let mut tokens = args.split_whitespace();
        let target_nick = tokens.next().unwrap_or("").to_string();
        let chan_name = tokens.next().unwrap_or("").to_string();
        let key = tokens.next().map(str::to_string);
        if target_nick.is_empty() || chan_name.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }
        let (tenant, user) = current_user(ctx)?;
        if !user.has_capability("force-join") || !user.access().is_at_least_edit() {
            send_channel_error(ctx, &chan_name, ChannelError::AccessDenied("force-join not permitted".into()));
            return Ok(());
        }
        let Some(target) = tenant.user_by_nick(&target_nick) else {
            return Err(HandlerError::NoSuchNick(target_nick));
        };
        let token = ctx.conn.token.clone().unwrap_or_default();
        if let Err(err) = do_join(ctx, &tenant, &target, &chan_name, key.as_deref(), &token).await {
            send_channel_error(ctx, &chan_name, err);
        }
        Ok(())
    }
}

pub struct ForcePartHandler;

#[async_trait]
impl CommandHandler for ForcePartHandler {
    fn name(&self) -> &'static str {
        "FORCEPART"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        let mut parts = args.splitn(3, ' ');
        let target_nick = parts.next().unwrap_or("").to_string();
        let chan_name = parts.next().unwrap_or("").to_string();
        if target_nick.is_empty() || chan_name.is_empty() {
            return Err(HandlerError::NeedMoreParams);
        }
        let reason = parts
            .next()
            .map(|s| s.trim_start_matches(':').to_string())
            .unwrap_or_else(|| "Removed by operator".to_string());
        let (tenant, user) = current_user(ctx)?;
        if !user.has_capability("force-part") || !user.access().is_at_least_edit() {
            send_channel_error(ctx, &chan_name, ChannelError::AccessDenied("force-part not permitted".into()));
            return Ok(());
        }
        let Some(chan) = tenant.channel(&chan_name) else {
            send_channel_error(ctx, &chan_name, ChannelError::NoSuchChannel(chan_name.clone()));
            return Ok(());
        };
        let Some(target) = tenant.user_by_nick(&target_nick) else {
            return Err(HandlerError::NoSuchNick(target_nick));
        };
        if !chan.is_member(&target_nick) {
            send_channel_error(ctx, &chan_name, ChannelError::NotOnChannel(chan_name.clone()));
            return Ok(());
        }
        let msg = Message::new("PART")
            .with_prefix(target.prefix())
            .with_params(vec![chan_name.clone()])
            .with_trailing(reason);
        for (member_nick, _) in chan.members_snapshot() {
            if let Some(member) = tenant.user_by_nick(&member_nick) {
                if let Some(handle) = member.connection() {
                    handle.send(&msg);
                }
            }
        }
        chan.remove_member(&target_nick);
        target.remove_channel(&chan_name);
        if tenant.gc_channel_if_empty(&chan_name) {
            crate::metrics::ACTIVE_CHANNELS.dec();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_assignment_matches_access_table() {
        assert_eq!(default_role_for(AccessLevel::Root, true), RoleSet::OPERATOR);
        assert_eq!(default_role_for(AccessLevel::Root, false), RoleSet::OPERATOR);
        assert_eq!(default_role_for(AccessLevel::Edit, true), RoleSet::OPERATOR);
        assert_eq!(default_role_for(AccessLevel::Edit, false), RoleSet::VOICE);
        assert_eq!(default_role_for(AccessLevel::Read, true), RoleSet::OPERATOR);
        assert_eq!(default_role_for(AccessLevel::Read, false), RoleSet::NONE);
    }

    #[test]
    fn modestring_parses_plus_minus_runs() {
        let mut applied = Vec::new();
        apply_modestring("+nt-s", |add, c| applied.push((add, c)));
        assert_eq!(applied, vec![(true, 'n'), (true, 't'), (false, 's')]);
    }
}

//! PRIVMSG/NOTICE routing: per-tenant broadcast, cross-tenant fan-out, and
//! handoff to the `!`-function dispatcher.

use async_trait::async_trait;

use crate::error::{ChannelError, HandlerError};
use crate::proto::Message;

use super::{current_user, CommandHandler, Context, HandlerResult};

fn send_channel_error(ctx: &mut Context<'_>, chan_name: &str, err: ChannelError) {
    let nick = ctx.nick_or_star();
    let msg = err.to_irc_reply(ctx.server_name(), &nick, chan_name);
    ctx.conn.handle.send(&msg);
}

/// Shared PRIVMSG/NOTICE routing. `is_notice` suppresses every client-visible
/// error numeric (NOTICE never emits error replies, per RFC) and, per the
/// tenant-aware NOTICE decision recorded in the design notes, restricts the
/// tenant-aware tagged fan-out to explicitly `#chan@tenant`-addressed sends.
async fn route(ctx: &mut Context<'_>, args: &str, verb: &str, is_notice: bool) -> HandlerResult {
    let mut parts = args.splitn(2, ' ');
    let target = parts.next().unwrap_or("").to_string();
    if target.is_empty() {
        return if is_notice { Ok(()) } else { Err(HandlerError::NeedMoreParams) };
    }
    let text = parts
        .next()
        .map(|s| s.trim_start_matches(':').to_string())
        .unwrap_or_default();

    let (tenant, user) = current_user(ctx)?;
    let nick = user.nickname();

    if let Some(chan_part) = target.strip_prefix('#') {
        let (schema_part, qualified_tenant) = match chan_part.split_once('@') {
            Some((s, t)) => (s.to_string(), Some(t.to_string())),
            None => (chan_part.to_string(), None),
        };
        let bare_chan = format!("#{schema_part}");
        let explicit_routing = qualified_tenant.is_some() && ctx.conn.handle.has_capability("tenant-aware");

        let (route_tenant, route_tenant_name) = if explicit_routing {
            let name = qualified_tenant.clone().unwrap();
            match ctx.shared.tenants.get(&name) {
                Some(t) => (t, name),
                None => return Ok(()), // unknown tenant: drop silently, nothing to route to
            }
        } else {
            (tenant.clone(), tenant.name.clone())
        };

        let Some(chan) = route_tenant.channel(&bare_chan) else {
            if !is_notice && !explicit_routing {
                send_channel_error(ctx, &bare_chan, ChannelError::NoSuchChannel(bare_chan.clone()));
            }
            return Ok(());
        };

        if !explicit_routing {
            if !chan.is_member(&nick) {
                if !is_notice {
                    send_channel_error(ctx, &bare_chan, ChannelError::NotOnChannel(bare_chan.clone()));
                }
                return Ok(());
            }
            if !is_notice && text.starts_with('!') {
                crate::functions::dispatch(ctx, &route_tenant, &chan, &user, &text[1..]).await;
                return Ok(());
            }
            if !chan.can_send_message(&nick) {
                if !is_notice {
                    send_channel_error(ctx, &bare_chan, ChannelError::CannotSendToChannel(bare_chan.clone()));
                }
                return Ok(());
            }
        }

        let msg = Message::new(verb)
            .with_prefix(user.prefix())
            .with_params(vec![bare_chan.clone()])
            .with_trailing(text.clone());
        let mut reached = 0usize;
        for (member_nick, _) in chan.members_snapshot() {
            if member_nick == nick {
                continue;
            }
            if let Some(member) = route_tenant.user_by_nick(&member_nick) {
                if let Some(handle) = member.connection() {
                    handle.send(&msg);
                    reached += 1;
                }
            }
        }
        crate::metrics::record_fanout(reached);

        if !is_notice || explicit_routing {
            let tagged_target = format!("{bare_chan}@{route_tenant_name}");
            let tagged_msg = Message::new(verb)
                .with_prefix(user.prefix())
                .with_params(vec![tagged_target])
                .with_trailing(text);
            ctx.shared.tenant_aware.broadcast(&tagged_msg);
        }
        return Ok(());
    }

    match tenant.user_by_nick(&target) {
        Some(recipient) => {
            let msg = Message::new(verb)
                .with_prefix(user.prefix())
                .with_params(vec![target])
                .with_trailing(text);
            if let Some(handle) = recipient.connection() {
                handle.send(&msg);
            }
            Ok(())
        }
        None => {
            if is_notice {
                Ok(())
            } else {
                Err(HandlerError::NoSuchNick(target))
            }
        }
    }
}

pub struct PrivmsgHandler;

#[async_trait]
impl CommandHandler for PrivmsgHandler {
    fn name(&self) -> &'static str {
        "PRIVMSG"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        route(ctx, args, "PRIVMSG", false).await
    }
}

pub struct NoticeHandler;

#[async_trait]
impl CommandHandler for NoticeHandler {
    fn name(&self) -> &'static str {
        "NOTICE"
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, args: &str) -> HandlerResult {
        route(ctx, args, "NOTICE", true).await
    }
}

//! The `!`-prefixed function dispatcher invoked from inside channel PRIVMSGs
//! (spec §4.7). A channel message body starting with `!` never reaches the
//! ordinary broadcast path; `handlers::messaging` hands it off here instead.

mod args;

use std::sync::Arc;

use serde_json::Value;

use crate::error::BackendError;
use crate::handlers::{do_join, Context};
use crate::proto::{Message, Prefix};
use crate::state::{Channel, Tenant, User};

use args::ParsedArgs;

/// Send a line to every current member of `chan`, from the server.
fn broadcast_notice(ctx: &Context<'_>, tenant: &Tenant, chan: &Channel, text: impl Into<String>) {
    let msg = Message::new("NOTICE")
        .with_prefix(Prefix::Server(ctx.server_name().to_string()))
        .with_params(vec![chan.name.clone()])
        .with_trailing(text);
    for (nick, _) in chan.members_snapshot() {
        if let Some(member) = tenant.user_by_nick(&nick) {
            if let Some(handle) = member.connection() {
                handle.send(&msg);
            }
        }
    }
}

/// Send a line only to the invoking connection (sender-only errors and help).
fn sender_notice(ctx: &mut Context<'_>, chan: &Channel, text: impl Into<String>) {
    let msg = Message::new("NOTICE")
        .with_prefix(Prefix::Server(ctx.server_name().to_string()))
        .with_params(vec![chan.name.clone()])
        .with_trailing(text);
    ctx.conn.handle.send(&msg);
}

fn backend_error_text(err: &BackendError) -> String {
    crate::metrics::record_backend_error();
    match err {
        BackendError::NotFound => "record or collection not found".to_string(),
        BackendError::Forbidden => "access denied by backend".to_string(),
        other => format!("backend error: {other}"),
    }
}

/// Entry point called by `handlers::messaging` for a `!name args` channel
/// message. `user` is the invoker (already confirmed a channel member with
/// permission to send); `chan`/`tenant` are the channel and tenant it was
/// invoked in.
pub async fn dispatch(
    ctx: &mut Context<'_>,
    tenant: &Arc<Tenant>,
    chan: &Arc<Channel>,
    user: &Arc<User>,
    body: &str,
) {
    crate::metrics::record_function_call();
    let mut tokens = body.split_whitespace();
    let name = tokens.next().unwrap_or("").to_ascii_lowercase();
    let rest: Vec<&str> = tokens.collect();
    let token = ctx.conn.token.clone().unwrap_or_default();

    match name.as_str() {
        "help" => help(ctx, chan, &rest),
        "find" => find(ctx, tenant, chan, &rest, &token).await,
        "list" => list(ctx, tenant, chan, &rest, &token).await,
        "count" => count(ctx, tenant, chan, &rest, &token).await,
        "get" => get(ctx, tenant, chan, &rest, &token).await,
        "show" => show(ctx, tenant, chan, &rest, &token).await,
        "open" => open(ctx, tenant, user, chan, &rest, &token).await,
        "set" | "unset" | "refresh" => reserved(ctx, chan, &name),
        "" => sender_notice(ctx, chan, "Missing function name. Try !help."),
        other => sender_notice(ctx, chan, format!("Unknown function: {other}. Try !help.")),
    }
}

const SCHEMA_FUNCTIONS: &[&str] = &["find", "list", "count", "get", "show", "open"];
const RECORD_FUNCTIONS: &[&str] = &["get", "show", "set", "unset", "refresh"];

fn help(ctx: &mut Context<'_>, chan: &Channel, args: &[&str]) {
    if let Some(name) = args.first() {
        let text = match *name {
            "find" => "!find --where k=v [and k=v...] [--limit N] [--fields a,b,c] - query a schema channel",
            "list" => "!list [--limit N] - list records in a schema channel",
            "count" => "!count [--where k=v [and k=v...]] - count records, optionally filtered",
            "get" => "!get <id> [--fields a,b,c] - fetch one record by id",
            "show" => "!show <id> - render one line per field of a record",
            "open" => "!open <id> - join the record channel for an id",
            "set" | "unset" | "refresh" => "reserved; not implemented",
            other => {
                sender_notice(ctx, chan, format!("No help for {other}"));
                return;
            }
        };
        sender_notice(ctx, chan, text);
        return;
    }
    let available: &[&str] = if chan.is_record_channel() {
        RECORD_FUNCTIONS
    } else {
        SCHEMA_FUNCTIONS
    };
    sender_notice(
        ctx,
        chan,
        format!("Available functions here: help, {}", available.join(", ")),
    );
}

fn reserved(ctx: &mut Context<'_>, chan: &Channel, name: &str) {
    if !chan.is_record_channel() {
        sender_notice(ctx, chan, format!("!{name} is only available in a record channel"));
        return;
    }
    sender_notice(ctx, chan, format!("!{name} is reserved and not implemented"));
}

async fn find(ctx: &mut Context<'_>, tenant: &Tenant, chan: &Channel, args: &[&str], token: &str) {
    if chan.is_record_channel() {
        sender_notice(ctx, chan, "!find is only available in a schema channel");
        return;
    }
    let parsed = ParsedArgs::parse(args);
    let limit = parsed
        .limit
        .unwrap_or(ctx.shared.limits.find_default_limit)
        .min(ctx.shared.limits.find_max_limit);
    let condition = parsed.where_clause.clone().unwrap_or_else(|| Value::Object(Default::default()));

    match ctx
        .shared
        .backend
        .find(token, &chan.schema, &condition, limit, parsed.fields.as_deref())
        .await
    {
        Ok(value) => {
            let rows = value.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
            broadcast_notice(ctx, tenant, chan, format!("Found {} record(s)", rows.len()));
            for row in rows.iter().take(limit as usize) {
                broadcast_notice(ctx, tenant, chan, render_row(row));
            }
        }
        Err(err) => sender_notice(ctx, chan, backend_error_text(&err)),
    }
}

async fn list(ctx: &mut Context<'_>, tenant: &Tenant, chan: &Channel, args: &[&str], token: &str) {
    if chan.is_record_channel() {
        sender_notice(ctx, chan, "!list is only available in a schema channel");
        return;
    }
    let parsed = ParsedArgs::parse(args);
    let limit = parsed
        .limit
        .unwrap_or(ctx.shared.limits.list_default_limit)
        .min(ctx.shared.limits.list_max_limit);

    match ctx.shared.backend.get_data(token, &chan.schema, None, Some(limit)).await {
        Ok(value) => {
            let rows = value.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
            broadcast_notice(ctx, tenant, chan, format!("{} record(s)", rows.len()));
            for row in rows.iter().take(limit as usize) {
                broadcast_notice(ctx, tenant, chan, render_row(row));
            }
        }
        Err(err) => sender_notice(ctx, chan, backend_error_text(&err)),
    }
}

async fn count(ctx: &mut Context<'_>, tenant: &Tenant, chan: &Channel, args: &[&str], token: &str) {
    if chan.is_record_channel() {
        sender_notice(ctx, chan, "!count is only available in a schema channel");
        return;
    }
    let parsed = ParsedArgs::parse(args);
    match ctx
        .shared
        .backend
        .count(token, &chan.schema, parsed.where_clause.as_ref())
        .await
    {
        Ok(total) => {
            let mut text = format!("Total: {total} record(s)");
            if !parsed.where_tokens.is_empty() {
                text.push_str(&format!(" (where {})", parsed.where_tokens.join(" and ")));
            }
            broadcast_notice(ctx, tenant, chan, text);
        }
        Err(err) => sender_notice(ctx, chan, backend_error_text(&err)),
    }
}

/// Resolve `(schema, id)` for `get`/`show`: an explicit positional id in a
/// schema channel, or the channel's own record id when invoked in a record
/// channel.
fn resolve_id<'a>(chan: &'a Channel, positional: &'a [String]) -> Option<&'a str> {
    if let Some(record_id) = &chan.record_id {
        Some(record_id.as_str())
    } else {
        positional.first().map(String::as_str)
    }
}

async fn get(ctx: &mut Context<'_>, tenant: &Tenant, chan: &Channel, args: &[&str], token: &str) {
    let parsed = ParsedArgs::parse(args);
    let Some(id) = resolve_id(chan, &parsed.positional) else {
        sender_notice(ctx, chan, "!get requires a record id in a schema channel");
        return;
    };

    match ctx.shared.backend.get_data(token, &chan.schema, Some(id), None).await {
        Ok(value) => {
            let record = value.get("data").cloned().unwrap_or(value);
            if let Some(fields) = &parsed.fields {
                for field in fields {
                    match ctx
                        .shared
                        .backend
                        .file_op(
                            token,
                            "retrieve",
                            &serde_json::json!({ "schema": chan.schema, "id": id, "field": field }),
                        )
                        .await
                    {
                        Ok(file_value) => {
                            broadcast_notice(ctx, tenant, chan, format!("{field}: {}", render_value(&file_value)));
                        }
                        Err(err) => sender_notice(ctx, chan, backend_error_text(&err)),
                    }
                }
            } else {
                broadcast_notice(ctx, tenant, chan, render_row(&record));
            }
        }
        Err(err) => sender_notice(ctx, chan, backend_error_text(&err)),
    }
}

async fn show(ctx: &mut Context<'_>, tenant: &Tenant, chan: &Channel, args: &[&str], token: &str) {
    let parsed = ParsedArgs::parse(args);
    let Some(id) = resolve_id(chan, &parsed.positional) else {
        sender_notice(ctx, chan, "!show requires a record id in a schema channel");
        return;
    };

    match ctx.shared.backend.get_data(token, &chan.schema, Some(id), None).await {
        Ok(value) => {
            let record = value.get("data").cloned().unwrap_or(value);
            if let Value::Object(map) = &record {
                for (field, field_value) in map {
                    broadcast_notice(ctx, tenant, chan, format!("{field}: {}", render_value(field_value)));
                }
            } else {
                broadcast_notice(ctx, tenant, chan, render_value(&record));
            }
        }
        Err(err) => sender_notice(ctx, chan, backend_error_text(&err)),
    }
}

async fn open(
    ctx: &mut Context<'_>,
    tenant: &Arc<Tenant>,
    user: &Arc<User>,
    chan: &Channel,
    args: &[&str],
    token: &str,
) {
    if chan.is_record_channel() {
        sender_notice(ctx, chan, "!open is only available in a schema channel");
        return;
    }
    let parsed = ParsedArgs::parse(args);
    let Some(id) = parsed.positional.first() else {
        sender_notice(ctx, chan, "!open requires a record id");
        return;
    };

    if let Err(err) = ctx.shared.backend.get_data(token, &chan.schema, Some(id), None).await {
        sender_notice(ctx, chan, backend_error_text(&err));
        return;
    }

    let record_chan_name = format!("#{}/{}", chan.schema, id);
    if let Err(err) = do_join(ctx, tenant, user, &record_chan_name, None, token).await {
        sender_notice(ctx, chan, err.to_string());
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_row(row: &Value) -> String {
    let Value::Object(map) = row else {
        return render_value(row);
    };
    let id = map
        .get("id")
        .map(render_value)
        .unwrap_or_else(|| "?".to_string());
    let mut rest: Vec<String> = map
        .iter()
        .filter(|(k, _)| k.as_str() != "id")
        .take(4)
        .map(|(k, v)| format!("{k}={}", render_value(v)))
        .collect();
    rest.sort();
    if rest.is_empty() {
        format!("id={id}")
    } else {
        format!("id={id} {}", rest.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_row_leads_with_id() {
        let row = serde_json::json!({ "id": 7, "status": "open", "owner": "alice" });
        let text = render_row(&row);
        assert!(text.starts_with("id=7"));
        assert!(text.contains("status=open"));
    }
}

//! The read-only/NOTIMPL command catalog: VERSION, TIME, INFO, STATS, ADMIN,
//! MOTD, HELP, LINKS, OPER, KILL, REHASH, WALLOPS. Each is out of scope for
//! re-specification (spec §1) but still needs a trivial handler so dispatch
//! never falls through to `421 Unknown command` for them. Every one returns a
//! fixed numeric with static content and follows the ordinary dispatch
//! contract (registration-gated like any other post-registration command).

use async_trait::async_trait;

use crate::proto::Message;

use super::{CommandHandler, Context, HandlerResult};

struct StaticReplyHandler {
    name: &'static str,
    code: u16,
    text: &'static str,
}

#[async_trait]
impl CommandHandler for StaticReplyHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn needs_registration(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut Context<'_>, _args: &str) -> HandlerResult {
        let nick = ctx.nick_or_star();
        let server = ctx.server_name().to_string();
        ctx.conn
            .handle
            .send(&Message::numeric_text(&server, self.code, &nick, self.text));
        Ok(())
    }
}

pub fn notimpl_handlers() -> Vec<Box<dyn CommandHandler>> {
    vec![
        Box::new(StaticReplyHandler {
            name: "VERSION",
            code: 351,
            text: "tenantircd-0.1.0. :multi-tenant backend bridge",
        }),
        Box::new(StaticReplyHandler {
            name: "TIME",
            code: 391,
            text: "server time reporting is not implemented",
        }),
        Box::new(StaticReplyHandler {
            name: "INFO",
            code: 371,
            text: "tenantircd: bridges IRC clients to a record-oriented HTTP backend",
        }),
        Box::new(StaticReplyHandler {
            name: "STATS",
            code: 219,
            text: "End of /STATS report",
        }),
        Box::new(StaticReplyHandler {
            name: "ADMIN",
            code: 256,
            text: "administrative contact information is not configured",
        }),
        Box::new(StaticReplyHandler {
            name: "MOTD",
            code: 422,
            text: "MOTD File is missing",
        }),
        Box::new(StaticReplyHandler {
            name: "LINKS",
            code: 365,
            text: "End of /LINKS list",
        }),
        Box::new(StaticReplyHandler {
            name: "HELP",
            code: 524,
            text: "HELP is not implemented; try !help in a channel",
        }),
        Box::new(StaticReplyHandler {
            name: "OPER",
            code: 481,
            text: "Permission Denied- OPER is not implemented",
        }),
        Box::new(StaticReplyHandler {
            name: "KILL",
            code: 481,
            text: "Permission Denied- KILL is not implemented",
        }),
        Box::new(StaticReplyHandler {
            name: "REHASH",
            code: 481,
            text: "Permission Denied- REHASH is not implemented",
        }),
        Box::new(StaticReplyHandler {
            name: "WALLOPS",
            code: 481,
            text: "Permission Denied- WALLOPS is not implemented",
        }),
    ]
}

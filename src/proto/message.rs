//! Inbound line parsing and outbound message construction/rendering.

use chrono::Utc;

/// A parsed inbound line: command plus the raw, unparsed remainder.
///
/// Handlers sub-parse `args` themselves since IRC parameter grammar is
/// command-specific; this layer only strips the client-supplied prefix (which
/// the server ignores) and uppercases the command token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundLine {
    pub command: String,
    pub args: String,
}

impl InboundLine {
    /// Parse `[:prefix] COMMAND [params] [:trailing]`. Returns `None` for an
    /// empty or whitespace-only line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_start();
        if rest.is_empty() {
            return None;
        }
        if rest.starts_with(':') {
            // Discard through the next space; a trailing lone prefix with no
            // command is simply an empty remainder, handled below.
            rest = match rest.find(' ') {
                Some(idx) => rest[idx + 1..].trim_start(),
                None => "",
            };
        }
        if rest.is_empty() {
            return None;
        }
        let (command, args) = match rest.find(' ') {
            Some(idx) => (&rest[..idx], rest[idx + 1..].trim_start()),
            None => (rest, ""),
        };
        Some(InboundLine {
            command: command.to_ascii_uppercase(),
            args: args.to_string(),
        })
    }
}

/// A server-assembled prefix: `nick!user@host` or a bare server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    Server(String),
    User {
        nick: String,
        user: String,
        host: String,
    },
}

impl std::fmt::Display for Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Prefix::Server(name) => write!(f, "{name}"),
            Prefix::User { nick, user, host } => write!(f, "{nick}!{user}@{host}"),
        }
    }
}

/// An outbound IRC message, ready to render for a specific recipient.
///
/// Capability-conditional formatting (the `server-time` tag, extended-join's
/// extra params) is resolved at render time per recipient rather than baked in
/// up front, so one `Message` can be rendered differently for different
/// members of the same broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<Prefix>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl Message {
    pub fn new(command: impl Into<String>) -> Self {
        Message {
            prefix: None,
            command: command.into(),
            params: Vec::new(),
            trailing: None,
        }
    }

    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_trailing(mut self, trailing: impl Into<String>) -> Self {
        self.trailing = Some(trailing.into());
        self
    }

    /// Build a numeric reply: `:server <code> <target> <params...> [:trailing]`.
    pub fn numeric(server: &str, code: u16, target: &str, params: Vec<String>) -> Self {
        let mut full_params = vec![target.to_string()];
        full_params.extend(params);
        Message {
            prefix: Some(Prefix::Server(server.to_string())),
            command: format!("{code:03}"),
            params: full_params,
            trailing: None,
        }
    }

    pub fn numeric_text(server: &str, code: u16, target: &str, text: impl Into<String>) -> Self {
        Message::numeric(server, code, target, Vec::new()).with_trailing(text)
    }

    /// Render the wire form of this message, without CRLF. `server_time`
    /// controls whether the IRCv3 `@time=` tag is prefixed for this recipient.
    pub fn render(&self, server_time: bool) -> String {
        let mut out = String::new();
        if server_time {
            out.push_str("@time=");
            out.push_str(&Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true));
            out.push(' ');
        }
        if let Some(prefix) = &self.prefix {
            out.push(':');
            out.push_str(&prefix.to_string());
            out.push(' ');
        }
        out.push_str(&self.command);
        for param in &self.params {
            out.push(' ');
            out.push_str(param);
        }
        if let Some(trailing) = &self.trailing {
            out.push_str(" :");
            out.push_str(trailing);
        }
        out
    }

    /// Render with a trailing CRLF, ready to write to the socket.
    pub fn render_line(&self, server_time: bool) -> String {
        let mut s = self.render(server_time);
        s.push_str("\r\n");
        s
    }
}

/// Numeric reply codes named in the glossary, grouped for readability.
pub mod numerics {
    pub const RPL_WELCOME: u16 = 1;
    pub const RPL_YOURHOST: u16 = 2;
    pub const RPL_CREATED: u16 = 3;
    pub const RPL_MYINFO: u16 = 4;
    pub const RPL_UMODEIS: u16 = 221;
    pub const RPL_CHANNELMODEIS: u16 = 324;
    pub const RPL_CREATIONTIME: u16 = 329;
    pub const RPL_NOTOPIC: u16 = 331;
    pub const RPL_TOPIC: u16 = 332;
    pub const RPL_INVITING: u16 = 341;
    pub const RPL_NAMREPLY: u16 = 353;
    pub const RPL_ENDOFNAMES: u16 = 366;
    pub const RPL_MOTD: u16 = 372;
    pub const RPL_MOTDSTART: u16 = 375;
    pub const RPL_ENDOFMOTD: u16 = 376;
    pub const ERR_INTERNAL: u16 = 400;
    pub const ERR_NOSUCHNICK: u16 = 401;
    pub const ERR_NOSUCHCHANNEL: u16 = 403;
    pub const ERR_CANNOTSENDTOCHAN: u16 = 404;
    pub const ERR_UNKNOWNCOMMAND: u16 = 421;
    pub const ERR_NONICKNAMEGIVEN: u16 = 431;
    pub const ERR_ERRONEUSNICKNAME: u16 = 432;
    pub const ERR_NICKNAMEINUSE: u16 = 433;
    pub const ERR_NEEDMOREPARAMS: u16 = 461; // note: §7 also uses 461 for USER params
    pub const ERR_NOTONCHANNEL: u16 = 442;
    pub const ERR_USERONCHANNEL: u16 = 443;
    pub const ERR_NOTREGISTERED: u16 = 451;
    pub const ERR_ALREADYREGISTRED: u16 = 462;
    pub const ERR_INVITEONLYCHAN: u16 = 473;
    pub const ERR_BADCHANNELKEY: u16 = 475;
    pub const ERR_CHANOPRIVSNEEDED: u16 = 482;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_command() {
        let line = InboundLine::parse("NICK alice").unwrap();
        assert_eq!(line.command, "NICK");
        assert_eq!(line.args, "alice");
    }

    #[test]
    fn strips_client_prefix() {
        let line = InboundLine::parse(":ignored PRIVMSG #chan :hi there").unwrap();
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.args, "#chan :hi there");
    }

    #[test]
    fn uppercases_command() {
        let line = InboundLine::parse("join #chan").unwrap();
        assert_eq!(line.command, "JOIN");
    }

    #[test]
    fn command_with_no_args() {
        let line = InboundLine::parse("CAP").unwrap();
        assert_eq!(line.command, "CAP");
        assert_eq!(line.args, "");
    }

    #[test]
    fn empty_line_parses_to_none() {
        assert_eq!(InboundLine::parse(""), None);
        assert_eq!(InboundLine::parse("   "), None);
    }

    #[test]
    fn renders_numeric_with_trailing() {
        let msg = Message::numeric_text("irc.test", numerics::RPL_NOTOPIC, "alice", "No topic is set");
        assert_eq!(
            msg.render(false),
            ":irc.test 331 alice :No topic is set"
        );
    }

    #[test]
    fn renders_server_time_tag() {
        let msg = Message::new("PING").with_trailing("x");
        let rendered = msg.render(true);
        assert!(rendered.starts_with("@time="));
        assert!(rendered.ends_with("PING :x"));
    }

    #[test]
    fn renders_user_prefixed_privmsg() {
        let msg = Message::new("PRIVMSG")
            .with_prefix(Prefix::User {
                nick: "alice".into(),
                user: "root".into(),
                host: "acme".into(),
            })
            .with_params(vec!["#chan".into()])
            .with_trailing("hi");
        assert_eq!(msg.render(false), ":alice!root@acme PRIVMSG #chan :hi");
    }
}

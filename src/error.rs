//! Unified error hierarchy for command handling and backend access.
//!
//! Handlers never panic or propagate raw errors to the client; every failure
//! becomes either an IRC numeric, a sender-visible NOTICE, a silent drop, or a
//! logged `400 :Internal server error`, per the error taxonomy this module
//! encodes.

use thiserror::Error;

use crate::proto::{numerics, Message};

/// Errors surfaced by command handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("not enough parameters")]
    NeedMoreParams,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    #[error("nickname in use: {0}")]
    NicknameInUse(String),

    #[error("not registered")]
    NotRegistered,

    #[error("already registered")]
    AlreadyRegistered,

    #[error("no such nick: {0}")]
    NoSuchNick(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("client quit: {0:?}")]
    Quit(Option<String>),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Static label for metrics; mirrors `ChannelError::error_code`.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreParams => "need_more_params",
            Self::UnknownCommand(_) => "unknown_command",
            Self::ErroneousNickname(_) => "erroneous_nickname",
            Self::NicknameInUse(_) => "nickname_in_use",
            Self::NotRegistered => "not_registered",
            Self::AlreadyRegistered => "already_registered",
            Self::NoSuchNick(_) => "no_such_nick",
            Self::AuthFailed(_) => "auth_failed",
            Self::Quit(_) => "quit",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Convert to a client-visible reply, if one is warranted. `Quit` is
    /// handled by the connection loop directly rather than rendered here.
    pub fn to_irc_reply(&self, server: &str, nick: &str, cmd_name: &str) -> Option<Message> {
        let nick_or_star = if nick.is_empty() { "*" } else { nick };
        match self {
            Self::NeedMoreParams => Some(Message::numeric_text(
                server,
                numerics::ERR_NEEDMOREPARAMS,
                nick_or_star,
                format!("{cmd_name} :Not enough parameters"),
            )),
            Self::UnknownCommand(cmd) => Some(Message::numeric(
                server,
                numerics::ERR_UNKNOWNCOMMAND,
                nick_or_star,
                vec![cmd.clone()],
            ).with_trailing("Unknown command")),
            Self::ErroneousNickname(bad) => Some(Message::numeric(
                server,
                numerics::ERR_ERRONEUSNICKNAME,
                nick_or_star,
                vec![bad.clone()],
            ).with_trailing("Erroneous nickname")),
            Self::NicknameInUse(bad) => Some(Message::numeric(
                server,
                numerics::ERR_NICKNAMEINUSE,
                nick_or_star,
                vec![bad.clone()],
            ).with_trailing("Nickname is already in use")),
            Self::NotRegistered => Some(Message::numeric_text(
                server,
                numerics::ERR_NOTREGISTERED,
                "*",
                "You have not registered",
            )),
            Self::AlreadyRegistered => Some(Message::numeric_text(
                server,
                numerics::ERR_ALREADYREGISTRED,
                nick_or_star,
                "You may not reregister",
            )),
            Self::NoSuchNick(target) => Some(Message::numeric(
                server,
                numerics::ERR_NOSUCHNICK,
                nick_or_star,
                vec![target.clone()],
            ).with_trailing("No such nick/channel")),
            Self::AuthFailed(detail) => Some(
                Message::new("USER").with_trailing(format!("Authentication failed - {detail}")),
            ),
            Self::Quit(_) => None,
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal handler error");
                Some(Message::numeric_text(
                    server,
                    numerics::ERR_INTERNAL,
                    nick_or_star,
                    "Internal server error",
                ))
            }
        }
    }
}

/// Errors specific to channel-state operations (join/part/kick/topic/mode).
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("no such channel: {0}")]
    NoSuchChannel(String),

    #[error("not on channel: {0}")]
    NotOnChannel(String),

    #[error("already on channel: {0}")]
    AlreadyOnChannel(String),

    #[error("channel operator needed on {0}")]
    OperatorNeeded(String),

    #[error("cannot send to channel {0}")]
    CannotSendToChannel(String),

    #[error("invite-only channel: {0}")]
    InviteOnly(String),

    #[error("bad channel key: {0}")]
    BadChannelKey(String),

    #[error("access denied: {0}")]
    AccessDenied(String),
}

impl ChannelError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoSuchChannel(_) => "no_such_channel",
            Self::NotOnChannel(_) => "not_on_channel",
            Self::AlreadyOnChannel(_) => "already_on_channel",
            Self::OperatorNeeded(_) => "operator_needed",
            Self::CannotSendToChannel(_) => "cannot_send_to_channel",
            Self::InviteOnly(_) => "invite_only",
            Self::BadChannelKey(_) => "bad_channel_key",
            Self::AccessDenied(_) => "access_denied",
        }
    }

    pub fn to_irc_reply(&self, server: &str, nick: &str, channel: &str) -> Message {
        match self {
            Self::NoSuchChannel(_) => Message::numeric(
                server,
                numerics::ERR_NOSUCHCHANNEL,
                nick,
                vec![channel.to_string()],
            )
            .with_trailing("No such channel"),
            Self::NotOnChannel(_) => Message::numeric(
                server,
                numerics::ERR_NOTONCHANNEL,
                nick,
                vec![channel.to_string()],
            )
            .with_trailing("You're not on that channel"),
            Self::AlreadyOnChannel(_) => Message::numeric(
                server,
                numerics::ERR_USERONCHANNEL,
                nick,
                vec![channel.to_string()],
            )
            .with_trailing("is already on channel"),
            Self::OperatorNeeded(_) => Message::numeric(
                server,
                numerics::ERR_CHANOPRIVSNEEDED,
                nick,
                vec![channel.to_string()],
            )
            .with_trailing("You're not channel operator"),
            Self::CannotSendToChannel(_) => Message::numeric(
                server,
                numerics::ERR_CANNOTSENDTOCHAN,
                nick,
                vec![channel.to_string()],
            )
            .with_trailing("Cannot send to channel (moderated/not a member)"),
            Self::InviteOnly(_) => Message::numeric(
                server,
                numerics::ERR_INVITEONLYCHAN,
                nick,
                vec![channel.to_string()],
            )
            .with_trailing("Cannot join channel (+i)"),
            Self::BadChannelKey(_) => Message::numeric(
                server,
                numerics::ERR_BADCHANNELKEY,
                nick,
                vec![channel.to_string()],
            )
            .with_trailing("Cannot join channel (+k)"),
            Self::AccessDenied(detail) => Message::numeric(
                server,
                numerics::ERR_NOSUCHCHANNEL,
                nick,
                vec![channel.to_string()],
            )
            .with_trailing(format!("Access denied - {detail}")),
        }
    }
}

/// Errors from calls against the backend HTTP API.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("record or collection not found")]
    NotFound,

    #[error("access denied by backend")]
    Forbidden,

    #[error("backend request timed out")]
    Timeout,

    #[error("backend unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("unexpected backend status {0}")]
    Unexpected(u16),

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_registered_targets_star() {
        let err = HandlerError::NotRegistered;
        let msg = err.to_irc_reply("irc.test", "", "NICK").unwrap();
        assert_eq!(msg.params[0], "*");
    }

    #[test]
    fn channel_operator_needed_reply_names_channel() {
        let err = ChannelError::OperatorNeeded("#users".into());
        let msg = err.to_irc_reply("irc.test", "alice", "#users");
        assert_eq!(msg.params, vec!["alice".to_string(), "#users".to_string()]);
    }
}

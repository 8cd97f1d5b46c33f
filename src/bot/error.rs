//! Error type surfaced to the dispatch boundary.
//!
//! Handlers propagate these with `?`; the dispatch loop is the single place
//! they become user-visible chat messages or callback acknowledgments.

use std::fmt;

use crate::bot::schedule::ScheduleParseError;

#[derive(Debug)]
pub enum BotError {
    /// Malformed schedule expression.
    Schedule(ScheduleParseError),
    /// A numeric argument that failed to parse.
    BadNumber { input: String },
    /// Referenced user does not exist.
    UserNotFound { user_id: i64 },
    /// The user answered a confirmation negatively.
    Cancelled,
    /// A question is already pending for this chat.
    ConversationBusy,
    /// The pending question expired before an answer arrived.
    AskTimeout,
    /// Command resolved but the sub-action token is not recognized.
    UnknownSubcommand { command: &'static str, action: String },
    /// Sub-action exists but has no implementation yet.
    NotImplemented { action: String },
    /// Handler requested an argument the command never declared.
    UnknownArgument { name: String },
    Database(rusqlite::Error),
    Transport(String),
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Schedule(e) => write!(f, "{}", e),
            Self::BadNumber { input } => write!(f, "invalid number: '{}'", input),
            Self::UserNotFound { user_id } => write!(f, "user {} not found", user_id),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ConversationBusy => {
                write!(f, "another question in this chat is still waiting for an answer")
            }
            Self::AskTimeout => write!(f, "no answer arrived in time, giving up"),
            Self::UnknownSubcommand { command, action } => {
                write!(f, "unknown {} action '{}'", command, action)
            }
            Self::NotImplemented { action } => {
                write!(f, "'{}' is not implemented yet", action)
            }
            Self::UnknownArgument { name } => {
                write!(f, "argument '{}' is not declared on this command", name)
            }
            Self::Database(e) => write!(f, "database error: {}", e),
            Self::Transport(msg) => write!(f, "telegram error: {}", msg),
        }
    }
}

impl std::error::Error for BotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schedule(e) => Some(e),
            Self::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ScheduleParseError> for BotError {
    fn from(e: ScheduleParseError) -> Self {
        Self::Schedule(e)
    }
}

impl From<rusqlite::Error> for BotError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e)
    }
}

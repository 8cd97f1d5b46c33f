//! Bot core: command dispatch, conversations, schedules, persistence.

pub mod ask;
pub mod command;
pub mod commands;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod schedule;
pub mod transport;

pub use ask::{AskService, Suggestion};
pub use command::{ArgSpec, Command, Invocation};
pub use database::{Database, User};
pub use dispatch::{Engine, EventPayload, InboundEvent};
pub use error::BotError;
pub use registry::CommandRegistry;
pub use schedule::ScheduleExpression;
pub use transport::{ChatTransport, TelegramTransport};

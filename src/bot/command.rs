//! Command descriptors and the per-event invocation context.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::bot::ask::{AskService, Suggestion};
use crate::bot::database::{Database, User};
use crate::bot::error::BotError;
use crate::bot::transport::ChatTransport;

/// Declaration of one named command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    /// Unique within the command.
    pub name: &'static str,
    /// Question shown when the value is missing and the handler asks for it.
    pub question: &'static str,
    /// Trailing slot that absorbs all remaining input tokens. Must be the
    /// last spec in the list; at most one per command.
    pub variadic: bool,
}

impl ArgSpec {
    pub const fn new(name: &'static str, question: &'static str) -> Self {
        Self { name, question, variadic: false }
    }

    pub const fn variadic(name: &'static str, question: &'static str) -> Self {
        Self { name, question, variadic: true }
    }
}

/// A registered bot command. Immutable after registration.
#[async_trait]
pub trait Command: Send + Sync {
    /// Alias strings, each starting with the command marker. The first one
    /// is the primary alias used for the bot menu.
    fn aliases(&self) -> &[&'static str];

    /// One-line help shown in the command menu.
    fn help(&self) -> &'static str;

    fn args(&self) -> &[ArgSpec] {
        &[]
    }

    async fn execute(&self, inv: &Invocation<'_>) -> Result<(), BotError>;
}

/// Everything a handler gets for one inbound event. Built fresh per event.
pub struct Invocation<'a> {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    /// Originating message id, for replies.
    pub message_id: Option<i64>,
    /// Raw whitespace-split tokens, command name included.
    pub tokens: Vec<String>,
    /// The requesting user's stored record.
    pub user: User,
    pub(crate) named: HashMap<String, String>,
    pub(crate) command: &'a dyn Command,
    pub(crate) ask: &'a AskService,
    pub(crate) transport: &'a dyn ChatTransport,
    pub(crate) db: &'a Database,
}

impl Invocation<'_> {
    /// Value bound to a named argument, if any.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.named.get(name).map(String::as_str)
    }

    pub fn transport(&self) -> &dyn ChatTransport {
        self.transport
    }

    pub fn db(&self) -> &Database {
        self.db
    }

    /// Ask the originating chat a free-form question and wait for the
    /// answer.
    pub async fn ask(&self, prompt: &str) -> Result<String, BotError> {
        self.ask.ask(self.chat_id, prompt, &[]).await
    }

    /// Ask with quick-reply suggestions.
    pub async fn ask_with(
        &self,
        prompt: &str,
        suggestions: &[Suggestion],
    ) -> Result<String, BotError> {
        self.ask.ask(self.chat_id, prompt, suggestions).await
    }

    /// Yes/no confirmation; negative answers become [`BotError::Cancelled`].
    pub async fn confirm(&self, prompt: &str) -> Result<(), BotError> {
        self.ask.confirm(self.chat_id, prompt).await
    }

    /// Return the bound value for `name`, or ask the chat using the
    /// argument's declared question and wait for the answer.
    ///
    /// Asking for an argument the command never declared is a programmer
    /// error and fails with [`BotError::UnknownArgument`].
    pub async fn get_or_ask(&self, name: &str) -> Result<String, BotError> {
        self.get_or_ask_with(name, &[]).await
    }

    pub async fn get_or_ask_with(
        &self,
        name: &str,
        suggestions: &[Suggestion],
    ) -> Result<String, BotError> {
        if let Some(value) = self.named.get(name) {
            return Ok(value.clone());
        }
        let Some(spec) = self.command.args().iter().find(|a| a.name == name) else {
            return Err(BotError::UnknownArgument { name: name.to_string() });
        };
        self.ask
            .ask(self.chat_id, &format!("❓ {}", spec.question), suggestions)
            .await
    }
}

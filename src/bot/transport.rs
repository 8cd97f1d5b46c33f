//! Chat transport behind a narrow trait, with a teloxide implementation.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, ParseMode,
    ReplyParameters,
};
use tracing::warn;

use crate::bot::error::BotError;

/// One inline quick-reply button: the displayed text and the payload the
/// transport delivers back when it is pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickReply {
    pub text: String,
    pub payload: String,
}

impl QuickReply {
    pub fn new(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { text: text.into(), payload: payload.into() }
    }
}

/// What the engine needs from the chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send an HTML message, optionally as a reply to `reply_to`.
    async fn send_message(
        &self,
        chat_id: i64,
        html: &str,
        reply_to: Option<i64>,
    ) -> Result<(), BotError>;

    /// Send an HTML message with quick-reply buttons attached.
    async fn send_keyboard(
        &self,
        chat_id: i64,
        html: &str,
        buttons: &[QuickReply],
    ) -> Result<(), BotError>;

    /// Answer a button press. Empty text clears the client's spinner
    /// without any visible effect.
    async fn ack_button(&self, callback_id: &str, text: &str) -> Result<(), BotError>;
}

/// Telegram implementation over a teloxide [`Bot`].
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        html: &str,
        reply_to: Option<i64>,
    ) -> Result<(), BotError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), html)
            .parse_mode(ParseMode::Html);

        if let Some(msg_id) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id as i32)));
        }

        request.await.map(|_| ()).map_err(|e| {
            warn!("Failed to send message to chat {}: {}", chat_id, e);
            BotError::Transport(format!("failed to send message: {e}"))
        })
    }

    async fn send_keyboard(
        &self,
        chat_id: i64,
        html: &str,
        buttons: &[QuickReply],
    ) -> Result<(), BotError> {
        let rows: Vec<Vec<InlineKeyboardButton>> = buttons
            .iter()
            .map(|b| vec![InlineKeyboardButton::callback(b.text.clone(), b.payload.clone())])
            .collect();

        self.bot
            .send_message(ChatId(chat_id), html)
            .parse_mode(ParseMode::Html)
            .reply_markup(InlineKeyboardMarkup::new(rows))
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Failed to send keyboard to chat {}: {}", chat_id, e);
                BotError::Transport(format!("failed to send keyboard: {e}"))
            })
    }

    async fn ack_button(&self, callback_id: &str, text: &str) -> Result<(), BotError> {
        let mut request = self
            .bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()));
        if !text.is_empty() {
            request = request.text(text);
        }
        request.await.map(|_| ()).map_err(|e| {
            warn!("Failed to answer callback query {}: {}", callback_id, e);
            BotError::Transport(format!("failed to answer callback query: {e}"))
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording transport for ask/dispatch tests.

    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Message { chat_id: i64, html: String, reply_to: Option<i64> },
        Keyboard { chat_id: i64, html: String, buttons: Vec<QuickReply> },
        Ack { callback_id: String, text: String },
    }

    #[derive(Default)]
    pub struct RecordingTransport {
        pub sent: Mutex<Vec<Sent>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn log(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn send_message(
            &self,
            chat_id: i64,
            html: &str,
            reply_to: Option<i64>,
        ) -> Result<(), BotError> {
            self.sent.lock().unwrap().push(Sent::Message {
                chat_id,
                html: html.to_string(),
                reply_to,
            });
            Ok(())
        }

        async fn send_keyboard(
            &self,
            chat_id: i64,
            html: &str,
            buttons: &[QuickReply],
        ) -> Result<(), BotError> {
            self.sent.lock().unwrap().push(Sent::Keyboard {
                chat_id,
                html: html.to_string(),
                buttons: buttons.to_vec(),
            });
            Ok(())
        }

        async fn ack_button(&self, callback_id: &str, text: &str) -> Result<(), BotError> {
            self.sent.lock().unwrap().push(Sent::Ack {
                callback_id: callback_id.to_string(),
                text: text.to_string(),
            });
            Ok(())
        }
    }
}

//! Conversation state: one pending question per chat.
//!
//! `ask` suspends the calling task on a oneshot rendezvous until the dispatch
//! loop routes a later inbound event for the same chat back through
//! `resolve`. Only the asking task parks; events for other chats keep
//! flowing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::bot::error::BotError;
use crate::bot::transport::{ChatTransport, QuickReply};

/// How long a question may stay unanswered before the asking task is woken
/// with [`BotError::AskTimeout`] and the pending slot is cleared.
const DEFAULT_ASK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// A suggested answer: `label` is displayed on the button and travels back
/// as the press payload; `value` is what the asking code receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub label: String,
    pub value: String,
}

impl Suggestion {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into() }
    }
}

struct PendingQuestion {
    suggestions: Vec<Suggestion>,
    tx: oneshot::Sender<String>,
}

pub struct AskService {
    transport: Arc<dyn ChatTransport>,
    pending: Mutex<HashMap<i64, PendingQuestion>>,
    timeout: Duration,
}

impl AskService {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self::with_timeout(transport, DEFAULT_ASK_TIMEOUT)
    }

    pub fn with_timeout(transport: Arc<dyn ChatTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Send `prompt` to the chat and suspend until the next inbound event
    /// for the same chat resumes us with its answer.
    ///
    /// Fails with [`BotError::ConversationBusy`] when the chat already has a
    /// pending question, and with [`BotError::AskTimeout`] when no answer
    /// arrives within the configured window.
    pub async fn ask(
        &self,
        chat_id: i64,
        prompt: &str,
        suggestions: &[Suggestion],
    ) -> Result<String, BotError> {
        let (tx, mut rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            if pending.contains_key(&chat_id) {
                return Err(BotError::ConversationBusy);
            }
            pending.insert(
                chat_id,
                PendingQuestion { suggestions: suggestions.to_vec(), tx },
            );
        }

        let sent = if suggestions.is_empty() {
            self.transport.send_message(chat_id, prompt, None).await
        } else {
            let buttons: Vec<QuickReply> = suggestions
                .iter()
                .map(|s| QuickReply::new(s.label.clone(), s.label.clone()))
                .collect();
            self.transport.send_keyboard(chat_id, prompt, &buttons).await
        };
        if let Err(e) = sent {
            self.pending.lock().unwrap().remove(&chat_id);
            return Err(e);
        }

        let sleep = tokio::time::sleep(self.timeout);
        tokio::pin!(sleep);
        tokio::select! {
            answer = &mut rx => answer.map_err(|_| BotError::AskTimeout),
            _ = &mut sleep => {
                let removed = self.pending.lock().unwrap().remove(&chat_id).is_some();
                if removed {
                    debug!("Question for chat {} timed out", chat_id);
                    Err(BotError::AskTimeout)
                } else {
                    // An answer is in flight: resolve already took the slot.
                    rx.await.map_err(|_| BotError::AskTimeout)
                }
            }
        }
    }

    /// Route an inbound event's text to this chat's pending question, if
    /// any. Returns whether the event was consumed.
    ///
    /// A button press whose payload matches a suggestion label resumes the
    /// asker with that suggestion's value; anything else resumes it with the
    /// raw text.
    pub fn resolve(&self, chat_id: i64, text: &str, from_button: bool) -> bool {
        let question = { self.pending.lock().unwrap().remove(&chat_id) };
        let Some(question) = question else {
            return false;
        };

        let answer = if from_button {
            question
                .suggestions
                .iter()
                .find(|s| s.label == text)
                .map(|s| s.value.clone())
                .unwrap_or_else(|| text.to_string())
        } else {
            text.to_string()
        };

        if question.tx.send(answer).is_err() {
            warn!("Answer for chat {} arrived after the question expired", chat_id);
        }
        true
    }

    /// Yes/no question built on [`AskService::ask`]. Succeeds only on the
    /// affirmative choice; anything else is [`BotError::Cancelled`].
    pub async fn confirm(&self, chat_id: i64, prompt: &str) -> Result<(), BotError> {
        let suggestions = [
            Suggestion::new("✅ Yes", "yes"),
            Suggestion::new("❌ No", "no"),
        ];
        let answer = self.ask(chat_id, prompt, &suggestions).await?;
        if answer == "yes" {
            Ok(())
        } else {
            Err(BotError::Cancelled)
        }
    }
}

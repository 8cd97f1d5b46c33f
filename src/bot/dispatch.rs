//! The dispatch loop: one task per inbound event.
//!
//! Order of business per event: pending-question interception first, then
//! registry matching, argument binding, user enrichment, and execution.
//! Handler failures never crash the process; this module is the single
//! place they become user-visible chat output.

use std::sync::Arc;

use teloxide::utils::html;
use tracing::{debug, warn};

use crate::bot::ask::AskService;
use crate::bot::command::{Command, Invocation};
use crate::bot::database::Database;
use crate::bot::error::BotError;
use crate::bot::registry::CommandRegistry;
use crate::bot::transport::ChatTransport;

/// A single delivered unit from the chat transport.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    /// Originating message id, for replies.
    pub message_id: Option<i64>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A typed chat message.
    Message { text: String },
    /// An inline-keyboard button press.
    ButtonPress { callback_id: String, data: String },
}

impl InboundEvent {
    fn text(&self) -> &str {
        match &self.payload {
            EventPayload::Message { text } => text,
            EventPayload::ButtonPress { data, .. } => data,
        }
    }

    fn is_button(&self) -> bool {
        matches!(self.payload, EventPayload::ButtonPress { .. })
    }

    fn callback_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::ButtonPress { callback_id, .. } => Some(callback_id),
            EventPayload::Message { .. } => None,
        }
    }
}

pub struct Engine {
    registry: CommandRegistry,
    ask: AskService,
    transport: Arc<dyn ChatTransport>,
    db: Database,
    bot_username: String,
}

impl Engine {
    pub fn new(
        registry: CommandRegistry,
        transport: Arc<dyn ChatTransport>,
        db: Database,
        bot_username: String,
    ) -> Self {
        let ask = AskService::new(transport.clone());
        Self { registry, ask, transport, db, bot_username }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Process one inbound event to completion. Callers spawn this per
    /// event so a suspended conversation never stalls the update stream.
    pub async fn handle_event(&self, event: InboundEvent) {
        // A pending question for this chat consumes the event entirely.
        if self.ask.resolve(event.chat_id, event.text(), event.is_button()) {
            debug!("Chat {}: event consumed by pending question", event.chat_id);
            self.ack_silently(&event).await;
            return;
        }

        let Some(command) = self.registry.resolve(event.text(), &self.bot_username) else {
            if event.is_button() {
                // Unmatched button presses are acked so the client stops
                // spinning; unmatched text is ignored.
                self.ack_silently(&event).await;
            } else {
                debug!("Chat {}: no command matched {:?}", event.chat_id, event.text());
            }
            return;
        };

        if let Err(err) = self.run_command(command.as_ref(), &event).await {
            warn!(
                "Command {:?} failed in chat {}: {}",
                event.text(),
                event.chat_id,
                err
            );
            self.report_error(&event, &err).await;
        } else {
            self.ack_silently(&event).await;
        }
    }

    async fn run_command(
        &self,
        command: &dyn Command,
        event: &InboundEvent,
    ) -> Result<(), BotError> {
        let tokens: Vec<String> = event.text().split_whitespace().map(String::from).collect();
        let named = CommandRegistry::bind_args(command, &tokens);
        let user = self
            .db
            .find_or_create_user(event.user_id, event.username.as_deref())?;

        let inv = Invocation {
            chat_id: event.chat_id,
            user_id: event.user_id,
            username: event.username.clone(),
            message_id: event.message_id,
            tokens,
            user,
            named,
            command,
            ask: &self.ask,
            transport: self.transport.as_ref(),
            db: &self.db,
        };
        command.execute(&inv).await
    }

    async fn ack_silently(&self, event: &InboundEvent) {
        if let Some(callback_id) = event.callback_id() {
            if let Err(e) = self.transport.ack_button(callback_id, "").await {
                warn!("Failed to ack callback {}: {}", callback_id, e);
            }
        }
    }

    async fn report_error(&self, event: &InboundEvent, err: &BotError) {
        match event.callback_id() {
            Some(callback_id) => {
                // Callback answers are transient plain text.
                if let Err(e) = self
                    .transport
                    .ack_button(callback_id, &format!("🚫 Error: {err}"))
                    .await
                {
                    warn!("Failed to report error to callback {}: {}", callback_id, e);
                }
            }
            None => {
                let text = format!("🚫 Error: <b>{}</b>", html::escape(&err.to_string()));
                if let Err(e) = self
                    .transport
                    .send_message(event.chat_id, &text, event.message_id)
                    .await
                {
                    warn!("Failed to report error to chat {}: {}", event.chat_id, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::bot::command::ArgSpec;
    use crate::bot::transport::testing::{RecordingTransport, Sent};

    struct EchoCommand;

    const ECHO_ARGS: &[ArgSpec] = &[
        ArgSpec::new("a", "a?"),
        ArgSpec::variadic("b", "b?"),
    ];

    #[async_trait]
    impl Command for EchoCommand {
        fn aliases(&self) -> &[&'static str] {
            &["/echo"]
        }
        fn help(&self) -> &'static str {
            "echoes its arguments"
        }
        fn args(&self) -> &[ArgSpec] {
            ECHO_ARGS
        }
        async fn execute(&self, inv: &Invocation<'_>) -> Result<(), BotError> {
            let text = format!(
                "a={} b={}",
                inv.arg("a").unwrap_or("-"),
                inv.arg("b").unwrap_or("-")
            );
            inv.transport().send_message(inv.chat_id, &text, None).await
        }
    }

    struct AskingCommand;

    const ASKING_ARGS: &[ArgSpec] = &[ArgSpec::new("city", "Which city?")];

    #[async_trait]
    impl Command for AskingCommand {
        fn aliases(&self) -> &[&'static str] {
            &["/city"]
        }
        fn help(&self) -> &'static str {
            "asks for a city when missing"
        }
        fn args(&self) -> &[ArgSpec] {
            ASKING_ARGS
        }
        async fn execute(&self, inv: &Invocation<'_>) -> Result<(), BotError> {
            let city = inv.get_or_ask("city").await?;
            inv.transport()
                .send_message(inv.chat_id, &format!("picked {city}"), None)
                .await
        }
    }

    struct FailingCommand;

    #[async_trait]
    impl Command for FailingCommand {
        fn aliases(&self) -> &[&'static str] {
            &["/fail"]
        }
        fn help(&self) -> &'static str {
            "always fails"
        }
        async fn execute(&self, _inv: &Invocation<'_>) -> Result<(), BotError> {
            Err(BotError::BadNumber { input: "<nope>".to_string() })
        }
    }

    fn engine() -> (Arc<Engine>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let mut registry = CommandRegistry::new();
        registry.register(Arc::new(EchoCommand));
        registry.register(Arc::new(AskingCommand));
        registry.register(Arc::new(FailingCommand));
        let db = Database::open_in_memory().unwrap();
        let engine = Arc::new(Engine::new(
            registry,
            transport.clone(),
            db,
            "mybot".to_string(),
        ));
        (engine, transport)
    }

    fn message(chat_id: i64, text: &str) -> InboundEvent {
        InboundEvent {
            chat_id,
            user_id: 100,
            username: Some("alice".to_string()),
            message_id: Some(5),
            payload: EventPayload::Message { text: text.to_string() },
        }
    }

    fn button(chat_id: i64, callback_id: &str, data: &str) -> InboundEvent {
        InboundEvent {
            chat_id,
            user_id: 100,
            username: Some("alice".to_string()),
            message_id: None,
            payload: EventPayload::ButtonPress {
                callback_id: callback_id.to_string(),
                data: data.to_string(),
            },
        }
    }

    async fn wait_for_sends(transport: &RecordingTransport, n: usize) {
        for _ in 0..200 {
            if transport.log().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("transport never recorded {n} sends: {:?}", transport.log());
    }

    #[tokio::test]
    async fn test_message_matches_and_binds_arguments() {
        let (engine, transport) = engine();
        engine.handle_event(message(7, "/echo x y z")).await;
        assert_eq!(
            transport.log(),
            vec![Sent::Message {
                chat_id: 7,
                html: "a=x b=y z".to_string(),
                reply_to: None
            }]
        );
    }

    #[tokio::test]
    async fn test_bot_suffix_is_stripped() {
        let (engine, transport) = engine();
        engine.handle_event(message(7, "/echo@mybot x")).await;
        assert_eq!(
            transport.log(),
            vec![Sent::Message {
                chat_id: 7,
                html: "a=x b=-".to_string(),
                reply_to: None
            }]
        );
    }

    #[tokio::test]
    async fn test_unmatched_text_is_ignored() {
        let (engine, transport) = engine();
        engine.handle_event(message(7, "just chatting")).await;
        engine.handle_event(message(7, "/unknown")).await;
        assert!(transport.log().is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_button_is_acked_silently() {
        let (engine, transport) = engine();
        engine.handle_event(button(7, "cb1", "stale data")).await;
        assert_eq!(
            transport.log(),
            vec![Sent::Ack { callback_id: "cb1".to_string(), text: String::new() }]
        );
    }

    #[tokio::test]
    async fn test_handler_error_is_reported_as_escaped_reply() {
        let (engine, transport) = engine();
        engine.handle_event(message(7, "/fail")).await;
        match &transport.log()[0] {
            Sent::Message { chat_id, html, reply_to } => {
                assert_eq!(*chat_id, 7);
                assert_eq!(*reply_to, Some(5));
                assert!(html.starts_with("🚫 Error: <b>"));
                // The '<' in the error text is escaped, not interpreted.
                assert!(html.contains("&lt;nope&gt;"));
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_button_originated_error_uses_transient_ack() {
        let (engine, transport) = engine();
        engine.handle_event(button(7, "cb1", "/fail")).await;
        match &transport.log()[0] {
            Sent::Ack { callback_id, text } => {
                assert_eq!(callback_id, "cb1");
                assert!(text.starts_with("🚫 Error:"));
            }
            other => panic!("expected ack, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_successful_button_command_is_acked() {
        let (engine, transport) = engine();
        engine.handle_event(button(7, "cb1", "/echo x")).await;
        let log = transport.log();
        assert_eq!(log.len(), 2);
        assert_eq!(
            log[1],
            Sent::Ack { callback_id: "cb1".to_string(), text: String::new() }
        );
    }

    #[tokio::test]
    async fn test_command_execution_enriches_user() {
        let (engine, _) = engine();
        engine.handle_event(message(7, "/echo x")).await;
        let stored = engine.db.find_user(100).unwrap().unwrap();
        assert_eq!(stored.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_ask_resume_across_events() {
        let (engine, transport) = engine();

        // The command suspends waiting for the missing argument.
        let eng = engine.clone();
        let first = tokio::spawn(async move { eng.handle_event(message(7, "/city")).await });

        // The question went out.
        wait_for_sends(&transport, 1).await;
        assert_eq!(
            transport.log()[0],
            Sent::Message {
                chat_id: 7,
                html: "❓ Which city?".to_string(),
                reply_to: None
            }
        );

        // A later event for the same chat resumes the suspended handler
        // instead of being dispatched as a command.
        engine.handle_event(message(7, "Lisbon")).await;
        first.await.unwrap();
        assert_eq!(
            transport.log()[1],
            Sent::Message {
                chat_id: 7,
                html: "picked Lisbon".to_string(),
                reply_to: None
            }
        );

        // The pending state is cleared: the same text now dispatches fresh.
        engine.handle_event(message(7, "Lisbon")).await;
        assert_eq!(transport.log().len(), 2);
    }

    #[tokio::test]
    async fn test_bound_argument_skips_the_ask() {
        let (engine, transport) = engine();
        engine.handle_event(message(7, "/city Porto")).await;
        assert_eq!(
            transport.log(),
            vec![Sent::Message {
                chat_id: 7,
                html: "picked Porto".to_string(),
                reply_to: None
            }]
        );
    }

    #[tokio::test]
    async fn test_ask_resume_via_button_press() {
        let (engine, transport) = engine();

        let eng = engine.clone();
        let first = tokio::spawn(async move { eng.handle_event(message(7, "/city")).await });
        wait_for_sends(&transport, 1).await;

        // Answer arrives as a button press; it is consumed and acked.
        engine.handle_event(button(7, "cb9", "Madrid")).await;
        first.await.unwrap();

        let log = transport.log();
        assert!(log.contains(&Sent::Message {
            chat_id: 7,
            html: "picked Madrid".to_string(),
            reply_to: None
        }));
        assert!(log.contains(&Sent::Ack { callback_id: "cb9".to_string(), text: String::new() }));
    }

    #[tokio::test]
    async fn test_other_chats_flow_while_one_is_suspended() {
        let (engine, transport) = engine();

        let eng = engine.clone();
        let suspended = tokio::spawn(async move { eng.handle_event(message(7, "/city")).await });
        wait_for_sends(&transport, 1).await;

        // A different chat's command is processed immediately.
        engine.handle_event(message(8, "/echo hi")).await;
        assert!(transport.log().contains(&Sent::Message {
            chat_id: 8,
            html: "a=hi b=-".to_string(),
            reply_to: None
        }));

        engine.handle_event(message(7, "Lisbon")).await;
        suspended.await.unwrap();
    }
}

mod bot;
mod config;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{BotCommand, CallbackQuery};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use bot::commands::{AdminCommand, NextCommand, StartCommand, SuggestCommand};
use bot::{CommandRegistry, Database, Engine, EventPayload, InboundEvent, TelegramTransport};
use config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "meetbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("meetbot.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting meetbot...");
    info!("Loaded config from {config_path}");

    let db = match Database::open(&config.data_dir.join("meetbot.db")) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to open database: {e}");
            std::process::exit(1);
        }
    };

    for user_id in &config.bootstrap_admin_ids {
        if let Err(e) = db.set_admin(*user_id, true) {
            tracing::error!("Failed to bootstrap admin {user_id}: {e}");
            std::process::exit(1);
        }
    }

    let bot = Bot::new(&config.telegram_bot_token);

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            me.username().to_string()
        }
        Err(e) => {
            tracing::error!("Failed to get bot info: {e}");
            std::process::exit(1);
        }
    };

    let mut registry = CommandRegistry::new();
    registry.register(Arc::new(StartCommand));
    registry.register(Arc::new(NextCommand));
    registry.register(Arc::new(SuggestCommand));
    registry.register(Arc::new(AdminCommand));

    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let engine = Arc::new(Engine::new(registry, transport, db, bot_username));

    // Publish the command menu to Telegram clients.
    let menu: Vec<BotCommand> = engine
        .registry()
        .menu()
        .into_iter()
        .map(|(name, help)| BotCommand::new(name, help))
        .collect();
    if let Err(e) = bot.set_my_commands(menu).await {
        warn!("Failed to set command menu: {e}");
    }

    info!("Receiving updates...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback_query));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

/// Spawn event processing so a handler suspended on a question never stalls
/// the update stream.
fn spawn_event(engine: Arc<Engine>, event: InboundEvent) {
    tokio::spawn(async move {
        engine.handle_event(event).await;
    });
}

async fn handle_message(msg: Message, engine: Arc<Engine>) -> ResponseResult<()> {
    let Some(ref user) = msg.from else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let username = user
        .username
        .clone()
        .unwrap_or_else(|| user.first_name.clone());

    let event = InboundEvent {
        chat_id: msg.chat.id.0,
        user_id: user.id.0 as i64,
        username: Some(username),
        message_id: Some(msg.id.0 as i64),
        payload: EventPayload::Message { text: text.to_string() },
    };
    spawn_event(engine, event);
    Ok(())
}

async fn handle_callback_query(query: CallbackQuery, engine: Arc<Engine>) -> ResponseResult<()> {
    let Some(chat_id) = query.message.as_ref().map(|m| m.chat().id.0) else {
        return Ok(());
    };
    let Some(data) = query.data.clone() else {
        return Ok(());
    };

    let username = query
        .from
        .username
        .clone()
        .unwrap_or_else(|| query.from.first_name.clone());

    let event = InboundEvent {
        chat_id,
        user_id: query.from.id.0 as i64,
        username: Some(username),
        message_id: None,
        payload: EventPayload::ButtonPress {
            callback_id: query.id.0.clone(),
            data,
        },
    };
    spawn_event(engine, event);
    Ok(())
}

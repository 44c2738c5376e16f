mod commands;
mod config;
mod dispatch;
mod gate;
mod queue;
mod redact;
mod store;
mod telegram_log;
mod transport;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use config::Config;
use gate::ProfanityList;
use queue::{ForwardQueue, MediaKind, QueueItem};
use store::Store;
use transport::{RelayTransport, TelegramRelay};

pub struct BotState {
    pub store: Arc<Mutex<Store>>,
    pub transport: Arc<dyn RelayTransport>,
    pub queue: ForwardQueue,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tgrelay.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("tgrelay.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
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
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let tg_layer = telegram_log::TelegramLogLayer::new(bot.clone(), log_chat_id);
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    info!("🤖 Starting tgrelay...");
    info!("Loaded config from {config_path}");

    let mut store = match Store::open(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = store.ensure_admins(&config.bootstrap_admins) {
        error!("Failed to persist bootstrap admins: {e}");
        std::process::exit(1);
    }
    info!(
        "State loaded from {} ({} pairs, forwarding {})",
        config.db_path.display(),
        store.pairs().len(),
        if store.forwarding_enabled() { "on" } else { "off" }
    );

    let store = Arc::new(Mutex::new(store));
    let transport: Arc<dyn RelayTransport> = Arc::new(TelegramRelay::new(bot.clone()));
    let queue = ForwardQueue::start(
        store.clone(),
        transport.clone(),
        Arc::new(ProfanityList::default()),
        config.forward_delay,
        config.attach_origin_link,
    );

    let state = Arc::new(BotState { store, transport, queue });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_channel_post().endpoint(handle_channel_post))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let is_private = matches!(msg.chat.kind, ChatKind::Private(_));

    if is_private {
        // The management surface lives in DMs; everything else relays.
        if msg.text().is_some_and(|t| t.starts_with('/')) {
            return commands::handle_command(bot, msg, state).await;
        }
        return Ok(());
    }

    state.queue.enqueue(queue_item_from(&msg));
    Ok(())
}

async fn handle_channel_post(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    state.queue.enqueue(queue_item_from(&msg));
    Ok(())
}

async fn handle_callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    commands::handle_callback(bot, q, state).await
}

fn queue_item_from(msg: &Message) -> QueueItem {
    let text = msg
        .text()
        .or_else(|| msg.caption())
        .unwrap_or("")
        .to_string();

    // Photos arrive as a size ladder; the last entry is the largest.
    let media = if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        MediaKind::Photo(photo.file.id.clone())
    } else if let Some(video) = msg.video() {
        MediaKind::Video(video.file.id.clone())
    } else if let Some(document) = msg.document() {
        MediaKind::Document(document.file.id.clone())
    } else {
        MediaKind::Text
    };

    let sender = msg
        .from
        .as_ref()
        .and_then(|u| u.username.clone())
        .or_else(|| msg.chat.title().map(str::to_string));

    QueueItem {
        origin_chat: msg.chat.id.0,
        origin_message_id: msg.id.0,
        sender,
        text,
        media,
    }
}

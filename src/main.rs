use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tele_translate::config::{Config, TransportMode};
use tele_translate::handler::{self, AppState, Command};
use tele_translate::outbox::{Outbox, TelegramTransport};
use tele_translate::pidlock::{self, PidLock};
use tele_translate::state::{ChatPrefs, SeenSet};
use tele_translate::translator::build_translators;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // One process per bot token: a second poller would steal updates and
    // double-reply. Must happen before any listener starts.
    let lock = Arc::new(PidLock::acquire(pidlock::LOCK_FILE)?);

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let mut config = Config::load(&config_path).await?;
    config.apply_env();
    config.validate()?;
    let config = Arc::new(config);

    spawn_signal_handler(lock.clone())?;

    let bot = Bot::new(&config.telegram.token);
    let (translator, forced_translator) = build_translators(&config.translation);
    let outbox = Outbox::spawn(Arc::new(TelegramTransport::new(bot.clone())));

    let state = AppState {
        config: config.clone(),
        prefs: Arc::new(ChatPrefs::new()),
        seen: Arc::new(SeenSet::default()),
        outbox,
        translator: Arc::new(translator),
        forced_translator: forced_translator.map(Arc::new),
    };

    info!(
        mode = ?config.telegram.mode,
        model = %config.translation.model,
        fallback = %config.translation.fallback_model,
        chain = ?state.translator.step_labels(),
        auto_translate = config.routing.auto_translate,
        routing = %format!(
            "ko->{}, km->{}, vi->{}",
            config.routing.korean_to, config.routing.khmer_to, config.routing.vietnamese_to
        ),
        allowed_chats = %if config.telegram.allowed_chat_ids.is_empty() {
            "ALL".to_string()
        } else {
            format!("{:?}", config.telegram.allowed_chat_ids)
        },
        "tele-translate running"
    );

    let tree = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handler::handle_command),
        )
        .branch(Update::filter_message().endpoint(handler::handle_message));

    let mut dispatcher = Dispatcher::builder(bot.clone(), tree)
        .dependencies(dptree::deps![state])
        .build();

    match config.telegram.mode {
        TransportMode::Polling => dispatcher.dispatch().await,
        TransportMode::Webhook => {
            let webhook = &config.telegram.webhook;
            let public_url = webhook
                .public_url
                .as_deref()
                .context("telegram.mode is \"webhook\" but telegram.webhook.public_url is not set")?;
            let url: url::Url =
                format!("{}{}", public_url.trim_end_matches('/'), webhook.path)
                    .parse()
                    .context("invalid webhook public_url/path")?;
            let addr: SocketAddr = format!("{}:{}", webhook.host, webhook.port)
                .parse()
                .context("invalid webhook host/port")?;

            info!(%url, %addr, "registering webhook");
            let listener = webhooks::axum(bot, webhooks::Options::new(addr, url))
                .await
                .context("failed to register webhook")?;
            dispatcher
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("webhook update listener error"),
                )
                .await;
        }
    }

    // Reached when the dispatcher stops; the lock drops here on the way out.
    drop(lock);
    Ok(())
}

/// Release the pid lock on SIGINT/SIGTERM, then exit cleanly.
fn spawn_signal_handler(lock: Arc<PidLock>) -> anyhow::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        info!("shutting down");
        lock.release();
        std::process::exit(0);
    });
    Ok(())
}

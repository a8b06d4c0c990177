//! Inbound update processing: filtering, routing, translation, delivery.

use std::sync::Arc;

use teloxide::types::{ChatId, Message};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::outbox::{Outbox, OutboundMessage};
use crate::router::{LanguageMode, pick_target_language};
use crate::script::{Script, detect_script, is_emoji_only};
use crate::state::{ChatPrefs, SeenSet};
use crate::translator::Translator;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Shared application state, injected into every handler invocation.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub prefs: Arc<ChatPrefs>,
    pub seen: Arc<SeenSet>,
    pub outbox: Outbox,
    pub translator: Arc<Translator>,
    /// Single-step OpenAI chain for chats that forced `/model 2`.
    /// None when no OpenAI key is configured.
    pub forced_translator: Option<Arc<Translator>>,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "health check")]
    Ping,
    #[command(description = "set the chat language mode: 1 = Khmer, 2 = Vietnamese")]
    Lang(String),
    #[command(description = "set the translation model: 1 = default chain, 2 = force fallback")]
    Model(String),
}

/// Whether a plain text message should enter the translation pipeline.
pub fn should_process(config: &Config, chat_id: ChatId, text: &str) -> bool {
    let allowed = &config.telegram.allowed_chat_ids;
    if !allowed.is_empty() && !allowed.contains(&chat_id.0) {
        debug!(chat_id = chat_id.0, "chat not on the allow-list, skipping");
        return false;
    }
    if text.trim().is_empty() {
        return false;
    }
    if text.starts_with('/') {
        // Commands take the command branch; unknown ones are ignored.
        return false;
    }
    if is_emoji_only(text) {
        debug!(chat_id = chat_id.0, "emoji-only message, skipping");
        return false;
    }
    true
}

/// Clamp overlong inputs before they hit a provider. Counts characters, not
/// bytes, so multi-byte scripts are never split mid-character.
pub fn clamp_text(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clamped: String = text.chars().take(max_chars).collect();
    clamped.push_str("\n\n(…truncated)");
    clamped
}

pub async fn handle_message(state: AppState, msg: Message) -> HandlerResult {
    let chat_id = msg.chat.id;
    let Some(text) = msg.text() else {
        return Ok(());
    };

    // Record before processing: a redelivered update must not race a slow
    // handler for the same message.
    if !state.seen.insert(chat_id, msg.id) {
        debug!(chat_id = chat_id.0, message_id = msg.id.0, "duplicate update ignored");
        return Ok(());
    }

    // Telegram clients carry the sender's UI language; km/vi are a strong
    // hint and become the sticky chat mode.
    if let Some(code) = msg.from.as_ref().and_then(|u| u.language_code.as_deref()) {
        match code {
            "km" => state.prefs.set_language_mode(chat_id, LanguageMode::Khmer),
            "vi" => state.prefs.set_language_mode(chat_id, LanguageMode::Vietnamese),
            _ => {}
        }
    }

    if !should_process(&state.config, chat_id, text) {
        return Ok(());
    }

    let original = clamp_text(text, state.config.translation.max_input_chars);
    let reply_text = msg
        .reply_to_message()
        .and_then(|reply| reply.text().or_else(|| reply.caption()));

    let mode = state.prefs.language_mode(chat_id);
    let target = pick_target_language(&state.config.routing, &original, reply_text, mode);
    let script = detect_script(&original, state.config.routing.assume_latin_is_vietnamese);
    info!(chat_id = chat_id.0, message_id = msg.id.0, ?script, ?mode, target_language = %target,
          "translating message");

    let translator = match (&state.forced_translator, state.prefs.force_fallback_model(chat_id)) {
        (Some(forced), true) => forced,
        _ => &state.translator,
    };

    let translated = match translator.translate(&target, &original).await {
        Ok(t) => t,
        Err(e) => {
            // Provider failure aborts this message only; nothing is posted
            // into the chat.
            warn!(chat_id = chat_id.0, error = %e, "translation failed, not replying");
            return Ok(());
        }
    };

    // A provider echoing its input unchanged is a failed translation, and
    // replying with it could feed the relay its own output.
    if translated.trim() == original.trim() && script != Script::Unknown {
        info!(chat_id = chat_id.0, "translation identical to input, suppressing reply");
        return Ok(());
    }

    if let Err(e) = state
        .outbox
        .send(OutboundMessage {
            chat_id,
            text: translated,
            reply_to: Some(msg.id),
        })
        .await
    {
        error!(chat_id = chat_id.0, error = %e, "delivery failed, dropping message");
    }
    Ok(())
}

pub async fn handle_command(state: AppState, msg: Message, cmd: Command) -> HandlerResult {
    let chat_id = msg.chat.id;
    match cmd {
        Command::Ping => reply(&state, &msg, "pong".to_string()).await,
        Command::Lang(arg) => match arg.trim() {
            "1" => {
                state.prefs.set_language_mode(chat_id, LanguageMode::Khmer);
                reply(&state, &msg, "Messages here now translate toward Khmer.".to_string()).await
            }
            "2" => {
                state.prefs.set_language_mode(chat_id, LanguageMode::Vietnamese);
                reply(&state, &msg, "Messages here now translate toward Vietnamese.".to_string())
                    .await
            }
            _ => {
                reply(
                    &state,
                    &msg,
                    "Language mode:\n\
                     /lang 1 - translate toward Khmer\n\
                     /lang 2 - translate toward Vietnamese\n\
                     Without a mode the script is auto-detected."
                        .to_string(),
                )
                .await
            }
        },
        Command::Model(arg) => {
            let translation = &state.config.translation;
            match arg.trim() {
                "1" => {
                    if translation.gemini_api_key.is_none() {
                        return reply(
                            &state,
                            &msg,
                            "GEMINI_API_KEY is not configured, so /model 1 is unavailable."
                                .to_string(),
                        )
                        .await;
                    }
                    state.prefs.set_force_fallback_model(chat_id, false);
                    reply(
                        &state,
                        &msg,
                        format!(
                            "Using the default chain ({}, fallback {}).",
                            translation.model, translation.fallback_model
                        ),
                    )
                    .await
                }
                "2" => {
                    if state.forced_translator.is_none() {
                        return reply(
                            &state,
                            &msg,
                            "OPENAI_API_KEY is not configured, so /model 2 is unavailable."
                                .to_string(),
                        )
                        .await;
                    }
                    state.prefs.set_force_fallback_model(chat_id, true);
                    reply(
                        &state,
                        &msg,
                        format!("Forcing {} for this chat.", translation.fallback_model),
                    )
                    .await
                }
                _ => {
                    let current = if state.prefs.force_fallback_model(chat_id) { 2 } else { 1 };
                    reply(
                        &state,
                        &msg,
                        format!(
                            "Model selection:\n\
                             /model 1 - default chain ({}, fallback {})\n\
                             /model 2 - force {}\n\n\
                             Current: /model {}",
                            translation.model,
                            translation.fallback_model,
                            translation.fallback_model,
                            current
                        ),
                    )
                    .await
                }
            }
        }
    }
}

async fn reply(state: &AppState, msg: &Message, text: String) -> HandlerResult {
    if let Err(e) = state
        .outbox
        .send(OutboundMessage {
            chat_id: msg.chat.id,
            text,
            reply_to: Some(msg.id),
        })
        .await
    {
        error!(chat_id = msg.chat.id.0, error = %e, "command reply failed");
    }
    Ok(())
}

//! In-process mutable state: per-chat preferences and the duplicate-update
//! guard. Nothing here survives a restart; that is deliberate.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use teloxide::types::{ChatId, MessageId};

use crate::router::LanguageMode;

/// Per-chat overrides. Absence of an entry means "use the default policy".
#[derive(Debug, Default, Clone, Copy)]
struct ChatPreference {
    language_mode: Option<LanguageMode>,
    force_fallback_model: bool,
}

/// Store of per-chat preferences, shared across handler invocations.
///
/// The tokio runtime is multi-threaded, so access goes through a mutex even
/// though contention is negligible.
#[derive(Debug, Default)]
pub struct ChatPrefs {
    inner: Mutex<HashMap<ChatId, ChatPreference>>,
}

impl ChatPrefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language_mode(&self, chat: ChatId) -> Option<LanguageMode> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&chat).and_then(|p| p.language_mode)
    }

    pub fn set_language_mode(&self, chat: ChatId, mode: LanguageMode) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(chat).or_default().language_mode = Some(mode);
    }

    pub fn force_fallback_model(&self, chat: ChatId) -> bool {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&chat).is_some_and(|p| p.force_fallback_model)
    }

    pub fn set_force_fallback_model(&self, chat: ChatId, force: bool) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(chat).or_default().force_fallback_model = force;
    }
}

/// At-most-once guard for inbound updates, keyed by `chatId:messageId`.
///
/// Telegram redelivers updates on restarts and flaky long-poll connections.
/// Keys are recorded before processing begins so a slow handler cannot race
/// a redelivery of the same update. Growth is bounded by clearing the whole
/// set past `capacity`; a clear can briefly re-admit old duplicates, which
/// is an accepted tradeoff.
#[derive(Debug)]
pub struct SeenSet {
    capacity: usize,
    inner: Mutex<HashSet<String>>,
}

impl SeenSet {
    pub const DEFAULT_CAPACITY: usize = 3000;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(HashSet::new()),
        }
    }

    /// Record an update. Returns false if it was already seen.
    pub fn insert(&self, chat: ChatId, message: MessageId) -> bool {
        let key = format!("{}:{}", chat.0, message.0);
        let mut set = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key) {
            return false;
        }
        if set.len() > self.capacity {
            set.clear();
        }
        true
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

//! Telegram group-chat translation relay.
//!
//! Messages are classified by script (Hangul, Khmer, Vietnamese), routed to
//! a target language, translated through a provider chain with fallback,
//! and delivered back as replies through a rate-limit-aware outbox.

pub mod config;
pub mod handler;
pub mod llm;
pub mod outbox;
pub mod pidlock;
pub mod router;
pub mod script;
pub mod state;
pub mod translator;

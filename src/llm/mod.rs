//! Thin chat-completion clients for the translation providers.

pub mod error;
pub mod gemini;
pub mod provider;
pub mod types;

pub use error::LLMError;
pub use gemini::GeminiProvider;
pub use provider::{LLMProvider, OpenAICompatibleProvider};
pub use types::{ChatRequest, ChatResponse, Choice, Message, Role};

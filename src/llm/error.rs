//! Provider error type.

use thiserror::Error;

/// Failure of a single provider call. The translation chain treats any
/// variant as "try the next step".
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider rejected the request (status {status}): {message}")]
    Api { status: u16, message: String },
}

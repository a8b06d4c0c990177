//! Serialized, paced, retrying message delivery.
//!
//! Telegram rate-limits sends per bot, not per chat, so every outbound
//! message in the process funnels through one queue with a single worker.
//! The worker owns the pacing clock: minimum spacing between physical
//! sends, pushed further into the future whenever Telegram answers with a
//! retry-after.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use teloxide::Bot;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, LinkPreviewOptions, MessageId, ReplyParameters};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, warn};

/// Minimum spacing between physical sends.
pub const MIN_SEND_INTERVAL: Duration = Duration::from_millis(1100);
/// Attempt budget per message.
pub const MAX_ATTEMPTS: u32 = 4;
/// Used when a 429 carries no retry-after.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(3);
/// Upper bound for the random backoff jitter.
const MAX_RETRY_JITTER_MS: u64 = 250;

/// An outbound send: destination, body, and an optional reply target.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub reply_to: Option<MessageId>,
}

/// Transport-level failure, classified for the retry policy.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("the message to reply to no longer exists")]
    StaleReplyTarget,

    #[error("send failed: {0}")]
    Other(String),
}

/// Final delivery outcome surfaced to callers.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: TransportError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("outbox worker is gone")]
    Closed,
}

/// The physical send seam. The retry policy lives in the worker; transports
/// only classify errors.
#[async_trait]
pub trait SendTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError>;
}

/// Teloxide-backed transport.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl SendTransport for TelegramTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let mut request = self
            .bot
            .send_message(message.chat_id, &message.text)
            .link_preview_options(disabled_link_preview());
        if let Some(reply_to) = message.reply_to {
            request = request.reply_parameters(ReplyParameters::new(reply_to));
        }
        request.await.map(drop).map_err(classify)
    }
}

fn disabled_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

fn classify(err: teloxide::RequestError) -> TransportError {
    match err {
        teloxide::RequestError::RetryAfter(seconds) => TransportError::RateLimited {
            retry_after: Some(Duration::from_secs(u64::from(seconds.seconds()))),
        },
        teloxide::RequestError::Api(api)
            if api.to_string().to_lowercase().contains("replied not found") =>
        {
            TransportError::StaleReplyTarget
        }
        other => TransportError::Other(other.to_string()),
    }
}

struct PendingSend {
    message: OutboundMessage,
    done: oneshot::Sender<Result<(), SendError>>,
}

/// Handle to the delivery worker. Cheap to clone; every clone feeds the
/// same serialized queue.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<PendingSend>,
}

impl Outbox {
    /// Spawn the single delivery worker and return its handle.
    pub fn spawn(transport: Arc<dyn SendTransport>) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(run_worker(transport, rx));
        Self { tx }
    }

    /// Queue a message and wait for its final delivery outcome.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), SendError> {
        let (done, result) = oneshot::channel();
        self.tx
            .send(PendingSend { message, done })
            .await
            .map_err(|_| SendError::Closed)?;
        result.await.map_err(|_| SendError::Closed)?
    }
}

async fn run_worker(transport: Arc<dyn SendTransport>, mut rx: mpsc::Receiver<PendingSend>) {
    let mut next_send_at = Instant::now();
    while let Some(pending) = rx.recv().await {
        let outcome = deliver(transport.as_ref(), &mut next_send_at, pending.message).await;
        // The caller may have given up waiting; delivery already happened
        // either way.
        let _ = pending.done.send(outcome);
    }
    debug!("outbox closed, delivery worker exiting");
}

async fn deliver(
    transport: &dyn SendTransport,
    next_send_at: &mut Instant,
    mut message: OutboundMessage,
) -> Result<(), SendError> {
    let mut last = None;

    for attempt in 1..=MAX_ATTEMPTS {
        sleep_until(*next_send_at).await;

        match transport.send(&message).await {
            Ok(()) => {
                *next_send_at = Instant::now() + MIN_SEND_INTERVAL;
                return Ok(());
            }
            Err(TransportError::StaleReplyTarget) if message.reply_to.is_some() => {
                // Reply target deleted (or thread/permission trouble):
                // resend once without the reply option.
                warn!(chat_id = message.chat_id.0, attempt,
                      "reply target missing, resending without reply");
                message.reply_to = None;
                last = Some(TransportError::StaleReplyTarget);
            }
            Err(TransportError::RateLimited { retry_after }) => {
                let retry_after = retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
                let jitter = Duration::from_millis(rand::rng().random_range(0..MAX_RETRY_JITTER_MS));
                // Push the shared pacing clock out as well, so queued
                // messages do not pile onto a throttled connection.
                *next_send_at = (*next_send_at).max(Instant::now() + retry_after);
                warn!(chat_id = message.chat_id.0, attempt,
                      retry_after_secs = retry_after.as_secs(),
                      "telegram rate limited, backing off");
                sleep(retry_after + jitter).await;
                last = Some(TransportError::RateLimited {
                    retry_after: Some(retry_after),
                });
            }
            Err(other) => return Err(SendError::Transport(other)),
        }
    }

    Err(SendError::Exhausted {
        attempts: MAX_ATTEMPTS,
        last: last.unwrap_or(TransportError::Other("attempt budget spent".to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MockTransport {
        responses: Mutex<VecDeque<Result<(), TransportError>>>,
        calls: Mutex<Vec<(Instant, Option<MessageId>)>>,
    }

    impl MockTransport {
        fn new(responses: Vec<Result<(), TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|c| c.0).collect()
        }

        fn call_replies(&self) -> Vec<Option<MessageId>> {
            self.calls.lock().unwrap().iter().map(|c| c.1).collect()
        }
    }

    #[async_trait]
    impl SendTransport for MockTransport {
        async fn send(&self, message: &OutboundMessage) -> Result<(), TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((Instant::now(), message.reply_to));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()))
        }
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            chat_id: ChatId(42),
            text: "hello".to_string(),
            reply_to: Some(MessageId(7)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let transport = MockTransport::new(vec![Ok(())]);
        let outbox = Outbox::spawn(transport.clone());

        outbox.send(message()).await.unwrap();
        assert_eq!(transport.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_are_paced() {
        let transport = MockTransport::new(vec![Ok(()), Ok(())]);
        let outbox = Outbox::spawn(transport.clone());

        outbox.send(message()).await.unwrap();
        outbox.send(message()).await.unwrap();

        let times = transport.call_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= MIN_SEND_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_honors_retry_after() {
        let transport = MockTransport::new(vec![
            Err(TransportError::RateLimited {
                retry_after: Some(Duration::from_secs(2)),
            }),
            Ok(()),
        ]);
        let outbox = Outbox::spawn(transport.clone());

        outbox.send(message()).await.unwrap();

        let times = transport.call_times();
        assert_eq!(times.len(), 2);
        let gap = times[1] - times[0];
        assert!(gap >= Duration::from_secs(2));
        assert!(gap < Duration::from_secs(2) + Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_without_hint_uses_default() {
        let transport = MockTransport::new(vec![
            Err(TransportError::RateLimited { retry_after: None }),
            Ok(()),
        ]);
        let outbox = Outbox::spawn(transport.clone());

        outbox.send(message()).await.unwrap();

        let times = transport.call_times();
        assert!(times[1] - times[0] >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_drops_reply_option() {
        let transport = MockTransport::new(vec![Err(TransportError::StaleReplyTarget), Ok(())]);
        let outbox = Outbox::spawn(transport.clone());

        outbox.send(message()).await.unwrap();

        assert_eq!(
            transport.call_replies(),
            vec![Some(MessageId(7)), None]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_without_reply_option_aborts() {
        let transport = MockTransport::new(vec![Err(TransportError::StaleReplyTarget)]);
        let outbox = Outbox::spawn(transport.clone());

        let mut msg = message();
        msg.reply_to = None;
        let err = outbox.send(msg).await.unwrap_err();
        assert!(matches!(
            err,
            SendError::Transport(TransportError::StaleReplyTarget)
        ));
        assert_eq!(transport.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_error_aborts_immediately() {
        let transport = MockTransport::new(vec![Err(TransportError::Other("boom".into()))]);
        let outbox = Outbox::spawn(transport.clone());

        let err = outbox.send(message()).await.unwrap_err();
        assert!(matches!(err, SendError::Transport(TransportError::Other(_))));
        assert_eq!(transport.call_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_budget_exhaustion() {
        let limited = || {
            Err(TransportError::RateLimited {
                retry_after: Some(Duration::from_secs(1)),
            })
        };
        let transport = MockTransport::new(vec![limited(), limited(), limited(), limited()]);
        let outbox = Outbox::spawn(transport.clone());

        let err = outbox.send(message()).await.unwrap_err();
        assert!(matches!(err, SendError::Exhausted { attempts: 4, .. }));
        assert_eq!(transport.call_times().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_pushes_pacing_for_next_message() {
        let transport = MockTransport::new(vec![
            Err(TransportError::RateLimited {
                retry_after: Some(Duration::from_secs(5)),
            }),
            Ok(()),
            Ok(()),
        ]);
        let outbox = Outbox::spawn(transport.clone());

        outbox.send(message()).await.unwrap();
        outbox.send(message()).await.unwrap();

        let times = transport.call_times();
        assert_eq!(times.len(), 3);
        // The queued message also waits out the pushed pacing clock.
        assert!(times[2] - times[0] >= Duration::from_secs(5));
    }
}

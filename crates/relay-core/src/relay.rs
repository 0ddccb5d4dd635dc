//! The chat relay service.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument, Span};

use crate::error::UpstreamError;
use crate::exchange::{ExchangeRecord, ExchangeStore};
use crate::fragments::{fragment_stream, ERROR_PREFIX, FRAGMENT_DELAY};
use crate::upstream::CompletionProvider;

/// Upper bound on a single upstream call unless overridden.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Forwards prompts upstream and records every exchange.
///
/// Cloning is cheap; all clones share the same provider, store and set of
/// pending log appends.
#[derive(Clone)]
pub struct ChatRelay {
    provider: Arc<dyn CompletionProvider>,
    store: Arc<dyn ExchangeStore>,
    pending: Arc<Mutex<JoinSet<()>>>,
    timeout: Duration,
    fragment_delay: Duration,
}

impl std::fmt::Debug for ChatRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRelay")
            .field("model", &self.provider.model())
            .field("timeout", &self.timeout)
            .field("fragment_delay", &self.fragment_delay)
            .finish_non_exhaustive()
    }
}

impl ChatRelay {
    pub fn new(provider: Arc<dyn CompletionProvider>, store: Arc<dyn ExchangeStore>) -> Self {
        Self {
            provider,
            store,
            pending: Arc::new(Mutex::new(JoinSet::new())),
            timeout: DEFAULT_UPSTREAM_TIMEOUT,
            fragment_delay: FRAGMENT_DELAY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = delay;
        self
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// One bounded upstream call. Failures come back as an
    /// `"[error] ..."` reply rather than an `Err`.
    pub async fn complete(&self, prompt: &str) -> String {
        let outcome = match tokio::time::timeout(self.timeout, self.provider.complete(prompt)).await
        {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(reply) => reply,
            Err(e) => {
                warn!(model = %self.model(), error = %e, "upstream completion failed");
                format!("{ERROR_PREFIX} {e}")
            }
        }
    }

    /// Complete `prompt` and record the exchange exactly once.
    ///
    /// The log append runs on its own task so the caller never waits on disk
    /// and never sees a logging failure.
    pub async fn exchange(&self, prompt: &str, streaming: bool) -> String {
        let reply = self.complete(prompt).await;
        self.record(ExchangeRecord::now(self.model(), streaming, prompt, reply.clone()));
        reply
    }

    /// Lazily complete `prompt` and yield the reply as paced fragments.
    ///
    /// Nothing is sent upstream until the stream is first polled. Dropping
    /// the stream midway stops delivery; the exchange is already logged by
    /// then. The upstream call and the log append run in the span that was
    /// current when the stream was created, not the one polling it.
    pub fn stream(&self, prompt: String) -> impl Stream<Item = String> + Send + use<> {
        let relay = self.clone();
        let delay = self.fragment_delay;
        let span = Span::current();
        stream::once(async move { relay.exchange(&prompt, true).await }.instrument(span))
            .flat_map(move |reply| fragment_stream(reply, delay))
    }

    /// Wait for every log append scheduled so far.
    ///
    /// Call once the server has stopped accepting requests; the runtime
    /// cancels unfinished tasks when it is dropped.
    pub async fn drain(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.pending_appends());
            if pending.is_empty() {
                return;
            }
            debug!(count = pending.len(), "waiting for pending exchange appends");
            while let Some(joined) = pending.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "exchange append task failed");
                }
            }
        }
    }

    fn pending_appends(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, record: ExchangeRecord) {
        let store = Arc::clone(&self.store);
        let mut pending = self.pending_appends();
        // Reap finished appends so the set only holds work still in flight.
        while pending.try_join_next().is_some() {}
        pending.spawn(
            async move {
                match store.append(record).await {
                    Ok(()) => debug!("exchange recorded"),
                    Err(e) => warn!(error = %e, "failed to append exchange record"),
                }
            }
            .in_current_span(),
        );
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

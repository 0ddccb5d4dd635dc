//! Simulated incremental delivery.
//!
//! The upstream call returns the whole reply at once; for clients that asked
//! for an event stream the reply is cut into small word groups and released
//! with a short pause between them.

use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};

/// Words per emitted fragment.
pub const FRAGMENT_WORDS: usize = 6;

/// Pause before each fragment.
pub const FRAGMENT_DELAY: Duration = Duration::from_millis(70);

/// Prefix of every reply that stands in for a failed upstream call.
pub const ERROR_PREFIX: &str = "[error]";

/// Payload of the terminal event.
pub const DONE_MARKER: &str = "[DONE]";

/// Split `text` on whitespace into space-joined groups of [`FRAGMENT_WORDS`].
///
/// The last group holds the remainder (1..=6 words). Whitespace-only input
/// yields no fragments.
pub fn split_fragments(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(FRAGMENT_WORDS)
        .map(|group| group.join(" "))
        .collect()
}

/// Stream the fragments of `text`, sleeping `delay` before each one.
///
/// An error marker is passed through untouched as a single item.
pub fn fragment_stream(text: String, delay: Duration) -> impl Stream<Item = String> + Send {
    let items = if text.starts_with(ERROR_PREFIX) {
        vec![text]
    } else {
        split_fragments(&text)
    };

    stream::iter(items).then(move |fragment| async move {
        tokio::time::sleep(delay).await;
        fragment
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────

use std::time::Duration;

use thiserror::Error;

/// Failures of a single upstream completion call.
///
/// None of these reach the HTTP caller as a status code; the relay renders
/// them into the reply text behind [`crate::ERROR_PREFIX`].
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The body was not the JSON shape we expect.
    #[error("invalid upstream response: {0}")]
    Decode(#[from] serde_json::Error),

    /// No answer within the configured bound.
    #[error("upstream call timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),
}

/// Failures while appending to the exchange log.
#[derive(Debug, Error)]
pub enum ExchangeLogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode exchange record: {0}")]
    Encode(#[from] serde_json::Error),
}

//! `/api/chat` request / response bodies.

use serde::{Deserialize, Serialize};

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Free-form user text. Missing or `null` is treated as `""`.
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatRequest {
    pub fn into_prompt(self) -> String {
        self.message.unwrap_or_default()
    }
}

/// Response body for non-streaming `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    /// Model output, or an `[error] ...` marker if the upstream call failed.
    pub reply: String,
}

//! Chat relay route.
//!
//! `POST /api/chat` forwards `message` upstream. Callers whose `Accept`
//! header names `text/event-stream` receive the reply as SSE fragments
//! followed by a `done` event; everyone else gets `{"reply": "..."}`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use relay_core::DONE_MARKER;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::schemas::chat::{ChatReply, ChatRequest};
use crate::state::AppState;

const EVENT_STREAM: &str = "text/event-stream";

/// Register the chat route.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(req) = body?;
    let prompt = req.into_prompt();
    let streaming = wants_event_stream(&headers);

    debug!(prompt_len = prompt.len(), streaming, "chat request");

    if streaming {
        let fragments = state
            .relay
            .stream(prompt)
            .map(|fragment| Ok::<Event, Infallible>(Event::default().data(sse_safe(&fragment))));
        let done = stream::once(async {
            Ok::<Event, Infallible>(Event::default().event("done").data(DONE_MARKER))
        });

        return Ok(Sse::new(fragments.chain(done)).into_response());
    }

    let reply = state.relay.exchange(&prompt, false).await;
    info!(reply_len = reply.len(), "chat reply sent");

    Ok(Json(ChatReply { reply }).into_response())
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains(EVENT_STREAM))
}

/// SSE lines cannot carry carriage returns; newlines are split into
/// multiple `data:` lines by [`Event::data`].
fn sse_safe(text: &str) -> String {
    text.replace('\r', "")
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use relay_core::{
        ChatRelay, CompletionProvider, ExchangeRecord, JsonlExchangeLog, UpstreamError,
        ERROR_PREFIX,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    /// Replies with a fixed text, or echoes the prompt when none is set.
    struct FakeProvider(Option<String>);

    #[async_trait]
    impl CompletionProvider for FakeProvider {
        fn model(&self) -> &str {
            "fake-model"
        }

        async fn complete(&self, prompt: &str) -> Result<String, UpstreamError> {
            Ok(self.0.clone().unwrap_or_else(|| format!("you said: {prompt}")))
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl CompletionProvider for FailingProvider {
        fn model(&self) -> &str {
            "fake-model"
        }

        async fn complete(&self, _prompt: &str) -> Result<String, UpstreamError> {
            Err(UpstreamError::Status { status: 500, message: "quota exceeded".into() })
        }
    }

    struct Harness {
        app: Router,
        relay: ChatRelay,
        _dir: tempfile::TempDir,
        log_path: std::path::PathBuf,
    }

    fn harness(provider: Arc<dyn CompletionProvider>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("exchanges.jsonl");
        let config = Config::from_lookup(|key| match key {
            "GEMINI_API_KEY" => Some("test".into()),
            "RELAY_FRAGMENT_DELAY_MS" => Some("0".into()),
            _ => None,
        })
        .unwrap();
        let relay = ChatRelay::new(provider, Arc::new(JsonlExchangeLog::new(&log_path)))
            .with_fragment_delay(Duration::ZERO);
        let state = Arc::new(AppState { config: Arc::new(config), relay: relay.clone() });
        Harness { app: crate::routes::build(state), relay, _dir: dir, log_path }
    }

    fn post_chat(body: Value, accept: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(accept) = accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_string(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    impl Harness {
        /// Flush pending appends and return every record on disk.
        async fn logged(&self) -> Vec<ExchangeRecord> {
            self.relay.drain().await;
            tokio::fs::read_to_string(&self.log_path)
                .await
                .unwrap_or_default()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    /// `data:` payloads and event names, in emission order.
    fn parse_sse(body: &str) -> Vec<(Option<String>, String)> {
        body.split("\n\n")
            .filter(|block| !block.is_empty())
            .map(|block| {
                let mut event = None;
                let mut data = Vec::new();
                for line in block.lines() {
                    if let Some(name) = line.strip_prefix("event: ") {
                        event = Some(name.to_owned());
                    } else if let Some(d) = line.strip_prefix("data: ") {
                        data.push(d.to_owned());
                    }
                }
                (event, data.join("\n"))
            })
            .collect()
    }

    #[tokio::test]
    async fn json_reply_by_default() {
        let h = harness(Arc::new(FakeProvider(None)));

        let resp = h.app.clone().oneshot(post_chat(json!({ "message": "hello" }), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().contains_key("x-trace-id"));

        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body, json!({ "reply": "you said: hello" }));

        let records = h.logged().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].model, "fake-model");
        assert!(!records[0].streaming);
        assert_eq!(records[0].prompt, "hello");
        assert_eq!(records[0].reply, "you said: hello");
    }

    #[tokio::test]
    async fn empty_and_missing_message_are_accepted() {
        let h = harness(Arc::new(FakeProvider(None)));

        let resp = h.app.clone().oneshot(post_chat(json!({ "message": "" }), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(body["reply"], "you said: ");

        let resp = h.app.clone().oneshot(post_chat(json!({}), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let records = h.logged().await;
        assert!(records.iter().all(|r| r.prompt.is_empty()));
    }

    #[tokio::test]
    async fn upstream_failure_is_still_a_success_response() {
        let h = harness(Arc::new(FailingProvider));

        let resp = h.app.clone().oneshot(post_chat(json!({ "message": "hi" }), None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        let reply = body["reply"].as_str().unwrap();
        assert!(reply.starts_with(ERROR_PREFIX), "reply was {reply}");
        assert!(reply.contains("quota exceeded"));

        assert_eq!(h.logged().await.len(), 1);
    }

    #[tokio::test]
    async fn event_stream_emits_fragments_then_done() {
        let reply = (1..=13).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let h = harness(Arc::new(FakeProvider(Some(reply.clone()))));

        let resp = h
            .app
            .clone()
            .oneshot(post_chat(json!({ "message": "go" }), Some("text/event-stream")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers()[header::CONTENT_TYPE].to_str().unwrap().to_owned();
        assert!(content_type.starts_with("text/event-stream"));

        let body = body_string(resp).await;
        assert!(body.starts_with("data: w1 w2 w3 w4 w5 w6\n\n"));
        assert!(body.ends_with("event: done\ndata: [DONE]\n\n"));

        let events = parse_sse(&body);
        assert_eq!(events.len(), 4);
        let (fragments, last) = events.split_at(3);
        assert!(fragments.iter().all(|(event, _)| event.is_none()));
        assert_eq!(
            fragments.iter().map(|(_, d)| d.split(' ').count()).collect::<Vec<_>>(),
            vec![6, 6, 1]
        );
        let joined = fragments.iter().map(|(_, d)| d.as_str()).collect::<Vec<_>>().join(" ");
        assert_eq!(joined, reply);
        assert_eq!(last[0], (Some("done".to_owned()), "[DONE]".to_owned()));

        let records = h.logged().await;
        assert_eq!(records.len(), 1);
        assert!(records[0].streaming);
        assert_eq!(records[0].reply, reply);
    }

    #[tokio::test]
    async fn accept_header_match_is_case_insensitive_and_partial() {
        let h = harness(Arc::new(FakeProvider(Some("short answer".into()))));

        let resp = h
            .app
            .clone()
            .oneshot(post_chat(
                json!({ "message": "q" }),
                Some("application/json, Text/Event-Stream;q=0.9"),
            ))
            .await
            .unwrap();
        let body = body_string(resp).await;
        assert_eq!(body, "data: short answer\n\nevent: done\ndata: [DONE]\n\n");
    }

    #[tokio::test]
    async fn event_stream_error_marker_is_single_fragment() {
        let h = harness(Arc::new(FailingProvider));

        let resp = h
            .app
            .clone()
            .oneshot(post_chat(json!({ "message": "q" }), Some("text/event-stream")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let events = parse_sse(&body_string(resp).await);
        assert_eq!(events.len(), 2);
        assert!(events[0].1.starts_with(ERROR_PREFIX));
        assert_eq!(events[1].0.as_deref(), Some("done"));
        assert!(h.logged().await[0].streaming);
    }

    #[tokio::test]
    async fn malformed_json_is_a_client_error() {
        let h = harness(Arc::new(FakeProvider(None)));
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn only_post_is_routed() {
        let h = harness(Arc::new(FakeProvider(None)));
        let req = Request::builder().uri("/api/chat").body(Body::empty()).unwrap();
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn client_trace_id_is_echoed_and_bad_ones_replaced() {
        let h = harness(Arc::new(FakeProvider(None)));
        let supplied = "7f1c9a3e-2b4d-4c6e-8a0f-1d2e3f4a5b6c";

        let mut req = post_chat(json!({ "message": "x" }), None);
        req.headers_mut().insert("x-trace-id", supplied.parse().unwrap());
        let resp = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.headers()["x-trace-id"], supplied);

        let mut req = post_chat(json!({ "message": "x" }), None);
        req.headers_mut().insert("x-trace-id", "not-a-uuid".parse().unwrap());
        let resp = h.app.clone().oneshot(req).await.unwrap();
        let generated = resp.headers()["x-trace-id"].to_str().unwrap();
        assert_ne!(generated, "not-a-uuid");
        assert!(uuid::Uuid::parse_str(generated).is_ok());

        assert_eq!(h.logged().await.len(), 2);
    }

    #[test]
    fn carriage_returns_are_stripped() {
        assert_eq!(sse_safe("a\r\nb"), "a\nb");
    }
}

//! relay-server – entry point.
//!
//! Startup order:
//! 1. Load `.env` (if present) and parse configuration from the environment.
//! 2. Initialise structured tracing (JSON or pretty).
//! 3. Build the Gemini client and the exchange log, wrap them in a relay.
//! 4. Build the Axum router and serve it with graceful shutdown.
//! 5. Flush exchange-log appends still in flight.

mod config;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::sync::Arc;

use relay_core::{ChatRelay, GeminiClient, JsonlExchangeLog};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Configuration ───────────────────────────────────────────────────────
    // A missing .env file is normal; real environment variables still apply.
    let _ = dotenv::dotenv();
    let cfg = Config::from_env()?;

    // ── 2. Tracing ─────────────────────────────────────────────────────────────
    init_tracing(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), model = %cfg.model, "relay-server starting");

    // ── 3. Relay ───────────────────────────────────────────────────────────────
    let provider = GeminiClient::new(cfg.api_key.clone(), cfg.model.clone())
        .set_base_url(cfg.upstream_base_url.clone());
    let exchange_log = JsonlExchangeLog::new(cfg.exchange_log_path.clone());
    info!(path = %exchange_log.path().display(), "exchange log ready");

    let relay = ChatRelay::new(Arc::new(provider), Arc::new(exchange_log))
        .with_timeout(cfg.upstream_timeout)
        .with_fragment_delay(cfg.fragment_delay);

    let state = Arc::new(AppState {
        config: Arc::new(cfg.clone()),
        relay: relay.clone(),
    });

    // ── 4. HTTP server with graceful shutdown ──────────────────────────────────
    let app = routes::build(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&cfg.bind_address).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // ── 5. Exchange log ────────────────────────────────────────────────────────
    // Returning from main drops the runtime and cancels unfinished tasks.
    relay.drain().await;

    info!("relay-server stopped");
    Ok(())
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `RELAY_LOG`; an unparsable `RELAY_LOG` falls back to
/// `info` and is reported once the subscriber is live.
fn init_tracing(cfg: &Config) {
    let (env_filter, rejected) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, None),
        Err(_) => match EnvFilter::try_new(&cfg.log_level) {
            Ok(filter) => (filter, None),
            Err(e) => (EnvFilter::new("info"), Some(e)),
        },
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true);
    if cfg.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    if let Some(e) = rejected {
        warn!(filter = %cfg.log_level, error = %e, "RELAY_LOG is not a valid tracing filter; using 'info'");
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    tokio::select! {
        _ = interrupt() => info!("SIGINT received"),
        _ = terminate() => info!("SIGTERM received"),
    }
    info!("draining connections before shutdown");
}

async fn interrupt() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C; relying on SIGTERM");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM; relying on Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

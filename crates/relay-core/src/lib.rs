//! relay-core – the chat relay behind `relay-server`.
//!
//! A [`ChatRelay`] forwards one prompt to a [`CompletionProvider`], records
//! the exchange through an [`ExchangeStore`], and can replay the reply as a
//! paced sequence of word fragments for clients that asked for incremental
//! delivery.

pub mod error;
pub mod exchange;
pub mod fragments;
pub mod relay;
pub mod upstream;

pub use error::{ExchangeLogError, UpstreamError};
pub use exchange::{ExchangeRecord, ExchangeStore, JsonlExchangeLog};
pub use fragments::{DONE_MARKER, ERROR_PREFIX, FRAGMENT_DELAY, FRAGMENT_WORDS};
pub use relay::ChatRelay;
pub use upstream::gemini::GeminiClient;
pub use upstream::CompletionProvider;

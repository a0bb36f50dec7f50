//! Resilient outbound HTTP fetching.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Immutable configuration and types
//! - [`core`] - Pure transformations
//! - effects - I/O operations behind the [`HttpClient`] trait
//!
//! # Key Features
//!
//! - **Retry Engine**: exponential backoff, a long wait after `429`, and
//!   optional no-retry on `404`/`422`
//! - **Rate Limiting**: one token bucket per engine, shared by every caller
//! - **Outage Recovery**: when requests fail with dial timeouts and public
//!   endpoints are unreachable too, wait for the network instead of failing
//! - **Content Decoding**: gzip/deflate and charset normalization to UTF-8
//! - **Redirect Resolution**: HTTP redirects plus one meta-refresh or
//!   `location.replace` hop
//! - **Incremental Streams**: follow a growing JSONL document with range
//!   requests until its end sentinel
//!
//! # Example
//!
//! ```no_run
//! use pullwire_fetch::{FetchConfig, ReqwestClient, RetryEngine};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> pullwire_fetch::Result<()> {
//! let engine = RetryEngine::new(ReqwestClient::new()?, FetchConfig::short_url()?);
//! let text = engine
//!     .get_text(&CancellationToken::new(), "https://example.com/")
//!     .await?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod data;
mod effects;
mod error;

pub use data::headers;
pub use data::{
    EndMessage, FetchConfig, FetchConfigBuilder, FetchSettings, OutageRecovery, ProbeConfig,
    RateLimit, StartMessage, StreamCursor,
};
pub use effects::{
    BodyStream, BoxStream, ContentDecoder, DEFAULT_CHANNEL_CAPACITY, DEFAULT_POLL_INTERVAL,
    HttpClient, HttpRequest, HttpResponse, Method, MockHttpClient, MockResponse, NetworkProbe,
    RateLimiter, RecordedRequest, RedirectChaser, Resolved, RetryEngine, StreamCompletion,
    StreamFetcher, StreamHandle, StreamReport, fetch_once, sleep_or_cancel,
};

#[cfg(feature = "reqwest")]
pub use effects::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS, ReqwestClient, ReqwestClientBuilder,
};

pub use error::{DecodeError, Error, Result, TransportError, TransportErrorKind};

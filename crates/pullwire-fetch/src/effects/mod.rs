//! I/O for fetching: the transport trait and everything that sleeps, sends
//! or reads a body.

mod decode;
mod http;
mod limiter;
mod mock;
mod probe;
mod redirect;
mod retry;
mod sleep;
mod stream;

pub use decode::ContentDecoder;
pub use http::{BodyStream, BoxStream, HttpClient, HttpRequest, HttpResponse, Method, fetch_once};
pub use limiter::RateLimiter;
pub use mock::{MockHttpClient, MockResponse, RecordedRequest};
pub use probe::NetworkProbe;
pub use redirect::{RedirectChaser, Resolved};
pub use retry::RetryEngine;
pub use sleep::sleep_or_cancel;
pub use stream::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_POLL_INTERVAL, StreamCompletion, StreamFetcher,
    StreamHandle, StreamReport,
};

#[cfg(feature = "reqwest")]
pub use http::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS, ReqwestClient, ReqwestClientBuilder,
};

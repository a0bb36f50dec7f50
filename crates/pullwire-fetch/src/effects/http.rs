use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::{Error, Result, TransportError};

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

pub type BodyStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing request as seen by an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Arc<[(String, String)]>,
    pub body: Option<Bytes>,
    /// Bound on the whole exchange, body included.
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Arc::from(Vec::new()),
            body: None,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, body: Bytes, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(url, timeout)
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Arc<[(String, String)]>) -> Self {
        self.headers = headers;
        self
    }

    /// Case-insensitive lookup of a request header.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response whose body has not been read yet.
///
/// Dropping it releases the underlying connection.
pub struct HttpResponse {
    pub status: u16,
    /// URL the response came from, after any HTTP redirects.
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: BodyStream,
}

impl HttpResponse {
    pub fn new(
        status: u16,
        url: impl Into<String>,
        headers: Vec<(String, String)>,
        body: BodyStream,
    ) -> Self {
        Self {
            status,
            url: url.into(),
            headers,
            body,
        }
    }

    /// Case-insensitive lookup of a response header.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }

    /// Read the rest of the body as-is.
    pub async fn bytes(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.content_length().unwrap_or(0).min(1 << 20) as usize);
        while let Some(chunk) = self.body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &"{ ... }")
            .finish()
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Asynchronous HTTP transport.
///
/// Implementations follow standard HTTP redirects themselves and report the
/// final URL in [`HttpResponse::url`]. Any status code is a successful
/// exchange at this level; only failures to exchange are errors.
///
/// # Implementations
///
/// - [`ReqwestClient`]: production implementation using `reqwest`
/// - [`MockHttpClient`](crate::MockHttpClient): scripted responses for tests
pub trait HttpClient: Send + Sync {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = std::result::Result<HttpResponse, TransportError>> + Send;
}

/// A single GET without retries, rate limiting or decoding.
///
/// The status code is not checked.
pub async fn fetch_once<C: HttpClient>(client: &C, url: &str, timeout: Duration) -> Result<Vec<u8>> {
    url::Url::parse(url).map_err(|source| Error::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    let response = client.execute(HttpRequest::get(url, timeout)).await?;
    response.bytes().await
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use super::*;
    use tracing::info;

    pub const DEFAULT_MAX_REDIRECTS: usize = 10;
    /// Dial budget, kept below the request timeout so a stalled connect is
    /// reported as a connect timeout rather than a whole-request timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Production HTTP client implementation using reqwest.
    ///
    /// Follows up to `max_redirects` HTTP redirects; past that the last
    /// redirect response is returned as-is.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new() -> Result<Self> {
            Self::builder().build()
        }

        pub fn builder() -> ReqwestClientBuilder {
            ReqwestClientBuilder::default()
        }
    }

    #[derive(Debug, Clone)]
    pub struct ReqwestClientBuilder {
        max_redirects: usize,
        log_redirects: bool,
        connect_timeout: Option<Duration>,
    }

    impl Default for ReqwestClientBuilder {
        fn default() -> Self {
            Self {
                max_redirects: DEFAULT_MAX_REDIRECTS,
                log_redirects: false,
                connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            }
        }
    }

    impl ReqwestClientBuilder {
        #[must_use]
        pub fn max_redirects(mut self, max_redirects: usize) -> Self {
            self.max_redirects = max_redirects;
            self
        }

        /// Log every redirect hop at info level.
        #[must_use]
        pub fn log_redirects(mut self, enabled: bool) -> Self {
            self.log_redirects = enabled;
            self
        }

        /// `None` leaves dialing bounded only by the request timeout.
        #[must_use]
        pub fn connect_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
            self.connect_timeout = timeout.into();
            self
        }

        pub fn build(self) -> Result<ReqwestClient> {
            let max_redirects = self.max_redirects;
            let log_redirects = self.log_redirects;
            let policy = reqwest::redirect::Policy::custom(move |attempt| {
                if log_redirects {
                    info!(url = %attempt.url(), hop = attempt.previous().len(), "following redirect");
                }
                if attempt.previous().len() > max_redirects {
                    attempt.stop()
                } else {
                    attempt.follow()
                }
            });

            let mut builder = reqwest::Client::builder().redirect(policy);
            if let Some(timeout) = self.connect_timeout {
                builder = builder.connect_timeout(timeout);
            }
            let client = builder
                .build()
                .map_err(|e| Error::Transport(TransportError::from(e)))?;
            Ok(ReqwestClient { client })
        }
    }

    impl HttpClient for ReqwestClient {
        async fn execute(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, TransportError> {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
            };
            let mut builder = self
                .client
                .request(method, &request.url)
                .timeout(request.timeout);

            for (key, value) in request.headers.iter() {
                builder = builder.header(key.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let url = response.url().to_string();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(k, v)| {
                    v.to_str()
                        .ok()
                        .map(|v| (k.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(TransportError::from));

            Ok(HttpResponse::new(status, url, headers, Box::pin(body)))
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_REDIRECTS, ReqwestClient, ReqwestClientBuilder,
};

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn response_with(headers: Vec<(&str, &str)>, chunks: Vec<&'static [u8]>) -> HttpResponse {
        let body = stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from_static(c))));
        HttpResponse::new(
            200,
            "https://example.com",
            headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Box::pin(body),
        )
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = response_with(vec![("Content-Length", "12")], vec![]);
        assert_eq!(response.header("content-length"), Some("12"));
        assert_eq!(response.content_length(), Some(12));
        assert_eq!(response.header("etag"), None);
    }

    #[tokio::test]
    async fn bytes_concatenates_chunks() {
        let response = response_with(vec![], vec![b"hello ", b"world"]);
        assert_eq!(response.bytes().await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn bytes_surfaces_body_errors() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(TransportError::new(
                crate::error::TransportErrorKind::Body,
                "connection reset",
            )),
        ]);
        let response = HttpResponse::new(200, "https://example.com", Vec::new(), Box::pin(body));
        let err = response.bytes().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn post_request_keeps_body() {
        let request = HttpRequest::post("https://example.com", Bytes::from_static(b"x"), Duration::from_secs(1));
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body.as_deref(), Some(&b"x"[..]));
    }
}

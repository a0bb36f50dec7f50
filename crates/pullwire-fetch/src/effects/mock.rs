use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use tokio::time::Instant;

use crate::effects::http::{HttpClient, HttpRequest, HttpResponse, Method};
use crate::error::{TransportError, TransportErrorKind};

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    headers: Vec<(String, String)>,
    chunks: Vec<Bytes>,
    delay: Duration,
    final_url: Option<String>,
    error: Option<TransportErrorKind>,
    body_error: Option<TransportErrorKind>,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            chunks: Vec::new(),
            delay: Duration::ZERO,
            final_url: None,
            error: None,
            body_error: None,
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::status(200).body(body)
    }

    /// Fail the exchange itself with a transport error of `kind`.
    pub fn error(kind: TransportErrorKind) -> Self {
        Self {
            error: Some(kind),
            ..Self::status(0)
        }
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.chunks = vec![body.into()];
        self
    }

    /// Deliver the body as separate chunks.
    #[must_use]
    pub fn chunks<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.chunks = chunks.into_iter().map(Into::into).collect();
        self
    }

    /// Wait this long before answering.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report this URL as where HTTP redirects ended.
    #[must_use]
    pub fn final_url(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(url.into());
        self
    }

    /// Fail the body stream after the scripted chunks.
    #[must_use]
    pub fn body_error(mut self, kind: TransportErrorKind) -> Self {
        self.body_error = Some(kind);
        self
    }
}

/// A request as the mock saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Default)]
struct MockState {
    routes: HashMap<String, VecDeque<MockResponse>>,
    requests: Vec<RecordedRequest>,
}

/// Scripted [`HttpClient`] for tests.
///
/// Each URL has a queue of replies consumed in order; the last reply repeats
/// once the queue is down to it. Unscripted URLs fail with a connect error.
/// Clones share state, so a clone handed to an engine can be inspected later.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    state: Arc<Mutex<MockState>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for `url`.
    #[must_use]
    pub fn on(self, url: impl Into<String>, response: MockResponse) -> Self {
        self.push(url, response);
        self
    }

    /// Queue several replies for `url`, in order.
    #[must_use]
    pub fn on_sequence(self, url: impl Into<String>, responses: Vec<MockResponse>) -> Self {
        let url = url.into();
        for response in responses {
            self.push(url.clone(), response);
        }
        self
    }

    pub fn push(&self, url: impl Into<String>, response: MockResponse) {
        self.lock()
            .routes
            .entry(url.into())
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn requests_to(&self, url: &str) -> Vec<RecordedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_response(&self, request: &HttpRequest) -> Option<MockResponse> {
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.to_vec(),
            body: request.body.clone(),
            at: Instant::now(),
        });
        let queue = state.routes.get_mut(&request.url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let Some(response) = self.next_response(&request) else {
            return Err(TransportError::new(
                TransportErrorKind::Connect,
                format!("no mock response for {}", request.url),
            ));
        };

        if !response.delay.is_zero() {
            tokio::time::sleep(response.delay).await;
        }
        if let Some(kind) = response.error {
            return Err(TransportError::new(kind, format!("mock {kind} for {}", request.url)));
        }

        let mut items: Vec<Result<Bytes, TransportError>> =
            response.chunks.into_iter().map(Ok).collect();
        if let Some(kind) = response.body_error {
            items.push(Err(TransportError::new(kind, "mock body failure")));
        }
        let url = response.final_url.unwrap_or(request.url);

        Ok(HttpResponse::new(
            response.status,
            url,
            response.headers,
            Box::pin(stream::iter(items)),
        ))
    }
}

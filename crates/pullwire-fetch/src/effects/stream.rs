use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::{LineSplitter, Sentinel, inspect_line, next_offset};
use crate::data::StreamCursor;
use crate::effects::decode::ContentDecoder;
use crate::effects::http::{HttpClient, HttpResponse};
use crate::effects::retry::{RetryEngine, into_text};
use crate::effects::sleep::sleep_or_cancel;
use crate::error::{Error, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// How a stream fetch ended.
#[derive(Debug)]
pub enum StreamCompletion {
    /// An end sentinel was received.
    EndOfStream,
    /// The server answered `200 OK` with the whole document at once.
    SingleResponse,
    Canceled,
    /// The consumer dropped its end of the channel.
    Abandoned,
    Failed(Error),
}

#[derive(Debug)]
pub struct StreamReport {
    pub cursor: StreamCursor,
    pub completion: StreamCompletion,
}

impl StreamReport {
    pub fn is_complete(&self) -> bool {
        matches!(
            self.completion,
            StreamCompletion::EndOfStream | StreamCompletion::SingleResponse
        )
    }
}

enum State {
    Polling,
    Draining(HttpResponse),
    Done(StreamCompletion),
}

/// Follows a line-delimited JSON document that is still being written.
///
/// The document is polled with `Range: bytes=<offset>-` requests. Lines from
/// `206 Partial Content` bodies are forwarded as they arrive until a
/// `{"type":"end"...}` line shows up. A plain `200 OK` is forwarded whole as
/// a single item and ends the fetch.
#[derive(Debug)]
pub struct StreamFetcher<C> {
    engine: Arc<RetryEngine<C>>,
    url: String,
    poll_interval: Duration,
    channel_capacity: usize,
}

impl<C: HttpClient + 'static> StreamFetcher<C> {
    pub fn new(engine: Arc<RetryEngine<C>>, url: impl Into<String>) -> Self {
        Self {
            engine,
            url: url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Run the fetch on a background task.
    pub fn spawn(self, cancel: CancellationToken) -> StreamHandle {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let task = tokio::spawn(self.run(cancel, tx));
        StreamHandle { lines: rx, task }
    }

    /// Drive the fetch to completion on the current task, sending lines to
    /// `tx`.
    pub async fn run(self, cancel: CancellationToken, tx: mpsc::Sender<String>) -> StreamReport {
        let mut cursor = StreamCursor::default();
        let mut splitter = LineSplitter::new();
        let mut state = State::Polling;

        loop {
            state = match state {
                State::Polling => self.poll(&cancel, &tx, &cursor).await,
                State::Draining(response) => {
                    self.drain(&cancel, &tx, response, &mut cursor, &mut splitter)
                        .await
                }
                State::Done(completion) => {
                    match &completion {
                        StreamCompletion::Failed(e) => {
                            error!(url = %self.url, offset = cursor.offset, error = %e, "stream fetch failed")
                        }
                        other => info!(url = %self.url, offset = cursor.offset, completion = ?other, "stream fetch finished"),
                    }
                    return StreamReport { cursor, completion };
                }
            };
        }
    }

    async fn poll(
        &self,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<String>,
        cursor: &StreamCursor,
    ) -> State {
        if cancel.is_cancelled() {
            return State::Done(StreamCompletion::Canceled);
        }

        let extra: Vec<(String, String)> = cursor
            .range_header()
            .map(|range| vec![("Range".to_string(), range)])
            .unwrap_or_default();
        debug!(url = %self.url, offset = cursor.offset, "polling stream");

        let response = match self.engine.get_response_with(cancel, &self.url, &extra).await {
            Ok(response) => response,
            Err(Error::Canceled) => return State::Done(StreamCompletion::Canceled),
            Err(e) => return State::Done(StreamCompletion::Failed(e)),
        };

        match response.status {
            206 => State::Draining(response),
            200 => {
                let decoder = ContentDecoder::new();
                let decoded = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return State::Done(StreamCompletion::Canceled),
                    decoded = decoder.decode(response) => decoded,
                };
                match decoded {
                    Ok(body) => match send_line(cancel, tx, into_text(body)).await {
                        Some(done) => done,
                        None => State::Done(StreamCompletion::SingleResponse),
                    },
                    Err(e) => State::Done(StreamCompletion::Failed(e)),
                }
            }
            code => {
                error!(url = %self.url, status = code, "unexpected status while polling stream");
                State::Done(StreamCompletion::Failed(Error::Status {
                    code,
                    url: self.url.clone(),
                }))
            }
        }
    }

    async fn drain(
        &self,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<String>,
        response: HttpResponse,
        cursor: &mut StreamCursor,
        splitter: &mut LineSplitter,
    ) -> State {
        let content_range = response.header("content-range").map(str::to_string);
        let mut body = response.body;
        let mut received = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return State::Done(StreamCompletion::Canceled),
                chunk = body.next() => chunk,
            };
            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => return State::Done(StreamCompletion::Failed(Error::Transport(e))),
                None => break,
            };
            received += bytes.len() as u64;
            for line in splitter.push(&bytes) {
                if let Some(done) = self.forward(cancel, tx, line, cursor).await {
                    return done;
                }
            }
        }

        if let Some(line) = splitter.take_complete_tail() {
            if let Some(done) = self.forward(cancel, tx, line, cursor).await {
                return done;
            }
        }

        cursor.advance_to(next_offset(cursor.offset, content_range.as_deref(), received));
        debug!(
            url = %self.url,
            received,
            offset = cursor.offset,
            pending = splitter.pending_len(),
            "partial response drained"
        );

        match sleep_or_cancel(self.poll_interval, cancel).await {
            Ok(()) => State::Polling,
            Err(_) => State::Done(StreamCompletion::Canceled),
        }
    }

    /// Send one line on, then act on it if it is a sentinel. Returns the next
    /// state when the fetch has to stop.
    async fn forward(
        &self,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<String>,
        line: String,
        cursor: &mut StreamCursor,
    ) -> Option<State> {
        let sentinel = inspect_line(&line);
        if let Some(done) = send_line(cancel, tx, line).await {
            return Some(done);
        }

        match sentinel? {
            Ok(Sentinel::Start(start)) => {
                info!(url = %self.url, start_time = ?start.processing_start_time, "received start of stream");
                cursor.start = Some(start);
                None
            }
            Ok(Sentinel::End(end)) => {
                info!(url = %self.url, code = ?end.code, "received end of stream");
                cursor.end = Some(end);
                Some(State::Done(StreamCompletion::EndOfStream))
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "ignoring malformed sentinel");
                None
            }
        }
    }
}

async fn send_line(
    cancel: &CancellationToken,
    tx: &mpsc::Sender<String>,
    line: String,
) -> Option<State> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Some(State::Done(StreamCompletion::Canceled)),
        sent = tx.send(line) => sent.err().map(|_| State::Done(StreamCompletion::Abandoned)),
    }
}

/// Consumer side of a spawned stream fetch.
#[derive(Debug)]
pub struct StreamHandle {
    lines: mpsc::Receiver<String>,
    task: JoinHandle<StreamReport>,
}

impl StreamHandle {
    /// Next line in arrival order; `None` once the fetch has stopped.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Stop consuming and wait for the background task's report.
    ///
    /// Lines not read yet are discarded; a fetch still running sees the
    /// channel closed and ends as [`StreamCompletion::Abandoned`].
    pub async fn finish(self) -> Result<StreamReport> {
        drop(self.lines);
        Ok(self.task.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FetchConfig;
    use crate::effects::mock::{MockHttpClient, MockResponse};
    use crate::error::TransportErrorKind;

    const URL: &str = "https://media.test/transcript.jsonl";

    fn engine(client: MockHttpClient) -> Arc<RetryEngine<MockHttpClient>> {
        let config = FetchConfig::builder()
            .attempts_and_backoff(1, Duration::from_millis(10))
            .build()
            .unwrap();
        Arc::new(RetryEngine::new(client, config))
    }

    fn partial(body: &str, first: usize) -> MockResponse {
        let last = first + body.len() - 1;
        MockResponse::status(206)
            .header("Content-Range", format!("bytes {first}-{last}/*"))
            .body(body.to_string())
    }

    async fn collect(mut handle: StreamHandle) -> (Vec<String>, StreamReport) {
        let mut lines = Vec::new();
        while let Some(line) = handle.next_line().await {
            lines.push(line);
        }
        (lines, handle.finish().await.unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn sentinels_split_across_two_responses() {
        let start = r#"{"type":"start","processing_start_time":"2024-01-01T00:00:00Z"}"#;
        let end = r#"{"type":"end","code":0,"system_reason":"done"}"#;
        let first = format!("{start}\n{}", &end[..12]);
        let second = format!("{}\n", &end[12..]);

        let client = MockHttpClient::new().on_sequence(
            URL,
            vec![partial(&first, 0), partial(&second, first.len())],
        );
        let handle = StreamFetcher::new(engine(client.clone()), URL)
            .poll_interval(Duration::from_millis(500))
            .spawn(CancellationToken::new());

        let (lines, report) = collect(handle).await;
        assert_eq!(lines, vec![start.to_string(), end.to_string()]);
        assert!(matches!(report.completion, StreamCompletion::EndOfStream));
        assert_eq!(
            report.cursor.start.as_ref().and_then(|s| s.processing_start_time.as_deref()),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(report.cursor.end.as_ref().and_then(|e| e.code), Some(0));

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].header("range"), None);
        let expected_range = format!("bytes={}-", first.len());
        assert_eq!(requests[1].header("range"), Some(expected_range.as_str()));
        assert_eq!(requests[1].at - requests[0].at, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn plain_ok_is_forwarded_whole() {
        let document = "{\"type\":\"word\",\"text\":\"a\"}\n{\"type\":\"word\",\"text\":\"b\"}\n";
        let client = MockHttpClient::new().on(URL, MockResponse::ok(document));
        let handle = StreamFetcher::new(engine(client.clone()), URL).spawn(CancellationToken::new());

        let (lines, report) = collect(handle).await;
        assert_eq!(lines, vec![document.to_string()]);
        assert!(matches!(report.completion, StreamCompletion::SingleResponse));
        assert!(report.is_complete());
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_start_is_not_fatal() {
        let body = "{\"type\":\"start\",oops\n{\"type\":\"end\"}\n";
        let client = MockHttpClient::new().on(URL, partial(body, 0));
        let handle = StreamFetcher::new(engine(client), URL).spawn(CancellationToken::new());

        let (lines, report) = collect(handle).await;
        assert_eq!(lines.len(), 2);
        assert!(report.cursor.start.is_none());
        assert!(matches!(report.completion, StreamCompletion::EndOfStream));
    }

    #[tokio::test(start_paused = true)]
    async fn unterminated_json_tail_counts_as_a_line() {
        let body = "{\"type\":\"word\"}\n{\"type\":\"end\",\"code\":0}";
        let client = MockHttpClient::new().on(URL, partial(body, 0));
        let handle = StreamFetcher::new(engine(client.clone()), URL).spawn(CancellationToken::new());

        let (lines, report) = collect(handle).await;
        assert_eq!(lines.len(), 2);
        assert!(matches!(report.completion, StreamCompletion::EndOfStream));
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_status_fails() {
        let client = MockHttpClient::new().on(URL, MockResponse::status(204));
        let handle = StreamFetcher::new(engine(client), URL).spawn(CancellationToken::new());

        let (lines, report) = collect(handle).await;
        assert!(lines.is_empty());
        assert!(matches!(
            report.completion,
            StreamCompletion::Failed(Error::Status { code: 204, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_request_ends_stream() {
        let client = MockHttpClient::new().on(URL, MockResponse::status(503));
        let handle = StreamFetcher::new(engine(client), URL).spawn(CancellationToken::new());

        let (_, report) = collect(handle).await;
        assert!(matches!(
            report.completion,
            StreamCompletion::Failed(Error::MaxRetriesExceeded { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn body_error_ends_stream() {
        let client = MockHttpClient::new().on(
            URL,
            partial("{\"type\":\"word\"}\n", 0).body_error(TransportErrorKind::Body),
        );
        let handle = StreamFetcher::new(engine(client), URL).spawn(CancellationToken::new());

        let (lines, report) = collect(handle).await;
        assert_eq!(lines.len(), 1);
        assert!(matches!(
            report.completion,
            StreamCompletion::Failed(Error::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_poll_sleep() {
        let client = MockHttpClient::new().on(URL, partial("{\"type\":\"word\"}\n", 0));
        let cancel = CancellationToken::new();
        let mut handle = StreamFetcher::new(engine(client.clone()), URL)
            .poll_interval(Duration::from_secs(3600))
            .spawn(cancel.clone());

        assert_eq!(handle.next_line().await.as_deref(), Some("{\"type\":\"word\"}"));
        cancel.cancel();
        assert_eq!(handle.next_line().await, None);

        let report = handle.finish().await.unwrap();
        assert!(matches!(report.completion, StreamCompletion::Canceled));
        assert_eq!(report.cursor.offset, 16);
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_consumer_abandons_fetch() {
        let lines: Vec<String> = (0..10).map(|i| format!("{{\"n\":{i}}}\n")).collect();
        let body = lines.concat();
        let client = MockHttpClient::new().on(URL, partial(&body, 0));
        let handle = StreamFetcher::new(engine(client), URL)
            .channel_capacity(1)
            .spawn(CancellationToken::new());

        let report = handle.finish().await.unwrap();
        assert!(matches!(report.completion, StreamCompletion::Abandoned));
    }
}

use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::{StatusVerdict, backoff_delay, classify_status, looks_like_network_issue};
use crate::data::{FetchConfig, OutageRecovery};
use crate::effects::decode::ContentDecoder;
use crate::effects::http::{HttpClient, HttpRequest, HttpResponse};
use crate::effects::limiter::RateLimiter;
use crate::effects::probe::NetworkProbe;
use crate::effects::sleep::sleep_or_cancel;
use crate::error::{Error, Result, TransportError, TransportErrorKind};

#[derive(Debug, Clone, Copy)]
pub(crate) enum BodyMode {
    Decoded,
    Raw,
}

/// Issues requests under one [`FetchConfig`]: rate limiting, retries with
/// exponential backoff, and optionally riding out a network outage.
///
/// One engine is meant to serve every request to the same service, so the
/// rate limit applies across all of them. Wrap it in an `Arc` to share it
/// between tasks.
#[derive(Debug)]
pub struct RetryEngine<C> {
    client: C,
    config: FetchConfig,
    limiter: Option<RateLimiter>,
    probe: NetworkProbe,
    decoder: ContentDecoder,
}

impl<C: HttpClient> RetryEngine<C> {
    pub fn new(client: C, config: FetchConfig) -> Self {
        Self {
            limiter: config.rate_limit().map(RateLimiter::new),
            probe: NetworkProbe::new(config.probe()),
            decoder: ContentDecoder::new(),
            client,
            config,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// GET `url` and return the first 2xx response, body unread.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] before any I/O
    /// - [`Error::Canceled`] as soon as `cancel` fires
    /// - [`Error::NotFoundNoRetry`] / [`Error::UnprocessableNoRetry`] when the
    ///   config suppresses retries for that status
    /// - [`Error::MaxRetriesExceeded`] wrapping the last failure
    /// - [`Error::NetworkUnavailableAfterMaxWait`] when outage recovery gives up
    pub async fn get_response(&self, cancel: &CancellationToken, url: &str) -> Result<HttpResponse> {
        self.get_response_with(cancel, url, &[]).await
    }

    /// Like [`get_response`](Self::get_response) with additional request
    /// headers; an extra header replaces a configured one of the same name.
    pub async fn get_response_with(
        &self,
        cancel: &CancellationToken,
        url: &str,
        extra_headers: &[(String, String)],
    ) -> Result<HttpResponse> {
        let request = self.get_request(url, extra_headers)?;
        self.send(cancel, &request).await
    }

    /// GET `url` and return the decoded body.
    ///
    /// A connection dropped while reading the body is retried like a failed
    /// request.
    pub async fn get_bytes(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<u8>> {
        let request = self.get_request(url, &[])?;
        let (body, _) = self.fetch_body(cancel, &request, BodyMode::Decoded).await?;
        Ok(body)
    }

    /// GET `url` as UTF-8 text.
    pub async fn get_text(&self, cancel: &CancellationToken, url: &str) -> Result<String> {
        let bytes = self.get_bytes(cancel, url).await?;
        Ok(into_text(bytes))
    }

    /// GET `url` and return the body exactly as sent, without decompression
    /// or charset handling.
    pub async fn get_raw(&self, cancel: &CancellationToken, url: &str) -> Result<Vec<u8>> {
        let request = self.get_request(url, &[])?;
        let (body, _) = self.fetch_body(cancel, &request, BodyMode::Raw).await?;
        Ok(body)
    }

    /// POST `body` to `url` under the same retry policy and return the
    /// decoded response body. The request body is resent on every attempt.
    pub async fn post_bytes(
        &self,
        cancel: &CancellationToken,
        url: &str,
        body: impl Into<Bytes>,
    ) -> Result<Vec<u8>> {
        let request = HttpRequest::post(parse_url(url)?, body.into(), self.config.request_timeout())
            .with_headers(self.config.shared_headers());
        let (body, _) = self.fetch_body(cancel, &request, BodyMode::Decoded).await?;
        Ok(body)
    }

    pub(crate) fn get_request(
        &self,
        url: &str,
        extra_headers: &[(String, String)],
    ) -> Result<HttpRequest> {
        let url = parse_url(url)?;
        let headers = if extra_headers.is_empty() {
            self.config.shared_headers()
        } else {
            let mut merged: Vec<(String, String)> = self
                .config
                .headers()
                .iter()
                .filter(|(k, _)| !extra_headers.iter().any(|(e, _)| e.eq_ignore_ascii_case(k)))
                .cloned()
                .collect();
            merged.extend_from_slice(extra_headers);
            merged.into()
        };
        Ok(HttpRequest::get(url, self.config.request_timeout()).with_headers(headers))
    }

    /// Send and read the body, retrying when reading the body fails part way.
    /// Returns the body and the URL it came from.
    pub(crate) async fn fetch_body(
        &self,
        cancel: &CancellationToken,
        request: &HttpRequest,
        mode: BodyMode,
    ) -> Result<(Vec<u8>, String)> {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0;
        loop {
            let response = self.send(cancel, request).await?;
            let final_url = response.url.clone();
            let read = async {
                match mode {
                    BodyMode::Decoded => self.decoder.decode(response).await,
                    BodyMode::Raw => response.bytes().await,
                }
            };
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Canceled),
                outcome = read => outcome,
            };

            let err = match outcome {
                Ok(body) => return Ok((body, final_url)),
                Err(err @ Error::Transport(_)) => err,
                Err(err) => return Err(err),
            };
            if attempt + 1 >= max_attempts {
                return Err(Error::MaxRetriesExceeded {
                    attempts: max_attempts,
                    source: Box::new(err),
                });
            }
            let delay = backoff_delay(attempt, self.config.backoff_factor(), None, None);
            info!(
                url = %request.url,
                attempt = attempt + 1,
                max_attempts,
                delay = ?delay,
                error = %err,
                "reading body failed, retrying after backoff"
            );
            sleep_or_cancel(delay, cancel).await?;
            attempt += 1;
        }
    }

    /// The retry loop proper.
    pub(crate) async fn send(
        &self,
        cancel: &CancellationToken,
        request: &HttpRequest,
    ) -> Result<HttpResponse> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire(cancel).await?;
        }

        let max_attempts = self.config.max_attempts();
        let mut attempt = 0;
        loop {
            let err = match self.attempt(cancel, request).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            if err.is_canceled() || err.is_no_retry() {
                return Err(err);
            }

            if attempt + 1 >= max_attempts {
                if let Some(recovery) = self.config.outage_recovery() {
                    if looks_like_network_issue(&err) {
                        warn!(url = %request.url, error = %err, "request failed with what looks like a network issue");
                        if self.network_down(cancel).await? {
                            return self.recover(cancel, request, recovery).await;
                        }
                    }
                }
                return Err(Error::MaxRetriesExceeded {
                    attempts: max_attempts,
                    source: Box::new(err),
                });
            }

            let delay = backoff_delay(
                attempt,
                self.config.backoff_factor(),
                err.status(),
                self.config.long_backoff_on_429(),
            );
            info!(
                url = %request.url,
                attempt = attempt + 1,
                max_attempts,
                delay = ?delay,
                status = err.status(),
                error = %err,
                "request failed, retrying after backoff"
            );
            sleep_or_cancel(delay, cancel).await?;
            attempt += 1;
        }
    }

    /// One exchange, bounded by the per-attempt timeout. Non-2xx statuses
    /// come back as errors with the response dropped.
    async fn attempt(&self, cancel: &CancellationToken, request: &HttpRequest) -> Result<HttpResponse> {
        let timeout = self.config.request_timeout();
        let started = Instant::now();
        let exchange = tokio::time::timeout(timeout, self.client.execute(request.clone()));
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Canceled),
            outcome = exchange => outcome,
        };
        let elapsed = started.elapsed();

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                debug!(url = %request.url, elapsed = ?elapsed, error = %e, "attempt failed");
                return Err(Error::Transport(e));
            }
            Err(_) => {
                debug!(url = %request.url, elapsed = ?elapsed, "attempt timed out");
                return Err(Error::Transport(TransportError::new(
                    TransportErrorKind::Timeout,
                    format!("no response within {timeout:?}"),
                )));
            }
        };
        debug!(url = %request.url, status = response.status, elapsed = ?elapsed, "attempt finished");

        let url = request.url.clone();
        match classify_status(
            response.status,
            self.config.no_retry_on_404(),
            self.config.no_retry_on_422(),
        ) {
            StatusVerdict::Success => Ok(response),
            StatusVerdict::NotFoundNoRetry => Err(Error::NotFoundNoRetry { url }),
            StatusVerdict::UnprocessableNoRetry => Err(Error::UnprocessableNoRetry { url }),
            StatusVerdict::Retry => Err(Error::Status {
                code: response.status,
                url,
            }),
        }
    }

    async fn network_down(&self, cancel: &CancellationToken) -> Result<bool> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Canceled),
            down = self.probe.is_globally_unavailable(&self.client) => Ok(down),
        }
    }

    /// Keep retrying at `recovery.interval` until the request goes through
    /// or `recovery.max_wait` is used up. Rate limiting does not apply here.
    async fn recover(
        &self,
        cancel: &CancellationToken,
        request: &HttpRequest,
        recovery: OutageRecovery,
    ) -> Result<HttpResponse> {
        warn!(
            url = %request.url,
            interval = ?recovery.interval,
            max_wait = ?recovery.max_wait,
            "network appears to be down, waiting for it to come back"
        );

        let started = Instant::now();
        loop {
            let remaining = recovery.max_wait.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            sleep_or_cancel(recovery.interval.min(remaining), cancel).await?;

            // The attempt itself counts against the budget.
            let remaining = recovery.max_wait.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            let outcome = match tokio::time::timeout(remaining, self.attempt(cancel, request)).await {
                Ok(outcome) => outcome,
                Err(_) => break,
            };
            let waited = started.elapsed();
            match outcome {
                Ok(response) => {
                    info!(url = %request.url, waited = ?waited, "network is back");
                    return Ok(response);
                }
                Err(err) if err.is_canceled() || err.is_no_retry() => return Err(err),
                Err(err @ Error::Status { .. }) => {
                    debug!(url = %request.url, waited = ?waited, error = %err, "still waiting for a good response");
                }
                Err(err) if looks_like_network_issue(&err) => {
                    debug!(url = %request.url, waited = ?waited, error = %err, "network still down");
                }
                Err(err) => return Err(err),
            }
        }

        let waited = started.elapsed();
        warn!(url = %request.url, waited = ?waited, "gave up waiting for the network");
        Err(Error::NetworkUnavailableAfterMaxWait { waited })
    }
}

fn parse_url(url: &str) -> Result<String> {
    Url::parse(url).map_err(|source| Error::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    Ok(url.to_string())
}

pub(crate) fn into_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

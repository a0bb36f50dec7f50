use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::{RedirectState, extract_client_redirect};
use crate::effects::http::HttpClient;
use crate::effects::retry::{BodyMode, RetryEngine};
use crate::error::Result;

/// Body of a redirect-resolved fetch and where it ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub body: Vec<u8>,
    pub requested_url: String,
    pub final_url: String,
}

impl Resolved {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether any redirect, HTTP or client-side, happened.
    pub fn was_redirected(&self) -> bool {
        self.requested_url != self.final_url
    }
}

/// Resolves shortened and tracking URLs.
///
/// HTTP redirects are left to the transport. On top of that the first page
/// is scanned once for an immediate meta refresh or `location.replace(...)`,
/// and that target is fetched instead. A second client-side redirect is
/// never followed.
#[derive(Debug)]
pub struct RedirectChaser<C> {
    engine: Arc<RetryEngine<C>>,
}

impl<C: HttpClient> RedirectChaser<C> {
    pub fn new(engine: Arc<RetryEngine<C>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<RetryEngine<C>> {
        &self.engine
    }

    pub async fn resolve(&self, cancel: &CancellationToken, url: &str) -> Result<Resolved> {
        let mut state = RedirectState::new(url);
        let mut current = url.to_string();

        loop {
            let request = self.engine.get_request(&current, &[])?;
            let (body, final_url) = self
                .engine
                .fetch_body(cancel, &request, BodyMode::Decoded)
                .await?;
            state.record_final(final_url);

            if !state.can_scan() {
                return Ok(finish(state, body));
            }
            let target = match extract_client_redirect(&String::from_utf8_lossy(&body)) {
                Some(target) => target,
                None => return Ok(finish(state, body)),
            };
            match state.follow(&target) {
                Some(next) => {
                    info!(from = state.requested(), to = %next, "following client-side redirect");
                    current = next;
                }
                None => return Ok(finish(state, body)),
            }
        }
    }
}

fn finish(state: RedirectState, body: Vec<u8>) -> Resolved {
    Resolved {
        body,
        requested_url: state.requested().to_string(),
        final_url: state.final_url().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FetchConfig;
    use crate::effects::mock::{MockHttpClient, MockResponse};

    fn chaser(client: MockHttpClient) -> RedirectChaser<MockHttpClient> {
        RedirectChaser::new(Arc::new(RetryEngine::new(client, FetchConfig::default())))
    }

    fn meta_refresh(target: &str) -> MockResponse {
        MockResponse::ok(format!(
            r#"<html><head><meta http-equiv="refresh" content="0;URL={target}"></head></html>"#
        ))
        .header("content-type", "text/html")
    }

    #[tokio::test]
    async fn follows_one_meta_refresh_only() {
        let client = MockHttpClient::new()
            .on("http://a.test/x", meta_refresh("http://b.test/y"))
            .on("http://b.test/y", meta_refresh("http://a.test/x"));
        let chaser = chaser(client.clone());

        let resolved = chaser
            .resolve(&CancellationToken::new(), "http://a.test/x")
            .await
            .unwrap();
        assert_eq!(resolved.requested_url, "http://a.test/x");
        assert_eq!(resolved.final_url, "http://b.test/y");
        assert!(resolved.text().contains("URL=http://a.test/x"));
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn http_redirect_final_url_is_kept() {
        let client = MockHttpClient::new().on(
            "https://sho.rt/abc",
            MockResponse::ok("<p>landing</p>").final_url("https://example.com/article"),
        );
        let chaser = chaser(client.clone());

        let resolved = chaser
            .resolve(&CancellationToken::new(), "https://sho.rt/abc")
            .await
            .unwrap();
        assert_eq!(resolved.final_url, "https://example.com/article");
        assert!(resolved.was_redirected());
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn relative_location_replace_resolves_against_final_url() {
        let client = MockHttpClient::new()
            .on(
                "https://t.test/r",
                MockResponse::ok(r#"<script>location.replace("/landing")</script>"#)
                    .final_url("https://t.test/go/r"),
            )
            .on("https://t.test/landing", MockResponse::ok("done"));
        let chaser = chaser(client.clone());

        let resolved = chaser
            .resolve(&CancellationToken::new(), "https://t.test/r")
            .await
            .unwrap();
        assert_eq!(resolved.final_url, "https://t.test/landing");
        assert_eq!(resolved.body, b"done");
    }

    #[tokio::test]
    async fn plain_page_is_returned_as_is() {
        let client = MockHttpClient::new().on("https://plain.test/", MockResponse::ok("hello"));
        let resolved = chaser(client)
            .resolve(&CancellationToken::new(), "https://plain.test/")
            .await
            .unwrap();
        assert!(!resolved.was_redirected());
        assert_eq!(resolved.text(), "hello");
    }

    #[test]
    fn text_replaces_invalid_utf8() {
        let resolved = Resolved {
            body: b"caf\xE9".to_vec(),
            requested_url: "https://a.test/".to_string(),
            final_url: "https://a.test/".to_string(),
        };
        assert_eq!(resolved.text(), "caf\u{FFFD}");
        assert_eq!(resolved.body, b"caf\xE9");
    }
}

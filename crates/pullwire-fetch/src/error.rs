//! Error types for pullwire-fetch.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("request canceled")]
    Canceled,

    #[error("404 Not Found, not retrying: {url}")]
    NotFoundNoRetry { url: String },

    #[error("422 Unprocessable Entity, not retrying: {url}")]
    UnprocessableNoRetry { url: String },

    #[error("unexpected status {code}: {url}")]
    Status { code: u16, url: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("max retries reached after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("network unavailable after waiting {waited:?}")]
    NetworkUnavailableAfterMaxWait { waited: Duration },

    #[error("failed to decode response body: {0}")]
    Decode(#[from] DecodeError),

    #[error("malformed {sentinel} message: {source}")]
    StreamParse {
        sentinel: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("stream task failed: {0}")]
    StreamTask(#[from] tokio::task::JoinError),
}

impl Error {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    /// True for the two policy-suppressed statuses (404/422 with no-retry set).
    pub fn is_no_retry(&self) -> bool {
        matches!(
            self,
            Error::NotFoundNoRetry { .. } | Error::UnprocessableNoRetry { .. }
        )
    }

    /// Status code carried by this error or by the error it wraps.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { code, .. } => Some(*code),
            Error::NotFoundNoRetry { .. } => Some(404),
            Error::UnprocessableNoRetry { .. } => Some(422),
            Error::MaxRetriesExceeded { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Coarse classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established.
    Connect,
    /// Connection establishment timed out (dial-level timeout).
    ConnectTimeout,
    /// The request as a whole exceeded its timeout.
    Timeout,
    /// Reading the response body failed part way.
    Body,
    /// The request could not be built or sent.
    Request,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Connect => write!(f, "connect error"),
            TransportErrorKind::ConnectTimeout => write!(f, "connect timeout"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Body => write!(f, "body error"),
            TransportErrorKind::Request => write!(f, "request error"),
            TransportErrorKind::Other => write!(f, "transport error"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let message = error_chain(&e);
        let kind = reqwest_error_kind(
            ReqwestFlags {
                connect: e.is_connect(),
                timeout: e.is_timeout(),
                body: e.is_body() || e.is_decode(),
                request: e.is_request() || e.is_builder(),
            },
            &message,
        );
        Self { kind, message }
    }
}

#[cfg(feature = "reqwest")]
#[derive(Debug, Clone, Copy, Default)]
struct ReqwestFlags {
    connect: bool,
    timeout: bool,
    body: bool,
    request: bool,
}

/// reqwest only flags its own timers as timeouts. OS-level dial timeouts
/// and resolvers that could not answer show up in the source chain text
/// and are classified as connect timeouts too.
#[cfg(feature = "reqwest")]
fn reqwest_error_kind(flags: ReqwestFlags, message: &str) -> TransportErrorKind {
    let lowered = message.to_ascii_lowercase();
    let timed_out = flags.timeout || lowered.contains("timed out") || lowered.contains("timeout");
    let resolver_unavailable = lowered.contains("temporary failure in name resolution")
        || (lowered.contains("lookup") && lowered.contains("try again"));

    if flags.connect && (timed_out || resolver_unavailable) {
        TransportErrorKind::ConnectTimeout
    } else if flags.connect {
        TransportErrorKind::Connect
    } else if flags.timeout {
        TransportErrorKind::Timeout
    } else if flags.body {
        TransportErrorKind::Body
    } else if flags.request {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    }
}

#[cfg(feature = "reqwest")]
fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decompress {encoding} body: {source}")]
    Decompress {
        encoding: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("unsupported charset '{0}'")]
    UnsupportedCharset(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_found_through_max_retries() {
        let err = Error::MaxRetriesExceeded {
            attempts: 3,
            source: Box::new(Error::Status {
                code: 503,
                url: "https://example.com".to_string(),
            }),
        };
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("3 attempts"));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn no_retry_classification() {
        let not_found = Error::NotFoundNoRetry {
            url: "https://example.com/a".to_string(),
        };
        assert!(not_found.is_no_retry());
        assert_eq!(not_found.status(), Some(404));
        assert!(!Error::Canceled.is_no_retry());
        assert!(Error::Canceled.is_canceled());
    }

    #[test]
    fn transport_error_display() {
        let err = TransportError::new(TransportErrorKind::ConnectTimeout, "tcp connect");
        assert_eq!(err.to_string(), "connect timeout: tcp connect");
    }

    #[cfg(feature = "reqwest")]
    #[test]
    fn reqwest_dial_failures_are_classified() {
        let connect = ReqwestFlags {
            connect: true,
            ..Default::default()
        };
        assert_eq!(
            reqwest_error_kind(
                ReqwestFlags {
                    timeout: true,
                    ..connect
                },
                "error sending request: client error (Connect): operation timed out"
            ),
            TransportErrorKind::ConnectTimeout
        );
        assert_eq!(
            reqwest_error_kind(
                connect,
                "error sending request: client error (Connect): dns error: \
                 failed to lookup address information: Temporary failure in name resolution"
            ),
            TransportErrorKind::ConnectTimeout
        );
        assert_eq!(
            reqwest_error_kind(
                connect,
                "error sending request: client error (Connect): dns error: \
                 failed to lookup address information: Name or service not known"
            ),
            TransportErrorKind::Connect
        );
        assert_eq!(
            reqwest_error_kind(connect, "tcp connect error: Connection refused (os error 111)"),
            TransportErrorKind::Connect
        );
        assert_eq!(
            reqwest_error_kind(
                ReqwestFlags {
                    timeout: true,
                    ..Default::default()
                },
                "operation timed out"
            ),
            TransportErrorKind::Timeout
        );
    }
}

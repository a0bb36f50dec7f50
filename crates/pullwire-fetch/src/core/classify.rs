use crate::error::{Error, TransportErrorKind};

/// Returns `true` for any 2xx status.
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// What the retry loop should do with a response it received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusVerdict {
    Success,
    /// 404 with retries on 404 disabled.
    NotFoundNoRetry,
    /// 422 with retries on 422 disabled.
    UnprocessableNoRetry,
    Retry,
}

pub fn classify_status(status: u16, no_retry_on_404: bool, no_retry_on_422: bool) -> StatusVerdict {
    match status {
        s if is_success(s) => StatusVerdict::Success,
        404 if no_retry_on_404 => StatusVerdict::NotFoundNoRetry,
        422 if no_retry_on_422 => StatusVerdict::UnprocessableNoRetry,
        _ => StatusVerdict::Retry,
    }
}

/// True when the error is a dial-level timeout: the connection could not be
/// established before a timeout fired. That is the signature of DNS or
/// routing trouble rather than a struggling server.
pub fn looks_like_network_issue(err: &Error) -> bool {
    match err {
        Error::Transport(t) => match t.kind {
            TransportErrorKind::ConnectTimeout => true,
            TransportErrorKind::Connect => {
                let message = t.message.to_ascii_lowercase();
                message.contains("timed out") || message.contains("timeout")
            }
            _ => false,
        },
        Error::MaxRetriesExceeded { source, .. } => looks_like_network_issue(source),
        _ => false,
    }
}

//! Pure transformations behind the fetchers.
//!
//! Nothing in this module performs I/O: backoff arithmetic, status and error
//! classification, client-side redirect scanning, charset normalization and
//! stream line bookkeeping.

mod backoff;
mod charset;
mod classify;
mod redirect;
mod sentinel;

pub use backoff::{backoff_delay, retry_delay};
pub use charset::{META_SNIFF_LEN, declared_charset, is_textual, normalize_charset, sniff_meta_charset};
pub use classify::{StatusVerdict, classify_status, is_success, looks_like_network_issue};
pub use redirect::{RedirectState, extract_client_redirect};
pub use sentinel::{LineSplitter, Sentinel, inspect_line, next_offset};

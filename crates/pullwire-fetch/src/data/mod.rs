//! Immutable data types for fetching operations.
//!
//! Configuration, header presets, file-based settings and the records
//! produced by the stream fetcher. Nothing in here performs I/O.

pub mod config;
pub mod headers;
pub mod settings;
pub mod stream;

pub use config::{FetchConfig, FetchConfigBuilder, OutageRecovery, ProbeConfig, RateLimit};
pub use settings::FetchSettings;
pub use stream::{EndMessage, StartMessage, StreamCursor};

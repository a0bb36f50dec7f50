//! Response body decoding: content-encoding first, then charset.

use std::io::{self, Write};

use flate2::write::{GzDecoder, ZlibDecoder};
use futures_util::StreamExt;
use tracing::debug;

use crate::core::{is_textual, normalize_charset};
use crate::effects::http::HttpResponse;
use crate::error::{DecodeError, Result};

/// Incremental decompressor fed one body chunk at a time.
enum Decompressor {
    Identity(Vec<u8>),
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl Decompressor {
    fn for_encoding(content_encoding: Option<&str>) -> Self {
        match content_encoding.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => Decompressor::Gzip(GzDecoder::new(Vec::new())),
            Some("deflate") => Decompressor::Deflate(ZlibDecoder::new(Vec::new())),
            Some("") | Some("identity") | None => Decompressor::Identity(Vec::new()),
            Some(other) => {
                debug!(encoding = other, "unknown content encoding, passing body through");
                Decompressor::Identity(Vec::new())
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Decompressor::Identity(_) => "identity",
            Decompressor::Gzip(_) => "gzip",
            Decompressor::Deflate(_) => "deflate",
        }
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Decompressor::Identity(out) => {
                out.extend_from_slice(chunk);
                Ok(())
            }
            Decompressor::Gzip(decoder) => decoder.write_all(chunk),
            Decompressor::Deflate(decoder) => decoder.write_all(chunk),
        }
    }

    fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            Decompressor::Identity(out) => Ok(out),
            Decompressor::Gzip(decoder) => decoder.finish(),
            Decompressor::Deflate(decoder) => decoder.finish(),
        }
    }
}

/// Turns a response into bytes the caller can use directly.
///
/// A `gzip` or `deflate` body is decompressed as it streams in. Textual
/// content types (`text/*`, anything mentioning `json` or `xml`) are then
/// re-encoded as UTF-8; everything else is returned as decompressed.
///
/// Errors reading the body surface as [`Error::Transport`](crate::Error::Transport); bad compressed
/// data or an unknown charset label as [`Error::Decode`](crate::Error::Decode).
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentDecoder;

impl ContentDecoder {
    pub fn new() -> Self {
        Self
    }

    pub async fn decode(&self, mut response: HttpResponse) -> Result<Vec<u8>> {
        let content_type = response.header("content-type").unwrap_or_default().to_string();
        let mut decompressor = Decompressor::for_encoding(response.header("content-encoding"));
        let encoding = decompressor.name();

        while let Some(chunk) = response.body.next().await {
            decompressor
                .write(&chunk?)
                .map_err(|source| DecodeError::Decompress { encoding, source })?;
        }
        let body = decompressor
            .finish()
            .map_err(|source| DecodeError::Decompress { encoding, source })?;

        if is_textual(&content_type) {
            Ok(normalize_charset(&body, &content_type)?)
        } else {
            Ok(body)
        }
    }

    /// Decode and convert to a `String`, replacing invalid UTF-8.
    pub async fn decode_text(&self, response: HttpResponse) -> Result<String> {
        let bytes = self.decode(response).await?;
        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

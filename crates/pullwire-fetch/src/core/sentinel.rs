use crate::data::stream::{EndMessage, StartMessage};
use crate::error::Error;

const START_PREFIX: &str = r#"{"type":"start""#;
const END_PREFIX: &str = r#"{"type":"end""#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sentinel {
    Start(StartMessage),
    End(EndMessage),
}

/// Recognize a sentinel line.
///
/// Returns `None` for ordinary lines, `Some(Err(_))` for a line that starts
/// like a sentinel but does not parse.
pub fn inspect_line(line: &str) -> Option<Result<Sentinel, Error>> {
    if line.starts_with(START_PREFIX) {
        return Some(
            serde_json::from_str::<StartMessage>(line)
                .map(Sentinel::Start)
                .map_err(|source| Error::StreamParse {
                    sentinel: "start",
                    source,
                }),
        );
    }
    if line.starts_with(END_PREFIX) {
        return match serde_json::from_str::<EndMessage>(line) {
            Ok(end) if end.kind == "end" => Some(Ok(Sentinel::End(end))),
            Ok(_) => None,
            Err(source) => Some(Err(Error::StreamParse {
                sentinel: "end",
                source,
            })),
        };
    }
    None
}

/// Splits a byte stream into lines across chunk and response boundaries.
///
/// An unterminated tail is kept until more bytes arrive, so a line cut in
/// half by a range boundary comes out whole.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line they complete (without `\n`/`\r\n`).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            lines.push(to_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Take the unterminated tail when it already is a complete JSON value.
    ///
    /// Producers sometimes omit the newline after the last record.
    pub fn take_complete_tail(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        serde_json::from_slice::<serde_json::Value>(&self.pending).ok()?;
        let line = to_line(&self.pending);
        self.pending.clear();
        Some(line)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Offset to request next after a partial response.
///
/// Uses the end of `Content-Range` (`bytes first-last/total`) when present,
/// otherwise `current + received`. Never goes backwards.
pub fn next_offset(current: u64, content_range: Option<&str>, received: u64) -> u64 {
    let from_range = content_range.and_then(|value| {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, _total) = rest.split_once('/')?;
        let (_first, last) = range.split_once('-')?;
        last.trim().parse::<u64>().ok().map(|last| last + 1)
    });
    let candidate = from_range.unwrap_or_else(|| current.saturating_add(received));
    current.max(candidate)
}

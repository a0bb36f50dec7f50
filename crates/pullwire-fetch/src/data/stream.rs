//! Records produced by the incremental stream fetcher.

use serde::{Deserialize, Serialize};

/// First sentinel line of a stream: `{"type":"start", ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_format_version: Option<String>,
}

/// Last sentinel line of a stream: `{"type":"end", ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_reason: Option<String>,
}

/// Progress of one stream: the acknowledged byte offset and the sentinels
/// seen so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamCursor {
    pub offset: u64,
    pub start: Option<StartMessage>,
    pub end: Option<EndMessage>,
}

impl StreamCursor {
    /// Move the offset forward; never moves it backwards.
    pub fn advance_to(&mut self, offset: u64) {
        self.offset = self.offset.max(offset);
    }

    /// Value of the `Range` header for the next poll, if one is needed.
    pub fn range_header(&self) -> Option<String> {
        (self.offset > 0).then(|| format!("bytes={}-", self.offset))
    }
}

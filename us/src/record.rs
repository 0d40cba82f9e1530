//! Per-video upload record

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// `last_caption_index` value for a video that has never been uploaded
pub const NEVER_USED: i64 = -1;

/// Whole-store mapping persisted as one document
pub type HistoryMap = BTreeMap<String, UploadRecord>;

/// Rotation position and upload count for one video
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Index of the caption used by the last successful upload, -1 if none
    pub last_caption_index: i64,

    /// Number of successful uploads
    pub upload_count: u64,

    /// Time of the last successful upload
    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp")]
    pub last_upload: Option<DateTime<Utc>>,
}

impl Default for UploadRecord {
    fn default() -> Self {
        Self {
            last_caption_index: NEVER_USED,
            upload_count: 0,
            last_upload: None,
        }
    }
}

impl UploadRecord {
    pub fn is_unseen(&self) -> bool {
        self.upload_count == 0 && self.last_caption_index == NEVER_USED
    }

    /// Next caption index in round-robin order over `caption_count` captions
    ///
    /// `caption_count` must be non-zero. A stored index past the end (the
    /// caption list shrank since it was written) still maps into range.
    pub fn next_index(&self, caption_count: usize) -> usize {
        debug!(last = self.last_caption_index, caption_count, "UploadRecord::next_index: called");
        (self.last_caption_index + 1).rem_euclid(caption_count as i64) as usize
    }

    /// Record a successful upload that used `caption_index`
    pub fn record_success(&mut self, caption_index: usize, at: DateTime<Utc>) {
        self.last_caption_index = caption_index as i64;
        self.upload_count += 1;
        self.last_upload = Some(at);
    }
}

/// Parse an ISO-8601 timestamp
///
/// Accepts RFC 3339 with offset, or a naive `YYYY-MM-DDTHH:MM:SS[.ffffff]`
/// which is read as local time.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let naive: NaiveDateTime = raw.parse()?;
    debug!(%raw, "parse_timestamp: naive timestamp, assuming local time");
    Ok(Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive)))
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_some(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| super::parse_timestamp(&s).map_err(D::Error::custom))
            .transpose()
    }
}

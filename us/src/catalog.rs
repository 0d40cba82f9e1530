//! Static video catalog: video id -> ordered captions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::HistoryError;

/// One catalog entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    /// Captions in rotation order
    #[serde(default)]
    pub captions: Vec<String>,

    /// What the video shows, used as context for generated captions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VideoEntry {
    pub fn new(captions: Vec<String>) -> Self {
        Self {
            captions,
            description: None,
        }
    }
}

/// Read-only mapping of video filename to its caption set
///
/// Loaded once at startup and shared with the tracker behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoCatalog {
    entries: BTreeMap<String, VideoEntry>,
}

impl VideoCatalog {
    pub fn new(entries: BTreeMap<String, VideoEntry>) -> Self {
        debug!(entry_count = entries.len(), "VideoCatalog::new: called");
        Self { entries }
    }

    /// Builder-style insert of a video with plain captions
    pub fn with_video<I, S>(mut self, video_id: impl Into<String>, captions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = VideoEntry::new(captions.into_iter().map(Into::into).collect());
        self.entries.insert(video_id.into(), entry);
        self
    }

    /// Captions for a video in rotation order
    pub fn get_captions(&self, video_id: &str) -> Result<&[String], HistoryError> {
        self.entries
            .get(video_id)
            .map(|e| e.captions.as_slice())
            .ok_or_else(|| HistoryError::UnknownVideo(video_id.to_string()))
    }

    pub fn entry(&self, video_id: &str) -> Option<&VideoEntry> {
        self.entries.get(video_id)
    }

    pub fn description(&self, video_id: &str) -> Option<&str> {
        self.entries.get(video_id).and_then(|e| e.description.as_deref())
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.entries.contains_key(video_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Video ids in sorted order
    pub fn video_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VideoEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of captions across all videos
    pub fn caption_count(&self) -> usize {
        self.entries.values().map(|e| e.captions.len()).sum()
    }

    /// Videos that would fail rotation because they have no captions
    pub fn empty_entries(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, e)| e.captions.is_empty())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

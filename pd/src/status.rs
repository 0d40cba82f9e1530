//! `pd status`: caption rotation state per video

use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use serde::Serialize;
use uploadstore::UploadHistoryTracker;

/// One catalog video and where its rotation stands
#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub video_id: String,
    pub caption_count: usize,
    /// -1 when never uploaded
    pub last_caption_index: i64,
    /// `None` when the video has no captions
    pub next_caption_index: Option<usize>,
    pub upload_count: u64,
    pub last_upload: Option<DateTime<Utc>>,
}

impl StatusEntry {
    pub fn never_uploaded(&self) -> bool {
        self.upload_count == 0
    }
}

/// Everything `pd status` shows
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub history: String,
    pub videos: Vec<StatusEntry>,
    /// Videos with history that are no longer in the catalog
    pub orphaned: Vec<String>,
}

impl StatusReport {
    pub fn build(tracker: &UploadHistoryTracker) -> Self {
        let catalog = tracker.catalog();
        let records = tracker.records();

        let videos = catalog
            .iter()
            .map(|(video_id, entry)| {
                let record = records.get(video_id).cloned().unwrap_or_default();
                let count = entry.captions.len();
                StatusEntry {
                    video_id: video_id.to_string(),
                    caption_count: count,
                    last_caption_index: record.last_caption_index,
                    next_caption_index: (count > 0).then(|| record.next_index(count)),
                    upload_count: record.upload_count,
                    last_upload: record.last_upload,
                }
            })
            .collect();

        let orphaned = records.keys().filter(|id| !catalog.contains(id)).cloned().collect();

        Self {
            history: tracker.location(),
            videos,
            orphaned,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{} {}\n", "Upload history:".bold(), self.history));

        for entry in &self.videos {
            out.push('\n');
            out.push_str(&format!("{}\n", entry.video_id.bold()));
            if entry.caption_count == 0 {
                out.push_str(&format!("  {}\n", "No captions configured".red()));
                continue;
            }
            if entry.never_uploaded() {
                out.push_str(&format!("  {}\n", "Never uploaded".dimmed()));
            } else {
                out.push_str(&format!("  Total uploads: {}\n", entry.upload_count));
                if entry.last_caption_index >= 0 {
                    out.push_str(&format!(
                        "  Last caption used: #{} of {}\n",
                        entry.last_caption_index + 1,
                        entry.caption_count
                    ));
                }
                if let Some(at) = entry.last_upload {
                    out.push_str(&format!(
                        "  Last upload: {}\n",
                        at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                    ));
                }
            }
            if let Some(next) = entry.next_caption_index {
                out.push_str(&format!("  Next caption: #{} of {}\n", next + 1, entry.caption_count));
            }
        }

        if !self.orphaned.is_empty() {
            out.push('\n');
            out.push_str(&format!(
                "{} {}\n",
                "History for videos not in the catalog:".yellow(),
                self.orphaned.join(", ")
            ));
        }
        out
    }
}

//! `pd check`: configuration self-test

use chrono::{NaiveTime, Weekday};
use colored::Colorize;
use tracing::debug;

use crate::config::{CaptionMode, Config};
use crate::schedule::{Slot, WeeklySchedule};
use crate::uploader::Platform;
use crate::video::VideoLibrary;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// File and caption state of one catalog video
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCheck {
    pub video_id: String,
    pub file_present: bool,
    pub caption_count: usize,
}

/// Findings of `pd check`
#[derive(Debug, Clone)]
pub struct ConfigReport {
    pub videos: Vec<VideoCheck>,
    pub total_captions: usize,
    pub per_day: Vec<(Weekday, usize)>,
    pub times: Vec<NaiveTime>,
    pub platforms: Vec<Platform>,
    pub uploads_per_week: usize,
    pub pool_uploads_per_week: usize,
    /// Library files a `pool` entry can pick
    pub pool_candidates: Vec<String>,
    pub today: Weekday,
    pub today_slots: Vec<Slot>,
    /// Problems that make scheduled uploads fail
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ConfigReport {
    pub fn build(config: &Config, schedule: &WeeklySchedule, library: &VideoLibrary, today: Weekday) -> Self {
        debug!(%today, "ConfigReport::build: called");
        let catalog = &config.catalog;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let videos: Vec<VideoCheck> = catalog
            .iter()
            .map(|(video_id, entry)| VideoCheck {
                video_id: video_id.to_string(),
                file_present: library.resolve(video_id).is_some(),
                caption_count: entry.captions.len(),
            })
            .collect();

        for video_id in schedule.scheduled_videos() {
            match catalog.entry(video_id) {
                None => errors.push(format!("Scheduled video '{}' is not in the catalog", video_id)),
                Some(entry) if entry.captions.is_empty() => {
                    errors.push(format!("Scheduled video '{}' has no captions", video_id))
                }
                Some(_) => {
                    if library.resolve(video_id).is_none() {
                        warnings.push(format!(
                            "Scheduled video '{}' not found in {}",
                            video_id,
                            library.dir().display()
                        ));
                    }
                }
            }
        }

        let pool_uploads_per_week = schedule.pool_uploads_per_week();
        let pool_candidates: Vec<String> = if pool_uploads_per_week > 0 {
            let files = library.list().unwrap_or_else(|e| {
                warnings.push(format!("Cannot list {}: {}", library.dir().display(), e));
                Vec::new()
            });
            files
                .into_iter()
                .filter(|id| catalog.entry(id).is_some_and(|e| !e.captions.is_empty()))
                .collect()
        } else {
            Vec::new()
        };
        if pool_uploads_per_week > 0 && pool_candidates.is_empty() {
            errors.push(format!(
                "The pool is scheduled but no captioned video is in {}",
                library.dir().display()
            ));
        }

        let scheduled = schedule.scheduled_videos();
        for video_id in catalog.empty_entries() {
            if !scheduled.contains(&video_id) {
                warnings.push(format!("Catalog video '{}' has no captions", video_id));
            }
        }

        for &platform in schedule.platforms() {
            let platform_config = config.platforms.get(platform);
            if !platform_config.enabled {
                warnings.push(format!("Scheduled platform {} is disabled", platform));
            } else if platform_config.command.is_empty() {
                warnings.push(format!("Platform {} has no upload command", platform));
            }
        }
        if schedule.platforms().is_empty() && !schedule.is_empty() {
            errors.push("Videos are scheduled but no platforms are selected".to_string());
        }

        if config.caption.mode == CaptionMode::Ai
            && let Err(e) = config.llm.get_api_key()
        {
            errors.push(e.to_string());
        }

        Self {
            total_captions: catalog.caption_count(),
            videos,
            per_day: WEEK.iter().map(|&d| (d, schedule.uploads_per_day(d))).collect(),
            times: schedule.times().to_vec(),
            platforms: schedule.platforms().to_vec(),
            uploads_per_week: schedule.uploads_per_week(),
            pool_uploads_per_week,
            pool_candidates,
            today,
            today_slots: schedule.slots_on(today),
            errors,
            warnings,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("{}\n", "Videos".bold()));
        for video in &self.videos {
            let file = if video.file_present {
                "found".green()
            } else {
                "missing".red()
            };
            out.push_str(&format!(
                "  {:<40} {:>3} captions  file {}\n",
                video.video_id, video.caption_count, file
            ));
        }
        out.push_str(&format!(
            "  {} videos, {} captions total\n\n",
            self.videos.len(),
            self.total_captions
        ));

        out.push_str(&format!("{}\n", "Schedule".bold()));
        let times: Vec<String> = self.times.iter().map(|t| t.format("%H:%M").to_string()).collect();
        out.push_str(&format!("  Upload times: {}\n", times.join(", ")));
        let platforms: Vec<&str> = self.platforms.iter().map(|p| p.as_str()).collect();
        out.push_str(&format!("  Platforms: {}\n", platforms.join(", ")));
        for (day, count) in &self.per_day {
            out.push_str(&format!("  {}: {} upload(s)\n", day, count));
        }
        out.push_str(&format!("  Uploads per week: {}\n", self.uploads_per_week));
        if self.pool_uploads_per_week > 0 {
            out.push_str(&format!(
                "  Pool: {} pick(s) per week from {} video(s)\n",
                self.pool_uploads_per_week,
                self.pool_candidates.len()
            ));
        }
        out.push('\n');

        out.push_str(&format!("{} ({})\n", "Today".bold(), self.today));
        if self.today_slots.is_empty() {
            out.push_str("  Nothing scheduled\n");
        }
        for slot in &self.today_slots {
            out.push_str(&format!("  {} {}\n", slot.time.format("%H:%M"), slot.videos.join(", ")));
        }

        if !self.warnings.is_empty() {
            out.push('\n');
            for warning in &self.warnings {
                out.push_str(&format!("{} {}\n", "warning:".yellow().bold(), warning));
            }
        }
        if !self.errors.is_empty() {
            out.push('\n');
            for error in &self.errors {
                out.push_str(&format!("{} {}\n", "error:".red().bold(), error));
            }
        }
        out.push('\n');
        if self.has_errors() {
            out.push_str(&format!("{}\n", "Configuration has errors".red().bold()));
        } else {
            out.push_str(&format!("{}\n", "Configuration OK".green().bold()));
        }
        out
    }
}

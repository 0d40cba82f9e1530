//! Weekly posting schedule
//!
//! Each weekday lists the videos to post in order; the i-th video of a day
//! goes out at the i-th upload time. Days with more videos than times post
//! the extras together with the last time of the day. A `pool` entry is
//! filled at upload time with a video from the videos directory.

use chrono::{Datelike, Days, NaiveDateTime, NaiveTime, Weekday};
use eyre::{Result, eyre};
use tracing::debug;

use crate::config::{DayPlan, ScheduleConfig};
use crate::uploader::Platform;

mod runner;

pub use runner::{plan_wait, run, supervise};

/// Longest single sleep while waiting for a slot
pub const MAX_WAIT_SECS: u64 = 60;

/// Most slots [`WeeklySchedule::upcoming`] returns
pub const MAX_UPCOMING: usize = 500;

/// Day entry that draws the next video from the pool
pub const POOL_ENTRY: &str = "pool";

pub fn is_pool_entry(entry: &str) -> bool {
    entry == POOL_ENTRY
}

/// Videos posted together at one time of day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub weekday: Weekday,
    pub time: NaiveTime,
    pub videos: Vec<String>,
}

/// A [`Slot`] pinned to a calendar date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotOccurrence {
    pub at: NaiveDateTime,
    pub slot: Slot,
}

/// Validated form of the `schedule` config section
#[derive(Debug, Clone)]
pub struct WeeklySchedule {
    /// Sorted, deduplicated
    times: Vec<NaiveTime>,
    /// Indexed by days from Monday
    days: [Vec<String>; 7],
    platforms: Vec<Platform>,
}

pub fn parse_time(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| eyre!("Invalid upload time '{}': expected HH:MM (24-hour)", raw))
}

pub fn parse_weekday(raw: &str) -> Result<Weekday> {
    raw.trim()
        .parse::<Weekday>()
        .map_err(|_| eyre!("Invalid weekday '{}': expected monday..sunday", raw))
}

fn day_index(weekday: Weekday) -> usize {
    weekday.num_days_from_monday() as usize
}

impl WeeklySchedule {
    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        debug!(times = ?config.times, day_count = config.days.len(), "WeeklySchedule::from_config: called");
        let mut times = config.times.iter().map(|t| parse_time(t)).collect::<Result<Vec<_>>>()?;
        times.sort();
        times.dedup();

        let mut days: [Vec<String>; 7] = Default::default();
        for (name, plan) in &config.days {
            let weekday = parse_weekday(name)?;
            let entries = match plan {
                DayPlan::Videos(videos) => videos.clone(),
                // One pool pick per upload time
                DayPlan::One(entry) if is_pool_entry(entry) => vec![POOL_ENTRY.to_string(); times.len().max(1)],
                DayPlan::One(video) => vec![video.clone()],
            };
            days[day_index(weekday)].extend(entries);
        }

        if times.is_empty() && days.iter().any(|d| !d.is_empty()) {
            return Err(eyre!("Videos are scheduled but no upload times are configured"));
        }

        Ok(Self {
            times,
            days,
            platforms: config.platforms.clone(),
        })
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    /// Videos listed for `weekday`, in posting order
    pub fn videos_on(&self, weekday: Weekday) -> &[String] {
        &self.days[day_index(weekday)]
    }

    pub fn uploads_per_day(&self, weekday: Weekday) -> usize {
        self.videos_on(weekday).len()
    }

    pub fn uploads_per_week(&self) -> usize {
        self.days.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads_per_week() == 0
    }

    /// Every distinct video id the schedule names, in first-seen order
    ///
    /// Pool entries are not video ids and are left out.
    pub fn scheduled_videos(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for video in self.days.iter().flatten().filter(|v| !is_pool_entry(v)) {
            if !seen.contains(&video.as_str()) {
                seen.push(video);
            }
        }
        seen
    }

    /// Number of pool picks per week
    pub fn pool_uploads_per_week(&self) -> usize {
        self.days.iter().flatten().filter(|v| is_pool_entry(v)).count()
    }

    /// Slots of `weekday` in time order
    pub fn slots_on(&self, weekday: Weekday) -> Vec<Slot> {
        let mut slots: Vec<Slot> = Vec::new();
        let Some(last) = self.times.len().checked_sub(1) else {
            return slots;
        };
        for (i, video) in self.videos_on(weekday).iter().enumerate() {
            let time = self.times[i.min(last)];
            match slots.iter_mut().find(|s| s.time == time) {
                Some(slot) => slot.videos.push(video.clone()),
                None => slots.push(Slot {
                    weekday,
                    time,
                    videos: vec![video.clone()],
                }),
            }
        }
        slots.sort_by_key(|s| s.time);
        slots
    }

    /// First slot strictly after `now`, looking at most a week ahead
    pub fn next_slot_after(&self, now: NaiveDateTime) -> Option<SlotOccurrence> {
        debug!(%now, "WeeklySchedule::next_slot_after: called");
        (0..=7u64).find_map(|offset| {
            let date = now.date().checked_add_days(Days::new(offset))?;
            self.slots_on(date.weekday())
                .into_iter()
                .map(|slot| SlotOccurrence {
                    at: date.and_time(slot.time),
                    slot,
                })
                .find(|occ| occ.at > now)
        })
    }

    /// The next `count` slots after `now`, at most [`MAX_UPCOMING`]
    pub fn upcoming(&self, now: NaiveDateTime, count: usize) -> Vec<SlotOccurrence> {
        let count = count.min(MAX_UPCOMING);
        let mut out = Vec::new();
        let mut cursor = now;
        while out.len() < count {
            let Some(occ) = self.next_slot_after(cursor) else {
                break;
            };
            cursor = occ.at;
            out.push(occ);
        }
        out
    }

    /// Today's latest slot at or before `now`, else today's first slot
    pub fn current_slot(&self, now: NaiveDateTime) -> Option<SlotOccurrence> {
        debug!(%now, "WeeklySchedule::current_slot: called");
        let date = now.date();
        let slots = self.slots_on(date.weekday());
        let slot = match slots.iter().rev().find(|s| s.time <= now.time()) {
            Some(slot) => slot.clone(),
            None => slots.first()?.clone(),
        };
        Some(SlotOccurrence {
            at: date.and_time(slot.time),
            slot,
        })
    }
}

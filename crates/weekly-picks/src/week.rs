//! Week numbering and photo grouping
//!
//! Week numbers follow the configurable "week-based year" model: a week starts
//! on `first_day_of_week`, and week 1 is the first week holding at least
//! `minimal_days_in_first_week` days of the new year. Monday/4 gives ISO-8601
//! weeks and Sunday/1 the US convention. Days at either end of a calendar year
//! can belong to a week of the neighbouring week-based year.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Days, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
    Weekday,
};
use photo_quality::Photo;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::WeekError;

/// Week-based year and week number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekId {
    pub year: i32,
    pub week_of_year: u32,
}

impl WeekId {
    pub fn new(year: i32, week_of_year: u32) -> Self {
        Self { year, week_of_year }
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{}", self.year, self.week_of_year)
    }
}

impl FromStr for WeekId {
    type Err = WeekError;

    /// Parses `2025-W49` (zero padding accepted: `2025-W07`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WeekError::InvalidWeekId(s.to_string());
        let (year, week) = s.trim().split_once("-W").ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let week_of_year: u32 = week.parse().map_err(|_| invalid())?;
        if !(1..=53).contains(&week_of_year) {
            return Err(invalid());
        }
        Ok(Self { year, week_of_year })
    }
}

/// First day of week plus minimal days in the first week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekDefinition {
    first_day_of_week: Weekday,
    minimal_days_in_first_week: u8,
}

impl Default for WeekDefinition {
    fn default() -> Self {
        Self::iso()
    }
}

impl WeekDefinition {
    pub fn new(
        first_day_of_week: Weekday,
        minimal_days_in_first_week: u8,
    ) -> Result<Self, WeekError> {
        if !(1..=7).contains(&minimal_days_in_first_week) {
            return Err(WeekError::InvalidMinimalDays(minimal_days_in_first_week));
        }
        Ok(Self {
            first_day_of_week,
            minimal_days_in_first_week,
        })
    }

    /// ISO-8601: weeks start Monday, week 1 holds the first Thursday
    pub fn iso() -> Self {
        Self {
            first_day_of_week: Weekday::Mon,
            minimal_days_in_first_week: 4,
        }
    }

    pub fn first_day_of_week(&self) -> Weekday {
        self.first_day_of_week
    }

    pub fn minimal_days_in_first_week(&self) -> u8 {
        self.minimal_days_in_first_week
    }

    /// 1-based day of week counted from `first_day_of_week`
    fn localized_day_of_week(&self, date: NaiveDate) -> i64 {
        let iso = date.weekday().num_days_from_monday() as i64;
        let first = self.first_day_of_week.num_days_from_monday() as i64;
        (iso - first).rem_euclid(7) + 1
    }

    /// Offset from day-of-year 1 to the first day of week 1
    fn start_of_week_offset(&self, day: i64, dow: i64) -> i64 {
        let week_start = (day - dow).rem_euclid(7);
        if week_start + 1 > self.minimal_days_in_first_week as i64 {
            7 - week_start
        } else {
            -week_start
        }
    }

    pub fn week_id(&self, date: NaiveDate) -> WeekId {
        let dow = self.localized_day_of_week(date);
        let doy = date.ordinal() as i64;
        let offset = self.start_of_week_offset(doy, dow);
        let week = compute_week(offset, doy);

        if week == 0 {
            // Still in the last week of the previous week-based year
            return match date.checked_sub_days(Days::new(doy as u64)) {
                Some(last_of_previous) => self.week_id(last_of_previous),
                None => WeekId::new(date.year() - 1, 1),
            };
        }

        let next_year_start = year_length(date.year()) + self.minimal_days_in_first_week as i64;
        let new_year_week = compute_week(offset, next_year_start);
        if week >= new_year_week {
            WeekId::new(date.year() + 1, (week - new_year_week + 1) as u32)
        } else {
            WeekId::new(date.year(), week as u32)
        }
    }

    /// First and last calendar day of the week containing `date`
    pub fn week_bounds(&self, date: NaiveDate) -> (NaiveDate, NaiveDate) {
        let back = (self.localized_day_of_week(date) - 1) as u64;
        let start = date.checked_sub_days(Days::new(back)).unwrap_or(date);
        let end = start.checked_add_days(Days::new(6)).unwrap_or(start);
        (start, end)
    }
}

fn compute_week(offset: i64, day: i64) -> i64 {
    (7 + offset + (day - 1)).div_euclid(7)
}

fn year_length(year: i32) -> i64 {
    if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
        366
    } else {
        365
    }
}

/// Time zone that capture timestamps are read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureZone {
    /// The system zone, daylight saving included
    Local,
    Fixed(FixedOffset),
}

impl CaptureZone {
    pub fn utc() -> Self {
        CaptureZone::Fixed(Utc.fix())
    }

    /// Calendar date of a capture timestamp (epoch millis)
    pub fn date_of(&self, taken_at: i64) -> NaiveDate {
        let instant = DateTime::from_timestamp_millis(taken_at).unwrap_or_else(|| {
            warn!(taken_at, "capture time out of range, using the epoch");
            DateTime::UNIX_EPOCH
        });
        match self {
            CaptureZone::Local => instant.with_timezone(&Local).date_naive(),
            CaptureZone::Fixed(offset) => instant.with_timezone(offset).date_naive(),
        }
    }

    /// Epoch millis of a wall-clock time in this zone.
    ///
    /// A time repeated by a daylight saving change resolves to the earlier
    /// instant; a time skipped by one gives `None`.
    pub fn wall_clock_millis(&self, naive: &NaiveDateTime) -> Option<i64> {
        let millis = match self {
            CaptureZone::Local => Local.from_local_datetime(naive).earliest()?.timestamp_millis(),
            CaptureZone::Fixed(offset) => {
                offset.from_local_datetime(naive).earliest()?.timestamp_millis()
            }
        };
        Some(millis)
    }
}

/// `[weeks]` configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeekConfig {
    pub first_day_of_week: Weekday,
    pub minimal_days_in_first_week: u8,
    /// Fixed offset for capture times; the system time zone when unset
    pub utc_offset_minutes: Option<i32>,
}

impl Default for WeekConfig {
    fn default() -> Self {
        Self {
            first_day_of_week: Weekday::Mon,
            minimal_days_in_first_week: 4,
            utc_offset_minutes: None,
        }
    }
}

impl WeekConfig {
    pub fn grouper(&self) -> Result<WeekGrouper, WeekError> {
        let definition =
            WeekDefinition::new(self.first_day_of_week, self.minimal_days_in_first_week)?;
        let zone = match self.utc_offset_minutes {
            Some(minutes) => minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .map(CaptureZone::Fixed)
                .ok_or(WeekError::InvalidUtcOffset(minutes))?,
            None => CaptureZone::Local,
        };
        Ok(WeekGrouper::new(definition, zone))
    }
}

/// One calendar week of photos.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyGroup {
    pub week_id: WeekId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Newest first
    pub photos: Vec<Photo>,
    /// Top picks, a subset of `photos`; empty until recommended
    pub recommended: Vec<Photo>,
}

/// Buckets photos into weeks in one time zone.
#[derive(Debug, Clone)]
pub struct WeekGrouper {
    definition: WeekDefinition,
    zone: CaptureZone,
}

impl WeekGrouper {
    pub fn new(definition: WeekDefinition, zone: CaptureZone) -> Self {
        Self { definition, zone }
    }

    pub fn utc(definition: WeekDefinition) -> Self {
        Self::new(definition, CaptureZone::utc())
    }

    pub fn definition(&self) -> &WeekDefinition {
        &self.definition
    }

    pub fn zone(&self) -> CaptureZone {
        self.zone
    }

    /// Calendar date of a capture timestamp (epoch millis)
    pub fn local_date(&self, taken_at: i64) -> NaiveDate {
        self.zone.date_of(taken_at)
    }

    pub fn week_id_of(&self, taken_at: i64) -> WeekId {
        self.definition.week_id(self.local_date(taken_at))
    }

    /// Group photos by week, most recent week first. Never emits an empty group.
    pub fn group(&self, photos: Vec<Photo>) -> Vec<WeeklyGroup> {
        let mut buckets: BTreeMap<WeekId, Vec<(NaiveDate, Photo)>> = BTreeMap::new();
        for photo in photos {
            let date = self.local_date(photo.taken_at);
            buckets
                .entry(self.definition.week_id(date))
                .or_default()
                .push((date, photo));
        }

        buckets
            .into_iter()
            .rev()
            .filter_map(|(week_id, entries)| {
                let latest = entries.iter().map(|(date, _)| *date).max()?;
                let (start_date, end_date) = self.definition.week_bounds(latest);

                let mut photos: Vec<Photo> = entries.into_iter().map(|(_, photo)| photo).collect();
                photos.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));

                Some(WeeklyGroup {
                    week_id,
                    start_date,
                    end_date,
                    photos,
                    recommended: Vec::new(),
                })
            })
            .collect()
    }
}

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// When a commitment occupies the calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// Repeats on the given weekdays, optionally bounded by a date range.
    Weekly {
        days: Vec<Weekday>,
        date_range: Option<(NaiveDate, NaiveDate)>,
    },
    /// Occurs exactly on the listed dates.
    Dates(Vec<NaiveDate>),
}

/// Per-date replacement for a single occurrence of a recurring commitment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OccurrenceOverride {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub title: Option<String>,
}

/// An immovable block the generator must schedule around.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixedCommitment {
    pub id: Uuid,
    pub title: String,
    pub recurrence: Recurrence,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_all_day: bool,
    /// Whether this block's duration is subtracted from daily capacity.
    pub counts_toward_daily_hours: bool,
    /// Dates on which a recurring occurrence is suppressed.
    pub deleted_occurrences: BTreeSet<NaiveDate>,
    /// Dates on which a single occurrence differs from the template.
    pub modified_occurrences: BTreeMap<NaiveDate, OccurrenceOverride>,
}

impl FixedCommitment {
    pub fn weekly(
        title: impl Into<String>,
        days: Vec<Weekday>,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            recurrence: Recurrence::Weekly {
                days,
                date_range: None,
            },
            start_time,
            end_time,
            is_all_day: false,
            counts_toward_daily_hours: true,
            deleted_occurrences: BTreeSet::new(),
            modified_occurrences: BTreeMap::new(),
        }
    }

    pub fn one_time(
        title: impl Into<String>,
        dates: Vec<NaiveDate>,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            recurrence: Recurrence::Dates(dates),
            start_time,
            end_time,
            is_all_day: false,
            counts_toward_daily_hours: true,
            deleted_occurrences: BTreeSet::new(),
            modified_occurrences: BTreeMap::new(),
        }
    }

    /// Suppress the occurrence on `date` only. Used to let a one-time
    /// event override a recurring slot without touching the template.
    pub fn delete_occurrence(&mut self, date: NaiveDate) {
        self.deleted_occurrences.insert(date);
    }

    pub fn modify_occurrence(&mut self, date: NaiveDate, change: OccurrenceOverride) {
        self.modified_occurrences.insert(date, change);
    }
}

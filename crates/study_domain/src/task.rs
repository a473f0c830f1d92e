use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::settings::UserSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PreferredTimeOfDay {
    Morning,
    Afternoon,
    Evening,
}

/// A deadline-bound unit of work the generator splits into sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub deadline: NaiveDate,
    /// Binary priority, not a scale.
    pub importance: bool,
    /// Current total estimate; remaining work is this minus credited
    /// done/skipped hours, never negative.
    pub estimated_hours: f64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Earliest date sessions may be placed on, when later than today.
    pub start_date: Option<NaiveDate>,
    pub min_session_minutes: Option<i64>,
    pub max_session_hours: Option<f64>,
    /// All remaining hours go into a single session.
    pub one_sitting: bool,
    pub preferred_time_of_day: Option<PreferredTimeOfDay>,
}

impl Task {
    pub fn new(title: impl Into<String>, deadline: NaiveDate, estimated_hours: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            deadline,
            importance: false,
            estimated_hours,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            start_date: None,
            min_session_minutes: None,
            max_session_hours: None,
            one_sitting: false,
            preferred_time_of_day: None,
        }
    }

    /// Deadline pulled in by the configured buffer days.
    pub fn effective_deadline(&self, settings: &UserSettings) -> NaiveDate {
        self.deadline - Duration::days(settings.buffer_days.max(0))
    }

    pub fn is_pending(&self) -> bool {
        self.status != TaskStatus::Completed && self.estimated_hours > 0.0
    }

    /// Session length floor, task preference over the global setting.
    pub fn min_session_minutes(&self, settings: &UserSettings) -> i64 {
        self.min_session_minutes
            .unwrap_or(settings.min_session_minutes)
            .max(1)
    }

    /// Session length ceiling in minutes: the tighter of the task's own
    /// cap and `max_consecutive_hours`.
    pub fn max_session_minutes(&self, settings: &UserSettings) -> i64 {
        let global = (settings.max_consecutive_hours * 60.0).round() as i64;
        match self.max_session_hours {
            Some(hours) => ((hours * 60.0).round() as i64).min(global).max(1),
            None => global.max(1),
        }
    }
}

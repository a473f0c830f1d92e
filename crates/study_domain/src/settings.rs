use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// How allocated hours are biased across a task's date window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StudyPlanMode {
    /// Spread remaining hours evenly over every eligible day.
    #[default]
    Even,
    /// Push larger allocations toward the earliest eligible days.
    FrontLoaded,
    /// Even for ordinary tasks, front-loaded for important ones.
    Balanced,
}

/// A clock range the generator should schedule around (lunch, commute, ...).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start < self.end && self.start < end
    }
}

/// Date-specific replacement for the default study window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowOverride {
    pub date: NaiveDate,
    pub start_hour: u32,
    pub end_hour: u32,
    /// Inactive overrides are kept around (the user may toggle them)
    /// but do not affect resolution.
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSettings {
    pub daily_available_hours: f64,
    /// Weekdays eligible for study sessions.
    pub work_days: Vec<Weekday>,
    /// Days subtracted from every deadline to form the effective deadline.
    pub buffer_days: i64,
    pub min_session_minutes: i64,
    pub buffer_minutes_between_sessions: i64,
    pub study_window_start_hour: u32,
    pub study_window_end_hour: u32,
    pub window_overrides: Vec<WindowOverride>,
    /// Hard cap on any single session's length.
    pub max_consecutive_hours: f64,
    pub avoid_time_ranges: Vec<TimeRange>,
    pub study_plan_mode: StudyPlanMode,
    /// When true, `SkipMetadata::partial_hours` counts toward a task's
    /// credited total; when false a skipped session credits its full
    /// allocation but logs zero worked hours.
    pub credit_partial_skip_hours: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            daily_available_hours: 4.0,
            work_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
            buffer_days: 0,
            min_session_minutes: 30,
            buffer_minutes_between_sessions: 0,
            study_window_start_hour: 8,
            study_window_end_hour: 22,
            window_overrides: Vec::new(),
            max_consecutive_hours: 4.0,
            avoid_time_ranges: Vec::new(),
            study_plan_mode: StudyPlanMode::Even,
            credit_partial_skip_hours: false,
        }
    }
}

impl UserSettings {
    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        self.work_days.contains(&date.weekday())
    }
}

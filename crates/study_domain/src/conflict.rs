//! Conflict-prevention engine: pure validation of proposed or existing
//! placements. Nothing here mutates plans except the explicit rollback
//! helper; every check runs and every triggered violation is returned
//! together so callers can present all reasons at once.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar;
use crate::commitment::FixedCommitment;
use crate::plan::{plan_for_date, StudyPlan};
use crate::settings::UserSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    SessionOverlap,
    CommitmentConflict,
    DailyLimitExceeded,
    InvalidTimeSlot,
    AllDayConflict,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub severity: Severity,
    pub message: String,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictValidationResult {
    pub is_valid: bool,
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<Conflict>,
    pub suggestions: Vec<String>,
    pub can_proceed: bool,
}

impl ConflictValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            conflicts: Vec::new(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            can_proceed: true,
        }
    }

    fn push_conflict(&mut self, kind: ConflictKind, severity: Severity, message: String, date: Option<NaiveDate>) {
        self.conflicts.push(Conflict {
            kind,
            severity,
            message,
            date,
        });
    }

    fn push_warning(&mut self, kind: ConflictKind, severity: Severity, message: String, date: Option<NaiveDate>) {
        self.warnings.push(Conflict {
            kind,
            severity,
            message,
            date,
        });
    }

    /// Recompute the verdict flags from the collected conflicts.
    /// Critical conflicts block outright; anything else is the
    /// caller's call.
    fn finish(mut self) -> Self {
        self.is_valid = self.conflicts.is_empty();
        self.can_proceed = !self
            .conflicts
            .iter()
            .any(|c| c.severity == Severity::Critical);
        self.conflicts.sort_by(|a, b| b.severity.cmp(&a.severity));
        self
    }

    pub fn has_kind(&self, kind: ConflictKind) -> bool {
        self.conflicts.iter().any(|c| c.kind == kind)
    }
}

fn window_bounds(settings: &UserSettings, date: NaiveDate) -> (NaiveTime, NaiveTime) {
    let (start_hour, end_hour) = calendar::effective_window(settings, date);
    let start = NaiveTime::from_hms_opt(start_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let end = if end_hour >= 24 {
        NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
    } else {
        NaiveTime::from_hms_opt(end_hour, 0, 0).unwrap_or(NaiveTime::MIN)
    };
    (start, end)
}

fn slot_hours(start: NaiveTime, end: NaiveTime) -> f64 {
    (end - start).num_minutes().max(0) as f64 / 60.0
}

/// Validate one proposed slot against the study window, work days,
/// other sessions, commitments, and the daily capacity limit.
///
/// `exclude` names a (task_id, session_number) pair to ignore in the
/// overlap check, so an existing session can be re-validated in place.
pub fn check_slot(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    plans: &[StudyPlan],
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    exclude: Option<(Uuid, u32)>,
) -> ConflictValidationResult {
    let mut result = ConflictValidationResult::ok();

    if start >= end {
        result.push_conflict(
            ConflictKind::InvalidTimeSlot,
            Severity::High,
            format!("slot ends at or before it starts ({start}..{end})"),
            Some(date),
        );
    }

    let (window_start, window_end) = window_bounds(settings, date);
    if start < window_start || end > window_end {
        result.push_conflict(
            ConflictKind::InvalidTimeSlot,
            Severity::Medium,
            format!("slot {start}..{end} is outside the study window {window_start}..{window_end}"),
            Some(date),
        );
    }

    if !settings.is_work_day(date) {
        result.push_conflict(
            ConflictKind::InvalidTimeSlot,
            Severity::Medium,
            format!("{date} is not a configured work day"),
            Some(date),
        );
    }

    let day_plan = plan_for_date(plans, date);
    if let Some(plan) = day_plan {
        for session in &plan.sessions {
            if Some((session.task_id, session.session_number)) == exclude {
                continue;
            }
            if !session.counts_against_capacity() {
                continue;
            }
            if session.overlaps(start, end) {
                result.push_conflict(
                    ConflictKind::SessionOverlap,
                    Severity::High,
                    format!(
                        "slot {start}..{end} overlaps session #{} ({}..{})",
                        session.session_number, session.start_time, session.end_time
                    ),
                    Some(date),
                );
            }
        }
    }

    for commitment in commitments {
        if !calendar::applies_on(commitment, date) {
            continue;
        }
        match calendar::occurrence_window(commitment, date) {
            None => {
                result.push_conflict(
                    ConflictKind::AllDayConflict,
                    Severity::Critical,
                    format!("'{}' blocks the whole day", commitment.title),
                    Some(date),
                );
            }
            Some((c_start, c_end)) => {
                if start < c_end && c_start < end {
                    result.push_conflict(
                        ConflictKind::CommitmentConflict,
                        Severity::High,
                        format!(
                            "slot {start}..{end} collides with '{}' ({c_start}..{c_end})",
                            commitment.title
                        ),
                        Some(date),
                    );
                }
            }
        }
    }

    let mut already_allocated = day_plan.map(|p| p.allocated_hours()).unwrap_or(0.0);
    if let (Some(plan), Some((task_id, number))) = (day_plan, exclude) {
        // A session being re-validated in place must not count its own
        // hours against the day twice.
        if let Some(session) = plan.find_session(task_id, number) {
            if session.counts_against_capacity() {
                already_allocated -= session.allocated_hours;
            }
        }
    }
    let proposed = slot_hours(start, end);
    if already_allocated + proposed > settings.daily_available_hours + f64::EPSILON {
        result.push_conflict(
            ConflictKind::DailyLimitExceeded,
            Severity::Medium,
            format!(
                "adding {proposed:.2}h to {already_allocated:.2}h exceeds the {:.2}h daily limit",
                settings.daily_available_hours
            ),
            Some(date),
        );
    }

    result.finish()
}

/// Pre-flight check for moving missed hours onto future days: there
/// must be somewhere to put them, and the hours must fit into the
/// remaining future capacity.
pub fn validate_before_redistribution(
    plans: &[StudyPlan],
    hours_to_move: f64,
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    today: NaiveDate,
    horizon_end: NaiveDate,
) -> ConflictValidationResult {
    let mut result = ConflictValidationResult::ok();

    let mut future_capacity = 0.0;
    let mut future_days = 0u32;
    let mut date = today;
    while date <= horizon_end {
        if settings.is_work_day(date) {
            let capacity = calendar::available_hours(settings, commitments, date);
            let allocated = plan_for_date(plans, date)
                .map(|p| p.allocated_hours())
                .unwrap_or(0.0);
            future_capacity += (capacity - allocated).max(0.0);
            future_days += 1;
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }

    if future_days == 0 {
        result.push_conflict(
            ConflictKind::InvalidTimeSlot,
            Severity::Critical,
            "no future plan dates are available for redistribution".to_string(),
            None,
        );
    } else if hours_to_move > future_capacity + f64::EPSILON {
        result.push_conflict(
            ConflictKind::DailyLimitExceeded,
            Severity::Critical,
            format!(
                "{hours_to_move:.2}h to move exceeds {future_capacity:.2}h of remaining future capacity"
            ),
            None,
        );
        result
            .suggestions
            .push("extend the deadline or raise daily available hours".to_string());
    } else if future_capacity > 0.0 && hours_to_move / future_capacity > 0.8 {
        result.push_warning(
            ConflictKind::DailyLimitExceeded,
            Severity::Medium,
            format!(
                "redistribution would push future utilization above 80% ({hours_to_move:.2}h of {future_capacity:.2}h)"
            ),
            None,
        );
    }

    result.finish()
}

/// Re-run the per-plan invariants across a whole plan set after any
/// redistribution or regeneration.
pub fn validate_after_redistribution(
    plans: &[StudyPlan],
    settings: &UserSettings,
    commitments: &[FixedCommitment],
) -> ConflictValidationResult {
    let mut result = ConflictValidationResult::ok();

    for plan in plans {
        let active: Vec<_> = plan
            .sessions
            .iter()
            .filter(|s| s.counts_against_capacity())
            .collect();

        for (i, a) in active.iter().enumerate() {
            for b in active.iter().skip(i + 1) {
                if a.overlaps(b.start_time, b.end_time) {
                    result.push_conflict(
                        ConflictKind::SessionOverlap,
                        Severity::High,
                        format!(
                            "{}: sessions #{} and #{} overlap",
                            plan.date, a.session_number, b.session_number
                        ),
                        Some(plan.date),
                    );
                }
            }
        }

        // Completed and skipped sessions are immutable history; a
        // commitment added after the fact must not invalidate them.
        for commitment in commitments {
            if !calendar::applies_on(commitment, plan.date) {
                continue;
            }
            match calendar::occurrence_window(commitment, plan.date) {
                None => {
                    if active.iter().any(|s| !s.status.is_terminal()) {
                        result.push_conflict(
                            ConflictKind::AllDayConflict,
                            Severity::Critical,
                            format!("{}: '{}' blocks the whole day", plan.date, commitment.title),
                            Some(plan.date),
                        );
                    }
                }
                Some((c_start, c_end)) => {
                    for session in active.iter().filter(|s| !s.status.is_terminal()) {
                        if session.overlaps(c_start, c_end) {
                            result.push_conflict(
                                ConflictKind::CommitmentConflict,
                                Severity::High,
                                format!(
                                    "{}: session #{} collides with '{}'",
                                    plan.date, session.session_number, commitment.title
                                ),
                                Some(plan.date),
                            );
                        }
                    }
                }
            }
        }

        let capacity = plan.available_hours;
        if capacity > 0.0 {
            let utilization = plan.allocated_hours() / capacity;
            if utilization > 0.9 {
                result.push_warning(
                    ConflictKind::DailyLimitExceeded,
                    Severity::Low,
                    format!("{}: day is {:.0}% full", plan.date, utilization * 100.0),
                    Some(plan.date),
                );
            }
        }
    }

    result.finish()
}

/// All-or-nothing guard: when the post-check reports an invalid plan
/// set, the working copy is discarded in favour of the original.
pub fn rollback_on_conflict(
    original: &[StudyPlan],
    working: Vec<StudyPlan>,
    report: &ConflictValidationResult,
) -> Vec<StudyPlan> {
    if report.is_valid {
        working
    } else {
        tracing::warn!(
            conflicts = report.conflicts.len(),
            "post-validation failed, rolling back plan set"
        );
        original.to_vec()
    }
}

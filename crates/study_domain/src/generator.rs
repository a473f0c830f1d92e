//! Plan generator: distributes each pending task's remaining hours
//! over its eligible date window, one valid slot at a time. Output is
//! always best-effort; hours that cannot be placed are reported per
//! task, never raised as an error.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;
use uuid::Uuid;

use crate::calendar;
use crate::commitment::FixedCommitment;
use crate::conflict;
use crate::plan::{prune_empty_plans, StudyPlan};
use crate::session::{SessionStatus, StudySession};
use crate::settings::{StudyPlanMode, UserSettings};
use crate::task::{PreferredTimeOfDay, Task};

/// Slot scan granularity.
const STEP_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPlans {
    pub plans: Vec<StudyPlan>,
    /// Hours per task that could not be placed before the effective
    /// deadline. Feasibility decisions belong to the caller.
    pub unscheduled_hours: BTreeMap<Uuid, f64>,
}

impl GeneratedPlans {
    pub fn unscheduled_for(&self, task_id: Uuid) -> f64 {
        self.unscheduled_hours.get(&task_id).copied().unwrap_or(0.0)
    }
}

/// Sessions from the previous plan set that the generator must leave
/// alone and schedule around.
fn is_pinned(session: &StudySession, date: NaiveDate, today: NaiveDate) -> bool {
    if date < today {
        return false;
    }
    session.is_manual_override || session.status.is_terminal()
}

struct Placement<'a> {
    settings: &'a UserSettings,
    commitments: &'a [FixedCommitment],
    days: BTreeMap<NaiveDate, StudyPlan>,
    now: NaiveDateTime,
}

impl<'a> Placement<'a> {
    fn ensure_day(&mut self, date: NaiveDate) -> &mut StudyPlan {
        let settings = self.settings;
        let commitments = self.commitments;
        self.days.entry(date).or_insert_with(|| {
            StudyPlan::new(date, calendar::available_hours(settings, commitments, date))
        })
    }

    fn remaining_capacity_minutes(&self, date: NaiveDate) -> i64 {
        match self.days.get(&date) {
            Some(plan) => {
                let left = plan.available_hours - plan.allocated_hours();
                (left * 60.0).round() as i64
            }
            None => {
                (calendar::available_hours(self.settings, self.commitments, date) * 60.0).round()
                    as i64
            }
        }
    }

    /// Scan the study window for a legal slot of `duration` minutes.
    /// The scan starts at the task's preferred time of day and wraps
    /// around to the rest of the window before giving up.
    fn find_slot(
        &self,
        date: NaiveDate,
        duration: i64,
        preferred: Option<PreferredTimeOfDay>,
    ) -> Option<(NaiveTime, NaiveTime)> {
        let (start_hour, end_hour) = calendar::effective_window(self.settings, date);
        let window_start = NaiveTime::from_hms_opt(start_hour.min(23), 0, 0)?;
        let window_end = if end_hour >= 24 {
            NaiveTime::from_hms_opt(23, 59, 59)?
        } else {
            NaiveTime::from_hms_opt(end_hour, 0, 0)?
        };

        let mut scan_from = match preferred {
            Some(PreferredTimeOfDay::Afternoon) => {
                window_start.max(NaiveTime::from_hms_opt(12, 0, 0)?)
            }
            Some(PreferredTimeOfDay::Evening) => {
                window_start.max(NaiveTime::from_hms_opt(17, 0, 0)?)
            }
            _ => window_start,
        };

        // Never schedule into the past on the current date.
        if date == self.now.date() {
            let rounded = round_up_to_step(self.now.time());
            scan_from = scan_from.max(rounded);
        }

        self.scan_range(date, scan_from, window_end, duration)
            .or_else(|| {
                if scan_from > window_start {
                    self.scan_range(date, window_start, scan_from, duration)
                } else {
                    None
                }
            })
    }

    fn scan_range(
        &self,
        date: NaiveDate,
        from: NaiveTime,
        until: NaiveTime,
        duration: i64,
    ) -> Option<(NaiveTime, NaiveTime)> {
        let plans: Vec<StudyPlan> = self.days.values().cloned().collect();
        let buffer = self.settings.buffer_minutes_between_sessions.max(0);
        let mut cursor = from;
        loop {
            let end = cursor + Duration::minutes(duration);
            if end > until || end < cursor {
                return None;
            }
            if self.candidate_is_free(date, cursor, end, &plans, buffer) {
                return Some((cursor, end));
            }
            let next = cursor + Duration::minutes(STEP_MINUTES);
            if next <= cursor {
                return None;
            }
            cursor = next;
        }
    }

    fn candidate_is_free(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        plans: &[StudyPlan],
        buffer: i64,
    ) -> bool {
        if self
            .settings
            .avoid_time_ranges
            .iter()
            .any(|range| range.overlaps(start, end))
        {
            return false;
        }

        if buffer > 0 {
            if let Some(plan) = self.days.get(&date) {
                for session in &plan.sessions {
                    if !session.counts_against_capacity() {
                        continue;
                    }
                    let gap_after = session.end_time + Duration::minutes(buffer);
                    let gap_before = session.start_time - Duration::minutes(buffer);
                    if start < gap_after && gap_before < end {
                        return false;
                    }
                }
            }
        }

        let report = conflict::check_slot(
            date,
            start,
            end,
            plans,
            self.settings,
            self.commitments,
            None,
        );
        report.is_valid
    }

    fn place(&mut self, date: NaiveDate, session: StudySession) {
        let plan = self.ensure_day(date);
        plan.sessions.push(session);
        plan.sort_sessions();
    }
}

fn round_up_to_step(time: NaiveTime) -> NaiveTime {
    use chrono::Timelike;
    let total = time.hour() as i64 * 60 + time.minute() as i64;
    let rounded = (total + STEP_MINUTES - 1) / STEP_MINUTES * STEP_MINUTES;
    let rounded = rounded.min(23 * 60 + 59);
    NaiveTime::from_hms_opt((rounded / 60) as u32, (rounded % 60) as u32, 0)
        .unwrap_or(NaiveTime::MIN)
}

/// Hours a task has already banked in a plan set (completed and
/// skipped sessions, per the skip-credit policy).
pub fn credited_hours(task_id: Uuid, plans: &[StudyPlan], credit_partial_skip: bool) -> f64 {
    plans
        .iter()
        .flat_map(|p| p.sessions.iter())
        .filter(|s| s.task_id == task_id)
        .map(|s| s.credited_hours(credit_partial_skip))
        .sum()
}

fn pinned_scheduled_hours(task_id: Uuid, plans: &[StudyPlan], today: NaiveDate) -> f64 {
    plans
        .iter()
        .filter(|p| p.date >= today)
        .flat_map(|p| p.sessions.iter().map(move |s| (p.date, s)))
        .filter(|(date, s)| {
            s.task_id == task_id && is_pinned(s, *date, today) && !s.status.is_terminal()
        })
        .map(|(_, s)| s.allocated_hours)
        .sum()
}

fn next_session_number(task_id: Uuid, previous: &[StudyPlan], today: NaiveDate) -> u32 {
    previous
        .iter()
        .flat_map(|p| p.sessions.iter().map(move |s| (p.date, s)))
        .filter(|(date, s)| {
            s.task_id == task_id && (s.status.is_terminal() || is_pinned(s, *date, today))
        })
        .map(|(_, s)| s.session_number)
        .max()
        .map(|n| n + 1)
        .unwrap_or(1)
}

/// Order of allocation: important tasks first, then nearest effective
/// deadline, then creation order.
fn priority_order(tasks: &mut Vec<&Task>, settings: &UserSettings) {
    tasks.sort_by(|a, b| {
        b.importance
            .cmp(&a.importance)
            .then_with(|| {
                a.effective_deadline(settings)
                    .cmp(&b.effective_deadline(settings))
            })
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

/// Generate a fresh plan set from today forward to the latest
/// effective deadline among pending tasks. `previous` contributes
/// credited hours and pinned sessions; it is otherwise untouched
/// (merging is a separate step).
pub fn generate_plans(
    tasks: &[Task],
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    previous: Option<&[StudyPlan]>,
    now: NaiveDateTime,
) -> GeneratedPlans {
    let today = now.date();
    let previous = previous.unwrap_or(&[]);
    let mut pending: Vec<&Task> = tasks.iter().filter(|t| t.is_pending()).collect();
    priority_order(&mut pending, settings);

    let mut placement = Placement {
        settings,
        commitments,
        days: BTreeMap::new(),
        now,
    };

    // Seed pinned sessions so new placements schedule around them.
    for plan in previous.iter().filter(|p| p.date >= today) {
        for session in &plan.sessions {
            if is_pinned(session, plan.date, today) {
                placement.place(plan.date, session.clone());
            }
        }
    }

    let mut unscheduled = BTreeMap::new();

    for task in &pending {
        let credit = credited_hours(task.id, previous, settings.credit_partial_skip_hours);
        let pinned = pinned_scheduled_hours(task.id, previous, today);
        let remaining_hours = (task.estimated_hours - credit - pinned).max(0.0);
        let mut remaining = (remaining_hours * 60.0).round() as i64;
        if remaining <= 0 {
            continue;
        }

        let window_start = task.start_date.map_or(today, |d| d.max(today));
        let deadline = task.effective_deadline(settings);
        let eligible: Vec<NaiveDate> = date_range(window_start, deadline)
            .into_iter()
            .filter(|d| settings.is_work_day(*d))
            .collect();

        if eligible.is_empty() {
            unscheduled.insert(task.id, remaining as f64 / 60.0);
            continue;
        }

        let mut number = next_session_number(task.id, previous, today);
        let min_session = task.min_session_minutes(settings);
        let max_session = task.max_session_minutes(settings);

        let placed = if task.one_sitting {
            place_one_sitting(&mut placement, task, &eligible, remaining, &mut number)
        } else {
            distribute(
                &mut placement,
                task,
                &eligible,
                remaining,
                min_session,
                max_session,
                &mut number,
            )
        };
        remaining -= placed;

        // Top-up pass: pour any leftover into days that still have room.
        if remaining > 0 && !task.one_sitting {
            remaining = top_up(
                &mut placement,
                task,
                &eligible,
                remaining,
                min_session,
                max_session,
                &mut number,
            );
        }

        // A sub-minimum sliver is merged into an existing session of
        // the same task rather than scheduled on its own.
        if remaining > 0 && remaining < min_session {
            remaining = absorb_sliver(&mut placement, task.id, remaining, max_session);
        }

        if remaining > 0 {
            debug!(task = %task.title, minutes = remaining, "hours left unscheduled");
            unscheduled.insert(task.id, remaining as f64 / 60.0);
        }
    }

    let mut plans: Vec<StudyPlan> = placement.days.into_values().collect();
    for plan in &mut plans {
        plan.refresh_overload();
    }
    prune_empty_plans(&mut plans);

    GeneratedPlans {
        plans,
        unscheduled_hours: unscheduled,
    }
}

fn date_range(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut date = from;
    while date <= to {
        dates.push(date);
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    dates
}

/// Per-day target length for the task's distribution mode.
fn day_target(
    mode: StudyPlanMode,
    important: bool,
    remaining: i64,
    days_left: usize,
    max_session: i64,
) -> i64 {
    let front_loaded = match mode {
        StudyPlanMode::FrontLoaded => true,
        StudyPlanMode::Balanced => important,
        StudyPlanMode::Even => false,
    };
    if front_loaded {
        remaining.min(max_session)
    } else {
        let days = days_left.max(1) as i64;
        let share = (remaining + days - 1) / days;
        let share = (share + STEP_MINUTES - 1) / STEP_MINUTES * STEP_MINUTES;
        share.min(remaining).min(max_session)
    }
}

fn distribute(
    placement: &mut Placement<'_>,
    task: &Task,
    eligible: &[NaiveDate],
    mut remaining: i64,
    min_session: i64,
    max_session: i64,
    number: &mut u32,
) -> i64 {
    let start = remaining;
    for (idx, date) in eligible.iter().enumerate() {
        if remaining <= 0 {
            break;
        }
        let target = day_target(
            placement.settings.study_plan_mode,
            task.importance,
            remaining,
            eligible.len() - idx,
            max_session,
        );
        let capacity = placement.remaining_capacity_minutes(*date);
        let mut desired = target.min(capacity).min(remaining);
        if desired < min_session {
            // Short tails are absorbed into an adjacent session later;
            // a day never carries a sub-minimum sliver of its own.
            continue;
        }
        desired = (desired / STEP_MINUTES).max(1) * STEP_MINUTES;

        let mut length = desired;
        while length >= min_session {
            if let Some((s, e)) = placement.find_slot(*date, length, task.preferred_time_of_day) {
                let session =
                    StudySession::new(task.id, *number, s, e, length as f64 / 60.0);
                *number += 1;
                placement.place(*date, session);
                remaining -= length;
                break;
            }
            length -= STEP_MINUTES;
        }
    }
    start - remaining
}

fn top_up(
    placement: &mut Placement<'_>,
    task: &Task,
    eligible: &[NaiveDate],
    mut remaining: i64,
    min_session: i64,
    max_session: i64,
    number: &mut u32,
) -> i64 {
    for date in eligible {
        if remaining < min_session {
            break;
        }
        loop {
            let capacity = placement.remaining_capacity_minutes(*date);
            let length = remaining.min(capacity).min(max_session) / STEP_MINUTES * STEP_MINUTES;
            if length < min_session {
                break;
            }
            match placement.find_slot(*date, length, task.preferred_time_of_day) {
                Some((s, e)) => {
                    let session =
                        StudySession::new(task.id, *number, s, e, length as f64 / 60.0);
                    *number += 1;
                    placement.place(*date, session);
                    remaining -= length;
                }
                None => break,
            }
            if remaining < min_session {
                break;
            }
        }
    }
    remaining
}

/// One-sitting tasks take all remaining hours in a single block; the
/// task preference overrides the consecutive-hours cap.
fn place_one_sitting(
    placement: &mut Placement<'_>,
    task: &Task,
    eligible: &[NaiveDate],
    remaining: i64,
    number: &mut u32,
) -> i64 {
    let length = (remaining + STEP_MINUTES - 1) / STEP_MINUTES * STEP_MINUTES;
    for date in eligible {
        if placement.remaining_capacity_minutes(*date) < length {
            continue;
        }
        if let Some((s, e)) = placement.find_slot(*date, length, task.preferred_time_of_day) {
            let session = StudySession::new(task.id, *number, s, e, remaining as f64 / 60.0);
            *number += 1;
            placement.place(*date, session);
            return remaining;
        }
    }
    0
}

/// Extend an existing session of the task by the sliver when the time
/// directly after it is free. Returns the minutes still unplaced.
fn absorb_sliver(
    placement: &mut Placement<'_>,
    task_id: Uuid,
    sliver: i64,
    max_session: i64,
) -> i64 {
    let candidates: Vec<(NaiveDate, u32, NaiveTime, NaiveTime, i64)> = placement
        .days
        .values()
        .flat_map(|plan| {
            plan.sessions.iter().filter_map(move |s| {
                if s.task_id == task_id && s.status == SessionStatus::Scheduled && !s.is_manual_override {
                    let length = (s.end_time - s.start_time).num_minutes();
                    Some((plan.date, s.session_number, s.start_time, s.end_time, length))
                } else {
                    None
                }
            })
        })
        .collect();

    for (date, session_number, _start, end, length) in candidates {
        if length + sliver > max_session {
            continue;
        }
        let new_end = end + Duration::minutes(sliver);
        if new_end < end {
            continue;
        }
        let plans: Vec<StudyPlan> = placement.days.values().cloned().collect();
        let report = conflict::check_slot(
            date,
            end,
            new_end,
            &plans,
            placement.settings,
            placement.commitments,
            Some((task_id, session_number)),
        );
        if !report.is_valid {
            continue;
        }
        if let Some(plan) = placement.days.get_mut(&date) {
            if let Some(session) = plan.find_session_mut(task_id, session_number) {
                session.end_time = new_end;
                session.allocated_hours += sliver as f64 / 60.0;
                return 0;
            }
        }
    }
    sliver
}

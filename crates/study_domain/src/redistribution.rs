//! Moving missed sessions' hours onto valid future slots, guarded by
//! the conflict engine on both sides of the mutation.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;
use uuid::Uuid;

use crate::calendar;
use crate::commitment::FixedCommitment;
use crate::conflict::{self, ConflictValidationResult};
use crate::plan::{plan_for_date_mut, prune_empty_plans, StudyPlan};
use crate::session::{derive_runtime_status, SessionStatus};
use crate::settings::UserSettings;
use crate::task::Task;

const STEP_MINUTES: i64 = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct RedistributionOutcome {
    pub plans: Vec<StudyPlan>,
    pub moved: usize,
    pub failed: usize,
    pub report: ConflictValidationResult,
}

/// Relocate every missed session's hours into the future, marking the
/// sessions `Redistributed` (or `FailedRedistribution` when no legal
/// slot exists before the owning task's effective deadline). The whole
/// operation is all-or-nothing: an invalid post-check rolls the plan
/// set back untouched.
pub fn redistribute_missed(
    plans: &[StudyPlan],
    tasks: &[Task],
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    now: NaiveDateTime,
) -> RedistributionOutcome {
    let today = now.date();
    let mut missed: Vec<(NaiveDate, Uuid, u32, f64)> = Vec::new();
    for plan in plans {
        for session in &plan.sessions {
            if derive_runtime_status(session, plan.date, now) == SessionStatus::Missed {
                missed.push((
                    plan.date,
                    session.task_id,
                    session.session_number,
                    session.allocated_hours,
                ));
            }
        }
    }

    if missed.is_empty() {
        return RedistributionOutcome {
            plans: plans.to_vec(),
            moved: 0,
            failed: 0,
            report: ConflictValidationResult::ok(),
        };
    }

    // Missed sessions of soon-due tasks get first pick of the slots.
    missed.sort_by_key(|(_, task_id, number, _)| {
        let deadline = tasks
            .iter()
            .find(|t| t.id == *task_id)
            .map(|t| t.effective_deadline(settings))
            .unwrap_or(today);
        (deadline, *number)
    });

    let hours_to_move: f64 = missed.iter().map(|(_, _, _, h)| h).sum();
    let horizon_end = tasks
        .iter()
        .filter(|t| missed.iter().any(|(_, id, _, _)| *id == t.id))
        .map(|t| t.effective_deadline(settings))
        .max()
        .unwrap_or(today);

    let before = conflict::validate_before_redistribution(
        plans,
        hours_to_move,
        settings,
        commitments,
        today,
        horizon_end,
    );

    let mut working = plans.to_vec();
    if !before.can_proceed {
        let failed = missed.len();
        for (date, task_id, number, _) in &missed {
            if let Some(plan) = plan_for_date_mut(&mut working, *date) {
                if let Some(session) = plan.find_session_mut(*task_id, *number) {
                    session.status = SessionStatus::FailedRedistribution;
                }
            }
        }
        return RedistributionOutcome {
            plans: working,
            moved: 0,
            failed,
            report: before,
        };
    }

    let mut moved = 0;
    let mut failed = 0;
    for (date, task_id, number, hours) in &missed {
        let deadline = tasks
            .iter()
            .find(|t| t.id == *task_id)
            .map(|t| t.effective_deadline(settings))
            .unwrap_or(today);
        let duration = (*hours * 60.0).round() as i64;

        match find_future_slot(&working, settings, commitments, today, deadline, duration) {
            Some((target_date, start, end)) => {
                relocate(
                    &mut working,
                    *date,
                    target_date,
                    *task_id,
                    *number,
                    start,
                    end,
                    settings,
                    commitments,
                );
                moved += 1;
            }
            None => {
                debug!(%task_id, session = number, "no legal slot before the deadline");
                if let Some(plan) = plan_for_date_mut(&mut working, *date) {
                    if let Some(session) = plan.find_session_mut(*task_id, *number) {
                        session.status = SessionStatus::FailedRedistribution;
                    }
                }
                failed += 1;
            }
        }
    }

    for plan in &mut working {
        plan.refresh_overload();
    }
    prune_empty_plans(&mut working);

    let after = conflict::validate_after_redistribution(&working, settings, commitments);
    let plans = conflict::rollback_on_conflict(plans, working, &after);
    RedistributionOutcome {
        plans,
        moved,
        failed,
        report: after,
    }
}

fn find_future_slot(
    plans: &[StudyPlan],
    settings: &UserSettings,
    commitments: &[FixedCommitment],
    today: NaiveDate,
    deadline: NaiveDate,
    duration: i64,
) -> Option<(NaiveDate, NaiveTime, NaiveTime)> {
    let mut date = today;
    while date <= deadline {
        if settings.is_work_day(date) {
            let capacity = calendar::available_hours(settings, commitments, date);
            let allocated = plans
                .iter()
                .find(|p| p.date == date)
                .map(|p| p.allocated_hours())
                .unwrap_or(0.0);
            if (capacity - allocated) * 60.0 + 1e-6 >= duration as f64 {
                let (start_hour, end_hour) = calendar::effective_window(settings, date);
                let window_start = NaiveTime::from_hms_opt(start_hour.min(23), 0, 0)?;
                let window_end = NaiveTime::from_hms_opt(end_hour.min(23), 0, 0)?;
                let mut cursor = window_start;
                loop {
                    let end = cursor + Duration::minutes(duration);
                    if end > window_end || end < cursor {
                        break;
                    }
                    let blocked = settings
                        .avoid_time_ranges
                        .iter()
                        .any(|r| r.overlaps(cursor, end));
                    if !blocked
                        && conflict::check_slot(
                            date, cursor, end, plans, settings, commitments, None,
                        )
                        .is_valid
                    {
                        return Some((date, cursor, end));
                    }
                    cursor = cursor + Duration::minutes(STEP_MINUTES);
                }
            }
        }
        date = date.succ_opt()?;
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn relocate(
    working: &mut Vec<StudyPlan>,
    from_date: NaiveDate,
    to_date: NaiveDate,
    task_id: Uuid,
    number: u32,
    start: NaiveTime,
    end: NaiveTime,
    settings: &UserSettings,
    commitments: &[FixedCommitment],
) {
    let Some(source) = plan_for_date_mut(working, from_date) else {
        return;
    };
    let Some(idx) = source
        .sessions
        .iter()
        .position(|s| s.task_id == task_id && s.session_number == number)
    else {
        return;
    };
    let mut session = source.sessions.remove(idx);

    session.original_time = session.original_time.or(Some(session.start_time));
    session.original_date = session.original_date.or(Some(from_date));
    session.start_time = start;
    session.end_time = end;
    session.status = SessionStatus::Redistributed;

    match working.iter().position(|p| p.date == to_date) {
        Some(idx) => {
            let plan = &mut working[idx];
            plan.sessions.push(session);
            plan.sort_sessions();
        }
        None => {
            let mut plan = StudyPlan::new(
                to_date,
                calendar::available_hours(settings, commitments, to_date),
            );
            plan.sessions.push(session);
            working.push(plan);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StudySession;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, day).unwrap()
    }

    #[test]
    fn missed_session_moves_to_a_future_slot() {
        let settings = UserSettings::default();
        let mut task = Task::new("Essay", d(14), 2.0);
        task.estimated_hours = 2.0;

        let mut past = StudyPlan::new(d(10), 4.0);
        past.sessions
            .push(StudySession::new(task.id, 1, t(9, 0), t(11, 0), 2.0));
        let now = d(11).and_time(t(8, 0));

        let outcome = redistribute_missed(&[past], &[task.clone()], &settings, &[], now);
        assert_eq!(outcome.moved, 1);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.report.is_valid);

        let relocated = outcome
            .plans
            .iter()
            .find_map(|p| p.find_session(task.id, 1).map(|s| (p.date, s)))
            .unwrap();
        assert!(relocated.0 >= d(11));
        assert!(relocated.0 <= d(14));
        assert_eq!(relocated.1.status, SessionStatus::Redistributed);
        assert_eq!(relocated.1.original_date, Some(d(10)));
    }

    #[test]
    fn unplaceable_session_is_marked_failed() {
        let mut settings = UserSettings::default();
        settings.daily_available_hours = 1.0;
        // Deadline already passed: no eligible future date exists.
        let task = Task::new("Late", d(10), 2.0);

        let mut past = StudyPlan::new(d(10), 1.0);
        past.sessions
            .push(StudySession::new(task.id, 1, t(9, 0), t(11, 0), 2.0));
        let now = d(12).and_time(t(8, 0));

        let outcome = redistribute_missed(&[past], &[task.clone()], &settings, &[], now);
        assert_eq!(outcome.moved, 0);
        assert!(outcome.failed >= 1);
        let session = outcome
            .plans
            .iter()
            .find_map(|p| p.find_session(task.id, 1))
            .unwrap();
        assert_eq!(session.status, SessionStatus::FailedRedistribution);
    }

    #[test]
    fn nothing_to_do_returns_plans_unchanged() {
        let settings = UserSettings::default();
        let plans = vec![StudyPlan::new(d(20), 4.0)];
        let now = d(10).and_time(t(8, 0));
        let outcome = redistribute_missed(&plans, &[], &settings, &[], now);
        assert_eq!(outcome.moved, 0);
        assert_eq!(outcome.plans, plans);
    }
}

//! One immutable snapshot of everything the engine schedules from,
//! plus the command reducer every mutation funnels through. The
//! reducer is pure: it never touches the clock or the filesystem, and
//! a caller always gets back a complete next state together with the
//! validation report for the mutation.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::commitment::FixedCommitment;
use crate::conflict::{self, ConflictValidationResult};
use crate::generator;
use crate::merge;
use crate::plan::{plan_for_date_mut, prune_empty_plans, StudyPlan};
use crate::redistribution;
use crate::session::SkipOrigin;
use crate::settings::UserSettings;
use crate::task::{Task, TaskStatus};

/// Wall-clock pair handed to the reducer: the host-local time drives
/// scheduling decisions, the UTC instant stamps completion metadata.
#[derive(Debug, Clone, Copy)]
pub struct Now {
    pub local: NaiveDateTime,
    pub utc: DateTime<Utc>,
}

impl Now {
    pub fn from_system() -> Self {
        Self {
            local: chrono::Local::now().naive_local(),
            utc: Utc::now(),
        }
    }

    /// Deterministic clock for tests and replays: the UTC instant is
    /// derived from `local`, never from the system clock.
    pub fn fixed(local: NaiveDateTime) -> Self {
        use chrono::TimeZone;
        Self {
            local,
            utc: Utc.from_utc_datetime(&local),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ScheduleState {
    pub tasks: Vec<Task>,
    pub commitments: Vec<FixedCommitment>,
    pub settings: UserSettings,
    pub plans: Vec<StudyPlan>,
    /// Hours per task the last regeneration could not place.
    #[serde(default)]
    pub unscheduled_hours: BTreeMap<Uuid, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddTask(Task),
    UpdateTask(Task),
    DeleteTask(Uuid),
    AddCommitment(FixedCommitment),
    UpdateCommitment(FixedCommitment),
    DeleteCommitment(Uuid),
    DeleteCommitmentOccurrence { id: Uuid, date: NaiveDate },
    UpdateSettings(UserSettings),
    CompleteSession {
        date: NaiveDate,
        task_id: Uuid,
        session_number: u32,
        actual_hours: Option<f64>,
    },
    SkipSession {
        date: NaiveDate,
        task_id: Uuid,
        session_number: u32,
        partial_hours: Option<f64>,
    },
    UndoSession {
        date: NaiveDate,
        task_id: Uuid,
        session_number: u32,
    },
    MoveSession {
        from_date: NaiveDate,
        task_id: Uuid,
        session_number: u32,
        to_date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    },
    /// The countdown timer finished a work block; treated as an
    /// ordinary completion with the measured hours.
    TimerFinished {
        date: NaiveDate,
        task_id: Uuid,
        session_number: u32,
        elapsed_seconds: u64,
    },
    RedistributeMissed,
}

/// Apply one command to the snapshot. Task, commitment, and settings
/// edits trigger a full regeneration merged against the plans that
/// existed immediately before this call; session commands mutate in
/// place through the lifecycle state machine.
pub fn apply(
    state: &ScheduleState,
    command: Command,
    now: Now,
) -> (ScheduleState, ConflictValidationResult) {
    let mut next = state.clone();
    let report = match command {
        Command::AddTask(task) => {
            next.tasks.push(task);
            regenerate(&mut next, now)
        }
        Command::UpdateTask(task) => {
            if let Some(slot) = next.tasks.iter_mut().find(|t| t.id == task.id) {
                *slot = task;
            }
            regenerate(&mut next, now)
        }
        Command::DeleteTask(id) => {
            next.tasks.retain(|t| t.id != id);
            // Sessions are deleted only when their owning task is.
            for plan in &mut next.plans {
                plan.sessions.retain(|s| s.task_id != id);
            }
            prune_empty_plans(&mut next.plans);
            next.unscheduled_hours.remove(&id);
            regenerate(&mut next, now)
        }
        Command::AddCommitment(commitment) => {
            next.commitments.push(commitment);
            regenerate(&mut next, now)
        }
        Command::UpdateCommitment(commitment) => {
            if let Some(slot) = next.commitments.iter_mut().find(|c| c.id == commitment.id) {
                *slot = commitment;
            }
            regenerate(&mut next, now)
        }
        Command::DeleteCommitment(id) => {
            next.commitments.retain(|c| c.id != id);
            regenerate(&mut next, now)
        }
        Command::DeleteCommitmentOccurrence { id, date } => {
            if let Some(commitment) = next.commitments.iter_mut().find(|c| c.id == id) {
                commitment.delete_occurrence(date);
            }
            regenerate(&mut next, now)
        }
        Command::UpdateSettings(settings) => {
            next.settings = settings;
            regenerate(&mut next, now)
        }
        Command::CompleteSession {
            date,
            task_id,
            session_number,
            actual_hours,
        } => {
            if let Some(plan) = plan_for_date_mut(&mut next.plans, date) {
                if let Some(session) = plan.find_session_mut(task_id, session_number) {
                    let hours = actual_hours.unwrap_or(session.allocated_hours);
                    session.mark_done(hours, now.utc);
                }
            }
            settle_task(&mut next, task_id);
            ConflictValidationResult::ok()
        }
        Command::SkipSession {
            date,
            task_id,
            session_number,
            partial_hours,
        } => {
            if let Some(plan) = plan_for_date_mut(&mut next.plans, date) {
                if let Some(session) = plan.find_session_mut(task_id, session_number) {
                    session.skip(SkipOrigin::User, partial_hours);
                }
            }
            settle_task(&mut next, task_id);
            ConflictValidationResult::ok()
        }
        Command::UndoSession {
            date,
            task_id,
            session_number,
        } => {
            let mut undone_hours = None;
            if let Some(plan) = plan_for_date_mut(&mut next.plans, date) {
                if let Some(session) = plan.find_session_mut(task_id, session_number) {
                    if session.status.is_terminal() {
                        undone_hours = Some(session.allocated_hours);
                        session.undo_finish();
                    }
                }
            }
            if let Some(hours) = undone_hours {
                if let Some(task) = next.tasks.iter_mut().find(|t| t.id == task_id) {
                    if task.status == TaskStatus::Completed {
                        // Reopen: the un-done block becomes work again.
                        task.status = TaskStatus::InProgress;
                        task.estimated_hours += hours;
                    }
                }
            }
            regenerate(&mut next, now)
        }
        Command::MoveSession {
            from_date,
            task_id,
            session_number,
            to_date,
            start,
            end,
        } => {
            let report = conflict::check_slot(
                to_date,
                start,
                end,
                &next.plans,
                &next.settings,
                &next.commitments,
                Some((task_id, session_number)),
            );
            // A manual move may not introduce any conflict; unlike
            // generation there is no later repair pass to lean on.
            if report.is_valid {
                move_session(&mut next, from_date, task_id, session_number, to_date, start, end, now);
            } else {
                debug!(%task_id, session = session_number, "manual move blocked");
            }
            report
        }
        Command::TimerFinished {
            date,
            task_id,
            session_number,
            elapsed_seconds,
        } => {
            let hours = elapsed_seconds as f64 / 3600.0;
            return apply(
                state,
                Command::CompleteSession {
                    date,
                    task_id,
                    session_number,
                    actual_hours: Some(hours),
                },
                now,
            );
        }
        Command::RedistributeMissed => {
            let outcome = redistribution::redistribute_missed(
                &next.plans,
                &next.tasks,
                &next.settings,
                &next.commitments,
                now.local,
            );
            next.plans = outcome.plans;
            outcome.report
        }
    };
    (next, report)
}

/// Regenerate from scratch, merge against the immediately preceding
/// plan set, and roll back if the merged result breaks an invariant.
fn regenerate(next: &mut ScheduleState, now: Now) -> ConflictValidationResult {
    let previous = next.plans.clone();
    let generated = generator::generate_plans(
        &next.tasks,
        &next.settings,
        &next.commitments,
        Some(&previous),
        now.local,
    );
    let today = now.local.date();
    let merged = merge::merge_plans(&previous, generated.plans, today);
    // Past plans are immutable history; only the part of the merge the
    // generator could actually influence is allowed to veto it.
    let current: Vec<StudyPlan> = merged
        .iter()
        .filter(|p| p.date >= today)
        .cloned()
        .collect();
    let report =
        conflict::validate_after_redistribution(&current, &next.settings, &next.commitments);
    next.plans = conflict::rollback_on_conflict(&previous, merged, &report);
    next.unscheduled_hours = generated.unscheduled_hours;
    report
}

/// Task-completion side effect: the task finishes when its remaining
/// hours hit zero or every one of its sessions is done/skipped. The
/// final estimate records the hours actually worked (skip credit per
/// the configured policy).
fn settle_task(next: &mut ScheduleState, task_id: Uuid) {
    let policy = next.settings.credit_partial_skip_hours;
    let sessions: Vec<_> = next
        .plans
        .iter()
        .flat_map(|p| p.sessions.iter())
        .filter(|s| s.task_id == task_id)
        .collect();
    if sessions.is_empty() {
        return;
    }
    let all_settled = sessions.iter().all(|s| s.status.is_terminal());
    let any_settled = sessions.iter().any(|s| s.status.is_terminal());
    let credited: f64 = sessions.iter().map(|s| s.credited_hours(policy)).sum();
    let worked: f64 = sessions.iter().map(|s| s.worked_hours(policy)).sum();

    if let Some(task) = next.tasks.iter_mut().find(|t| t.id == task_id) {
        let remaining = (task.estimated_hours - credited).max(0.0);
        if all_settled || remaining < 1e-9 {
            task.status = TaskStatus::Completed;
            task.estimated_hours = worked;
        } else if any_settled && task.status == TaskStatus::Pending {
            task.status = TaskStatus::InProgress;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn move_session(
    next: &mut ScheduleState,
    from_date: NaiveDate,
    task_id: Uuid,
    session_number: u32,
    to_date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    now: Now,
) {
    let Some(source) = plan_for_date_mut(&mut next.plans, from_date) else {
        return;
    };
    let Some(idx) = source
        .sessions
        .iter()
        .position(|s| s.task_id == task_id && s.session_number == session_number)
    else {
        return;
    };
    let mut session = source.sessions.remove(idx);
    session.apply_manual_move(from_date, start, end, now.utc);

    match next.plans.iter().position(|p| p.date == to_date) {
        Some(idx) => {
            let plan = &mut next.plans[idx];
            plan.sessions.push(session);
            plan.sort_sessions();
            plan.refresh_overload();
        }
        None => {
            let available = crate::calendar::available_hours(
                &next.settings,
                &next.commitments,
                to_date,
            );
            let mut plan = StudyPlan::new(to_date, available);
            plan.sessions.push(session);
            next.plans.push(plan);
        }
    }
    prune_empty_plans(&mut next.plans);
}

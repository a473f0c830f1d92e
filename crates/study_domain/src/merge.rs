//! Preservation/merge protocol: reconcile a freshly generated plan set
//! against the previous one so recorded progress survives
//! regeneration. This is the central correctness property of the
//! engine: "regenerate everything" must never discard a completed,
//! skipped, or manually moved session.

use chrono::NaiveDate;

use crate::plan::{prune_empty_plans, StudyPlan};
use crate::session::StudySession;

fn is_preserved(session: &StudySession) -> bool {
    session.done || session.status.is_terminal() || session.is_manual_override
}

/// Merge `new` (generator output) with `previous` (the plan set that
/// existed immediately before this mutation).
///
/// Per (task_id, session_number) pair:
/// - completed sessions keep their status, hours, and timing verbatim;
/// - skipped sessions keep their status and duration;
/// - manually moved sessions keep their provenance and chosen
///   date/time, relocating if the regenerated copy landed elsewhere;
/// - anything else takes the newly computed placement.
///
/// Plans for dates before `today` are history and are carried over
/// from `previous` untouched. The merge is idempotent.
pub fn merge_plans(
    previous: &[StudyPlan],
    new: Vec<StudyPlan>,
    today: NaiveDate,
) -> Vec<StudyPlan> {
    let mut merged: Vec<StudyPlan> = previous
        .iter()
        .filter(|p| p.date < today)
        .cloned()
        .collect();
    let mut working: Vec<StudyPlan> = new.into_iter().filter(|p| p.date >= today).collect();

    for prev_plan in previous.iter().filter(|p| p.date >= today) {
        for prev in prev_plan.sessions.iter().filter(|s| is_preserved(s)) {
            // Where did the regenerated copy land, if anywhere?
            let landed = working.iter().position(|p| {
                p.find_session(prev.task_id, prev.session_number).is_some()
            });

            match landed {
                Some(idx) if working[idx].date == prev_plan.date => {
                    if let Some(session) =
                        working[idx].find_session_mut(prev.task_id, prev.session_number)
                    {
                        *session = prev.clone();
                    }
                }
                Some(idx) => {
                    // Regenerated elsewhere: the preserved date wins.
                    working[idx]
                        .sessions
                        .retain(|s| !(s.task_id == prev.task_id && s.session_number == prev.session_number));
                    insert_session(&mut working, prev_plan, prev.clone());
                }
                None => {
                    insert_session(&mut working, prev_plan, prev.clone());
                }
            }
        }
    }

    for plan in &mut working {
        plan.sort_sessions();
        plan.refresh_overload();
    }
    merged.append(&mut working);
    prune_empty_plans(&mut merged);
    merged
}

fn insert_session(working: &mut Vec<StudyPlan>, origin: &StudyPlan, session: StudySession) {
    match working.iter().position(|p| p.date == origin.date) {
        Some(idx) => {
            let plan = &mut working[idx];
            if plan
                .find_session(session.task_id, session.session_number)
                .is_none()
            {
                plan.sessions.push(session);
            }
        }
        None => {
            let mut plan = StudyPlan::new(origin.date, origin.available_hours);
            plan.sessions.push(session);
            working.push(plan);
        }
    }
}

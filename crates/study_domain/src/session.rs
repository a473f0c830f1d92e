use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Skipped,
    Missed,
    Rescheduled,
    Redistributed,
    FailedRedistribution,
}

impl SessionStatus {
    /// Legal transitions of the session lifecycle. `Completed` and
    /// `Skipped` are terminal.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match self {
            Scheduled => matches!(next, InProgress | Completed | Skipped | Missed),
            InProgress => matches!(next, Completed | Skipped | Missed),
            Missed => matches!(next, Rescheduled | Redistributed | Skipped | FailedRedistribution),
            // A moved session can itself later be missed again.
            Rescheduled | Redistributed => matches!(next, Completed | Skipped | Missed),
            FailedRedistribution => matches!(next, Completed | Skipped | Rescheduled),
            Completed | Skipped => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Skipped)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipOrigin {
    User,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkipMetadata {
    pub origin: SkipOrigin,
    /// Hours actually worked before the skip, if any were recorded.
    pub partial_hours: Option<f64>,
}

/// One scheduled block of work on one task, bounded to a single date.
/// Identity within a plan set is the pair (task_id, session_number).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudySession {
    pub task_id: Uuid,
    /// Stable ordinal within the task; survives regeneration.
    pub session_number: u32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub allocated_hours: f64,
    pub status: SessionStatus,
    pub done: bool,
    pub actual_hours: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub original_time: Option<NaiveTime>,
    pub original_date: Option<NaiveDate>,
    pub is_manual_override: bool,
    pub rescheduled_at: Option<DateTime<Utc>>,
    pub skip: Option<SkipMetadata>,
}

impl StudySession {
    pub fn new(
        task_id: Uuid,
        session_number: u32,
        start_time: NaiveTime,
        end_time: NaiveTime,
        allocated_hours: f64,
    ) -> Self {
        Self {
            task_id,
            session_number,
            start_time,
            end_time,
            allocated_hours,
            status: SessionStatus::Scheduled,
            done: false,
            actual_hours: None,
            completed_at: None,
            original_time: None,
            original_date: None,
            is_manual_override: false,
            rescheduled_at: None,
            skip: None,
        }
    }

    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start_time < end && start < self.end_time
    }

    /// Mark done. Ignored when the session already reached a terminal
    /// state.
    pub fn mark_done(&mut self, actual_hours: f64, now: DateTime<Utc>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = SessionStatus::Completed;
        self.done = true;
        self.actual_hours = Some(actual_hours);
        self.completed_at = Some(now);
    }

    /// Skip without recording worked hours (unless partial hours are
    /// supplied by the caller's skip metadata).
    pub fn skip(&mut self, origin: SkipOrigin, partial_hours: Option<f64>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = SessionStatus::Skipped;
        self.skip = Some(SkipMetadata {
            origin,
            partial_hours,
        });
    }

    /// Revert a completion or skip back to a plain scheduled session.
    pub fn undo_finish(&mut self) {
        self.status = SessionStatus::Scheduled;
        self.done = false;
        self.actual_hours = None;
        self.completed_at = None;
        self.skip = None;
    }

    /// Manual drag/move: records provenance once and pins the session
    /// against regeneration.
    pub fn apply_manual_move(
        &mut self,
        from_date: NaiveDate,
        new_start: NaiveTime,
        new_end: NaiveTime,
        now: DateTime<Utc>,
    ) {
        if !self.is_manual_override {
            self.original_time = Some(self.start_time);
            self.original_date = Some(from_date);
        }
        self.start_time = new_start;
        self.end_time = new_end;
        self.is_manual_override = true;
        self.rescheduled_at = Some(now);
        if self.status == SessionStatus::Missed {
            self.status = SessionStatus::Rescheduled;
        }
    }

    /// Hours this session credits toward its task's total once finished.
    pub fn credited_hours(&self, credit_partial_skip: bool) -> f64 {
        match self.status {
            SessionStatus::Completed => self.actual_hours.unwrap_or(self.allocated_hours),
            SessionStatus::Skipped => {
                if credit_partial_skip {
                    self.skip
                        .as_ref()
                        .and_then(|meta| meta.partial_hours)
                        .unwrap_or(self.allocated_hours)
                } else {
                    self.allocated_hours
                }
            }
            _ => 0.0,
        }
    }

    /// Hours actually worked, as shown in completion stats. A skipped
    /// session logs zero unless partial hours are recorded and the
    /// policy counts them.
    pub fn worked_hours(&self, credit_partial_skip: bool) -> f64 {
        match self.status {
            SessionStatus::Completed => self.actual_hours.unwrap_or(self.allocated_hours),
            SessionStatus::Skipped if credit_partial_skip => self
                .skip
                .as_ref()
                .and_then(|meta| meta.partial_hours)
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn counts_against_capacity(&self) -> bool {
        self.status != SessionStatus::Skipped
    }
}

/// What the session's status *is* right now, given the wall clock.
/// A scheduled session whose end time has passed is missed; this is
/// derived on demand and never persisted.
pub fn derive_runtime_status(
    session: &StudySession,
    plan_date: NaiveDate,
    now: NaiveDateTime,
) -> SessionStatus {
    if session.done || session.status.is_terminal() {
        return session.status;
    }
    let session_end = plan_date.and_time(session.end_time);
    if session_end < now {
        match session.status {
            SessionStatus::Scheduled
            | SessionStatus::InProgress
            | SessionStatus::Rescheduled
            | SessionStatus::Redistributed => SessionStatus::Missed,
            other => other,
        }
    } else {
        session.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn session() -> StudySession {
        StudySession::new(Uuid::new_v4(), 1, t(9, 0), t(10, 0), 1.0)
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        assert!(SessionStatus::Scheduled.can_transition_to(SessionStatus::Missed));
        assert!(SessionStatus::Missed.can_transition_to(SessionStatus::Redistributed));
        assert!(SessionStatus::Rescheduled.can_transition_to(SessionStatus::Missed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Scheduled));
        assert!(!SessionStatus::Skipped.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn mark_done_stamps_completion_metadata() {
        let mut s = session();
        let now = Utc::now();
        s.mark_done(0.75, now);
        assert!(s.done);
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(s.actual_hours, Some(0.75));
        assert_eq!(s.completed_at, Some(now));

        // Terminal: a later skip must not overwrite the completion.
        s.skip(SkipOrigin::User, None);
        assert_eq!(s.status, SessionStatus::Completed);
    }

    #[test]
    fn manual_move_records_provenance_once() {
        let mut s = session();
        let d1 = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let now = Utc::now();
        s.apply_manual_move(d1, t(14, 0), t(15, 0), now);
        assert!(s.is_manual_override);
        assert_eq!(s.original_time, Some(t(9, 0)));
        assert_eq!(s.original_date, Some(d1));

        let d2 = NaiveDate::from_ymd_opt(2025, 11, 4).unwrap();
        s.apply_manual_move(d2, t(16, 0), t(17, 0), now);
        // Provenance still points at the first move's origin.
        assert_eq!(s.original_time, Some(t(9, 0)));
        assert_eq!(s.original_date, Some(d1));
        assert_eq!(s.start_time, t(16, 0));
    }

    #[test]
    fn runtime_status_derives_missed_after_end_time() {
        let s = session();
        let date = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let before = date.and_time(t(9, 30));
        let after = date.and_time(t(10, 1));
        assert_eq!(derive_runtime_status(&s, date, before), SessionStatus::Scheduled);
        assert_eq!(derive_runtime_status(&s, date, after), SessionStatus::Missed);

        let mut done = session();
        done.mark_done(1.0, Utc::now());
        assert_eq!(derive_runtime_status(&done, date, after), SessionStatus::Completed);
    }

    #[test]
    fn status_serializes_snake_case() {
        // The on-disk plan format depends on these names.
        let json = serde_json::to_string(&SessionStatus::FailedRedistribution).unwrap();
        assert_eq!(json, "\"failed_redistribution\"");
        let back: SessionStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(back, SessionStatus::InProgress);
    }

    #[test]
    fn skip_credit_follows_the_partial_hours_policy() {
        let mut s = session();
        s.skip(SkipOrigin::User, Some(0.25));
        assert_eq!(s.credited_hours(false), 1.0);
        assert_eq!(s.credited_hours(true), 0.25);
    }
}

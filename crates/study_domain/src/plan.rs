use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::StudySession;

/// All sessions scheduled for one calendar date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyPlan {
    pub date: NaiveDate,
    pub sessions: Vec<StudySession>,
    /// Daily capacity after subtracting commitment time.
    pub available_hours: f64,
    /// Allocated hours reached or exceeded capacity. Overload is
    /// allowed only as a flagged condition, never silently.
    pub is_overloaded: bool,
}

impl StudyPlan {
    pub fn new(date: NaiveDate, available_hours: f64) -> Self {
        Self {
            date,
            sessions: Vec::new(),
            available_hours,
            is_overloaded: false,
        }
    }

    /// Total hours of sessions that still count against capacity.
    pub fn allocated_hours(&self) -> f64 {
        self.sessions
            .iter()
            .filter(|s| s.counts_against_capacity())
            .map(|s| s.allocated_hours)
            .sum()
    }

    pub fn find_session(&self, task_id: Uuid, session_number: u32) -> Option<&StudySession> {
        self.sessions
            .iter()
            .find(|s| s.task_id == task_id && s.session_number == session_number)
    }

    pub fn find_session_mut(
        &mut self,
        task_id: Uuid,
        session_number: u32,
    ) -> Option<&mut StudySession> {
        self.sessions
            .iter_mut()
            .find(|s| s.task_id == task_id && s.session_number == session_number)
    }

    pub fn refresh_overload(&mut self) {
        self.is_overloaded = self.allocated_hours() >= self.available_hours
            && !self.sessions.is_empty()
            && self.available_hours > 0.0
            || self.allocated_hours() > self.available_hours;
    }

    pub fn sort_sessions(&mut self) {
        self.sessions
            .sort_by(|a, b| a.start_time.cmp(&b.start_time));
    }
}

/// Find the plan for a date within a plan set.
pub fn plan_for_date(plans: &[StudyPlan], date: NaiveDate) -> Option<&StudyPlan> {
    plans.iter().find(|p| p.date == date)
}

pub fn plan_for_date_mut(plans: &mut [StudyPlan], date: NaiveDate) -> Option<&mut StudyPlan> {
    plans.iter_mut().find(|p| p.date == date)
}

/// Plans with no sessions left are dropped; the rest stay date-ordered.
pub fn prune_empty_plans(plans: &mut Vec<StudyPlan>) {
    plans.retain(|p| !p.sessions.is_empty());
    plans.sort_by_key(|p| p.date);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SkipOrigin, StudySession};
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn skipped_sessions_do_not_count_against_capacity() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let mut plan = StudyPlan::new(date, 4.0);
        let task = Uuid::new_v4();
        plan.sessions
            .push(StudySession::new(task, 1, t(9, 0), t(11, 0), 2.0));
        let mut skipped = StudySession::new(task, 2, t(12, 0), t(14, 0), 2.0);
        skipped.skip(SkipOrigin::User, None);
        plan.sessions.push(skipped);

        assert_eq!(plan.allocated_hours(), 2.0);
        plan.refresh_overload();
        assert!(!plan.is_overloaded);
    }

    #[test]
    fn overload_is_flagged_when_capacity_is_reached() {
        let date = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let mut plan = StudyPlan::new(date, 2.0);
        plan.sessions
            .push(StudySession::new(Uuid::new_v4(), 1, t(9, 0), t(11, 0), 2.0));
        plan.refresh_overload();
        assert!(plan.is_overloaded);
    }

    #[test]
    fn prune_drops_empty_plans_and_orders_by_date() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 11, day).unwrap();
        let mut plans = vec![StudyPlan::new(d(5), 4.0), StudyPlan::new(d(3), 4.0)];
        plans[1]
            .sessions
            .push(StudySession::new(Uuid::new_v4(), 1, t(9, 0), t(10, 0), 1.0));
        prune_empty_plans(&mut plans);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].date, d(3));
    }
}

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// Failures a command can name before the reducer runs. Placement
/// problems are not errors; those surface through the conflict report.
#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("no task with id {0}")]
    UnknownTask(Uuid),
    #[error("no commitment with id {0}")]
    UnknownCommitment(Uuid),
    #[error("no session {session_number} of task {task_id} on {date}")]
    UnknownSession {
        date: NaiveDate,
        task_id: Uuid,
        session_number: u32,
    },
    #[error("hours must be positive, got {0}")]
    InvalidHours(f64),
}

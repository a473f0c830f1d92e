use std::path::{Path, PathBuf};

use anyhow::Result;
use parking_lot::RwLock;
use tracing::info;

use study_domain::commitment::FixedCommitment;
use study_domain::conflict::ConflictValidationResult;
use study_domain::plan::StudyPlan;
use study_domain::settings::UserSettings;
use study_domain::task::Task;
use study_domain::{apply, Command, Now, ScheduleError, ScheduleState};

use crate::storage::Storage;

/// Thread-safe facade over the schedule engine. Every mutation goes
/// through [`ScheduleService::dispatch`], which reduces the command,
/// persists the next state, and only then swaps it in.
pub struct ScheduleService {
    storage: Storage,
    state: RwLock<ScheduleState>,
}

pub struct ScheduleServiceBuilder {
    data_dir: Option<PathBuf>,
}

impl ScheduleServiceBuilder {
    pub fn new() -> Self {
        Self { data_dir: None }
    }

    pub fn data_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.data_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> Result<ScheduleService> {
        let dir = self
            .data_dir
            .ok_or_else(|| anyhow::anyhow!("data directory not set"))?;
        let storage = Storage::new(dir)?;
        let state = storage.load_state();
        info!(
            tasks = state.tasks.len(),
            plans = state.plans.len(),
            dir = %storage.dir().display(),
            "schedule service loaded"
        );
        Ok(ScheduleService {
            storage,
            state: RwLock::new(state),
        })
    }
}

impl Default for ScheduleServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleService {
    pub fn builder() -> ScheduleServiceBuilder {
        ScheduleServiceBuilder::new()
    }

    /// Apply one command at the system clock.
    pub fn dispatch(&self, command: Command) -> Result<ConflictValidationResult> {
        self.dispatch_at(command, Now::from_system())
    }

    /// Apply one command at an explicit instant. The persisted state
    /// only changes when both validation and the write succeed.
    #[tracing::instrument(skip(self, command, now))]
    pub fn dispatch_at(&self, command: Command, now: Now) -> Result<ConflictValidationResult> {
        self.check_targets(&command)?;
        let mut guard = self.state.write();
        let (next, report) = apply(&guard, command, now);
        self.storage.save_state(&next)?;
        *guard = next;
        Ok(report)
    }

    pub fn state(&self) -> ScheduleState {
        self.state.read().clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.read().tasks.clone()
    }

    pub fn commitments(&self) -> Vec<FixedCommitment> {
        self.state.read().commitments.clone()
    }

    pub fn settings(&self) -> UserSettings {
        self.state.read().settings.clone()
    }

    pub fn plans(&self) -> Vec<StudyPlan> {
        self.state.read().plans.clone()
    }

    /// Hours per task the last regeneration could not place.
    pub fn unscheduled_report(&self) -> std::collections::BTreeMap<uuid::Uuid, f64> {
        self.state.read().unscheduled_hours.clone()
    }

    pub fn plan_for(&self, date: chrono::NaiveDate) -> Option<StudyPlan> {
        self.state
            .read()
            .plans
            .iter()
            .find(|p| p.date == date)
            .cloned()
    }

    /// Command targets must exist before the reducer runs, so callers
    /// get a named error instead of a silent no-op.
    fn check_targets(&self, command: &Command) -> Result<()> {
        let state = self.state.read();
        match command {
            Command::UpdateTask(task) => {
                if !state.tasks.iter().any(|t| t.id == task.id) {
                    return Err(ScheduleError::UnknownTask(task.id).into());
                }
            }
            Command::DeleteTask(id) => {
                if !state.tasks.iter().any(|t| t.id == *id) {
                    return Err(ScheduleError::UnknownTask(*id).into());
                }
            }
            Command::UpdateCommitment(commitment) => {
                if !state.commitments.iter().any(|c| c.id == commitment.id) {
                    return Err(ScheduleError::UnknownCommitment(commitment.id).into());
                }
            }
            Command::DeleteCommitment(id) | Command::DeleteCommitmentOccurrence { id, .. } => {
                if !state.commitments.iter().any(|c| c.id == *id) {
                    return Err(ScheduleError::UnknownCommitment(*id).into());
                }
            }
            Command::CompleteSession {
                date,
                task_id,
                session_number,
                actual_hours,
            } => {
                if let Some(hours) = actual_hours {
                    if *hours <= 0.0 {
                        return Err(ScheduleError::InvalidHours(*hours).into());
                    }
                }
                Self::require_session(&state, *date, *task_id, *session_number)?;
            }
            Command::SkipSession {
                date,
                task_id,
                session_number,
                partial_hours,
            } => {
                if let Some(hours) = partial_hours {
                    if *hours <= 0.0 {
                        return Err(ScheduleError::InvalidHours(*hours).into());
                    }
                }
                Self::require_session(&state, *date, *task_id, *session_number)?;
            }
            Command::UndoSession {
                date,
                task_id,
                session_number,
            }
            | Command::TimerFinished {
                date,
                task_id,
                session_number,
                ..
            } => {
                Self::require_session(&state, *date, *task_id, *session_number)?;
            }
            Command::MoveSession {
                from_date,
                task_id,
                session_number,
                ..
            } => {
                Self::require_session(&state, *from_date, *task_id, *session_number)?;
            }
            Command::AddTask(_)
            | Command::AddCommitment(_)
            | Command::UpdateSettings(_)
            | Command::RedistributeMissed => {}
        }
        Ok(())
    }

    fn require_session(
        state: &ScheduleState,
        date: chrono::NaiveDate,
        task_id: uuid::Uuid,
        session_number: u32,
    ) -> Result<()> {
        let found = state
            .plans
            .iter()
            .find(|p| p.date == date)
            .and_then(|p| p.find_session(task_id, session_number))
            .is_some();
        if found {
            Ok(())
        } else {
            Err(ScheduleError::UnknownSession {
                date,
                task_id,
                session_number,
            }
            .into())
        }
    }
}

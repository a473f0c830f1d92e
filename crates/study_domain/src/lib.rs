pub mod calendar;
pub mod commitment;
pub mod conflict;
pub mod error;
pub mod generator;
pub mod merge;
pub mod plan;
pub mod redistribution;
pub mod session;
pub mod settings;
pub mod state;
pub mod task;

pub use crate::error::ScheduleError;
pub use crate::state::{apply, Command, Now, ScheduleState};

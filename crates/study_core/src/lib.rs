pub mod service;
pub mod storage;

pub use crate::service::{ScheduleService, ScheduleServiceBuilder};
pub use study_domain::{Command, Now, ScheduleState};

/// Install the default log subscriber. Call once from the embedding
/// application's entry point.
pub fn init_logging() {
    tracing_subscriber::fmt::init();
}

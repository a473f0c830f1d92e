//! Flat-file persistence: one JSON document per logical key inside a
//! data directory. Writes go through a temp file and an atomic rename
//! so a crash mid-write never leaves a half-written document behind.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use study_domain::commitment::FixedCommitment;
use study_domain::plan::StudyPlan;
use study_domain::settings::UserSettings;
use study_domain::task::Task;
use study_domain::ScheduleState;

pub const TASKS_KEY: &str = "tasks";
pub const PLANS_KEY: &str = "plans";
pub const COMMITMENTS_KEY: &str = "fixed_commitments";
pub const SETTINGS_KEY: &str = "settings";

pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create data directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Read one document. A missing or unreadable file yields the
    /// default; user data should never brick the app on startup.
    pub fn load<T>(&self, key: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return T::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, %err, "malformed document, falling back to defaults");
                T::default()
            }
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        let raw = serde_json::to_string_pretty(value).context("serialize document")?;
        fs::write(&tmp, raw).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }

    pub fn load_state(&self) -> ScheduleState {
        ScheduleState {
            tasks: self.load::<Vec<Task>>(TASKS_KEY),
            commitments: self.load::<Vec<FixedCommitment>>(COMMITMENTS_KEY),
            settings: self.load::<UserSettings>(SETTINGS_KEY),
            plans: self.load::<Vec<StudyPlan>>(PLANS_KEY),
            unscheduled_hours: Default::default(),
        }
    }

    pub fn save_state(&self, state: &ScheduleState) -> Result<()> {
        self.save(TASKS_KEY, &state.tasks)?;
        self.save(COMMITMENTS_KEY, &state.commitments)?;
        self.save(SETTINGS_KEY, &state.settings)?;
        self.save(PLANS_KEY, &state.plans)?;
        Ok(())
    }
}

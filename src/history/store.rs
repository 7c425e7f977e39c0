use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value;

use crate::error::{PipewatchError, Result};

use super::model::{HistoryStore, JobHistory};

/// Where job histories live between pipeline runs.
pub trait HistoryRepository {
    /// Loads the stored history, or an empty one when nothing was saved yet.
    fn retrieve(&self) -> Result<HistoryStore>;

    /// Replaces the stored history.
    fn save(&self, store: &HistoryStore) -> Result<()>;
}

/// History persisted as a single JSON document on disk.
///
/// Per-project files default to the platform cache directory:
/// - Linux: `~/.cache/pipewatch/{project-slug}.json`
/// - macOS: `~/Library/Caches/pipewatch/{project-slug}.json`
pub struct JsonFileStore {
    path: PathBuf,
    window_size: usize,
}

impl JsonFileStore {
    /// Creates a store backed by `path`; loaded windows are trimmed to
    /// `window_size` slots.
    pub fn new(path: impl Into<PathBuf>, window_size: usize) -> Self {
        Self {
            path: path.into(),
            window_size,
        }
    }

    /// Creates a store in the default per-project location.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no cache directory.
    pub fn for_project(project_path: &str, window_size: usize) -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| PipewatchError::Config("No cache directory found".into()))?
            .join("pipewatch");

        let filename = project_path.replace('/', "-") + ".json";

        Ok(Self::new(cache_dir.join(filename), window_size))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryRepository for JsonFileStore {
    fn retrieve(&self) -> Result<HistoryStore> {
        if !self.path.exists() {
            info!(
                "No job history at {}, starting from scratch",
                self.path.display()
            );
            return Ok(HistoryStore::default());
        }

        let content = fs::read_to_string(&self.path)?;
        let value: Value = serde_json::from_str(&content)?;
        let store = parse_store(value, self.window_size)?;

        debug!(
            "Loaded history for {} jobs from: {}",
            store.jobs.len(),
            self.path.display()
        );

        Ok(store)
    }

    fn save(&self, store: &HistoryStore) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(store)?;

        // Write next to the target then rename, so readers never see a partial document
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        debug!(
            "Saved history for {} jobs to: {}",
            store.jobs.len(),
            self.path.display()
        );

        Ok(())
    }
}

/// Builds a store from a raw JSON document, skipping job entries that cannot
/// be read instead of rejecting the whole document.
fn parse_store(value: Value, window_size: usize) -> Result<HistoryStore> {
    let Value::Object(mut document) = value else {
        return Err(PipewatchError::History(
            "expected a JSON object at the top level".to_string(),
        ));
    };

    let pipeline_id = match document.remove("pipeline_id") {
        None | Some(Value::Null) => 0,
        Some(value) => value.as_u64().ok_or_else(|| {
            PipewatchError::History(format!("invalid pipeline_id: {value}"))
        })?,
    };

    let updated_at = document
        .remove("updated_at")
        .and_then(|value| serde_json::from_value(value).ok());

    let mut store = HistoryStore {
        pipeline_id,
        updated_at,
        ..HistoryStore::default()
    };

    let jobs = match document.remove("jobs") {
        None | Some(Value::Null) => return Ok(store),
        Some(Value::Object(jobs)) => jobs,
        Some(other) => {
            return Err(PipewatchError::History(format!(
                "expected `jobs` to be an object, got {other}"
            )))
        }
    };

    for (name, entry) in jobs {
        match serde_json::from_value::<JobHistory>(entry) {
            Ok(mut history) => {
                history.truncate(window_size);
                store.jobs.insert(name, history);
            }
            Err(e) => warn!("Ignoring unreadable history for job {name}: {e}"),
        }
    }

    Ok(store)
}

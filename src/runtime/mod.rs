//! Durable run state store keyed by a caller-supplied storage path.
//!
//! [`Runtime`] persists [`ExecutionState`] across turns and process
//! restarts. Saves are atomic with respect to concurrent reads of the same
//! run id: state is written to a temporary file and renamed into place, so
//! a partial write is never observable and a failed save leaves the prior
//! durable state intact. Writes are serialized per run id; distinct run ids
//! proceed in parallel.
//!
//! The internal layout under the storage root is an implementation detail
//! and not guaranteed stable across versions.

pub mod persistence;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::instrument;

use crate::state::ExecutionState;
use persistence::PersistenceError;

pub use persistence::PersistedRun;

/// Infrastructure errors from the persistence layer.
///
/// Distinct from workflow errors: a runtime failure aborts the run without
/// touching previously durable state.
#[derive(Debug, Error, Diagnostic)]
pub enum RuntimeError {
    #[error("storage I/O failed at {path}: {source}")]
    #[diagnostic(
        code(hiveflow::runtime::io),
        help("Check that the storage root exists and is writable.")
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(hiveflow::runtime::persistence))]
    Persistence(#[from] PersistenceError),

    #[error("invalid run id: '{0}'")]
    #[diagnostic(
        code(hiveflow::runtime::invalid_run_id),
        help("Run ids may only contain alphanumerics, '-' and '_'.")
    )]
    InvalidRunId(String),
}

/// Durable, path-keyed store for run state.
pub struct Runtime {
    root: PathBuf,
    locks: Mutex<FxHashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Runtime {
    /// Creates a runtime rooted at the given directory.
    ///
    /// Nothing is created on disk until the first save; the directory
    /// structure is built lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    /// The storage root this runtime writes under.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads the persisted state for a run, or `None` if the run has never
    /// been saved.
    #[instrument(skip(self), err)]
    pub async fn load(&self, run_id: &str) -> Result<Option<ExecutionState>, RuntimeError> {
        let path = self.run_path(run_id)?;
        let lock = self.run_lock(run_id);
        let _guard = lock.lock().await;

        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(persistence::from_json(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RuntimeError::Io { path, source: e }),
        }
    }

    /// Durably saves a run's state, fully replacing any prior state.
    #[instrument(skip(self, state), err)]
    pub async fn save(&self, run_id: &str, state: &ExecutionState) -> Result<(), RuntimeError> {
        let path = self.run_path(run_id)?;
        let json = persistence::to_json(state)?;
        let lock = self.run_lock(run_id);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RuntimeError::Io {
                path: self.root.clone(),
                source: e,
            })?;

        // Write-then-rename keeps partial writes invisible to readers.
        let tmp = self
            .root
            .join(format!(".{run_id}.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .map_err(|e| RuntimeError::Io {
                path: tmp.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| RuntimeError::Io {
                path: path.clone(),
                source: e,
            })
    }

    /// Lists the run ids with durable state under this root.
    pub async fn list_runs(&self) -> Result<Vec<String>, RuntimeError> {
        let mut runs = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(runs),
            Err(e) => {
                return Err(RuntimeError::Io {
                    path: self.root.clone(),
                    source: e,
                })
            }
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| RuntimeError::Io {
            path: self.root.clone(),
            source: e,
        })? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(run_id) = name.strip_suffix(".json") {
                if !run_id.starts_with('.') {
                    runs.push(run_id.to_string());
                }
            }
        }
        runs.sort();
        Ok(runs)
    }

    fn run_path(&self, run_id: &str) -> Result<PathBuf, RuntimeError> {
        if run_id.is_empty()
            || !run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(RuntimeError::InvalidRunId(run_id.to_string()));
        }
        Ok(self.root.join(format!("{run_id}.json")))
    }

    fn run_lock(&self, run_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(run_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;
    use serde_json::json;

    fn sample_state(run_id: &str) -> ExecutionState {
        let mut input = FxHashMap::default();
        input.insert("business_category".to_string(), json!("law firms"));
        ExecutionState::new(run_id, "discovery", input)
    }

    #[tokio::test]
    /// A save followed by a load round-trips the state; unknown runs load
    /// as None.
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(dir.path());

        assert!(runtime.load("run-1").await.unwrap().is_none());

        let state = sample_state("run-1");
        runtime.save("run-1", &state).await.unwrap();
        let loaded = runtime.load("run-1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    /// A save fully replaces prior state.
    async fn test_save_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(dir.path());

        let mut state = sample_state("run-1");
        runtime.save("run-1", &state).await.unwrap();

        state.iterations = 7;
        state.context.insert("business_list".to_string(), json!([]));
        runtime.save("run-1", &state).await.unwrap();

        let loaded = runtime.load("run-1").await.unwrap().unwrap();
        assert_eq!(loaded.iterations, 7);
    }

    #[tokio::test]
    /// The storage root is created lazily on first save, and no temp files
    /// are left behind.
    async fn test_lazy_root_and_no_temp_litter() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deep").join("store");
        let runtime = Runtime::new(&nested);
        assert!(!nested.exists());

        runtime.save("run-1", &sample_state("run-1")).await.unwrap();
        assert!(nested.exists());

        let names: Vec<_> = std::fs::read_dir(&nested)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["run-1.json".to_string()]);
    }

    #[tokio::test]
    /// Run ids that could escape the storage root are rejected.
    async fn test_invalid_run_ids() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(dir.path());
        for bad in ["", "../evil", "a/b", "a\\b", "run 1"] {
            assert!(matches!(
                runtime.load(bad).await,
                Err(RuntimeError::InvalidRunId(_))
            ));
        }
    }

    #[tokio::test]
    /// list_runs reports every saved run and tolerates a missing root.
    async fn test_list_runs() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new(dir.path().join("missing"));
        assert!(runtime.list_runs().await.unwrap().is_empty());

        let runtime = Runtime::new(dir.path());
        runtime.save("run-b", &sample_state("run-b")).await.unwrap();
        runtime.save("run-a", &sample_state("run-a")).await.unwrap();
        assert_eq!(
            runtime.list_runs().await.unwrap(),
            vec!["run-a".to_string(), "run-b".to_string()]
        );
    }
}

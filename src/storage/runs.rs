//! Run record stores

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{RunStore, RunUpdate};
use crate::agent::TestRun;
use crate::core::{PilotError, Result};

/// One pretty-printed JSON file per run under a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    /// Load a stored run
    pub async fn load(&self, run_id: &str) -> Result<TestRun> {
        let path = self.path_for(run_id);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PilotError::storage(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Replace the record via temp file + rename so readers never see half a write
    async fn write(&self, run: &TestRun) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            PilotError::storage(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        let path = self.path_for(&run.id);
        let tmp = temp_sibling(&path);
        let content = serde_json::to_string_pretty(run)?;

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| PilotError::storage(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            PilotError::storage(format!("Failed to replace {}: {}", path.display(), e))
        })?;

        debug!(run_id = %run.id, path = %path.display(), "run record written");
        Ok(())
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl RunStore for JsonFileStore {
    async fn create(&self, run: &TestRun) -> Result<()> {
        self.write(run).await
    }

    async fn finalize(&self, run_id: &str, update: RunUpdate) -> Result<()> {
        let mut run = self.load(run_id).await?;
        update.apply_to(&mut run);
        self.write(&run).await?;
        debug!(run_id, status = %update.status(), "run finalized");
        Ok(())
    }
}

/// In-process store, also recording every terminal write it receives
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, TestRun>>,
    updates: Mutex<Vec<(String, RunUpdate)>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, run_id: &str) -> Option<TestRun> {
        self.runs.lock().await.get(run_id).cloned()
    }

    /// Terminal writes in arrival order
    pub async fn updates(&self) -> Vec<(String, RunUpdate)> {
        self.updates.lock().await.clone()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, run: &TestRun) -> Result<()> {
        self.runs.lock().await.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn finalize(&self, run_id: &str, update: RunUpdate) -> Result<()> {
        let mut runs = self.runs.lock().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| PilotError::storage(format!("Unknown run {}", run_id)))?;
        update.apply_to(run);
        self.updates
            .lock()
            .await
            .push((run_id.to_string(), update));
        Ok(())
    }
}

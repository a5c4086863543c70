//! Screenshot store on the local filesystem

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use url::Url;

use super::{ArtifactStore, ScreenshotRef};
use crate::core::{PilotError, Result};

/// Writes `<dir>/<run_id>.png` and hands out `file://` references
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    dir: PathBuf,
    ttl: Duration,
}

impl LocalArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(&self, run_id: &str, png: &[u8]) -> Result<ScreenshotRef> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            PilotError::storage(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        let path = self.dir.join(format!("{}.png", run_id));
        tokio::fs::write(&path, png)
            .await
            .map_err(|e| PilotError::storage(format!("Failed to write {}: {}", path.display(), e)))?;

        let absolute = tokio::fs::canonicalize(&path).await?;
        let uri = Url::from_file_path(&absolute)
            .map_err(|_| PilotError::storage(format!("Not an absolute path: {}", absolute.display())))?
            .to_string();

        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| PilotError::storage(format!("Invalid link ttl: {}", e)))?;

        debug!(run_id, bytes = png.len(), uri = %uri, "screenshot stored");
        Ok(ScreenshotRef {
            uri,
            expires_at: Utc::now() + ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_writes_file_and_returns_expiring_ref() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().join("shots"), Duration::from_secs(60));

        let shot = store.upload("run-42", b"\x89PNG fake").await.unwrap();

        assert!(shot.uri.starts_with("file://"));
        assert!(shot.uri.ends_with("run-42.png"));
        assert!(!shot.is_expired(Utc::now()));
        assert!(shot.is_expired(Utc::now() + chrono::Duration::seconds(61)));

        let written = std::fs::read(dir.path().join("shots").join("run-42.png")).unwrap();
        assert_eq!(written, b"\x89PNG fake");
    }
}

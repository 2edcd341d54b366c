//! External persistence for attempt histories

use crate::attempt::AttemptHistory;
use crate::error::SinkError;
use crate::request::is_safe_target;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Receives the full history once a run terminates
#[async_trait]
pub trait HistorySink: Send + Sync {
    /// Persist `history` for `target_id`
    ///
    /// # Errors
    /// `SinkError` on any persistence failure. The orchestrator logs it and
    /// returns the result unchanged.
    async fn persist(&self, target_id: &str, history: &AttemptHistory) -> Result<(), SinkError>;
}

/// Writes `<dir>/<target_id>/attempts.json`
#[derive(Debug, Clone)]
pub struct JsonHistorySink {
    dir: PathBuf,
}

impl JsonHistorySink {
    /// File name inside each target directory
    pub const FILE_NAME: &'static str = "attempts.json";

    /// Create sink rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the history for `target_id` is written
    #[must_use]
    pub fn path_for(&self, target_id: &str) -> PathBuf {
        self.dir.join(target_id).join(Self::FILE_NAME)
    }
}

#[async_trait]
impl HistorySink for JsonHistorySink {
    async fn persist(&self, target_id: &str, history: &AttemptHistory) -> Result<(), SinkError> {
        if !is_safe_target(target_id) {
            return Err(SinkError::UnsafeTarget(target_id.to_string()));
        }

        let target_dir = self.dir.join(target_id);
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| SinkError::io(&target_dir, e))?;

        let json = serde_json::to_vec_pretty(history)?;
        let path = self.path_for(target_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| SinkError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| SinkError::io(&path, e))?;

        tracing::debug!("history for {} written to {}", target_id, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attempt::AttemptRecord;
    use forge_artifact::{CandidateArtifact, Provenance};

    #[tokio::test]
    async fn writes_history_under_target_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonHistorySink::new(dir.path());

        let mut history = AttemptHistory::new(3);
        history
            .push(AttemptRecord::new(CandidateArtifact::new(
                "x = 1\n",
                1,
                Provenance::new("scripted", 1, "github"),
            )))
            .unwrap();

        sink.persist("github", &history).await.unwrap();

        let written = std::fs::read_to_string(sink.path_for("github")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["max_attempts"], 3);
        assert_eq!(value["entries"][0]["attempt_index"], 1);
        assert!(!dir.path().join("github").join("attempts.json.tmp").exists());
    }

    #[tokio::test]
    async fn refuses_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonHistorySink::new(dir.path());
        let err = sink
            .persist("../escape", &AttemptHistory::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::UnsafeTarget(_)));
    }
}

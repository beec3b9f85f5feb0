//! JSON-lines results store on the local filesystem.

use super::gate::{MeasurementRow, SessionRow, SessionStore};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Appends rows to `wheelie_results.jsonl` and `training_sessions.jsonl`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn measurements_path(&self) -> PathBuf {
        self.dir.join("wheelie_results.jsonl")
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.dir.join("training_sessions.jsonl")
    }

    /// All stored sessions; unreadable lines are skipped.
    pub fn read_sessions(&self) -> Result<Vec<SessionRow>, StoreError> {
        let path = self.sessions_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

fn append_lines<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
    }

    let mut buf = String::new();
    for row in rows {
        let line = serde_json::to_string(row).map_err(|e| StoreError::Serialization(e.to_string()))?;
        buf.push_str(&line);
        buf.push('\n');
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::Io(e.to_string()))?;
    file.write_all(buf.as_bytes())
        .map_err(|e| StoreError::Io(e.to_string()))
}

impl SessionStore for FileStore {
    fn insert_measurements(&self, rows: Vec<MeasurementRow>) -> BoxFuture<'_, Result<usize, StoreError>> {
        async move {
            append_lines(&self.measurements_path(), &rows)?;
            Ok(rows.len())
        }
        .boxed()
    }

    fn insert_session(&self, row: SessionRow) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { append_lines(&self.sessions_path(), std::slice::from_ref(&row)) }.boxed()
    }

    fn count_sessions_between<'a>(
        &'a self,
        user_id: &'a str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<u32, StoreError>> {
        async move {
            Ok(self
                .read_sessions()?
                .iter()
                .filter(|s| s.user_id == user_id && s.start_time >= from && s.start_time < until)
                .count() as u32)
        }
        .boxed()
    }
}

//! In-process results store.

use super::gate::{MeasurementRow, SessionRow, SessionStore};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    measurements: Vec<MeasurementRow>,
    sessions: Vec<SessionRow>,
    failure: Option<StoreError>,
}

/// Keeps rows in memory. Can be told to fail every request.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following request fail with `failure`, or succeed again
    /// with `None`.
    pub fn fail_with(&self, failure: Option<StoreError>) {
        self.lock().failure = failure;
    }

    pub fn measurements(&self) -> Vec<MeasurementRow> {
        self.lock().measurements.clone()
    }

    pub fn sessions(&self) -> Vec<SessionRow> {
        self.lock().sessions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemoryStore {
    fn insert_measurements(&self, rows: Vec<MeasurementRow>) -> BoxFuture<'_, Result<usize, StoreError>> {
        let mut inner = self.lock();
        let result = match inner.failure.clone() {
            Some(e) => Err(e),
            None => {
                let count = rows.len();
                inner.measurements.extend(rows);
                Ok(count)
            }
        };
        future::ready(result).boxed()
    }

    fn insert_session(&self, row: SessionRow) -> BoxFuture<'_, Result<(), StoreError>> {
        let mut inner = self.lock();
        let result = match inner.failure.clone() {
            Some(e) => Err(e),
            None => {
                inner.sessions.push(row);
                Ok(())
            }
        };
        future::ready(result).boxed()
    }

    fn count_sessions_between<'a>(
        &'a self,
        user_id: &'a str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<u32, StoreError>> {
        let inner = self.lock();
        let result = match inner.failure.clone() {
            Some(e) => Err(e),
            None => Ok(inner
                .sessions
                .iter()
                .filter(|s| s.user_id == user_id && s.start_time >= from && s.start_time < until)
                .count() as u32),
        };
        future::ready(result).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn session(user: &str, start: DateTime<Utc>) -> SessionRow {
        SessionRow {
            user_id: user.to_string(),
            session_id: Uuid::new_v4(),
            session_name: "s".to_string(),
            duration: 10,
            start_time: start,
            end_time: start + Duration::seconds(10),
            measurements_count: 0,
            max_angle: 0.0,
        }
    }

    #[tokio::test]
    async fn test_count_filters_user_and_range() {
        let store = MemoryStore::new();
        let day = Utc::now();
        store.insert_session(session("a", day)).await.unwrap();
        store.insert_session(session("a", day)).await.unwrap();
        store.insert_session(session("b", day)).await.unwrap();
        store
            .insert_session(session("a", day - Duration::days(2)))
            .await
            .unwrap();

        let from = day - Duration::hours(1);
        let until = day + Duration::hours(1);
        assert_eq!(store.count_sessions_between("a", from, until).await.unwrap(), 2);
        assert_eq!(store.count_sessions_between("b", from, until).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.fail_with(Some(StoreError::Io("disk".to_string())));
        assert!(store.insert_measurements(Vec::new()).await.is_err());
        store.fail_with(None);
        assert_eq!(store.insert_measurements(Vec::new()).await.unwrap(), 0);
    }
}

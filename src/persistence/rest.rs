//! Results store backed by a PostgREST-style HTTP API (e.g. Supabase).

use super::gate::{MeasurementRow, SessionRow, SessionStore};
use crate::config::StoreConfig;
use crate::error::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;

/// Talks to `{base_url}/rest/v1/{table}`.
pub struct RestStore {
    config: StoreConfig,
    client: reqwest::Client,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        if !config.is_remote_configured() {
            return Err(StoreError::Config(
                "store base_url and api_key must be set".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| StoreError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Endpoint URL for a table.
    pub fn table_url(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table
        )
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.table_url(table))
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
    }

    async fn insert<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<(), StoreError> {
        let response = self
            .request(reqwest::Method::POST, table)
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        check_status(response).await.map(|_| ())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(StoreError::Server {
        status: status.as_u16(),
        message,
    })
}

impl SessionStore for RestStore {
    fn insert_measurements(&self, rows: Vec<MeasurementRow>) -> BoxFuture<'_, Result<usize, StoreError>> {
        async move {
            self.insert(&self.config.measurements_table, &rows).await?;
            Ok(rows.len())
        }
        .boxed()
    }

    fn insert_session(&self, row: SessionRow) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            self.insert(&self.config.sessions_table, std::slice::from_ref(&row))
                .await
        }
        .boxed()
    }

    fn count_sessions_between<'a>(
        &'a self,
        user_id: &'a str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<u32, StoreError>> {
        async move {
            let query = [
                ("select", "session_id".to_string()),
                ("user_id", format!("eq.{user_id}")),
                (
                    "start_time",
                    format!("gte.{}", from.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ),
                (
                    "start_time",
                    format!("lt.{}", until.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ),
            ];
            let response = self
                .request(reqwest::Method::GET, &self.config.sessions_table)
                .query(&query)
                .send()
                .await
                .map_err(|e| StoreError::Network(e.to_string()))?;

            let rows: Vec<serde_json::Value> = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            Ok(rows.len() as u32)
        }
        .boxed()
    }
}

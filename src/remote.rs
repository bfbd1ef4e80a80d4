//! Client for the remote word table.
//!
//! The table speaks PostgREST: equality filters are `column=eq.value`,
//! ordering is `order=column.desc`, and inserts echo the created row when
//! `Prefer: return=representation` is set.
//!
//! Every public operation fails soft. Transport errors, non-2xx responses
//! and unparseable bodies are logged and turned into an empty/absent result
//! so the caller can fall back to the local cache.

use crate::config::RemoteSyncConfig;
use crate::model::{ContextExample, SavedWord, WordDetail, now_millis};
use chrono::DateTime;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info, warn};

const TABLE_PATH: &str = "/rest/v1/saved_words";
const USER_AGENT: &str = concat!("lexiai/", env!("CARGO_PKG_VERSION"));

/// The operations the reconciler needs from a remote word table.
pub trait WordStore: Send + Sync {
    fn config(&self) -> &RemoteSyncConfig;

    fn is_configured(&self) -> bool {
        self.config().is_configured()
    }

    /// Minimal read; true when the table answered with a success status.
    fn test_connection(&self) -> impl Future<Output = bool> + Send;

    /// All rows for `user_id`, newest first. Empty on any failure.
    fn fetch_all(&self, user_id: &str) -> impl Future<Output = Vec<SavedWord>> + Send;

    /// Insert-or-return-existing for `(user_id, word)`. `None` on failure.
    fn upsert(
        &self,
        word: &WordDetail,
        user_id: &str,
    ) -> impl Future<Output = Option<SavedWord>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = DeleteOutcome> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    NotConfigured,
    Deleted,
    Failed,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("insert returned no rows")]
    EmptyInsert,
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Parse(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }
}

/// REST client for the `saved_words` table.
#[derive(Clone)]
pub struct RemoteStore {
    http: reqwest::Client,
    config: RemoteSyncConfig,
}

impl RemoteStore {
    pub fn new(config: RemoteSyncConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn table_url(&self) -> String {
        format!("{}{}", self.config.endpoint_url, TABLE_PATH)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let key = &self.config.api_key;
        if let Ok(value) = HeaderValue::from_str(key) {
            headers.insert("apikey", value);
        }
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    async fn get_rows(&self, query: &[(&str, String)]) -> Result<Vec<WordRow>, RemoteError> {
        let response = self
            .http
            .get(self.table_url())
            .headers(self.headers())
            .query(query)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(response.json::<Vec<WordRow>>().await?)
    }

    async fn try_fetch_all(&self, user_id: &str) -> Result<Vec<SavedWord>, RemoteError> {
        let rows = self
            .get_rows(&[
                ("user_id", format!("eq.{user_id}")),
                ("order", "created_at.desc".to_string()),
            ])
            .await?;
        Ok(rows.into_iter().map(WordRow::into_saved).collect())
    }

    async fn try_upsert(
        &self,
        word: &WordDetail,
        user_id: &str,
    ) -> Result<(SavedWord, bool), RemoteError> {
        let existing = self
            .get_rows(&[
                ("user_id", format!("eq.{user_id}")),
                ("word", format!("eq.{}", word.word)),
            ])
            .await?;
        if let Some(row) = existing.into_iter().next() {
            return Ok((row.with_detail(word.clone()), false));
        }

        let payload = InsertRow {
            word: &word.word,
            nuance: &word.nuance,
            examples: &word.examples,
            user_id,
        };
        let response = self
            .http
            .post(self.table_url())
            .headers(self.headers())
            .json(&payload)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let created = response.json::<Vec<WordRow>>().await?;
        let row = created.into_iter().next().ok_or(RemoteError::EmptyInsert)?;
        Ok((row.with_detail(word.clone()), true))
    }

    async fn try_delete(&self, id: &str) -> Result<(), RemoteError> {
        let response = self
            .http
            .delete(self.table_url())
            .headers(self.headers())
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

impl WordStore for RemoteStore {
    fn config(&self) -> &RemoteSyncConfig {
        &self.config
    }

    async fn test_connection(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        let result = self
            .http
            .get(self.table_url())
            .headers(self.headers())
            .query(&[("limit", "1")])
            .send()
            .await;
        match result {
            Ok(response) => {
                let status = response.status();
                debug!(%status, "remote connection check");
                status.is_success()
            }
            Err(err) => {
                warn!(error = %err, "remote connection check failed");
                false
            }
        }
    }

    async fn fetch_all(&self, user_id: &str) -> Vec<SavedWord> {
        if !self.is_configured() {
            return Vec::new();
        }
        match self.try_fetch_all(user_id).await {
            Ok(words) => {
                debug!(user_id, count = words.len(), "fetched remote words");
                words
            }
            Err(err) => {
                warn!(user_id, error = %err, "remote fetch failed");
                Vec::new()
            }
        }
    }

    async fn upsert(&self, word: &WordDetail, user_id: &str) -> Option<SavedWord> {
        if !self.is_configured() {
            return None;
        }
        match self.try_upsert(word, user_id).await {
            Ok((saved, inserted)) => {
                info!(word = %saved.word(), id = %saved.id, inserted, "remote upsert");
                Some(saved)
            }
            Err(err) => {
                warn!(word = %word.word, error = %err, "remote upsert failed");
                None
            }
        }
    }

    async fn delete(&self, id: &str) -> DeleteOutcome {
        if !self.is_configured() {
            return DeleteOutcome::NotConfigured;
        }
        match self.try_delete(id).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(err) => {
                warn!(id, error = %err, "remote delete failed");
                DeleteOutcome::Failed
            }
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Http {
        status: status.as_u16(),
        body,
    })
}

#[derive(Serialize)]
struct InsertRow<'a> {
    word: &'a str,
    nuance: &'a str,
    examples: &'a [ContextExample],
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct WordRow {
    id: Value,
    word: String,
    #[serde(default)]
    nuance: Option<String>,
    #[serde(default)]
    examples: Option<Vec<ContextExample>>,
    #[serde(default)]
    created_at: Option<String>,
}

impl WordRow {
    fn id_string(&self) -> String {
        match &self.id {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        }
    }

    fn saved_at(&self) -> i64 {
        self.created_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.timestamp_millis())
            .unwrap_or_else(now_millis)
    }

    fn into_saved(self) -> SavedWord {
        let id = self.id_string();
        let saved_at = self.saved_at();
        let detail = WordDetail {
            word: self.word,
            nuance: self.nuance.unwrap_or_default(),
            examples: self.examples.unwrap_or_default(),
        };
        SavedWord::from_remote(detail, id, saved_at)
    }

    /// Keeps the row's identity but carries the caller's detail.
    fn with_detail(self, detail: WordDetail) -> SavedWord {
        SavedWord::from_remote(detail, self.id_string(), self.saved_at())
    }
}

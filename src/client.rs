//! HTTP client for a running ShieldOps server.

use crate::api::ErrorBody;
use crate::engines::{EngineStats, EngineSummary, Ranking};
use crate::models::AgentEvent;
use crate::orchestration::SupervisorSession;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server returned {status}: {message}")]
    Api { status: StatusCode, message: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone)]
pub struct ShieldOpsClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ShieldOpsClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or(text);
        Err(ClientError::Api { status, message })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> ClientResult<T> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn health(&self) -> ClientResult<Value> {
        self.get("/health").await
    }

    pub async fn engines(&self) -> ClientResult<Vec<EngineSummary>> {
        self.get("/api/v1/engines").await
    }

    /// Store a record in an engine. `input` is the engine's input document.
    pub async fn record(&self, engine: &str, input: &Value) -> ClientResult<Value> {
        self.post(&format!("/api/v1/engines/{}/records", engine), input)
            .await
    }

    /// List records, newest first. `filters` are engine-specific query pairs.
    pub async fn list_records(
        &self,
        engine: &str,
        filters: &[(&str, &str)],
        limit: Option<usize>,
    ) -> ClientResult<Vec<Value>> {
        let mut builder = self
            .request(Method::GET, &format!("/api/v1/engines/{}/records", engine))
            .query(filters);
        if let Some(limit) = limit {
            builder = builder.query(&[("limit", limit)]);
        }
        self.send(builder).await
    }

    pub async fn report(&self, engine: &str) -> ClientResult<Value> {
        self.get(&format!("/api/v1/engines/{}/report", engine)).await
    }

    pub async fn rankings(&self, engine: &str) -> ClientResult<Vec<Ranking>> {
        self.get(&format!("/api/v1/engines/{}/rankings", engine))
            .await
    }

    pub async fn stats(&self, engine: &str) -> ClientResult<EngineStats> {
        self.get(&format!("/api/v1/engines/{}/stats", engine)).await
    }

    /// Remove every record of an engine; returns the number removed.
    pub async fn clear(&self, engine: &str) -> ClientResult<usize> {
        let body: Value = self
            .post(&format!("/api/v1/engines/{}/clear", engine), &Value::Null)
            .await?;
        Ok(body["cleared"].as_u64().unwrap_or(0) as usize)
    }

    pub async fn submit_event(&self, event: &AgentEvent) -> ClientResult<SupervisorSession> {
        self.post("/api/v1/supervisor/events", event).await
    }

    pub async fn sessions(&self, limit: Option<usize>) -> ClientResult<Vec<SupervisorSession>> {
        let mut builder = self.request(Method::GET, "/api/v1/supervisor/sessions");
        if let Some(limit) = limit {
            builder = builder.query(&[("limit", limit)]);
        }
        self.send(builder).await
    }
}

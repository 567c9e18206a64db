//! Remote knowledge-base service client.
//!
//! Defines the [`KnowledgeService`] trait covering the three network
//! boundaries the client depends on, and [`HttpKnowledgeService`], the
//! `reqwest`-backed implementation.
//!
//! # Endpoints
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | upload | multipart form, `file` part | `{ success, asset_ids, error? }` |
//! | ingest | `{ knowledge_base_id, asset_ids }` | `{ success, error? }` |
//! | agent query | `{ query, agent_id, session_id }` | `{ success, response: { status, message?, result? } }` |
//!
//! # Response Handling
//!
//! Responses are read as loose JSON and default-filled field by field, so a
//! missing or oddly-typed optional field never turns into a fault:
//! - missing `success` → `false`
//! - missing lists → empty
//! - `confidence` outside `[0, 1]` → clamped
//! - citations without a usable `citation_number` → skipped
//!
//! A non-2xx reply whose body is still a JSON envelope carrying `success`
//! is treated as a structured failure rather than a transport fault.

use async_trait::async_trait;
use reqwest::multipart;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::file::FileHandle;
use crate::models::{Citation, StructuredAnswer};

/// Faults raised before a usable response envelope was obtained.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Transport(String),
    #[error("service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid response from service: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// Tagged result of a remote step once its envelope has been read.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    /// The service reported failure, with its message if it sent one.
    Fail(Option<String>),
}

/// Reply to an upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadResponse {
    pub success: bool,
    pub asset_ids: Vec<String>,
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn from_json(json: &Value) -> Self {
        Self {
            success: bool_field(json, "success"),
            asset_ids: string_list(json.get("asset_ids")),
            error: string_field(json, "error"),
        }
    }

    /// Success yields the first asset identifier; anything else is a failure.
    pub fn into_outcome(self) -> Outcome<String> {
        match (self.success, self.asset_ids.into_iter().next()) {
            (true, Some(asset_id)) => Outcome::Ok(asset_id),
            _ => Outcome::Fail(self.error),
        }
    }
}

/// Reply to an ingest request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestResponse {
    pub success: bool,
    pub error: Option<String>,
}

impl IngestResponse {
    pub fn from_json(json: &Value) -> Self {
        Self {
            success: bool_field(json, "success"),
            error: string_field(json, "error"),
        }
    }

    pub fn into_outcome(self) -> Outcome<()> {
        if self.success {
            Outcome::Ok(())
        } else {
            Outcome::Fail(self.error)
        }
    }
}

/// Reply to an agent query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResponse {
    pub success: bool,
    pub status: Option<String>,
    pub message: Option<String>,
    pub result: Option<StructuredAnswer>,
}

impl AgentResponse {
    pub fn from_json(json: &Value) -> Self {
        let response = json.get("response");
        Self {
            success: bool_field(json, "success"),
            status: response.and_then(|r| string_field(r, "status")),
            message: response.and_then(|r| string_field(r, "message")),
            result: response
                .and_then(|r| r.get("result"))
                .filter(|r| r.is_object())
                .map(parse_answer),
        }
    }

    /// Both the envelope and the agent must report success; a reply where
    /// they disagree is treated as a failure.
    pub fn is_success(&self) -> bool {
        self.success && self.status.as_deref() == Some("success")
    }
}

/// The three remote operations the pipelines depend on.
///
/// Implementations return `Err` only for faults (transport errors,
/// undecodable bodies); a service-reported failure is an `Ok` response whose
/// `success` flag is false.
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn upload(&self, file: &FileHandle) -> Result<UploadResponse, ServiceError>;

    async fn ingest(
        &self,
        knowledge_base_id: &str,
        asset_ids: &[String],
    ) -> Result<IngestResponse, ServiceError>;

    async fn query_agent(
        &self,
        query: &str,
        agent_id: &str,
        session_id: &str,
    ) -> Result<AgentResponse, ServiceError>;
}

/// [`KnowledgeService`] over HTTP.
pub struct HttpKnowledgeService {
    client: reqwest::Client,
    upload_url: String,
    ingest_url: String,
    query_url: String,
    api_key: Option<String>,
}

impl HttpKnowledgeService {
    /// Build a client from the `[service]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ServiceConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            upload_url: join_url(base, &config.upload_path),
            ingest_url: join_url(base, &config.ingest_path),
            query_url: join_url(base, &config.query_path),
            api_key: config.api_key(),
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {}", key)),
            None => req,
        }
    }
}

#[async_trait]
impl KnowledgeService for HttpKnowledgeService {
    async fn upload(&self, file: &FileHandle) -> Result<UploadResponse, ServiceError> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.media_type)
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .authorize(self.client.post(&self.upload_url))
            .multipart(form)
            .send()
            .await?;

        let json = read_envelope(resp).await?;
        Ok(UploadResponse::from_json(&json))
    }

    async fn ingest(
        &self,
        knowledge_base_id: &str,
        asset_ids: &[String],
    ) -> Result<IngestResponse, ServiceError> {
        let body = serde_json::json!({
            "knowledge_base_id": knowledge_base_id,
            "asset_ids": asset_ids,
        });

        let resp = self
            .authorize(self.client.post(&self.ingest_url))
            .json(&body)
            .send()
            .await?;

        let json = read_envelope(resp).await?;
        Ok(IngestResponse::from_json(&json))
    }

    async fn query_agent(
        &self,
        query: &str,
        agent_id: &str,
        session_id: &str,
    ) -> Result<AgentResponse, ServiceError> {
        let body = serde_json::json!({
            "query": query,
            "agent_id": agent_id,
            "session_id": session_id,
        });

        let resp = self
            .authorize(self.client.post(&self.query_url))
            .json(&body)
            .send()
            .await?;

        let json = read_envelope(resp).await?;
        Ok(AgentResponse::from_json(&json))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base, path.trim_start_matches('/'))
}

/// Read a JSON envelope, keeping structured failures that arrive with a
/// non-2xx status.
async fn read_envelope(resp: reqwest::Response) -> Result<Value, ServiceError> {
    let status = resp.status();
    let body = resp.text().await?;
    let parsed = serde_json::from_str::<Value>(&body);

    if status.is_success() {
        return parsed.map_err(|e| ServiceError::Decode(e.to_string()));
    }

    match parsed {
        Ok(json) if json.get("success").is_some() => Ok(json),
        _ => Err(ServiceError::Http {
            status: status.as_u16(),
            body: truncate(&body, 200),
        }),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// ============ Lenient field extraction ============

fn bool_field(json: &Value, key: &str) -> bool {
    json.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn string_field(json: &Value, key: &str) -> Option<String> {
    json.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn u32_field(json: &Value, key: &str) -> Option<u32> {
    let value = json.get(key)?;
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })
        .and_then(|n| u32::try_from(n).ok())
}

fn parse_citation(json: &Value) -> Option<Citation> {
    Some(Citation {
        citation_number: u32_field(json, "citation_number")?,
        document_name: string_field(json, "document_name").unwrap_or_default(),
        page_number: u32_field(json, "page_number").unwrap_or(0),
        excerpt: string_field(json, "excerpt").unwrap_or_default(),
    })
}

/// Parse a `result` object into a [`StructuredAnswer`], default-filling
/// every field.
pub fn parse_answer(json: &Value) -> StructuredAnswer {
    let sources = json
        .get("sources")
        .and_then(|s| s.as_array())
        .map(|items| items.iter().filter_map(parse_citation).collect())
        .unwrap_or_default();

    let confidence = json
        .get("confidence")
        .and_then(|c| c.as_f64())
        .filter(|c| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    StructuredAnswer {
        answer: string_field(json, "answer").unwrap_or_default(),
        sources,
        confidence,
        related_questions: string_list(json.get("related_questions")),
    }
}

//! Core data models shared by the document and chat pipelines.
//!
//! These types represent the documents in the registry, the turns in the
//! chat transcript, and the structured answers the remote agent returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an uploaded document.
///
/// The only legal transitions are `Uploading → Success` and
/// `Uploading → Error`; both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploading,
    Success,
    Error,
}

impl DocumentStatus {
    /// Whether moving from `self` to `next` goes forward along the state machine.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Uploading, DocumentStatus::Success)
                | (DocumentStatus::Uploading, DocumentStatus::Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Success => "success",
            DocumentStatus::Error => "error",
        }
    }
}

/// One user-supplied file undergoing ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub asset_id: Option<String>,
    pub error: Option<String>,
}

impl Document {
    /// A provisional entry for a file that was just accepted.
    pub fn uploading(name: impl Into<String>, size: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            size,
            created_at: Utc::now(),
            status: DocumentStatus::Uploading,
            asset_id: None,
            error: None,
        }
    }
}

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A numbered source backing a marker in an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub citation_number: u32,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub page_number: u32,
    #[serde(default)]
    pub excerpt: String,
}

/// Structured payload attached to an assistant turn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredAnswer {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Citation>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub related_questions: Vec<String>,
}

impl StructuredAnswer {
    /// Payload used when the agent could not be reached at all.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// One entry in the chat transcript. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub answer: Option<StructuredAnswer>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            created_at: Utc::now(),
            answer: None,
        }
    }

    pub fn assistant(text: impl Into<String>, answer: Option<StructuredAnswer>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            text: text.into(),
            created_at: Utc::now(),
            answer,
        }
    }
}

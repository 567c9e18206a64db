//! The controlling view model.
//!
//! [`ViewModel`] owns the document registry (through [`DocumentPipeline`]),
//! the chat transcript (through [`ChatPipeline`]), the query input buffer,
//! and the transient UI flags. Front ends drive it through the methods
//! below and re-render on the [`ViewEvent`](crate::events::ViewEvent)s it
//! emits; nothing outside this module mutates the state directly.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::chat::{ChatPipeline, Rejection};
use crate::config::{ChatConfig, Config};
use crate::documents::StatusCounts;
use crate::events::ViewObserver;
use crate::file::FileHandle;
use crate::models::{ChatTurn, Document};
use crate::service::{HttpKnowledgeService, KnowledgeService};
use crate::upload::DocumentPipeline;

/// Transient UI state that carries no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiFlags {
    /// A file drag is hovering over the dropzone.
    pub drag_active: bool,
    pub sidebar_open: bool,
}

pub struct ViewModel {
    chat_config: ChatConfig,
    documents: DocumentPipeline,
    chat: ChatPipeline,
    input: Mutex<String>,
    flags: Mutex<UiFlags>,
}

impl ViewModel {
    /// Build a view model talking to `service`. A fresh session id is
    /// generated and kept for the view model's lifetime.
    pub fn new(
        config: &Config,
        service: Arc<dyn KnowledgeService>,
        observer: Arc<dyn ViewObserver>,
    ) -> Self {
        let session_id = format!("session-{}", Uuid::new_v4());
        info!(session = %session_id, "starting session");

        Self {
            chat_config: config.chat.clone(),
            documents: DocumentPipeline::new(
                Arc::clone(&service),
                config.knowledge_base.id.clone(),
                Arc::clone(&observer),
            ),
            chat: ChatPipeline::new(service, config.agent.id.clone(), session_id, observer),
            input: Mutex::new(String::new()),
            flags: Mutex::new(UiFlags {
                drag_active: false,
                sidebar_open: true,
            }),
        }
    }

    /// Build a view model backed by the HTTP service in `config`.
    pub fn connect(config: &Config, observer: Arc<dyn ViewObserver>) -> anyhow::Result<Self> {
        let service = HttpKnowledgeService::new(&config.service)?;
        Ok(Self::new(config, Arc::new(service), observer))
    }

    pub fn session_id(&self) -> &str {
        self.chat.session_id()
    }

    // ============ Documents ============

    pub async fn submit_files(&self, files: Vec<FileHandle>) -> Vec<String> {
        self.documents.submit_files(files).await
    }

    pub async fn delete_document(&self, id: &str) -> Option<Document> {
        self.documents.delete_document(id).await
    }

    pub async fn clear_all(&self) -> usize {
        self.documents.clear_all().await
    }

    pub async fn documents(&self) -> Vec<Document> {
        self.documents.documents().await
    }

    pub async fn document_counts(&self) -> StatusCounts {
        self.documents.counts().await
    }

    /// Look a document up by a unique id prefix.
    pub async fn find_document(&self, prefix: &str) -> Option<Document> {
        self.documents.find_by_prefix(prefix).await
    }

    pub async fn pending_uploads(&self) -> usize {
        self.documents.pending_tasks().await
    }

    /// Wait for every upload started so far to settle.
    pub async fn wait_for_uploads(&self) {
        self.documents.wait_idle().await
    }

    // ============ Dropzone and layout ============

    pub async fn drag_enter(&self) {
        self.flags.lock().await.drag_active = true;
    }

    pub async fn drag_leave(&self) {
        self.flags.lock().await.drag_active = false;
    }

    /// Files dropped on the dropzone: ends the drag and submits them.
    pub async fn drop_files(&self, files: Vec<FileHandle>) -> Vec<String> {
        self.drag_leave().await;
        self.submit_files(files).await
    }

    /// Flip sidebar visibility; returns the new state.
    pub async fn toggle_sidebar(&self) -> bool {
        let mut flags = self.flags.lock().await;
        flags.sidebar_open = !flags.sidebar_open;
        flags.sidebar_open
    }

    pub async fn flags(&self) -> UiFlags {
        *self.flags.lock().await
    }

    // ============ Chat ============

    /// Replace the input buffer, truncated to the configured length.
    /// Returns what was kept.
    pub async fn set_input(&self, text: &str) -> String {
        let capped = cap_chars(text, self.chat_config.max_query_chars);
        *self.input.lock().await = capped.clone();
        capped
    }

    pub async fn input(&self) -> String {
        self.input.lock().await.clone()
    }

    /// Whether the submit control is enabled.
    pub async fn can_submit(&self) -> bool {
        !self.is_searching() && !self.input.lock().await.trim().is_empty()
    }

    pub fn is_searching(&self) -> bool {
        self.chat.is_searching()
    }

    /// Submit the input buffer as a query.
    pub async fn submit_input(&self) -> Result<ChatTurn, Rejection> {
        let text = self.input().await;
        self.submit_query(&text).await
    }

    /// Submit `text` as a query and wait for the answer. The input buffer is
    /// cleared once the query is accepted. If the caller stops waiting, the
    /// answer is still appended to the transcript.
    pub async fn submit_query(&self, text: &str) -> Result<ChatTurn, Rejection> {
        let text = cap_chars(text.trim(), self.chat_config.max_query_chars);
        let pending = self.chat.begin(&text).await?;
        self.input.lock().await.clear();
        Ok(pending.complete().await)
    }

    pub fn suggested_queries(&self) -> &[String] {
        &self.chat_config.suggested_queries
    }

    /// Submit the suggested query at `index` (0-based).
    pub async fn submit_suggestion(&self, index: usize) -> Result<ChatTurn, Rejection> {
        let query = self
            .chat_config
            .suggested_queries
            .get(index)
            .cloned()
            .ok_or(Rejection::UnknownShortcut)?;
        self.submit_query(&query).await
    }

    /// Related questions offered by the latest answer.
    pub async fn related_questions(&self) -> Vec<String> {
        self.chat
            .last_answer()
            .await
            .and_then(|turn| turn.answer)
            .map(|answer| answer.related_questions)
            .unwrap_or_default()
    }

    /// Resubmit the latest answer's related question at `index` (0-based)
    /// as a new query.
    pub async fn submit_related_question(&self, index: usize) -> Result<ChatTurn, Rejection> {
        let query = self
            .related_questions()
            .await
            .into_iter()
            .nth(index)
            .ok_or(Rejection::UnknownShortcut)?;
        self.submit_query(&query).await
    }

    pub async fn transcript(&self) -> Vec<ChatTurn> {
        self.chat.turns().await
    }
}

fn cap_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

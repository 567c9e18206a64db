//! Document upload pipeline.
//!
//! Each accepted PDF goes through two remote steps, upload then ingest,
//! in its own task:
//!
//! ```text
//!                 ┌──────────┐ ok  ┌──────────┐ ok
//! submit_files ──▶│  upload  │────▶│  ingest  │────▶ success (asset id)
//!                 └────┬─────┘     └────┬─────┘
//!                      │ fail/fault     │ fail/fault
//!                      ▼                ▼
//!                    error            error
//! ```
//!
//! Documents are registered in `uploading` status before any task starts.
//! Tasks are kept in a group keyed by document id and are never aborted:
//! deleting a document only removes it from the registry, and the task's
//! final write is dropped when it finds the id gone.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::documents::{DocumentRegistry, DocumentUpdate, StatusCounts, UpdateResult};
use crate::events::{ViewEvent, ViewObserver};
use crate::file::FileHandle;
use crate::models::Document;
use crate::service::{KnowledgeService, Outcome, ServiceError};

pub const DEFAULT_UPLOAD_ERROR: &str = "Upload failed";
pub const DEFAULT_INGEST_ERROR: &str = "Failed to add to knowledge base";

pub struct DocumentPipeline {
    registry: Arc<Mutex<DocumentRegistry>>,
    service: Arc<dyn KnowledgeService>,
    knowledge_base_id: String,
    observer: Arc<dyn ViewObserver>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl DocumentPipeline {
    pub fn new(
        service: Arc<dyn KnowledgeService>,
        knowledge_base_id: impl Into<String>,
        observer: Arc<dyn ViewObserver>,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(DocumentRegistry::new())),
            service,
            knowledge_base_id: knowledge_base_id.into(),
            observer,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Accept files, register the PDFs, and start one upload task per PDF.
    ///
    /// Non-PDF files are dropped without error. Returns the ids of the
    /// registered documents in input order. Does not wait for the uploads.
    pub async fn submit_files<I>(&self, files: I) -> Vec<String>
    where
        I: IntoIterator<Item = FileHandle>,
    {
        let accepted: Vec<FileHandle> = files
            .into_iter()
            .filter(|f| {
                if !f.is_pdf() {
                    debug!(file = %f.name, media_type = %f.media_type, "skipping non-PDF file");
                }
                f.is_pdf()
            })
            .collect();

        if accepted.is_empty() {
            return Vec::new();
        }

        let mut jobs = Vec::with_capacity(accepted.len());
        {
            let mut registry = self.registry.lock().await;
            for file in accepted {
                let doc = Document::uploading(file.name.clone(), file.size());
                if !registry.register(doc.clone()) {
                    continue;
                }
                self.observer.notify(ViewEvent::DocumentAdded {
                    id: doc.id.clone(),
                    name: doc.name.clone(),
                });
                jobs.push(UploadJob {
                    id: doc.id,
                    file,
                    knowledge_base_id: self.knowledge_base_id.clone(),
                    registry: Arc::clone(&self.registry),
                    service: Arc::clone(&self.service),
                    observer: Arc::clone(&self.observer),
                });
            }
        }

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|_, handle| !handle.is_finished());

        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            let id = job.id.clone();
            debug!(document = %id, file = %job.file.name, "starting upload");
            tasks.insert(id.clone(), tokio::spawn(job.run()));
            ids.push(id);
        }
        ids
    }

    /// Remove a document whatever its status. An upload still running for it
    /// keeps running; its result is discarded.
    pub async fn delete_document(&self, id: &str) -> Option<Document> {
        let removed = self.registry.lock().await.remove(id);
        if let Some(doc) = &removed {
            debug!(document = %doc.id, status = doc.status.as_str(), "document deleted");
            self.observer
                .notify(ViewEvent::DocumentRemoved { id: doc.id.clone() });
        }
        removed
    }

    /// Remove every document; returns how many were removed.
    pub async fn clear_all(&self) -> usize {
        let removed = self.registry.lock().await.clear();
        self.observer.notify(ViewEvent::RegistryCleared { removed });
        removed
    }

    pub async fn documents(&self) -> Vec<Document> {
        self.registry.lock().await.documents().to_vec()
    }

    pub async fn get(&self, id: &str) -> Option<Document> {
        self.registry.lock().await.get(id).cloned()
    }

    pub async fn find_by_prefix(&self, prefix: &str) -> Option<Document> {
        self.registry.lock().await.find_by_prefix(prefix).cloned()
    }

    pub async fn counts(&self) -> StatusCounts {
        self.registry.lock().await.counts()
    }

    /// Number of upload tasks that have not finished yet, including tasks
    /// whose document has been deleted.
    pub async fn pending_tasks(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Wait until every upload task started so far has finished.
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<(String, JoinHandle<()>)> =
                self.tasks.lock().await.drain().collect();
            if handles.is_empty() {
                return;
            }
            for (id, handle) in handles {
                if let Err(e) = handle.await {
                    warn!(document = %id, "upload task ended abnormally: {}", e);
                }
            }
        }
    }
}

/// Everything one upload task owns.
struct UploadJob {
    id: String,
    file: FileHandle,
    knowledge_base_id: String,
    registry: Arc<Mutex<DocumentRegistry>>,
    service: Arc<dyn KnowledgeService>,
    observer: Arc<dyn ViewObserver>,
}

impl UploadJob {
    /// Run both remote steps, then write the outcome back.
    ///
    /// The steps run in a child task so a panic inside the service still
    /// settles the document as `error`.
    async fn run(self) {
        let job = Arc::new(self);
        let worker = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.transfer().await })
        };

        let update = match worker.await {
            Ok(update) => update,
            Err(e) => {
                warn!(document = %job.id, "upload worker failed: {}", e);
                DocumentUpdate::Error {
                    message: DEFAULT_UPLOAD_ERROR.to_string(),
                }
            }
        };

        job.finish(update).await;
    }

    async fn transfer(&self) -> DocumentUpdate {
        let asset_id = match self.service.upload(&self.file).await {
            Ok(resp) => match resp.into_outcome() {
                Outcome::Ok(asset_id) => asset_id,
                Outcome::Fail(message) => {
                    warn!(document = %self.id, file = %self.file.name, "upload rejected");
                    return DocumentUpdate::Error {
                        message: message.unwrap_or_else(|| DEFAULT_UPLOAD_ERROR.to_string()),
                    };
                }
            },
            Err(e) => return self.fault("upload", e),
        };

        debug!(document = %self.id, asset = %asset_id, "uploaded, ingesting");

        match self
            .service
            .ingest(&self.knowledge_base_id, std::slice::from_ref(&asset_id))
            .await
        {
            Ok(resp) => match resp.into_outcome() {
                Outcome::Ok(()) => DocumentUpdate::Success { asset_id },
                Outcome::Fail(message) => {
                    warn!(document = %self.id, asset = %asset_id, "ingest rejected");
                    DocumentUpdate::Error {
                        message: message.unwrap_or_else(|| DEFAULT_INGEST_ERROR.to_string()),
                    }
                }
            },
            Err(e) => self.fault("ingest", e),
        }
    }

    fn fault(&self, step: &str, err: ServiceError) -> DocumentUpdate {
        warn!(document = %self.id, file = %self.file.name, "{} failed: {}", step, err);
        let message = err.to_string();
        DocumentUpdate::Error {
            message: if message.trim().is_empty() {
                DEFAULT_UPLOAD_ERROR.to_string()
            } else {
                message
            },
        }
    }

    async fn finish(&self, update: DocumentUpdate) {
        let result = self.registry.lock().await.update(&self.id, update);
        match result {
            UpdateResult::Applied(doc) => {
                debug!(document = %doc.id, status = doc.status.as_str(), "upload settled");
                self.observer.notify(ViewEvent::DocumentUpdated {
                    id: doc.id,
                    name: doc.name,
                    status: doc.status,
                    error: doc.error,
                });
            }
            UpdateResult::Missing => {
                debug!(document = %self.id, "document removed before upload settled, dropping result");
            }
            UpdateResult::Rejected { current } => {
                warn!(
                    document = %self.id,
                    current = current.as_str(),
                    "ignoring update for document that already settled"
                );
            }
        }
    }
}

//! The document registry.
//!
//! An ordered, identifier-keyed collection of [`Document`]s. All writes go
//! through identifier-scoped operations: a write for an id that is no longer
//! present is dropped rather than re-inserting it, and a status write that
//! would move a document backward is refused.

use serde::Serialize;

use crate::models::{Document, DocumentStatus};

/// Terminal update applied to an in-flight document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentUpdate {
    Success { asset_id: String },
    Error { message: String },
}

impl DocumentUpdate {
    pub fn status(&self) -> DocumentStatus {
        match self {
            DocumentUpdate::Success { .. } => DocumentStatus::Success,
            DocumentUpdate::Error { .. } => DocumentStatus::Error,
        }
    }
}

/// What happened to an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateResult {
    /// Applied; carries the document as it now stands.
    Applied(Document),
    /// The id is no longer in the registry (deleted or cleared).
    Missing,
    /// The document already reached a terminal status.
    Rejected { current: DocumentStatus },
}

/// Per-status totals for the document panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub uploading: usize,
    pub success: usize,
    pub error: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.uploading + self.success + self.error
    }
}

#[derive(Debug, Default)]
pub struct DocumentRegistry {
    docs: Vec<Document>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provisional entry. Ids are generated client-side, so a
    /// collision means the caller reused a document; it is refused.
    pub fn register(&mut self, doc: Document) -> bool {
        if self.contains(&doc.id) {
            return false;
        }
        self.docs.push(doc);
        true
    }

    /// Merge a terminal update into the document with `id`.
    pub fn update(&mut self, id: &str, update: DocumentUpdate) -> UpdateResult {
        let Some(doc) = self.docs.iter_mut().find(|d| d.id == id) else {
            return UpdateResult::Missing;
        };

        let next = update.status();
        if !doc.status.can_transition_to(next) {
            return UpdateResult::Rejected {
                current: doc.status,
            };
        }

        doc.status = next;
        match update {
            DocumentUpdate::Success { asset_id } => {
                doc.asset_id = Some(asset_id);
                doc.error = None;
            }
            DocumentUpdate::Error { message } => {
                doc.asset_id = None;
                doc.error = Some(message);
            }
        }
        UpdateResult::Applied(doc.clone())
    }

    pub fn remove(&mut self, id: &str) -> Option<Document> {
        let pos = self.docs.iter().position(|d| d.id == id)?;
        Some(self.docs.remove(pos))
    }

    /// Remove everything; returns how many documents were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.docs.len();
        self.docs.clear();
        n
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.docs.iter().find(|d| d.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Resolve a unique id prefix, as typed by a user.
    pub fn find_by_prefix(&self, prefix: &str) -> Option<&Document> {
        if prefix.is_empty() {
            return None;
        }
        let mut matches = self.docs.iter().filter(|d| d.id.starts_with(prefix));
        let first = matches.next()?;
        match matches.next() {
            Some(_) => None,
            None => Some(first),
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for doc in &self.docs {
            match doc.status {
                DocumentStatus::Uploading => counts.uploading += 1,
                DocumentStatus::Success => counts.success += 1,
                DocumentStatus::Error => counts.error += 1,
            }
        }
        counts
    }
}

//! Scripted in-memory [`KnowledgeService`] for pipeline tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

use crate::file::FileHandle;
use crate::models::{Citation, StructuredAnswer};
use crate::service::{AgentResponse, IngestResponse, KnowledgeService, ServiceError, UploadResponse};

/// How the fake answers one call.
#[derive(Clone)]
pub enum Reply<T> {
    Respond(T),
    Fault(String),
    Panic,
}

impl<T> Reply<T> {
    fn resolve(self) -> Result<T, ServiceError> {
        match self {
            Reply::Respond(v) => Ok(v),
            Reply::Fault(msg) => Err(ServiceError::Transport(msg)),
            Reply::Panic => panic!("scripted panic"),
        }
    }
}

/// Uploads are keyed by file name, ingests by asset id. Anything not
/// scripted succeeds; uploaded files get asset id `asset-<name>`.
pub struct FakeService {
    uploads: Mutex<HashMap<String, Reply<UploadResponse>>>,
    ingests: Mutex<HashMap<String, Reply<IngestResponse>>>,
    query: Mutex<Reply<AgentResponse>>,
    upload_gate: Option<Semaphore>,
    query_gate: Option<Semaphore>,
    pub upload_calls: AtomicUsize,
    pub ingest_calls: Mutex<Vec<(String, Vec<String>)>>,
    pub query_calls: Mutex<Vec<(String, String, String)>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(HashMap::new()),
            ingests: Mutex::new(HashMap::new()),
            query: Mutex::new(Reply::Respond(success_response("ok", vec![], 0.5))),
            upload_gate: None,
            query_gate: None,
            upload_calls: AtomicUsize::new(0),
            ingest_calls: Mutex::new(Vec::new()),
            query_calls: Mutex::new(Vec::new()),
        }
    }

    /// Uploads block until [`release_uploads`](Self::release_uploads).
    pub fn gated_uploads(mut self) -> Self {
        self.upload_gate = Some(Semaphore::new(0));
        self
    }

    /// Queries block until [`release_queries`](Self::release_queries).
    pub fn gated_queries(mut self) -> Self {
        self.query_gate = Some(Semaphore::new(0));
        self
    }

    pub fn on_upload(self, name: &str, reply: Reply<UploadResponse>) -> Self {
        self.uploads.lock().unwrap().insert(name.to_string(), reply);
        self
    }

    pub fn on_ingest(self, asset_id: &str, reply: Reply<IngestResponse>) -> Self {
        self.ingests.lock().unwrap().insert(asset_id.to_string(), reply);
        self
    }

    pub fn on_query(self, reply: Reply<AgentResponse>) -> Self {
        *self.query.lock().unwrap() = reply;
        self
    }

    pub fn release_uploads(&self, n: usize) {
        if let Some(gate) = &self.upload_gate {
            gate.add_permits(n);
        }
    }

    pub fn release_queries(&self, n: usize) {
        if let Some(gate) = &self.query_gate {
            gate.add_permits(n);
        }
    }

    pub fn query_count(&self) -> usize {
        self.query_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl KnowledgeService for FakeService {
    async fn upload(&self, file: &FileHandle) -> Result<UploadResponse, ServiceError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.upload_gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let reply = self.uploads.lock().unwrap().get(&file.name).cloned();
        reply
            .unwrap_or_else(|| {
                Reply::Respond(UploadResponse {
                    success: true,
                    asset_ids: vec![format!("asset-{}", file.name)],
                    error: None,
                })
            })
            .resolve()
    }

    async fn ingest(
        &self,
        knowledge_base_id: &str,
        asset_ids: &[String],
    ) -> Result<IngestResponse, ServiceError> {
        self.ingest_calls
            .lock()
            .unwrap()
            .push((knowledge_base_id.to_string(), asset_ids.to_vec()));
        let key = asset_ids.first().cloned().unwrap_or_default();
        let reply = self.ingests.lock().unwrap().get(&key).cloned();
        reply
            .unwrap_or(Reply::Respond(IngestResponse {
                success: true,
                error: None,
            }))
            .resolve()
    }

    async fn query_agent(
        &self,
        query: &str,
        agent_id: &str,
        session_id: &str,
    ) -> Result<AgentResponse, ServiceError> {
        self.query_calls.lock().unwrap().push((
            query.to_string(),
            agent_id.to_string(),
            session_id.to_string(),
        ));
        if let Some(gate) = &self.query_gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        let reply = self.query.lock().unwrap().clone();
        reply.resolve()
    }
}

pub fn pdf(name: &str) -> FileHandle {
    FileHandle::new(name, "application/pdf", b"%PDF-1.7".to_vec())
}

pub fn citation(n: u32, doc: &str, page: u32) -> Citation {
    Citation {
        citation_number: n,
        document_name: doc.to_string(),
        page_number: page,
        excerpt: format!("excerpt {}", n),
    }
}

pub fn success_response(answer: &str, sources: Vec<Citation>, confidence: f64) -> AgentResponse {
    AgentResponse {
        success: true,
        status: Some("success".to_string()),
        message: None,
        result: Some(StructuredAnswer {
            answer: answer.to_string(),
            sources,
            confidence,
            related_questions: vec!["What else?".to_string()],
        }),
    }
}

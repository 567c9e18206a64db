//! Chat pipeline: one remote agent query per submitted question.
//!
//! [`ChatPipeline::begin`] checks the preconditions, takes the single
//! in-flight slot, appends the user turn and spawns a task that calls the
//! agent. That task owns the slot and appends exactly one assistant turn
//! whatever the outcome: a failed reply, a panicking service, or a caller
//! that stopped waiting. [`PendingQuery::complete`] waits for it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{ViewEvent, ViewObserver};
use crate::models::{ChatTurn, StructuredAnswer};
use crate::service::{AgentResponse, KnowledgeService, ServiceError};
use crate::transcript::Transcript;

pub const NO_ANSWER: &str = "No answer available";
pub const FAILED_RESPONSE: &str = "Failed to get response";
pub const SEARCH_FAULT: &str = "An error occurred while searching. Please try again.";

/// Why a submission was not accepted. Rejections leave all state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("query is empty")]
    Empty,
    #[error("a query is already in flight")]
    InFlight,
    #[error("no such shortcut")]
    UnknownShortcut,
}

pub struct ChatPipeline {
    transcript: Arc<Mutex<Transcript>>,
    in_flight: Arc<AtomicBool>,
    service: Arc<dyn KnowledgeService>,
    agent_id: String,
    session_id: String,
    observer: Arc<dyn ViewObserver>,
}

impl ChatPipeline {
    pub fn new(
        service: Arc<dyn KnowledgeService>,
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
        observer: Arc<dyn ViewObserver>,
    ) -> Self {
        Self {
            transcript: Arc::new(Mutex::new(Transcript::new())),
            in_flight: Arc::new(AtomicBool::new(false)),
            service,
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            observer,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_searching(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Accept a query: take the in-flight slot, append the user turn and
    /// start the agent call in its own task.
    pub async fn begin(&self, text: &str) -> Result<PendingQuery, Rejection> {
        let query = text.trim();
        if query.is_empty() {
            return Err(Rejection::Empty);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("query rejected, another one is in flight");
            return Err(Rejection::InFlight);
        }
        let flight = FlightGuard {
            flag: Arc::clone(&self.in_flight),
            observer: Arc::clone(&self.observer),
        };
        self.observer.notify(ViewEvent::SearchStarted);

        let user = ChatTurn::user(query);
        let turns = append_turn(&self.transcript, self.observer.as_ref(), user).await;
        debug!(session = %self.session_id, turns, "query accepted");

        let job = QueryJob {
            query: query.to_string(),
            agent_id: self.agent_id.clone(),
            session_id: self.session_id.clone(),
            transcript: Arc::clone(&self.transcript),
            service: Arc::clone(&self.service),
            observer: Arc::clone(&self.observer),
            _flight: flight,
        };
        Ok(PendingQuery {
            handle: tokio::spawn(job.run()),
        })
    }

    /// Accept a query and wait for its answer.
    pub async fn submit_query(&self, text: &str) -> Result<ChatTurn, Rejection> {
        let pending = self.begin(text).await?;
        Ok(pending.complete().await)
    }

    pub async fn turns(&self) -> Vec<ChatTurn> {
        self.transcript.lock().await.turns().to_vec()
    }

    pub async fn last_answer(&self) -> Option<ChatTurn> {
        self.transcript.lock().await.last_answer().cloned()
    }

    pub async fn len(&self) -> usize {
        self.transcript.lock().await.turns().len()
    }
}

/// Append under the transcript lock; returns the new length.
async fn append_turn(
    transcript: &Mutex<Transcript>,
    observer: &dyn ViewObserver,
    turn: ChatTurn,
) -> usize {
    let event = ViewEvent::TurnAppended {
        id: turn.id.clone(),
        role: turn.role,
    };
    let len = {
        let mut transcript = transcript.lock().await;
        transcript.append(turn);
        transcript.turns().len()
    };
    observer.notify(event);
    len
}

/// A query whose user turn is in the transcript and whose answer is still
/// outstanding.
///
/// Dropping it detaches the task: the assistant turn is still appended and
/// the in-flight slot is released once it is.
pub struct PendingQuery {
    handle: JoinHandle<ChatTurn>,
}

impl PendingQuery {
    /// Wait for the assistant turn.
    pub async fn complete(self) -> ChatTurn {
        match self.handle.await {
            Ok(turn) => turn,
            Err(e) => {
                // The agent call itself is isolated in a worker, so this is
                // only reached if appending the answer failed.
                warn!("chat task failed: {}", e);
                ChatTurn::assistant(SEARCH_FAULT, Some(StructuredAnswer::empty()))
            }
        }
    }
}

/// Everything one query task owns, including the in-flight slot.
struct QueryJob {
    query: String,
    agent_id: String,
    session_id: String,
    transcript: Arc<Mutex<Transcript>>,
    service: Arc<dyn KnowledgeService>,
    observer: Arc<dyn ViewObserver>,
    _flight: FlightGuard,
}

impl QueryJob {
    /// Call the agent and append exactly one assistant turn. The slot is
    /// released after the append, when `self` is dropped.
    async fn run(self) -> ChatTurn {
        let worker = {
            let service = Arc::clone(&self.service);
            let query = self.query.clone();
            let agent_id = self.agent_id.clone();
            let session_id = self.session_id.clone();
            tokio::spawn(async move {
                service
                    .query_agent(&query, &agent_id, &session_id)
                    .await
            })
        };

        debug!(session = %self.session_id, "querying agent");
        let (text, answer) = match worker.await {
            Ok(reply) => resolve_reply(reply),
            Err(e) => {
                warn!(session = %self.session_id, "agent query worker failed: {}", e);
                (SEARCH_FAULT.to_string(), Some(StructuredAnswer::empty()))
            }
        };

        let turn = ChatTurn::assistant(text, answer);
        append_turn(&self.transcript, self.observer.as_ref(), turn.clone()).await;
        turn
    }
}

/// Releases the in-flight slot on drop, on every path out of a query.
struct FlightGuard {
    flag: Arc<AtomicBool>,
    observer: Arc<dyn ViewObserver>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.observer.notify(ViewEvent::SearchFinished);
    }
}

/// Map an agent reply to the assistant turn's text and payload.
///
/// A non-success status keeps whatever `result` the service sent along.
pub fn resolve_reply(
    reply: Result<AgentResponse, ServiceError>,
) -> (String, Option<StructuredAnswer>) {
    match reply {
        Ok(resp) if resp.is_success() => {
            let text = resp
                .result
                .as_ref()
                .map(|r| r.answer.as_str())
                .filter(|a| !a.trim().is_empty())
                .unwrap_or(NO_ANSWER)
                .to_string();
            (text, resp.result)
        }
        Ok(resp) => {
            warn!(
                status = resp.status.as_deref().unwrap_or("<missing>"),
                "agent reported failure"
            );
            let text = resp
                .result
                .as_ref()
                .map(|r| r.answer.clone())
                .filter(|a| !a.trim().is_empty())
                .or_else(|| resp.message.clone())
                .unwrap_or_else(|| FAILED_RESPONSE.to_string());
            (text, resp.result)
        }
        Err(e) => {
            warn!("agent query failed: {}", e);
            (SEARCH_FAULT.to_string(), Some(StructuredAnswer::empty()))
        }
    }
}

//! View change notifications.
//!
//! Every mutation of the view model's state emits a [`ViewEvent`] so a front
//! end knows when to re-render. Events are written to **stderr** so stdout
//! stays parseable for scripts.

use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

use crate::models::{DocumentStatus, Role};

/// A single state change.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ViewEvent {
    DocumentAdded { id: String, name: String },
    DocumentUpdated {
        id: String,
        name: String,
        status: DocumentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    DocumentRemoved { id: String },
    RegistryCleared { removed: usize },
    TurnAppended { id: String, role: Role },
    SearchStarted,
    SearchFinished,
}

/// Receives view events. Called from pipeline tasks, so it must be cheap
/// and must not block.
pub trait ViewObserver: Send + Sync {
    fn notify(&self, event: ViewEvent);
}

/// Human-friendly lines on stderr: "upload report.pdf  success".
pub struct StderrObserver;

impl ViewObserver for StderrObserver {
    fn notify(&self, event: ViewEvent) {
        let line = match &event {
            ViewEvent::DocumentAdded { name, .. } => format!("upload {}  uploading...\n", name),
            ViewEvent::DocumentUpdated {
                name,
                status,
                error,
                ..
            } => match error {
                Some(msg) => format!("upload {}  {}: {}\n", name, status.as_str(), msg),
                None => format!("upload {}  {}\n", name, status.as_str()),
            },
            ViewEvent::DocumentRemoved { id } => format!("document {} removed\n", short_id(id)),
            ViewEvent::RegistryCleared { removed } => {
                format!("cleared {} document(s)\n", removed)
            }
            ViewEvent::SearchStarted => "searching...\n".to_string(),
            // Turns and search completion are visible in the transcript itself.
            ViewEvent::TurnAppended { .. } | ViewEvent::SearchFinished => return,
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable events: one JSON object per line on stderr.
pub struct JsonObserver;

impl ViewObserver for JsonObserver {
    fn notify(&self, event: ViewEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op observer.
pub struct NoObserver;

impl ViewObserver for NoObserver {
    fn notify(&self, _event: ViewEvent) {}
}

/// Keeps every event in memory, in arrival order.
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ViewEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ViewEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ViewObserver for CollectingObserver {
    fn notify(&self, event: ViewEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

/// Abbreviated identifier for display.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Notification mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum NotifyMode {
    Off,
    Human,
    Json,
}

impl NotifyMode {
    /// Default: human notifications when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            NotifyMode::Human
        } else {
            NotifyMode::Off
        }
    }

    pub fn observer(&self) -> Box<dyn ViewObserver> {
        match self {
            NotifyMode::Off => Box::new(NoObserver),
            NotifyMode::Human => Box::new(StderrObserver),
            NotifyMode::Json => Box::new(JsonObserver),
        }
    }
}

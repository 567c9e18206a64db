//! # kb-chat
//!
//! A client for uploading PDF documents to a remote knowledge base and
//! querying them through a conversational agent that answers with citations.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!  user action ──────▶ │          ViewModel           │ ──▶ ViewEvent ──▶ re-render
//!                      │ ┌──────────────┐ ┌─────────┐ │
//!                      │ │ Document     │ │  Chat   │ │
//!                      │ │ Pipeline     │ │ Pipeline│ │
//!                      │ └──────┬───────┘ └────┬────┘ │
//!                      └────────┼──────────────┼──────┘
//!                               ▼              ▼
//!                        upload + ingest   agent query
//!                      ┌──────────────────────────────┐
//!                      │   KnowledgeService (HTTP)    │
//!                      └──────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, chat turns, structured answers |
//! | [`service`] | Remote service trait and HTTP client |
//! | [`documents`] | Identifier-keyed document registry |
//! | [`upload`] | Upload → ingest pipeline |
//! | [`transcript`] | Append-only chat transcript |
//! | [`chat`] | Single-flight query pipeline |
//! | [`citations`] | Inline `[n]` citation splitting |
//! | [`view_model`] | The controlling view model |
//! | [`events`] | State change notifications |
//! | [`display`] | Terminal rendering |
//! | [`commands`] | CLI entry points |

pub mod chat;
pub mod citations;
pub mod commands;
pub mod config;
pub mod display;
pub mod documents;
pub mod events;
pub mod file;
pub mod models;
pub mod service;
pub mod transcript;
pub mod upload;
pub mod view_model;

#[cfg(test)]
mod testing;

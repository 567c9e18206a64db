//! CLI entry points for `kbchat upload`, `kbchat ask`, and `kbchat chat`.
//!
//! Each command builds a [`ViewModel`] from the config, drives it, and
//! prints the resulting panels to stdout. Change notifications go to stderr.

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::chat::Rejection;
use crate::config::Config;
use crate::display::{render_documents, render_shortcuts, render_turn};
use crate::events::{short_id, ViewObserver};
use crate::file::FileHandle;
use crate::models::ChatTurn;
use crate::view_model::ViewModel;

/// A line typed into the interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Query(String),
    Upload(Vec<PathBuf>),
    Docs,
    Delete(String),
    Clear,
    /// List suggestions, or submit the n-th (0-based).
    Suggest(Option<usize>),
    /// Submit the latest answer's n-th related question (0-based).
    Related(usize),
    Sidebar,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

const HELP: &str = "\
commands:
  <question>          ask the agent
  /upload <paths...>  upload PDF files (runs in the background)
  /docs               show the document panel
  /delete <id>        delete a document by id prefix
  /clear              delete every document
  /suggest [n]        list suggested queries, or ask the n-th
  /related <n>        ask the n-th related question of the last answer
  /sidebar            toggle the document panel after each answer
  /help               show this help
  /quit               leave (waits for running uploads)
";

pub fn parse_command(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ReplCommand::Query(line.to_string());
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    match (name, args.as_slice()) {
        ("upload", []) => ReplCommand::Invalid("usage: /upload <paths...>".to_string()),
        ("upload", paths) => ReplCommand::Upload(paths.iter().map(PathBuf::from).collect()),
        ("docs", []) => ReplCommand::Docs,
        ("delete", [id]) => ReplCommand::Delete(id.to_string()),
        ("delete", _) => ReplCommand::Invalid("usage: /delete <id>".to_string()),
        ("clear", []) => ReplCommand::Clear,
        ("suggest", []) => ReplCommand::Suggest(None),
        ("suggest", [n]) => match parse_ordinal(n) {
            Some(i) => ReplCommand::Suggest(Some(i)),
            None => ReplCommand::Invalid(format!("not a list number: {}", n)),
        },
        ("related", [n]) => match parse_ordinal(n) {
            Some(i) => ReplCommand::Related(i),
            None => ReplCommand::Invalid(format!("not a list number: {}", n)),
        },
        ("related", _) => ReplCommand::Invalid("usage: /related <n>".to_string()),
        ("sidebar", []) => ReplCommand::Sidebar,
        ("help", _) => ReplCommand::Help,
        ("quit", []) | ("exit", []) => ReplCommand::Quit,
        _ => ReplCommand::Invalid(format!("unknown command: /{}", rest)),
    }
}

/// 1-based list number to 0-based index.
fn parse_ordinal(s: &str) -> Option<usize> {
    s.parse::<usize>().ok().filter(|n| *n >= 1).map(|n| n - 1)
}

fn load_files(paths: &[PathBuf]) -> Result<Vec<FileHandle>> {
    paths.iter().map(|p| FileHandle::from_path(p)).collect()
}

pub async fn run_upload(
    config: &Config,
    paths: &[PathBuf],
    observer: Arc<dyn ViewObserver>,
) -> Result<()> {
    let files = load_files(paths)?;
    let vm = ViewModel::connect(config, observer)?;

    let ids = vm.submit_files(files).await;
    if ids.is_empty() {
        println!("No PDF files to upload.");
        return Ok(());
    }
    vm.wait_for_uploads().await;

    let counts = vm.document_counts().await;
    print!("{}", render_documents(&vm.documents().await, counts));

    if counts.error > 0 {
        bail!("{} of {} document(s) failed", counts.error, counts.total());
    }
    Ok(())
}

pub async fn run_ask(config: &Config, query: &str, observer: Arc<dyn ViewObserver>) -> Result<()> {
    let vm = ViewModel::connect(config, observer)?;
    match vm.submit_query(query).await {
        Ok(turn) => {
            print!("{}", render_turn(&turn));
            Ok(())
        }
        Err(Rejection::Empty) => bail!("query must not be empty"),
        Err(e) => bail!("query not accepted: {}", e),
    }
}

pub async fn run_chat(
    config: &Config,
    uploads: &[PathBuf],
    observer: Arc<dyn ViewObserver>,
) -> Result<()> {
    let vm = ViewModel::connect(config, observer)?;
    if !uploads.is_empty() {
        vm.submit_files(load_files(uploads)?).await;
    }

    println!("session {}", vm.session_id());
    print!("{}", render_shortcuts("suggested", vm.suggested_queries()));
    println!("type /help for commands");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    chat_loop(&vm, stdin).await?;

    let pending = vm.pending_uploads().await;
    if pending > 0 {
        println!("waiting for {} upload(s)...", pending);
        vm.wait_for_uploads().await;
        print!(
            "{}",
            render_documents(&vm.documents().await, vm.document_counts().await)
        );
    }
    Ok(())
}

/// Read commands until `/quit` or end of input.
pub async fn chat_loop<R>(vm: &ViewModel, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            ReplCommand::Quit => break,
            ReplCommand::Empty => {}
            ReplCommand::Help => print!("{}", HELP),
            ReplCommand::Invalid(msg) => println!("{}", msg),
            ReplCommand::Query(text) => {
                vm.set_input(&text).await;
                let result = vm.submit_input().await;
                show_answer(vm, result).await;
            }
            ReplCommand::Suggest(None) => {
                print!("{}", render_shortcuts("suggested", vm.suggested_queries()));
            }
            ReplCommand::Suggest(Some(i)) => {
                let result = vm.submit_suggestion(i).await;
                show_answer(vm, result).await;
            }
            ReplCommand::Related(i) => {
                let result = vm.submit_related_question(i).await;
                show_answer(vm, result).await;
            }
            ReplCommand::Upload(paths) => match load_files(&paths) {
                Ok(files) => {
                    let submitted = files.len();
                    let ids = vm.submit_files(files).await;
                    let skipped = submitted - ids.len();
                    println!("uploading {} file(s)", ids.len());
                    if skipped > 0 {
                        println!("skipped {} non-PDF file(s)", skipped);
                    }
                }
                Err(e) => println!("Error: {:#}", e),
            },
            ReplCommand::Docs => {
                print!(
                    "{}",
                    render_documents(&vm.documents().await, vm.document_counts().await)
                );
            }
            ReplCommand::Delete(prefix) => match vm.find_document(&prefix).await {
                Some(doc) => {
                    vm.delete_document(&doc.id).await;
                    println!("deleted {} ({})", doc.name, short_id(&doc.id));
                }
                None => println!("no unique document matches '{}'", prefix),
            },
            ReplCommand::Clear => {
                let n = vm.clear_all().await;
                println!("cleared {} document(s)", n);
            }
            ReplCommand::Sidebar => {
                let open = vm.toggle_sidebar().await;
                println!("document panel {}", if open { "shown" } else { "hidden" });
            }
        }
    }
    Ok(())
}

async fn show_answer(vm: &ViewModel, result: std::result::Result<ChatTurn, Rejection>) {
    match result {
        Ok(turn) => {
            print!("{}", render_turn(&turn));
            if vm.flags().await.sidebar_open && !vm.documents().await.is_empty() {
                print!(
                    "{}",
                    render_documents(&vm.documents().await, vm.document_counts().await)
                );
            }
        }
        Err(Rejection::Empty) => {}
        Err(e) => println!("{}", e),
    }
}

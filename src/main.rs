//! # kbchat CLI
//!
//! Upload PDFs to a remote knowledge base and ask a citing agent about them.
//!
//! ## Usage
//!
//! ```bash
//! kbchat --config ./config/kbchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbchat init` | Write an example config file |
//! | `kbchat upload <paths...>` | Upload and ingest PDFs, then print the document panel |
//! | `kbchat ask "<query>"` | Ask one question and print the cited answer |
//! | `kbchat chat` | Interactive session with background uploads |

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use kb_chat::commands;
use kb_chat::config;
use kb_chat::events::NotifyMode;

/// kbchat: upload PDFs to a knowledge base and chat with them.
///
/// All commands except `init` read the TOML file given by `--config`.
#[derive(Parser)]
#[command(
    name = "kbchat",
    about = "Upload PDFs to a knowledge base and chat with them through a citing agent",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbchat.toml")]
    config: PathBuf,

    /// Where to report state changes. Defaults to `human` when stderr is a
    /// terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<NotifyMode>,

    /// Log pipeline activity at debug level (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Write an example config file at `--config`.
    ///
    /// Refuses to overwrite an existing file.
    Init,

    /// Upload PDF files and add them to the knowledge base.
    ///
    /// Non-PDF files are skipped. Waits for every file to settle and exits
    /// non-zero if any failed.
    Upload {
        /// Files to upload.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a single question.
    Ask {
        /// The question.
        query: String,
    },

    /// Start an interactive chat session.
    Chat {
        /// Files to start uploading when the session opens.
        #[arg(long = "upload", num_args = 1..)]
        uploads: Vec<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "kb_chat=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::Init = cli.command {
        config::scaffold_config(&cli.config)?;
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let observer: Arc<dyn kb_chat::events::ViewObserver> = Arc::from(
        cli.progress
            .unwrap_or_else(NotifyMode::default_for_tty)
            .observer(),
    );

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Upload { paths } => {
            commands::run_upload(&cfg, &paths, observer).await?;
        }
        Commands::Ask { query } => {
            commands::run_ask(&cfg, &query, observer).await?;
        }
        Commands::Chat { uploads } => {
            commands::run_chat(&cfg, &uploads, observer).await?;
        }
    }

    Ok(())
}

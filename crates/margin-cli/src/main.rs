//! `margin`: documents, autosave and assistant chat from the command line.

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Study notes with an assistant that can write into them.
#[derive(Debug, Parser)]
#[command(name = "margin", version, about)]
pub struct Cli {
    /// User to act as.
    #[arg(long, env = "MARGIN_USER")]
    pub user: String,

    /// Notes API base URL (overrides MARGIN_API_URL).
    #[arg(long)]
    pub api_url: Option<String>,

    /// Use an in-memory store seeded with a sample document.
    #[arg(long)]
    pub offline: bool,

    /// Where assistant answers come from.
    #[arg(long, value_enum, default_value_t = AssistantChoice::Gateway, env = "MARGIN_ASSISTANT")]
    pub assistant: AssistantChoice,

    /// Reference text for Ollama answers, used for every context.
    #[arg(long)]
    pub context_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AssistantChoice {
    /// The notes API's query endpoint (or the in-memory echo when offline).
    Gateway,
    /// A local Ollama server.
    Ollama,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a document.
    Show {
        document: String,
        /// Print the stored markup instead of plain text.
        #[arg(long)]
        markup: bool,
        /// Treat the first block as the title.
        #[arg(long)]
        titled: bool,
    },
    /// Append a paragraph to a document and save it.
    Edit {
        document: String,
        text: String,
        /// Format the new block as a heading of this level.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=6))]
        heading: Option<u8>,
        #[arg(long)]
        bold: bool,
        /// Save immediately instead of waiting for autosave.
        #[arg(long)]
        flush: bool,
    },
    /// Upload an image and embed it at the end of a document.
    Image { document: String, path: PathBuf },
    /// List the user's documents.
    List,
    /// Create a document.
    Create { title: String },
    /// Ask the assistant about a context (e.g. a lecture video).
    Ask { context: String, question: String },
    /// Append text to a document: the given text, or the latest assistant
    /// reply in a context's chat.
    Capture {
        document: String,
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        context: Option<String>,
        #[arg(long)]
        text: Option<String>,
        /// Capture only this part of the reply.
        #[arg(long, requires = "context")]
        selection: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = logging::init();

    let cli = Cli::parse();
    commands::run(cli).await
}

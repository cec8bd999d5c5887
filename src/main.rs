//! # Course RAG CLI (`course-rag`)
//!
//! ## Usage
//!
//! ```bash
//! course-rag --config ./config/course-rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `course-rag serve` | Start the HTTP API, ingesting `[ingest].docs_path` first |
//! | `course-rag ingest <folder>` | Ingest course documents from a folder |
//! | `course-rag query "<text>"` | Answer one question |
//! | `course-rag courses` | Show course count and titles |
//!
//! `ANTHROPIC_API_KEY` (and `OPENAI_API_KEY` for OpenAI embeddings) are read
//! from the environment; a `.env` file in the working directory is loaded
//! first when present.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use course_rag::config;
use course_rag::logging::init_logging;
use course_rag::rag::RagSystem;
use course_rag::server;

/// Course RAG: question answering over course materials.
#[derive(Parser)]
#[command(
    name = "course-rag",
    about = "Course RAG: retrieval-augmented question answering over course materials",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/course-rag.toml`. A missing file means all
    /// defaults.
    #[arg(long, global = true, default_value = "./config/course-rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API.
    ///
    /// Ingests `[ingest].docs_path` (skipping courses already stored) and
    /// then binds `[server].bind`.
    Serve,

    /// Ingest course documents from a folder.
    Ingest {
        /// Folder containing course `.txt` / `.md` files.
        folder: PathBuf,

        /// Remove all stored courses before ingesting.
        #[arg(long)]
        clear: bool,
    },

    /// Answer a single question.
    Query {
        /// The question.
        text: String,

        /// Continue an existing session.
        #[arg(long)]
        session: Option<String>,
    },

    /// Show how many courses are stored and their titles.
    Courses,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging("info");

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let rag = RagSystem::from_config(&cfg).await?;

    match cli.command {
        Commands::Serve => {
            if let Some(docs) = &cfg.ingest.docs_path {
                let (courses, chunks) = rag.add_course_folder(docs, false).await?;
                tracing::info!(courses, chunks, "startup ingestion finished");
            }
            server::run_server(&cfg, Arc::new(rag)).await?;
        }
        Commands::Ingest { folder, clear } => {
            let (courses, chunks) = rag.add_course_folder(&folder, clear).await?;
            println!("ingest {}", folder.display());
            println!("  courses added: {}", courses);
            println!("  chunks added:  {}", chunks);
        }
        Commands::Query { text, session } => {
            let outcome = rag.query(&text, session.as_deref()).await?;
            println!("{}", outcome.answer);
            if !outcome.sources.is_empty() {
                println!("\nSources:");
                for source in outcome.sources {
                    let info = source.into_info();
                    match info.link {
                        Some(link) => println!("  - {} ({})", info.text, link),
                        None => println!("  - {}", info.text),
                    }
                }
            }
            println!("\nsession: {}", outcome.session_id);
        }
        Commands::Courses => {
            let analytics = rag.get_course_analytics().await?;
            println!("courses: {}", analytics.total_courses);
            for title in analytics.course_titles {
                println!("  - {}", title);
            }
        }
    }

    Ok(())
}

//! # Course RAG
//!
//! Retrieval-augmented question answering over course materials.
//!
//! Course documents are parsed into a course outline and overlapping text
//! chunks, embedded, and stored in a vector store. A question is answered by
//! Claude, which can search the store through tools mid-generation; the
//! answer comes back with the sources it was built from, and the exchange is
//! kept in a bounded per-session history.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Course docs │──▶│ Parse+Chunk  │──▶│ Vector store │
//! │  .txt / .md │   │    +Embed    │   │ memory/SQLite│
//! └─────────────┘   └──────────────┘   └──────┬───────┘
//!                                             │ tools
//!                 ┌──────────┐   ┌────────────┴─┐
//!                 │ HTTP/CLI │──▶│  RagSystem   │──▶ Claude
//!                 └──────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! course-rag ingest ./docs               # parse, chunk, embed, store
//! course-rag query "What is MCP?"        # one-shot answer
//! course-rag serve                       # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | Orchestrator error type |
//! | [`embedding`] | Embedding providers |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | Persistent vector store |
//! | [`ingest`] | Course file discovery |
//! | [`tools`] | Tools offered to the model |
//! | [`generator`] | Claude tool loop |
//! | [`rag`] | Query orchestration and ingestion |
//! | [`server`] | HTTP API |
//!
//! Models, document parsing, chunking, the store and session traits, and
//! the in-memory backends live in the [`course_rag_core`] crate.

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod rag;
pub mod server;
pub mod sqlite_store;
pub mod tools;

pub use course_rag_core;

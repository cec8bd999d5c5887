//! # Course RAG Core
//!
//! Shared, runtime-agnostic logic for Course RAG: data models, course
//! document parsing, chunking, the vector store and session traits, and
//! their in-memory implementations.
//!
//! This crate contains no tokio, sqlx, or network dependencies. Storage and
//! session backends that need them live in the `course-rag` app crate.

pub mod chunk;
pub mod document;
pub mod embedding;
pub mod models;
pub mod session;
pub mod store;

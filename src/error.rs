//! Error type surfaced by the RAG orchestrator.

use thiserror::Error;

/// Failure of a RAG operation, classified by the collaborator that failed.
///
/// Each variant carries the full message chain of the underlying error so
/// the HTTP layer can report it verbatim.
#[derive(Debug, Error)]
pub enum RagError {
    /// The vector store failed while a tool was searching it.
    #[error("{0}")]
    Retrieval(String),

    /// The language model call failed, or the tool loop did not converge.
    #[error("{0}")]
    Generation(String),

    /// The session manager failed.
    #[error("{0}")]
    Session(String),

    /// A course document or folder could not be ingested.
    #[error("{0}")]
    Ingestion(String),
}

impl RagError {
    pub fn retrieval(err: anyhow::Error) -> Self {
        Self::Retrieval(format!("{:#}", err))
    }

    pub fn generation(err: anyhow::Error) -> Self {
        Self::Generation(format!("{:#}", err))
    }

    pub fn session(err: anyhow::Error) -> Self {
        Self::Session(format!("{:#}", err))
    }

    pub fn ingestion(err: anyhow::Error) -> Self {
        Self::Ingestion(format!("{:#}", err))
    }

    /// Short machine-readable name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Retrieval(_) => "retrieval",
            Self::Generation(_) => "generation",
            Self::Session(_) => "session",
            Self::Ingestion(_) => "ingestion",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_chain_preserved() {
        let err = anyhow::anyhow!("connection refused").context("vector store search failed");
        let rag = RagError::retrieval(err);
        assert_eq!(
            rag.to_string(),
            "vector store search failed: connection refused"
        );
        assert_eq!(rag.kind(), "retrieval");
    }

    #[test]
    fn test_plain_message() {
        let rag = RagError::generation(anyhow::anyhow!("Database connection failed"));
        assert_eq!(rag.to_string(), "Database connection failed");
    }
}

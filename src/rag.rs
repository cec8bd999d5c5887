//! RAG orchestration.
//!
//! [`RagSystem`] ties the collaborators together:
//!
//! ```text
//! query ─▶ session ─▶ history ─▶ generator ⇄ tools ─▶ vector store
//!                                    │
//!                         answer + sources ─▶ session exchange
//! ```
//!
//! Every collaborator sits behind a trait ([`VectorStore`],
//! [`SessionManager`], [`Generator`]) so tests can substitute fakes. The
//! HTTP layer depends only on [`RagService`].

use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use course_rag_core::document::{parse_course_document, ChunkParams};
use course_rag_core::models::{Course, CourseAnalytics, CourseChunk, Source};
use course_rag_core::session::{InMemorySessionManager, SessionManager};
use course_rag_core::store::memory::InMemoryVectorStore;
use course_rag_core::store::VectorStore;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::RagError;
use crate::generator::{AnthropicClient, AnthropicGenerator, Generator};
use crate::ingest::scan_course_files;
use crate::sqlite_store::SqliteVectorStore;
use crate::tools::{Tool, ToolRegistry};

/// Answer to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    pub answer: String,
    pub sources: Vec<Source>,
    pub session_id: String,
}

/// What the HTTP layer needs from the RAG system.
#[async_trait]
pub trait RagService: Send + Sync {
    async fn query(&self, query: &str, session_id: Option<&str>)
        -> Result<QueryOutcome, RagError>;

    async fn course_analytics(&self) -> Result<CourseAnalytics, RagError>;
}

pub struct RagSystem {
    store: Arc<dyn VectorStore>,
    sessions: Arc<dyn SessionManager>,
    generator: Arc<dyn Generator>,
    tools: ToolRegistry,
    chunk_params: ChunkParams,
    include_globs: Vec<String>,
}

impl RagSystem {
    /// Assemble a system from its parts, registering the course search and
    /// outline tools over `store`.
    pub fn new(
        store: Arc<dyn VectorStore>,
        sessions: Arc<dyn SessionManager>,
        generator: Arc<dyn Generator>,
        chunk_params: ChunkParams,
    ) -> Self {
        Self {
            tools: ToolRegistry::with_course_tools(store.clone()),
            store,
            sessions,
            generator,
            chunk_params,
            include_globs: vec!["**/*.txt".to_string(), "**/*.md".to_string()],
        }
    }

    /// Build the production system described by `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let max_results = config.retrieval.max_results;

        let store: Arc<dyn VectorStore> = match config.store.backend.as_str() {
            "sqlite" => Arc::new(
                SqliteVectorStore::open(&config.store.path, embedder, max_results).await?,
            ),
            _ => Arc::new(InMemoryVectorStore::new(embedder, max_results)),
        };
        let sessions = Arc::new(InMemorySessionManager::new(config.session.max_history));
        let client = AnthropicClient::from_env(&config.generator)?;
        let generator = Arc::new(AnthropicGenerator::new(client, &config.generator));

        Ok(
            Self::new(store, sessions, generator, config.chunking.params())
                .with_include_globs(config.ingest.include_globs.clone()),
        )
    }

    pub fn with_include_globs(mut self, include_globs: Vec<String>) -> Self {
        self.include_globs = include_globs;
        self
    }

    /// Offer an additional tool to the model.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.register(tool);
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Answer `query`, creating a session when `session_id` is `None`.
    pub async fn query(
        &self,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<QueryOutcome, RagError> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => self
                .sessions
                .create_session()
                .await
                .map_err(RagError::session)?,
        };
        let history = self
            .sessions
            .get_history(&session_id)
            .await
            .map_err(RagError::session)?;

        let tools = self.tools.manager();
        let prompt = format!("Answer this question about course materials: {}", query);
        let answer = self
            .generator
            .generate_response(&prompt, &history, Some(&tools))
            .await
            .map_err(classify_generation_error)?;
        let sources = tools.sources().map_err(RagError::generation)?;

        self.sessions
            .add_exchange(&session_id, query, &answer)
            .await
            .map_err(RagError::session)?;

        tracing::info!(
            session_id = %session_id,
            history = history.len(),
            sources = sources.len(),
            "query answered"
        );
        Ok(QueryOutcome {
            answer,
            sources,
            session_id,
        })
    }

    pub async fn get_course_analytics(&self) -> Result<CourseAnalytics, RagError> {
        self.store
            .get_course_analytics()
            .await
            .map_err(RagError::retrieval)
    }

    /// Parse one course file and store it, replacing a course with the same
    /// title. Returns the course and the number of chunks stored.
    pub async fn add_course_document(&self, path: &Path) -> Result<(Course, usize), RagError> {
        let (course, chunks) = self.parse_file(path).await.map_err(RagError::ingestion)?;
        self.store_course(&course, &chunks)
            .await
            .map_err(RagError::ingestion)?;
        Ok((course, chunks.len()))
    }

    /// Ingest every course file under `folder`.
    ///
    /// Courses whose title is already stored are skipped, unless
    /// `clear_existing` empties the store first. Files that fail to parse
    /// are logged and skipped; store failures abort. Returns
    /// `(courses_added, chunks_added)`.
    pub async fn add_course_folder(
        &self,
        folder: &Path,
        clear_existing: bool,
    ) -> Result<(usize, usize), RagError> {
        if !folder.is_dir() {
            tracing::warn!(folder = %folder.display(), "course folder does not exist");
            return Ok((0, 0));
        }
        if clear_existing {
            tracing::info!("clearing existing course data");
            self.store.clear().await.map_err(RagError::ingestion)?;
        }

        let files =
            scan_course_files(folder, &self.include_globs).map_err(RagError::ingestion)?;
        let mut known: HashSet<String> = self
            .store
            .get_course_analytics()
            .await
            .map_err(RagError::ingestion)?
            .course_titles
            .into_iter()
            .collect();

        let mut courses_added = 0;
        let mut chunks_added = 0;
        for path in files {
            let (course, chunks) = match self.parse_file(&path).await {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %format!("{:#}", e), "skipping course file");
                    continue;
                }
            };
            if known.contains(&course.title) {
                tracing::debug!(title = %course.title, "course already stored, skipping");
                continue;
            }

            self.store_course(&course, &chunks)
                .await
                .map_err(RagError::ingestion)?;
            tracing::info!(title = %course.title, chunks = chunks.len(), "added course");
            courses_added += 1;
            chunks_added += chunks.len();
            known.insert(course.title);
        }

        Ok((courses_added, chunks_added))
    }

    async fn parse_file(&self, path: &Path) -> anyhow::Result<(Course, Vec<CourseChunk>)> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let stem = path.file_stem().map(|s| s.to_string_lossy().to_string());
        let parsed = parse_course_document(&text, stem.as_deref(), self.chunk_params)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok((parsed.course, parsed.chunks))
    }

    async fn store_course(&self, course: &Course, chunks: &[CourseChunk]) -> anyhow::Result<()> {
        self.store.replace_course(course, chunks).await
    }
}

/// Errors tagged as retrieval failures by a tool stay retrieval failures;
/// everything else from the generator is a generation failure.
fn classify_generation_error(err: anyhow::Error) -> RagError {
    let from_store = err
        .chain()
        .any(|e| matches!(e.downcast_ref::<RagError>(), Some(RagError::Retrieval(_))));
    if from_store {
        RagError::retrieval(err)
    } else {
        RagError::generation(err)
    }
}

#[async_trait]
impl RagService for RagSystem {
    async fn query(
        &self,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<QueryOutcome, RagError> {
        RagSystem::query(self, query, session_id).await
    }

    async fn course_analytics(&self) -> Result<CourseAnalytics, RagError> {
        self.get_course_analytics().await
    }
}

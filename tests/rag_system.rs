//! Orchestrator tests with fake session, generator and store collaborators.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use course_rag::course_rag_core::document::ChunkParams;
use course_rag::course_rag_core::embedding::HashingEmbedder;
use course_rag::course_rag_core::models::{
    Course, CourseAnalytics, CourseChunk, Exchange, ScoredChunk,
};
use course_rag::course_rag_core::session::{InMemorySessionManager, SessionManager};
use course_rag::course_rag_core::store::memory::InMemoryVectorStore;
use course_rag::course_rag_core::store::VectorStore;
use course_rag::error::RagError;
use course_rag::generator::Generator;
use course_rag::rag::RagSystem;
use course_rag::tools::ToolManager;

const COURSE_ONE: &str = "\
Course Title: Building Towards Computer Use with Anthropic
Course Link: https://www.deeplearning.ai/short-courses/building-toward-computer-use-with-anthropic/
Course Instructor: Colt Steele

Lesson 0: Introduction
Lesson Link: https://learn.deeplearning.ai/courses/building-toward-computer-use-with-anthropic/lesson/a6k0z/introduction
Welcome to Building Toward Computer Use with Anthropic. Computer use lets a model operate a desktop.

Lesson 1: API Basics
Lesson Link: https://learn.deeplearning.ai/courses/building-toward-computer-use-with-anthropic/lesson/gt1mz/api-basics
In this lesson you make your first request to the messages API with the Python SDK.
";

const COURSE_TWO: &str = "\
Course Title: MCP: Build Rich-Context AI Apps with Anthropic
Course Instructor: Elie Schoppik

Lesson 1: Why MCP
The Model Context Protocol standardizes how applications give context to language models.
";

/// Session manager that counts `create_session` calls.
struct CountingSessions {
    inner: InMemorySessionManager,
    created: AtomicUsize,
    fail: bool,
}

impl CountingSessions {
    fn new(max_history: usize) -> Self {
        Self {
            inner: InMemorySessionManager::new(max_history),
            created: AtomicUsize::new(0),
            fail: false,
        }
    }
}

#[async_trait]
impl SessionManager for CountingSessions {
    async fn create_session(&self) -> Result<String> {
        if self.fail {
            return Err(anyhow!("session backend unavailable"));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.inner.create_session().await
    }
    async fn add_exchange(&self, session_id: &str, query: &str, answer: &str) -> Result<()> {
        self.inner.add_exchange(session_id, query, answer).await
    }
    async fn get_history(&self, session_id: &str) -> Result<Vec<Exchange>> {
        if self.fail {
            return Err(anyhow!("session backend unavailable"));
        }
        self.inner.get_history(session_id).await
    }
    async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.inner.clear_session(session_id).await
    }
}

/// Generator that optionally searches once, then answers with a counter.
#[derive(Default)]
struct FakeGenerator {
    search: Option<String>,
    fail: bool,
    seen: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate_response(
        &self,
        query: &str,
        history: &[Exchange],
        tools: Option<&ToolManager>,
    ) -> Result<String> {
        if self.fail {
            return Err(anyhow!("model overloaded"));
        }
        if let (Some(search), Some(tools)) = (&self.search, tools) {
            tools
                .execute("search_course_content", json!({ "query": search }))
                .await?;
        }
        let mut seen = self.seen.lock().unwrap();
        seen.push((query.to_string(), history.len()));
        Ok(format!("answer {}", seen.len()))
    }
}

fn memory_store() -> Arc<dyn VectorStore> {
    Arc::new(InMemoryVectorStore::new(
        Arc::new(HashingEmbedder::default()),
        5,
    ))
}

fn system(
    store: Arc<dyn VectorStore>,
    sessions: Arc<CountingSessions>,
    generator: Arc<FakeGenerator>,
) -> RagSystem {
    RagSystem::new(store, sessions, generator, ChunkParams::default())
}

fn course_dir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("course1_script.txt"), COURSE_ONE).unwrap();
    fs::write(tmp.path().join("course2_script.txt"), COURSE_TWO).unwrap();
    tmp
}

#[tokio::test]
async fn test_query_without_session_creates_exactly_one() {
    let sessions = Arc::new(CountingSessions::new(2));
    let generator = Arc::new(FakeGenerator::default());
    let rag = system(memory_store(), sessions.clone(), generator.clone());

    let outcome = rag.query("What is MCP?", None).await.unwrap();
    assert_eq!(sessions.created.load(Ordering::SeqCst), 1);
    assert!(!outcome.session_id.is_empty());
    assert_eq!(outcome.answer, "answer 1");

    let history = sessions.get_history(&outcome.session_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].query, "What is MCP?");
    assert_eq!(history[0].answer, "answer 1");

    assert_eq!(
        generator.seen.lock().unwrap()[0].0,
        "Answer this question about course materials: What is MCP?"
    );
}

#[tokio::test]
async fn test_query_with_session_reuses_it() {
    let sessions = Arc::new(CountingSessions::new(2));
    let rag = system(
        memory_store(),
        sessions.clone(),
        Arc::new(FakeGenerator::default()),
    );

    let outcome = rag.query("q", Some("my-session")).await.unwrap();
    assert_eq!(outcome.session_id, "my-session");
    assert_eq!(sessions.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_history_passed_to_generator_is_bounded() {
    let sessions = Arc::new(CountingSessions::new(2));
    let generator = Arc::new(FakeGenerator::default());
    let rag = system(memory_store(), sessions.clone(), generator.clone());

    for i in 0..4 {
        rag.query(&format!("q{}", i), Some("s")).await.unwrap();
    }
    let history_lens: Vec<usize> = generator
        .seen
        .lock()
        .unwrap()
        .iter()
        .map(|(_, n)| *n)
        .collect();
    assert_eq!(history_lens, vec![0, 1, 2, 2]);

    let history = sessions.get_history("s").await.unwrap();
    let queries: Vec<&str> = history.iter().map(|e| e.query.as_str()).collect();
    assert_eq!(queries, vec!["q2", "q3"]);
}

#[tokio::test]
async fn test_sources_come_from_executed_tools() {
    let tmp = course_dir();
    let generator = Arc::new(FakeGenerator {
        search: Some("Model Context Protocol".into()),
        ..FakeGenerator::default()
    });
    let rag = system(
        memory_store(),
        Arc::new(CountingSessions::new(2)),
        generator,
    );
    rag.add_course_folder(tmp.path(), false).await.unwrap();

    let outcome = rag.query("Explain MCP", None).await.unwrap();
    assert!(!outcome.sources.is_empty());
    assert_eq!(
        outcome.sources[0].text(),
        "MCP: Build Rich-Context AI Apps with Anthropic - Lesson 1"
    );

    // no tool calls, no sources, even right after a query that had some
    let quiet = system(
        rag.store().clone(),
        Arc::new(CountingSessions::new(2)),
        Arc::new(FakeGenerator::default()),
    );
    assert!(quiet.query("hello", None).await.unwrap().sources.is_empty());
}

#[tokio::test]
async fn test_generation_failure_records_nothing() {
    let sessions = Arc::new(CountingSessions::new(2));
    let rag = system(
        memory_store(),
        sessions.clone(),
        Arc::new(FakeGenerator {
            fail: true,
            ..FakeGenerator::default()
        }),
    );

    let err = rag.query("q", Some("s")).await.unwrap_err();
    assert!(matches!(err, RagError::Generation(_)));
    assert_eq!(err.to_string(), "model overloaded");
    assert!(sessions.get_history("s").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_session_failure() {
    let mut sessions = CountingSessions::new(2);
    sessions.fail = true;
    let rag = system(
        memory_store(),
        Arc::new(sessions),
        Arc::new(FakeGenerator::default()),
    );
    let err = rag.query("q", None).await.unwrap_err();
    assert!(matches!(err, RagError::Session(_)));
}

struct OfflineStore;

#[async_trait]
impl VectorStore for OfflineStore {
    async fn search_content(
        &self,
        _query: &str,
        _course_filter: Option<&str>,
        _lesson_filter: Option<u32>,
    ) -> Result<Vec<ScoredChunk>> {
        Err(anyhow!("vector store offline"))
    }
    async fn search_courses(&self, _name_fragment: &str) -> Result<Vec<Course>> {
        Err(anyhow!("vector store offline"))
    }
    async fn add_course_metadata(&self, _course: &Course) -> Result<()> {
        Err(anyhow!("vector store offline"))
    }
    async fn add_course_content(&self, _chunks: &[CourseChunk]) -> Result<()> {
        Err(anyhow!("vector store offline"))
    }
    async fn replace_course(&self, _course: &Course, _chunks: &[CourseChunk]) -> Result<()> {
        Err(anyhow!("vector store offline"))
    }
    async fn get_course_analytics(&self) -> Result<CourseAnalytics> {
        Err(anyhow!("vector store offline"))
    }
    async fn get_course(&self, _title: &str) -> Result<Option<Course>> {
        Err(anyhow!("vector store offline"))
    }
    async fn clear(&self) -> Result<()> {
        Err(anyhow!("vector store offline"))
    }
}

#[tokio::test]
async fn test_store_failure_inside_tool_is_retrieval_error() {
    let sessions = Arc::new(CountingSessions::new(2));
    let rag = system(
        Arc::new(OfflineStore),
        sessions.clone(),
        Arc::new(FakeGenerator {
            search: Some("anything".into()),
            ..FakeGenerator::default()
        }),
    );

    let err = rag.query("q", Some("s")).await.unwrap_err();
    assert!(matches!(err, RagError::Retrieval(_)), "got {:?}", err);
    assert!(err.to_string().contains("vector store offline"));
    assert!(sessions.get_history("s").await.unwrap().is_empty());

    let err = rag.get_course_analytics().await.unwrap_err();
    assert!(matches!(err, RagError::Retrieval(_)));
}

#[tokio::test]
async fn test_add_course_folder_is_idempotent() {
    let tmp = course_dir();
    fs::write(tmp.path().join("broken.txt"), [0xffu8, 0xfe, 0x00]).unwrap();
    let rag = system(
        memory_store(),
        Arc::new(CountingSessions::new(2)),
        Arc::new(FakeGenerator::default()),
    );

    let (courses, chunks) = rag.add_course_folder(tmp.path(), false).await.unwrap();
    assert_eq!(courses, 2);
    assert!(chunks >= 3);

    let analytics = rag.get_course_analytics().await.unwrap();
    assert_eq!(analytics.total_courses, 2);
    assert!(analytics
        .course_titles
        .contains(&"Building Towards Computer Use with Anthropic".to_string()));

    assert_eq!(rag.add_course_folder(tmp.path(), false).await.unwrap(), (0, 0));
    assert_eq!(
        rag.add_course_folder(tmp.path(), true).await.unwrap(),
        (courses, chunks)
    );
    assert_eq!(rag.get_course_analytics().await.unwrap().total_courses, 2);
}

#[tokio::test]
async fn test_add_course_folder_missing_folder() {
    let rag = system(
        memory_store(),
        Arc::new(CountingSessions::new(2)),
        Arc::new(FakeGenerator::default()),
    );
    let result = rag
        .add_course_folder(std::path::Path::new("/no/such/folder"), false)
        .await
        .unwrap();
    assert_eq!(result, (0, 0));
}

#[tokio::test]
async fn test_add_course_document_parses_metadata() {
    let tmp = course_dir();
    let rag = system(
        memory_store(),
        Arc::new(CountingSessions::new(2)),
        Arc::new(FakeGenerator::default()),
    );

    let (course, chunks) = rag
        .add_course_document(&tmp.path().join("course1_script.txt"))
        .await
        .unwrap();
    assert_eq!(course.title, "Building Towards Computer Use with Anthropic");
    assert_eq!(course.instructor.as_deref(), Some("Colt Steele"));
    assert_eq!(course.lessons.len(), 2);
    assert_eq!(chunks, 2);

    let stored = rag
        .store()
        .get_course("Building Towards Computer Use with Anthropic")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, course);

    let err = rag
        .add_course_document(&tmp.path().join("missing.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Ingestion(_)));
}

#[tokio::test]
async fn test_reingesting_document_drops_chunks_of_removed_lessons() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("widgets.txt");
    fs::write(
        &path,
        "Course Title: Widgets 101\n\nLesson 1: Old\nOld lesson text about widgets.\n",
    )
    .unwrap();
    let rag = system(
        memory_store(),
        Arc::new(CountingSessions::new(2)),
        Arc::new(FakeGenerator::default()),
    );
    rag.add_course_document(&path).await.unwrap();
    assert_eq!(
        rag.store().search_content("widgets", None, None).await.unwrap().len(),
        1
    );

    fs::write(&path, "Course Title: Widgets 101\n\nLesson 2: New\n").unwrap();
    let (course, chunks) = rag.add_course_document(&path).await.unwrap();
    assert_eq!(chunks, 0);
    assert_eq!(course.lessons.len(), 1);
    assert_eq!(course.lessons[0].lesson_number, 2);

    assert!(rag
        .store()
        .search_content("widgets", None, None)
        .await
        .unwrap()
        .is_empty());
}

//! Tools the language model can call while answering.
//!
//! A [`Tool`] has a name, a description and a JSON Schema for its input,
//! which are sent to the model as tool definitions. The built-in tools
//! search the [`VectorStore`]:
//!
//! | Tool | Description |
//! |------|-------------|
//! | `search_course_content` | [`CourseSearchTool`]: semantic search over lesson content |
//! | `get_course_outline` | [`CourseOutlineTool`]: title, link, instructor and lesson list |
//!
//! Tools live in a long-lived [`ToolRegistry`]. Each query gets a fresh
//! [`ToolManager`] from [`ToolRegistry::manager`], which dispatches calls by
//! name and collects the sources of every executed tool, so sources never
//! leak between concurrent queries.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use course_rag_core::models::{Course, ScoredChunk, Source};
use course_rag_core::store::VectorStore;

use crate::error::RagError;

/// Result of one tool execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    /// Text handed back to the model.
    pub content: String,
    /// Attribution for the content.
    pub sources: Vec<Source>,
    /// The call was malformed; the model should correct itself.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sources: Vec::new(),
            is_error: true,
        }
    }
}

/// Tool definition as sent to the model.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A callable tool.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use course_rag::tools::{Tool, ToolOutput};
/// use serde_json::{json, Value};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Tool for Echo {
///     fn name(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Repeat the input" }
///     fn input_schema(&self) -> Value {
///         json!({ "type": "object", "properties": { "text": { "type": "string" } } })
///     }
///     async fn execute(&self, params: Value) -> anyhow::Result<ToolOutput> {
///         Ok(ToolOutput::text(params["text"].as_str().unwrap_or_default()))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call this tool.
    fn name(&self) -> &str;

    /// What the tool does, written for the model.
    fn description(&self) -> &str;

    /// JSON Schema of the input object.
    fn input_schema(&self) -> Value;

    /// Run the tool.
    ///
    /// Return `Ok` with [`ToolOutput::error`] for bad input the model can
    /// fix; return `Err` for failures of the underlying system.
    async fn execute(&self, params: Value) -> Result<ToolOutput>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Long-lived set of registered tools, in registration order.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the course search and outline tools over `store`.
    pub fn with_course_tools(store: Arc<dyn VectorStore>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CourseSearchTool::new(store.clone())));
        registry.register(Arc::new(CourseOutlineTool::new(store)));
        registry
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Fresh per-query dispatcher with an empty source list.
    pub fn manager(&self) -> ToolManager {
        ToolManager {
            tools: self.tools.clone(),
            sources: Mutex::new(Vec::new()),
        }
    }
}

/// Per-query tool dispatcher and source accumulator.
pub struct ToolManager {
    tools: Vec<Arc<dyn Tool>>,
    sources: Mutex<Vec<Source>>,
}

impl ToolManager {
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute `name` with `params`.
    ///
    /// Unknown names yield an error output for the model rather than an
    /// `Err`. Sources of the output are appended to this manager, skipping
    /// ones already collected.
    pub async fn execute(&self, name: &str, params: Value) -> Result<ToolOutput> {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            tracing::warn!(tool = name, "model requested unknown tool");
            return Ok(ToolOutput::error(format!("Tool '{}' not found", name)));
        };

        tracing::debug!(tool = name, %params, "executing tool");
        let output = tool.execute(params).await?;

        let mut sources = self
            .sources
            .lock()
            .map_err(|_| anyhow!("tool source list lock poisoned"))?;
        for source in &output.sources {
            if !sources.contains(source) {
                sources.push(source.clone());
            }
        }
        Ok(output)
    }

    /// Sources collected so far, in execution order.
    pub fn sources(&self) -> Result<Vec<Source>> {
        self.sources
            .lock()
            .map(|s| s.clone())
            .map_err(|_| anyhow!("tool source list lock poisoned"))
    }
}

/// Run a store operation, tagging failures as retrieval errors.
async fn retrieval<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    fut.await.map_err(|e| anyhow::Error::new(RagError::retrieval(e)))
}

/// Resolve a possibly partial course name to the best-matching title.
async fn resolve_course(store: &dyn VectorStore, name: &str) -> Result<Option<Course>> {
    let matches = retrieval(store.search_courses(name)).await?;
    Ok(matches.into_iter().next())
}

fn parse_params<T: for<'de> Deserialize<'de>>(tool: &str, params: Value) -> Result<T, ToolOutput> {
    serde_json::from_value(params)
        .map_err(|e| ToolOutput::error(format!("Invalid input for {}: {}", tool, e)))
}

// ============ search_course_content ============

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    course_name: Option<String>,
    #[serde(default)]
    lesson_number: Option<u32>,
}

/// Semantic search over course content with optional course and lesson
/// filters.
pub struct CourseSearchTool {
    store: Arc<dyn VectorStore>,
}

impl CourseSearchTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    async fn format_results(&self, results: &[ScoredChunk]) -> Result<ToolOutput> {
        let mut courses: HashMap<String, Option<Course>> = HashMap::new();
        let mut blocks = Vec::with_capacity(results.len());
        let mut sources = Vec::with_capacity(results.len());

        for hit in results {
            let title = &hit.chunk.course_title;
            if !courses.contains_key(title) {
                let course = retrieval(self.store.get_course(title)).await?;
                courses.insert(title.clone(), course);
            }
            let course = courses.get(title).and_then(|c| c.as_ref());

            let (label, link) = match hit.chunk.lesson_number {
                Some(n) => (
                    format!("{} - Lesson {}", title, n),
                    course
                        .and_then(|c| c.lesson(n))
                        .and_then(|l| l.lesson_link.clone())
                        .or_else(|| course.and_then(|c| c.course_link.clone())),
                ),
                None => (title.clone(), course.and_then(|c| c.course_link.clone())),
            };

            blocks.push(format!("[{}]\n{}", label, hit.chunk.text));
            sources.push(Source::linked(label, link));
        }

        Ok(ToolOutput {
            content: blocks.join("\n\n"),
            sources,
            is_error: false,
        })
    }
}

#[async_trait]
impl Tool for CourseSearchTool {
    fn name(&self) -> &str {
        "search_course_content"
    }

    fn description(&self) -> &str {
        "Search course materials with smart course name matching and lesson filtering"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for in the course content"
                },
                "course_name": {
                    "type": "string",
                    "description": "Course title (partial matches work, e.g. 'MCP', 'Introduction')"
                },
                "lesson_number": {
                    "type": "integer",
                    "description": "Specific lesson number to search within (e.g. 1, 2, 3)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let params: SearchParams = match parse_params(self.name(), params) {
            Ok(p) => p,
            Err(output) => return Ok(output),
        };

        let course = match params.course_name.as_deref() {
            Some(name) => match resolve_course(self.store.as_ref(), name).await? {
                Some(course) => Some(course),
                None => {
                    return Ok(ToolOutput::text(format!(
                        "No course found matching '{}'",
                        name
                    )))
                }
            },
            None => None,
        };
        let course_title = course.as_ref().map(|c| c.title.as_str());

        let results = retrieval(self.store.search_content(
            &params.query,
            course_title,
            params.lesson_number,
        ))
        .await
        .context("course content search failed")?;

        if results.is_empty() {
            let mut message = "No relevant content found".to_string();
            if let Some(title) = course_title {
                message.push_str(&format!(" in course '{}'", title));
            }
            if let Some(n) = params.lesson_number {
                message.push_str(&format!(" in lesson {}", n));
            }
            message.push('.');
            return Ok(ToolOutput::text(message));
        }

        self.format_results(&results).await
    }
}

// ============ get_course_outline ============

#[derive(Debug, Deserialize)]
struct OutlineParams {
    course_name: String,
}

/// Course outline lookup: title, link, instructor and lesson list.
pub struct CourseOutlineTool {
    store: Arc<dyn VectorStore>,
}

impl CourseOutlineTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

fn format_outline(course: &Course) -> String {
    let mut out = format!("Course: {}\n", course.title);
    if let Some(link) = &course.course_link {
        out.push_str(&format!("Link: {}\n", link));
    }
    if let Some(instructor) = &course.instructor {
        out.push_str(&format!("Instructor: {}\n", instructor));
    }
    out.push_str(&format!("Lessons ({}):", course.lessons.len()));
    for lesson in &course.lessons {
        out.push_str(&format!("\n{}. {}", lesson.lesson_number, lesson.title));
    }
    out
}

#[async_trait]
impl Tool for CourseOutlineTool {
    fn name(&self) -> &str {
        "get_course_outline"
    }

    fn description(&self) -> &str {
        "Get the outline of a course: title, link, instructor and the numbered list of lessons"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "course_name": {
                    "type": "string",
                    "description": "Course title (partial matches work)"
                }
            },
            "required": ["course_name"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput> {
        let params: OutlineParams = match parse_params(self.name(), params) {
            Ok(p) => p,
            Err(output) => return Ok(output),
        };

        let Some(course) = resolve_course(self.store.as_ref(), &params.course_name).await? else {
            return Ok(ToolOutput::text(format!(
                "No course found matching '{}'",
                params.course_name
            )));
        };

        Ok(ToolOutput {
            content: format_outline(&course),
            sources: vec![Source::linked(
                course.title.clone(),
                course.course_link.clone(),
            )],
            is_error: false,
        })
    }
}

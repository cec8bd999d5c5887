//! Vector store abstraction for Course RAG.
//!
//! The [`VectorStore`] trait defines the operations the RAG pipeline needs
//! from a store: content search, course-name search, ingestion of course
//! metadata and chunks, and analytics. Backends are pluggable (in-memory
//! here, SQLite in the app crate).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Course, CourseAnalytics, CourseChunk, ScoredChunk};

/// Abstract vector store for course content.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`search_content`](VectorStore::search_content) | Rank chunks by similarity to a query |
/// | [`search_courses`](VectorStore::search_courses) | Find courses by (partial) name |
/// | [`add_course_metadata`](VectorStore::add_course_metadata) | Insert or replace a course |
/// | [`add_course_content`](VectorStore::add_course_content) | Replace chunk sets per course |
/// | [`replace_course`](VectorStore::replace_course) | Swap in a course and its full chunk set |
/// | [`get_course_analytics`](VectorStore::get_course_analytics) | Count and list course titles |
/// | [`get_course`](VectorStore::get_course) | Fetch one course by exact title |
/// | [`clear`](VectorStore::clear) | Drop all courses and chunks |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Rank chunks by cosine similarity to `query`, best first.
    ///
    /// Ties keep insertion order. Returns at most the store's configured
    /// result limit, and an empty vector when nothing is stored or nothing
    /// passes the filters.
    async fn search_content(
        &self,
        query: &str,
        course_filter: Option<&str>,
        lesson_filter: Option<u32>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Find courses whose title matches `name_fragment`, best first.
    async fn search_courses(&self, name_fragment: &str) -> Result<Vec<Course>>;

    /// Insert a course, replacing any existing course with the same title.
    async fn add_course_metadata(&self, course: &Course) -> Result<()>;

    /// Store chunks. For every course title present in `chunks`, the
    /// title's previous chunk set is replaced atomically.
    ///
    /// Fails if a chunk references a course that is not known to the store.
    async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<()>;

    /// Store `course` and make `chunks` its complete chunk set in one step.
    ///
    /// Chunks previously stored under the course's title are dropped even
    /// when `chunks` is empty. Fails if a chunk belongs to another course.
    async fn replace_course(&self, course: &Course, chunks: &[CourseChunk]) -> Result<()>;

    /// Count and list the distinct course titles.
    async fn get_course_analytics(&self) -> Result<CourseAnalytics>;

    /// Fetch a course by exact title.
    async fn get_course(&self, title: &str) -> Result<Option<Course>>;

    /// Remove every course and chunk.
    async fn clear(&self) -> Result<()>;
}

/// Reject chunks that do not belong to `course`.
pub fn ensure_chunks_belong(course: &Course, chunks: &[CourseChunk]) -> Result<()> {
    if let Some(stray) = chunks.iter().find(|c| c.course_title != course.title) {
        anyhow::bail!(
            "chunk of course '{}' passed while replacing course '{}'",
            stray.course_title,
            course.title
        );
    }
    Ok(())
}

/// Score `candidates` against `query_vec` and return the best `limit`.
///
/// `candidates` must be in insertion order: the sort is stable, so equal
/// scores keep that order.
pub fn rank_by_similarity<T>(
    query_vec: &[f32],
    candidates: impl IntoIterator<Item = (T, Vec<f32>)>,
    limit: usize,
) -> Vec<(T, f32)> {
    let mut scored: Vec<(T, f32)> = candidates
        .into_iter()
        .map(|(item, vec)| {
            let score = cosine_similarity(query_vec, &vec);
            (item, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// Order courses for a name search: titles containing the fragment
/// (case-insensitive) first, then the rest by title similarity.
pub fn rank_courses(
    name_fragment: &str,
    query_vec: &[f32],
    courses: impl IntoIterator<Item = (Course, Vec<f32>)>,
    limit: usize,
) -> Vec<Course> {
    let needle = name_fragment.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let scored = courses.into_iter().map(|(course, vec)| {
        let boost = if course.title.to_lowercase().contains(&needle) {
            2.0
        } else {
            0.0
        };
        let score = boost + cosine_similarity(query_vec, &vec);
        (course, score)
    });
    let mut scored: Vec<(Course, f32)> = scored.collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored.into_iter().map(|(c, _)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let q = vec![1.0, 0.0];
        let ranked = rank_by_similarity(
            &q,
            vec![
                ("first", vec![1.0, 0.0]),
                ("low", vec![0.0, 1.0]),
                ("second", vec![2.0, 0.0]),
            ],
            10,
        );
        let order: Vec<&str> = ranked.iter().map(|(n, _)| *n).collect();
        assert_eq!(order, vec!["first", "second", "low"]);
    }

    #[test]
    fn test_rank_truncates() {
        let q = vec![1.0];
        let ranked = rank_by_similarity(&q, (0..10).map(|i| (i, vec![1.0])), 3);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0, 0);
    }

    #[test]
    fn test_rank_courses_substring_first() {
        let course = |t: &str| Course {
            title: t.to_string(),
            instructor: None,
            course_link: None,
            lessons: vec![],
        };
        let q = vec![1.0, 0.0];
        let ranked = rank_courses(
            "mcp",
            &q,
            vec![
                (course("Prompt Compression"), vec![1.0, 0.0]),
                (course("MCP: Build Rich-Context AI Apps"), vec![0.0, 1.0]),
            ],
            5,
        );
        assert_eq!(ranked[0].title, "MCP: Build Rich-Context AI Apps");
        assert!(rank_courses("  ", &q, vec![(course("x"), vec![1.0, 0.0])], 5).is_empty());
    }
}

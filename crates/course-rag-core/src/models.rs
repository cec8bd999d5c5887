//! Core data models used throughout Course RAG.
//!
//! These types represent the courses, chunks, sources, and session
//! exchanges that flow through the ingestion and query pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lesson within a [`Course`]. Lesson numbers are unique per course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub lesson_number: u32,
    pub title: String,
    pub lesson_link: Option<String>,
}

/// Course metadata, keyed by `title` for all downstream references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub title: String,
    pub instructor: Option<String>,
    pub course_link: Option<String>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

impl Course {
    pub fn lesson(&self, lesson_number: u32) -> Option<&Lesson> {
        self.lessons
            .iter()
            .find(|l| l.lesson_number == lesson_number)
    }

    /// Returns the first duplicated lesson number, if any.
    pub fn duplicate_lesson(&self) -> Option<u32> {
        let mut seen = std::collections::HashSet::new();
        self.lessons
            .iter()
            .map(|l| l.lesson_number)
            .find(|n| !seen.insert(*n))
    }
}

/// A span of course text stored and indexed by the vector store.
///
/// `lesson_number` is `None` for course-level text that precedes the
/// first lesson marker. `chunk_index` is contiguous per course and lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseChunk {
    pub course_title: String,
    pub lesson_number: Option<u32>,
    pub chunk_index: u32,
    pub text: String,
}

/// A chunk returned from content search with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: CourseChunk,
    pub score: f32,
}

/// Attribution for part of an answer.
///
/// Both shapes ever produced by tools are accepted: a bare string, and a
/// structured `{text, link}` object. Use [`Source::into_info`] to get the
/// wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Plain(String),
    Linked { text: String, link: Option<String> },
}

/// Wire form of a [`Source`]: `link` is `null` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub text: String,
    pub link: Option<String>,
}

impl Source {
    pub fn linked(text: impl Into<String>, link: Option<String>) -> Self {
        Source::Linked {
            text: text.into(),
            link,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Source::Plain(text) => text,
            Source::Linked { text, .. } => text,
        }
    }

    pub fn into_info(self) -> SourceInfo {
        match self {
            Source::Plain(text) => SourceInfo { text, link: None },
            Source::Linked { text, link } => SourceInfo { text, link },
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Source::Plain(s.to_string())
    }
}

/// One query/answer pair in a session's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub query: String,
    pub answer: String,
    pub at: DateTime<Utc>,
}

impl Exchange {
    pub fn new(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            at: Utc::now(),
        }
    }
}

/// Aggregate view over the courses known to a vector store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseAnalytics {
    pub total_courses: usize,
    pub course_titles: Vec<String>,
}

impl CourseAnalytics {
    pub fn from_titles(course_titles: Vec<String>) -> Self {
        Self {
            total_courses: course_titles.len(),
            course_titles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_source_normalizes_to_null_link() {
        let info = Source::Plain("String source 1".into()).into_info();
        assert_eq!(info.text, "String source 1");
        assert_eq!(info.link, None);
    }

    #[test]
    fn test_linked_source_preserved() {
        let info = Source::linked("Source with link", Some("https://example.com/page1".into()))
            .into_info();
        assert_eq!(info.text, "Source with link");
        assert_eq!(info.link.as_deref(), Some("https://example.com/page1"));
    }

    #[test]
    fn test_source_accepts_both_json_shapes() {
        let sources: Vec<Source> = serde_json::from_value(serde_json::json!([
            "legacy",
            { "text": "structured", "link": "https://example.com" },
            { "text": "no link", "link": null }
        ]))
        .unwrap();

        assert_eq!(sources[0], Source::Plain("legacy".into()));
        assert_eq!(
            sources[1],
            Source::linked("structured", Some("https://example.com".into()))
        );
        assert_eq!(sources[2], Source::linked("no link", None));
    }

    #[test]
    fn test_duplicate_lesson_detected() {
        let course = Course {
            title: "T".into(),
            instructor: None,
            course_link: None,
            lessons: vec![
                Lesson { lesson_number: 1, title: "a".into(), lesson_link: None },
                Lesson { lesson_number: 1, title: "b".into(), lesson_link: None },
            ],
        };
        assert_eq!(course.duplicate_lesson(), Some(1));
    }
}

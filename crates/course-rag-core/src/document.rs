//! Course document parsing.
//!
//! Turns the text of a course document into [`Course`] metadata and a list
//! of [`CourseChunk`]s ready for the vector store.
//!
//! # Format
//!
//! ```text
//! Course Title: Building Towards Computer Use
//! Course Link: https://example.com/course
//! Course Instructor: Colt Steele
//!
//! Lesson 0: Introduction
//! Lesson Link: https://example.com/lesson0
//! Welcome to the course...
//!
//! Lesson 1: Getting Started
//! ...
//! ```
//!
//! Header lines may appear in any order before the first lesson marker.
//! The short forms `Course:` and `Instructor:` are accepted too. When no
//! lesson marker is present, all remaining text becomes course-level
//! content with no lesson number.

use anyhow::{bail, Result};

use crate::chunk::chunk_text;
use crate::models::{Course, CourseChunk, Lesson};

/// Chunking parameters for [`parse_course_document`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

/// A parsed course document.
#[derive(Debug, Clone)]
pub struct ParsedCourse {
    pub course: Course,
    pub chunks: Vec<CourseChunk>,
}

struct LessonBlock {
    number: u32,
    title: String,
    link: Option<String>,
    body: Vec<String>,
}

/// Parse a course document into metadata and chunks.
///
/// `fallback_title` is used when the document has no title header
/// (typically the file stem). Fails if no title can be determined.
pub fn parse_course_document(
    text: &str,
    fallback_title: Option<&str>,
    params: ChunkParams,
) -> Result<ParsedCourse> {
    let mut title: Option<String> = None;
    let mut instructor: Option<String> = None;
    let mut course_link: Option<String> = None;
    let mut preamble: Vec<String> = Vec::new();
    let mut blocks: Vec<LessonBlock> = Vec::new();

    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();

        if let Some((number, lesson_title)) = parse_lesson_marker(trimmed) {
            let mut link = None;
            if let Some(next) = lines.peek() {
                if let Some(value) = header_value(next.trim(), &["lesson link"]) {
                    link = non_empty(value);
                    lines.next();
                }
            }
            blocks.push(LessonBlock {
                number,
                title: lesson_title,
                link,
                body: Vec::new(),
            });
            continue;
        }

        if let Some(block) = blocks.last_mut() {
            block.body.push(line.to_string());
            continue;
        }

        if let Some(value) = header_value(trimmed, &["course title", "course"]) {
            title = non_empty(value);
        } else if let Some(value) = header_value(trimmed, &["course link"]) {
            course_link = non_empty(value);
        } else if let Some(value) = header_value(trimmed, &["course instructor", "instructor"]) {
            instructor = non_empty(value);
        } else {
            preamble.push(line.to_string());
        }
    }

    let title = match title.or_else(|| fallback_title.and_then(non_empty)) {
        Some(t) => t,
        None => bail!("course document has no title"),
    };

    // Merge duplicate lesson numbers into the first occurrence.
    let mut merged: Vec<LessonBlock> = Vec::new();
    for block in blocks {
        match merged.iter_mut().find(|b| b.number == block.number) {
            Some(existing) => {
                existing.body.extend(block.body);
                if existing.link.is_none() {
                    existing.link = block.link;
                }
            }
            None => merged.push(block),
        }
    }

    let mut chunks = Vec::new();

    let preamble_text = preamble.join("\n");
    if merged.is_empty() {
        for (i, text) in chunk_text(&preamble_text, params.chunk_size, params.chunk_overlap)
            .into_iter()
            .enumerate()
        {
            chunks.push(CourseChunk {
                course_title: title.clone(),
                lesson_number: None,
                chunk_index: i as u32,
                text,
            });
        }
    }

    for block in &merged {
        let body = block.body.join("\n");
        for (i, text) in chunk_text(&body, params.chunk_size, params.chunk_overlap)
            .into_iter()
            .enumerate()
        {
            let text = if i == 0 {
                format!("Lesson {} content: {}", block.number, text)
            } else {
                text
            };
            chunks.push(CourseChunk {
                course_title: title.clone(),
                lesson_number: Some(block.number),
                chunk_index: i as u32,
                text,
            });
        }
    }

    let lessons = merged
        .into_iter()
        .map(|b| Lesson {
            lesson_number: b.number,
            title: b.title,
            lesson_link: b.link,
        })
        .collect();

    Ok(ParsedCourse {
        course: Course {
            title,
            instructor,
            course_link,
            lessons,
        },
        chunks,
    })
}

/// Match `Lesson <n>: <title>` (case-insensitive keyword).
fn parse_lesson_marker(line: &str) -> Option<(u32, String)> {
    let lower = line.to_ascii_lowercase();
    let rest = lower.strip_prefix("lesson ")?;
    let colon = rest.find(':')?;
    let number = rest[..colon].trim().parse::<u32>().ok()?;
    // Same byte offsets in the original line: the prefix is ASCII.
    let title = line["lesson ".len() + colon + 1..].trim().to_string();
    Some((number, title))
}

/// If `line` is `<key>: value` for one of `keys` (case-insensitive), return the value.
fn header_value<'a>(line: &'a str, keys: &[&str]) -> Option<&'a str> {
    let colon = line.find(':')?;
    let key = line[..colon].trim().to_ascii_lowercase();
    if keys.iter().any(|k| *k == key) {
        Some(line[colon + 1..].trim())
    } else {
        None
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

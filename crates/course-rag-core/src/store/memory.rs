//! In-memory [`VectorStore`] implementation.
//!
//! All state lives behind a single `std::sync::RwLock`, so a course's chunk
//! set is swapped in one write: readers see either the old set or the new
//! one. Embeddings are computed before the lock is taken. Search is
//! brute-force cosine similarity over every stored vector.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::Embedder;
use crate::models::{Course, CourseAnalytics, CourseChunk, ScoredChunk};

use super::{ensure_chunks_belong, rank_by_similarity, rank_courses, VectorStore};

struct StoredCourse {
    course: Course,
    vector: Vec<f32>,
}

struct StoredChunk {
    chunk: CourseChunk,
    vector: Vec<f32>,
}

#[derive(Default)]
struct Inner {
    courses: Vec<StoredCourse>,
    chunks: Vec<StoredChunk>,
}

/// In-memory vector store for tests and non-persistent deployments.
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    max_results: usize,
    inner: RwLock<Inner>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>, max_results: usize) -> Self {
        Self {
            embedder,
            max_results,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))
    }
}

fn ensure_known(inner: &Inner, titles: &HashSet<&str>) -> Result<()> {
    for title in titles {
        if !inner.courses.iter().any(|c| c.course.title == *title) {
            bail!("unknown course '{}': add course metadata first", title);
        }
    }
    Ok(())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search_content(
        &self,
        query: &str,
        course_filter: Option<&str>,
        lesson_filter: Option<u32>,
    ) -> Result<Vec<ScoredChunk>> {
        if self.read()?.chunks.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(query).await?;

        let inner = self.read()?;
        let candidates = inner
            .chunks
            .iter()
            .filter(|sc| course_filter.map_or(true, |t| sc.chunk.course_title == t))
            .filter(|sc| lesson_filter.map_or(true, |n| sc.chunk.lesson_number == Some(n)))
            .map(|sc| (&sc.chunk, sc.vector.clone()));

        Ok(rank_by_similarity(&query_vec, candidates, self.max_results)
            .into_iter()
            .map(|(chunk, score)| ScoredChunk {
                chunk: chunk.clone(),
                score,
            })
            .collect())
    }

    async fn search_courses(&self, name_fragment: &str) -> Result<Vec<Course>> {
        if name_fragment.trim().is_empty() || self.read()?.courses.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(name_fragment).await?;

        let inner = self.read()?;
        let candidates = inner
            .courses
            .iter()
            .map(|sc| (sc.course.clone(), sc.vector.clone()));
        Ok(rank_courses(
            name_fragment,
            &query_vec,
            candidates,
            self.max_results,
        ))
    }

    async fn add_course_metadata(&self, course: &Course) -> Result<()> {
        if let Some(n) = course.duplicate_lesson() {
            bail!(
                "course '{}' has duplicate lesson number {}",
                course.title,
                n
            );
        }
        let vector = self.embedder.embed_one(&course.title).await?;

        let mut inner = self.write()?;
        let stored = StoredCourse {
            course: course.clone(),
            vector,
        };
        match inner
            .courses
            .iter_mut()
            .find(|sc| sc.course.title == course.title)
        {
            Some(existing) => *existing = stored,
            None => inner.courses.push(stored),
        }
        Ok(())
    }

    async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let titles: HashSet<&str> = chunks.iter().map(|c| c.course_title.as_str()).collect();
        ensure_known(&*self.read()?, &titles)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let mut inner = self.write()?;
        ensure_known(&inner, &titles)?;
        inner
            .chunks
            .retain(|sc| !titles.contains(sc.chunk.course_title.as_str()));
        inner
            .chunks
            .extend(chunks.iter().zip(vectors).map(|(chunk, vector)| StoredChunk {
                chunk: chunk.clone(),
                vector,
            }));
        Ok(())
    }

    async fn replace_course(&self, course: &Course, chunks: &[CourseChunk]) -> Result<()> {
        if let Some(n) = course.duplicate_lesson() {
            bail!(
                "course '{}' has duplicate lesson number {}",
                course.title,
                n
            );
        }
        ensure_chunks_belong(course, chunks)?;

        let course_vector = self.embedder.embed_one(&course.title).await?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&texts).await?
        };
        if vectors.len() != chunks.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let mut inner = self.write()?;
        let stored = StoredCourse {
            course: course.clone(),
            vector: course_vector,
        };
        match inner
            .courses
            .iter_mut()
            .find(|sc| sc.course.title == course.title)
        {
            Some(existing) => *existing = stored,
            None => inner.courses.push(stored),
        }
        inner
            .chunks
            .retain(|sc| sc.chunk.course_title != course.title);
        inner
            .chunks
            .extend(chunks.iter().zip(vectors).map(|(chunk, vector)| StoredChunk {
                chunk: chunk.clone(),
                vector,
            }));
        Ok(())
    }

    async fn get_course_analytics(&self) -> Result<CourseAnalytics> {
        let inner = self.read()?;
        Ok(CourseAnalytics::from_titles(
            inner
                .courses
                .iter()
                .map(|sc| sc.course.title.clone())
                .collect(),
        ))
    }

    async fn get_course(&self, title: &str) -> Result<Option<Course>> {
        let inner = self.read()?;
        Ok(inner
            .courses
            .iter()
            .find(|sc| sc.course.title == title)
            .map(|sc| sc.course.clone()))
    }

    async fn clear(&self) -> Result<()> {
        let mut inner = self.write()?;
        inner.courses.clear();
        inner.chunks.clear();
        Ok(())
    }
}

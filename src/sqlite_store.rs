//! SQLite-backed [`VectorStore`].
//!
//! Courses and chunks live in two tables (see [`crate::migrate`]); embedding
//! vectors are stored as little-endian `f32` BLOBs and ranked in process with
//! the same brute-force cosine scan as the in-memory store. Replacing a
//! course's chunk set happens inside one transaction, so concurrent searches
//! see either the old set or the new one.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use course_rag_core::embedding::{blob_to_vec, vec_to_blob, Embedder};
use course_rag_core::models::{Course, CourseAnalytics, CourseChunk, Lesson, ScoredChunk};
use course_rag_core::store::{ensure_chunks_belong, rank_by_similarity, rank_courses, VectorStore};

use crate::{db, migrate};

type CourseRow = (String, Option<String>, Option<String>, String, Vec<u8>);
type ChunkRow = (String, Option<i64>, i64, String, Vec<u8>);

/// Persistent vector store on a SQLite database file.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    max_results: usize,
}

impl SqliteVectorStore {
    /// Open the database at `path`, creating the schema if needed.
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>, max_results: usize) -> Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open course store at {}", path.display()))?;
        migrate::run_migrations(&pool).await?;
        tracing::debug!(path = %path.display(), "sqlite course store opened");
        Ok(Self {
            pool,
            embedder,
            max_results,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn course_from_row(row: CourseRow) -> Result<(Course, Vec<f32>)> {
    let (title, instructor, course_link, lessons_json, embedding) = row;
    let lessons: Vec<Lesson> = serde_json::from_str(&lessons_json)
        .with_context(|| format!("corrupt lesson list for course '{}'", title))?;
    Ok((
        Course {
            title,
            instructor,
            course_link,
            lessons,
        },
        blob_to_vec(&embedding),
    ))
}

fn chunk_from_row(row: ChunkRow) -> (CourseChunk, Vec<f32>) {
    let (course_title, lesson_number, chunk_index, text, embedding) = row;
    (
        CourseChunk {
            course_title,
            lesson_number: lesson_number.map(|n| n as u32),
            chunk_index: chunk_index as u32,
            text,
        },
        blob_to_vec(&embedding),
    )
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn search_content(
        &self,
        query: &str,
        course_filter: Option<&str>,
        lesson_filter: Option<u32>,
    ) -> Result<Vec<ScoredChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(
            r#"
            SELECT course_title, lesson_number, chunk_index, text, embedding
            FROM chunks
            WHERE (? IS NULL OR course_title = ?)
              AND (? IS NULL OR lesson_number = ?)
            ORDER BY id ASC
            "#,
        )
        .bind(course_filter)
        .bind(course_filter)
        .bind(lesson_filter.map(i64::from))
        .bind(lesson_filter.map(i64::from))
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(query).await?;

        Ok(
            rank_by_similarity(&query_vec, rows.into_iter().map(chunk_from_row), self.max_results)
                .into_iter()
                .map(|(chunk, score)| ScoredChunk { chunk, score })
                .collect(),
        )
    }

    async fn search_courses(&self, name_fragment: &str) -> Result<Vec<Course>> {
        if name_fragment.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<CourseRow> = sqlx::query_as(
            "SELECT title, instructor, course_link, lessons_json, embedding FROM courses ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let courses = rows
            .into_iter()
            .map(course_from_row)
            .collect::<Result<Vec<_>>>()?;
        let query_vec = self.embedder.embed_one(name_fragment).await?;
        Ok(rank_courses(
            name_fragment,
            &query_vec,
            courses,
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
        let lessons_json = serde_json::to_string(&course.lessons)?;

        sqlx::query(
            r#"
            INSERT INTO courses (title, instructor, course_link, lessons_json, embedding)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                instructor = excluded.instructor,
                course_link = excluded.course_link,
                lessons_json = excluded.lessons_json,
                embedding = excluded.embedding
            "#,
        )
        .bind(&course.title)
        .bind(&course.instructor)
        .bind(&course.course_link)
        .bind(&lessons_json)
        .bind(vec_to_blob(&vector))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_course_content(&self, chunks: &[CourseChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let titles: BTreeSet<&str> = chunks.iter().map(|c| c.course_title.as_str()).collect();
        let mut tx = self.pool.begin().await?;

        for title in &titles {
            let known: bool =
                sqlx::query_scalar("SELECT COUNT(*) > 0 FROM courses WHERE title = ?")
                    .bind(*title)
                    .fetch_one(&mut *tx)
                    .await?;
            if !known {
                bail!("unknown course '{}': add course metadata first", title);
            }
            sqlx::query("DELETE FROM chunks WHERE course_title = ?")
                .bind(*title)
                .execute(&mut *tx)
                .await?;
        }

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (course_title, lesson_number, chunk_index, text, embedding)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.course_title)
            .bind(chunk.lesson_number.map(i64::from))
            .bind(i64::from(chunk.chunk_index))
            .bind(&chunk.text)
            .bind(vec_to_blob(&vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(chunks = chunks.len(), courses = titles.len(), "stored course content");
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
        let lessons_json = serde_json::to_string(&course.lessons)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO courses (title, instructor, course_link, lessons_json, embedding)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                instructor = excluded.instructor,
                course_link = excluded.course_link,
                lessons_json = excluded.lessons_json,
                embedding = excluded.embedding
            "#,
        )
        .bind(&course.title)
        .bind(&course.instructor)
        .bind(&course.course_link)
        .bind(&lessons_json)
        .bind(vec_to_blob(&course_vector))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM chunks WHERE course_title = ?")
            .bind(&course.title)
            .execute(&mut *tx)
            .await?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (course_title, lesson_number, chunk_index, text, embedding)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.course_title)
            .bind(chunk.lesson_number.map(i64::from))
            .bind(i64::from(chunk.chunk_index))
            .bind(&chunk.text)
            .bind(vec_to_blob(&vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(title = %course.title, chunks = chunks.len(), "replaced course");
        Ok(())
    }

    async fn get_course_analytics(&self) -> Result<CourseAnalytics> {
        let titles: Vec<String> = sqlx::query_scalar("SELECT title FROM courses ORDER BY rowid ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(CourseAnalytics::from_titles(titles))
    }

    async fn get_course(&self, title: &str) -> Result<Option<Course>> {
        let row: Option<CourseRow> = sqlx::query_as(
            "SELECT title, instructor, course_link, lessons_json, embedding FROM courses WHERE title = ?",
        )
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| course_from_row(r).map(|(course, _)| course))
            .transpose()
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM courses").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

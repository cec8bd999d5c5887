use anyhow::Result;
use sqlx::SqlitePool;

/// Create the course store schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per course; lessons are kept as JSON since they are only
    // ever read back whole.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS courses (
            title TEXT PRIMARY KEY,
            instructor TEXT,
            course_link TEXT,
            lessons_json TEXT NOT NULL DEFAULT '[]',
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // rowid gives insertion order for stable tie-breaking
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_title TEXT NOT NULL,
            lesson_number INTEGER,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (course_title) REFERENCES courses(title) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_course_title ON chunks(course_title)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chunks_course_lesson ON chunks(course_title, lesson_number)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

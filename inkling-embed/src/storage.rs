//! SQLite-backed content store for sources, notes and insights.
//!
//! Source embeddings live chunk-level: rows in `source_chunks` paired with
//! vectors in the `chunk_vec` vec0 table (rowid = chunk id). Note and
//! insight embeddings are single JSON vectors stored on the row itself.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Utc;
use libsqlite3_sys::{SQLITE_OK, sqlite3, sqlite3_api_routines, sqlite3_auto_extension};
use sqlite_vec::sqlite3_vec_init;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::chunker::Chunk;
use crate::errors::{EmbedError, EmbedResult};

static SQLITE_VEC_INIT_RC: OnceLock<i32> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct ContentStore {
    pool: SqlitePool,
}

impl ContentStore {
    /// Open (or create) the content database at the given path.
    pub async fn open(db_path: &Path) -> EmbedResult<Self> {
        init_sqlite_vec_once()?;
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = create_pool(options, 8).await?;
        run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Open an in-memory content database. Used by tests and by callers
    /// that want a throwaway store.
    pub async fn open_in_memory() -> EmbedResult<Self> {
        init_sqlite_vec_once()?;

        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);

        let pool = create_pool(options, 1).await?;
        run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Default database location under the platform data directory.
    pub fn default_db_path() -> EmbedResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or(EmbedError::MissingDataDir)?;
        Ok(data_dir.join("inkling").join("content.sqlite3"))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -- Sources -------------------------------------------------------------

    pub async fn upsert_source(
        &self,
        id: &str,
        title: &str,
        full_text: Option<&str>,
    ) -> EmbedResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO sources (id, title, full_text, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   title=excluded.title,
                   full_text=excluded.full_text,
                   updated_at=excluded.updated_at"#,
        )
        .bind(id)
        .bind(title)
        .bind(full_text)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_source(&self, id: &str) -> EmbedResult<Option<SourceRecord>> {
        let row: Option<(String, String, Option<String>)> =
            sqlx::query_as("SELECT id, title, full_text FROM sources WHERE id = ? LIMIT 1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, title, full_text)| SourceRecord {
            id,
            title,
            full_text,
        }))
    }

    /// Replace every chunk (and chunk vector) stored for a source with the
    /// given chunk/vector pairs, in a single transaction. Returns the number
    /// of chunks written.
    pub async fn replace_source_chunks(
        &self,
        source_id: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> EmbedResult<usize> {
        debug_assert_eq!(chunks.len(), vectors.len());

        let has_vec_table = vec_table_exists(&self.pool).await?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await?;

        let old_ids: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM source_chunks WHERE source_id = ?")
                .bind(source_id)
                .fetch_all(&mut *tx)
                .await?;

        sqlx::query("DELETE FROM source_chunks WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        if has_vec_table && !old_ids.is_empty() {
            let placeholders = old_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let sql = format!("DELETE FROM chunk_vec WHERE rowid IN ({})", placeholders);
            let mut query = sqlx::query(&sql);
            for (chunk_id,) in &old_ids {
                query = query.bind(chunk_id);
            }
            query.execute(&mut *tx).await?;
        }

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let result = sqlx::query(
                r#"INSERT INTO source_chunks (source_id, chunk_index, title, content, updated_at)
                   VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(source_id)
            .bind(chunk.index as i64)
            .bind(&chunk.title)
            .bind(&chunk.content)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            let chunk_id = result.last_insert_rowid();
            let payload = vector_payload(vector)?;
            sqlx::query("INSERT OR REPLACE INTO chunk_vec(rowid, embedding) VALUES (?, ?)")
                .bind(chunk_id)
                .bind(payload)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(chunks.len())
    }

    /// Number of chunks currently stored for a source.
    pub async fn source_chunk_count(&self, source_id: &str) -> EmbedResult<usize> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM source_chunks WHERE source_id = ?")
                .bind(source_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as usize)
    }

    // -- Notes ---------------------------------------------------------------

    pub async fn upsert_note(
        &self,
        id: &str,
        title: &str,
        content: Option<&str>,
    ) -> EmbedResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO notes (id, title, content, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   title=excluded.title,
                   content=excluded.content,
                   updated_at=excluded.updated_at"#,
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_note(&self, id: &str) -> EmbedResult<Option<NoteRecord>> {
        let row: Option<(String, String, Option<String>)> =
            sqlx::query_as("SELECT id, title, content FROM notes WHERE id = ? LIMIT 1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id, title, content)| NoteRecord { id, title, content }))
    }

    /// Overwrite the stored embedding vector for a note.
    pub async fn write_note_embedding(&self, id: &str, vector: &[f32]) -> EmbedResult<()> {
        let payload = vector_payload(vector)?;
        let result = sqlx::query("UPDATE notes SET embedding = ?, updated_at = ? WHERE id = ?")
            .bind(payload)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EmbedError::NotFound(id.to_string()));
        }

        Ok(())
    }

    pub async fn note_embedding(&self, id: &str) -> EmbedResult<Option<Vec<f32>>> {
        read_row_embedding(&self.pool, "notes", id).await
    }

    // -- Insights ------------------------------------------------------------

    pub async fn upsert_insight(
        &self,
        id: &str,
        source_id: Option<&str>,
        insight_type: &str,
        content: &str,
    ) -> EmbedResult<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"INSERT INTO insights (id, source_id, insight_type, content, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                   source_id=excluded.source_id,
                   insight_type=excluded.insight_type,
                   content=excluded.content,
                   updated_at=excluded.updated_at"#,
        )
        .bind(id)
        .bind(source_id)
        .bind(insight_type)
        .bind(content)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_insight(&self, id: &str) -> EmbedResult<Option<InsightRecord>> {
        let row: Option<(String, Option<String>, String, String)> = sqlx::query_as(
            "SELECT id, source_id, insight_type, content FROM insights WHERE id = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, source_id, insight_type, content)| InsightRecord {
            id,
            source_id,
            insight_type,
            content,
        }))
    }

    /// Overwrite the stored embedding vector for an insight.
    pub async fn write_insight_embedding(&self, id: &str, vector: &[f32]) -> EmbedResult<()> {
        let payload = vector_payload(vector)?;
        let result = sqlx::query("UPDATE insights SET embedding = ?, updated_at = ? WHERE id = ?")
            .bind(payload)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EmbedError::NotFound(id.to_string()));
        }

        Ok(())
    }

    pub async fn insight_embedding(&self, id: &str) -> EmbedResult<Option<Vec<f32>>> {
        read_row_embedding(&self.pool, "insights", id).await
    }

    // -- Vector table --------------------------------------------------------

    /// Create the `chunk_vec` vec0 table at the given dimension if it does
    /// not exist yet, and record the dimension in `meta`.
    pub(crate) async fn ensure_vec_table_dim(&self, dimension: usize) -> EmbedResult<()> {
        if !vec_table_exists(&self.pool).await? {
            let create_sql = format!(
                "CREATE VIRTUAL TABLE IF NOT EXISTS chunk_vec USING vec0(embedding float[{}])",
                dimension
            );
            sqlx::query(&create_sql).execute(&self.pool).await?;
        }

        sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_dim', ?)")
            .bind(dimension.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub(crate) async fn has_vec_table(&self) -> EmbedResult<bool> {
        vec_table_exists(&self.pool).await
    }
}

#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: String,
    pub title: String,
    pub full_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InsightRecord {
    pub id: String,
    pub source_id: Option<String>,
    pub insight_type: String,
    pub content: String,
}

fn init_sqlite_vec_once() -> EmbedResult<()> {
    let rc = *SQLITE_VEC_INIT_RC.get_or_init(|| unsafe {
        type SqliteVecInitFn =
            unsafe extern "C" fn(*mut sqlite3, *mut *const i8, *const sqlite3_api_routines) -> i32;

        sqlite3_auto_extension(Some(std::mem::transmute::<*const (), SqliteVecInitFn>(
            sqlite3_vec_init as *const (),
        )))
    });

    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(EmbedError::SqliteVec(format!(
            "sqlite3_auto_extension failed with code {rc}"
        )))
    }
}

async fn create_pool(options: SqliteConnectOptions, max_connections: u32) -> EmbedResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA cache_size = -64000")
        .execute(&pool)
        .await?;

    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> EmbedResult<()> {
    let migration_sql = include_str!("../migrations/001_initial_schema.sql");

    for statement in migration_sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| EmbedError::Migration(format!("failed to execute migration: {e}")))?;
        }
    }

    Ok(())
}

async fn vec_table_exists(pool: &SqlitePool) -> EmbedResult<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'chunk_vec'",
    )
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

fn vector_payload(vector: &[f32]) -> EmbedResult<String> {
    serde_json::to_string(vector)
        .map_err(|e| EmbedError::Embedding(format!("embedding serialize failed: {e}")))
}

async fn read_row_embedding(
    pool: &SqlitePool,
    table: &str,
    id: &str,
) -> EmbedResult<Option<Vec<f32>>> {
    let sql = format!("SELECT embedding FROM {} WHERE id = ? LIMIT 1", table);
    let row: Option<(Option<String>,)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    let Some((Some(payload),)) = row else {
        return Ok(None);
    };

    let vector: Vec<f32> = serde_json::from_str(&payload)
        .map_err(|e| EmbedError::Embedding(format!("embedding parse failed: {e}")))?;
    Ok(Some(vector))
}

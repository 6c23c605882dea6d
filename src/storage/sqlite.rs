//! SQLite metadata store
//!
//! Persists chunks, relationships and categories with rusqlite behind a
//! deadpool-sqlite connection pool. Every pool connection opens the same
//! database file, so in-memory databases are not supported here; use
//! [`super::InMemoryStore`] instead.

use super::MetadataStore;
use crate::error::{Result, StrataError};
use crate::types::{
    AccessStats, Category, ChunkMetadata, ChunkType, ChunkUpsert, DecayUpdate, Direction,
    Metadata, Relationship, RelationshipType,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Default connection pool size
const DEFAULT_POOL_SIZE: usize = 8;

/// Applied to every pooled connection before use
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    chunk_type TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_accessed_at TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    importance REAL NOT NULL DEFAULT 0.5 CHECK(importance BETWEEN 0.0 AND 1.0),
    decay_score REAL NOT NULL DEFAULT 1.0 CHECK(decay_score BETWEEN 0.0 AND 1.0),
    is_archived INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS relationships (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_chunk_id TEXT NOT NULL,
    to_chunk_id TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    strength REAL NOT NULL CHECK(strength BETWEEN 0.0 AND 1.0),
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
    name TEXT PRIMARY KEY NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    item_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_archived_decay ON chunks(is_archived, decay_score);
CREATE INDEX IF NOT EXISTS idx_chunks_last_accessed ON chunks(last_accessed_at);
CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_chunk_id);
CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_chunk_id);
"#;

const CHUNK_COLUMNS: &str = "id, content, source, chunk_type, created_at, updated_at, \
     last_accessed_at, access_count, importance, decay_score, is_archived";

const RELATIONSHIP_COLUMNS: &str =
    "from_chunk_id, to_chunk_id, relationship_type, strength, metadata, created_at";

/// SQLite-backed metadata store with connection pooling
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and initialize the schema
    ///
    /// # Example
    /// ```ignore
    /// let store = SqliteStore::open("strata.db").await?;
    /// ```
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_pool_size(db_path, DEFAULT_POOL_SIZE).await
    }

    /// Open with a custom maximum pool size
    pub async fn with_pool_size<P: AsRef<Path>>(db_path: P, pool_size: usize) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        info!(
            "Opening metadata store at: {} (pool_size: {})",
            path_str, pool_size
        );

        let pool = Config::new(path_str)
            .builder(Runtime::Tokio1)
            .map_err(|e| StrataError::Database(format!("Failed to configure pool: {}", e)))?
            .max_size(pool_size)
            .build()
            .map_err(|e| StrataError::Database(format!("Failed to create connection pool: {}", e)))?;

        let store = Self { pool };
        store
            .with_conn(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;

        info!("Metadata store schema ready");
        Ok(store)
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| {
            StrataError::Database(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.interact(move |conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(conn)
        })
        .await
            .map_err(|e| StrataError::Database(format!("Pool interaction failed: {}", e)))?
    }
}

fn to_sql_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_time(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<ChunkMetadata> {
    let chunk_type: String = row.get(3)?;
    let chunk_type = chunk_type
        .parse::<ChunkType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    let last_accessed_at = match row.get::<_, Option<String>>(6)? {
        Some(raw) => Some(parse_time(6, raw)?),
        None => None,
    };

    Ok(ChunkMetadata {
        id: row.get(0)?,
        content: row.get(1)?,
        source: row.get(2)?,
        chunk_type,
        created_at: parse_time(4, row.get(4)?)?,
        updated_at: parse_time(5, row.get(5)?)?,
        last_accessed_at,
        access_count: row.get(7)?,
        importance: row.get(8)?,
        decay_score: row.get(9)?,
        is_archived: row.get(10)?,
    })
}

fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let relationship_type: String = row.get(2)?;
    let relationship_type = relationship_type
        .parse::<RelationshipType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let metadata: String = row.get(4)?;
    let metadata: Metadata = serde_json::from_str(&metadata)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Relationship {
        from_chunk_id: row.get(0)?,
        to_chunk_id: row.get(1)?,
        relationship_type,
        strength: row.get(3)?,
        metadata,
        created_at: parse_time(5, row.get(5)?)?,
    })
}

/// Write transaction that takes the RESERVED lock up front
///
/// A deferred transaction that reads before writing cannot wait on the busy
/// handler when another connection holds the lock, so writers start here.
fn write_tx(conn: &mut Connection) -> rusqlite::Result<rusqlite::Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
}

fn load_chunk(conn: &Connection, id: &str) -> Result<Option<ChunkMetadata>> {
    let sql = format!("SELECT {} FROM chunks WHERE id = ?1", CHUNK_COLUMNS);
    Ok(conn.query_row(&sql, params![id], chunk_from_row).optional()?)
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn get_chunk_metadata(&self, id: &str) -> Result<Option<ChunkMetadata>> {
        let id = id.to_string();
        self.with_conn(move |conn| load_chunk(conn, &id)).await
    }

    async fn upsert_chunk_metadata(&self, upsert: ChunkUpsert) -> Result<ChunkMetadata> {
        self.with_conn(move |conn| {
            let tx = write_tx(conn)?;
            let existing = load_chunk(&tx, &upsert.id)?;
            let chunk = upsert.apply(existing, Utc::now());
            tx.execute(
                "INSERT INTO chunks (id, content, source, chunk_type, created_at, updated_at,
                     last_accessed_at, access_count, importance, decay_score, is_archived)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(id) DO UPDATE SET
                     content = excluded.content,
                     source = excluded.source,
                     chunk_type = excluded.chunk_type,
                     created_at = excluded.created_at,
                     updated_at = excluded.updated_at,
                     last_accessed_at = excluded.last_accessed_at,
                     access_count = excluded.access_count,
                     importance = excluded.importance",
                params![
                    chunk.id,
                    chunk.content,
                    chunk.source,
                    chunk.chunk_type.as_str(),
                    to_sql_time(&chunk.created_at),
                    to_sql_time(&chunk.updated_at),
                    chunk.last_accessed_at.as_ref().map(to_sql_time),
                    chunk.access_count,
                    chunk.importance,
                    chunk.decay_score,
                    chunk.is_archived,
                ],
            )?;
            tx.commit()?;
            Ok(chunk)
        })
        .await
    }

    async fn delete_chunk_metadata(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = write_tx(conn)?;
            let edges = tx.execute(
                "DELETE FROM relationships WHERE from_chunk_id = ?1 OR to_chunk_id = ?1",
                params![id],
            )?;
            let rows = tx.execute("DELETE FROM chunks WHERE id = ?1", params![id])?;
            tx.commit()?;
            debug!("Deleted chunk {} ({} edges removed)", id, edges);
            Ok(rows > 0)
        })
        .await
    }

    async fn get_all_chunk_metadata(&self, include_archived: bool) -> Result<Vec<ChunkMetadata>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM chunks {} ORDER BY created_at, id",
                CHUNK_COLUMNS,
                if include_archived { "" } else { "WHERE is_archived = 0" }
            );
            let mut stmt = conn.prepare(&sql)?;
            let chunks = stmt
                .query_map([], chunk_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(chunks)
        })
        .await
    }

    async fn bulk_update_decay_scores(&self, updates: &[DecayUpdate]) -> Result<usize> {
        let updates = updates.to_vec();
        self.with_conn(move |conn| {
            let now = to_sql_time(&Utc::now());
            let tx = write_tx(conn)?;
            let mut updated = 0;
            {
                let mut stmt = tx.prepare(
                    "UPDATE chunks SET decay_score = ?1, updated_at = ?2 WHERE id = ?3",
                )?;
                for update in &updates {
                    updated += stmt.execute(params![update.score.clamp(0.0, 1.0), now, update.id])?;
                }
            }
            tx.commit()?;
            Ok(updated)
        })
        .await
    }

    async fn archive_chunk(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "UPDATE chunks SET is_archived = 1, updated_at = ?1 WHERE id = ?2 AND is_archived = 0",
                params![to_sql_time(&Utc::now()), id],
            )?;
            Ok(rows > 0)
        })
        .await
    }

    async fn archive_stale_chunks(&self, threshold: f64) -> Result<usize> {
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "UPDATE chunks SET is_archived = 1, updated_at = ?1
                 WHERE is_archived = 0 AND decay_score < ?2",
                params![to_sql_time(&Utc::now()), threshold],
            )?;
            Ok(rows)
        })
        .await
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<ChunkMetadata> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = write_tx(conn)?;
            let at = to_sql_time(&at);
            let rows = tx.execute(
                "UPDATE chunks SET access_count = access_count + 1,
                     last_accessed_at = ?1, updated_at = ?1
                 WHERE id = ?2",
                params![at, id],
            )?;
            if rows == 0 {
                return Err(StrataError::ChunkNotFound(id));
            }
            let chunk = load_chunk(&tx, &id)?.ok_or_else(|| StrataError::ChunkNotFound(id.clone()))?;
            tx.commit()?;
            Ok(chunk)
        })
        .await
    }

    async fn get_relationships(&self, id: &str, direction: Direction) -> Result<Vec<Relationship>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let filter = match direction {
                Direction::Outgoing => "from_chunk_id = ?1",
                Direction::Incoming => "to_chunk_id = ?1",
                Direction::Both => "(from_chunk_id = ?1 OR to_chunk_id = ?1)",
            };
            let sql = format!(
                "SELECT {} FROM relationships WHERE {} ORDER BY id",
                RELATIONSHIP_COLUMNS, filter
            );
            let mut stmt = conn.prepare(&sql)?;
            let relationships = stmt
                .query_map(params![id], relationship_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(relationships)
        })
        .await
    }

    async fn add_relationship(&self, relationship: &Relationship) -> Result<()> {
        let relationship = relationship.clone();
        let metadata = serde_json::to_string(&relationship.metadata)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO relationships
                     (from_chunk_id, to_chunk_id, relationship_type, strength, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    relationship.from_chunk_id,
                    relationship.to_chunk_id,
                    relationship.relationship_type.as_str(),
                    relationship.strength,
                    metadata,
                    to_sql_time(&relationship.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_relationship(
        &self,
        from: &str,
        to: &str,
        relationship_type: RelationshipType,
    ) -> Result<usize> {
        let (from, to) = (from.to_string(), to.to_string());
        self.with_conn(move |conn| {
            let rows = conn.execute(
                "DELETE FROM relationships
                 WHERE from_chunk_id = ?1 AND to_chunk_id = ?2 AND relationship_type = ?3",
                params![from, to, relationship_type.as_str()],
            )?;
            Ok(rows)
        })
        .await
    }

    async fn get_related_chunk_ids(&self, id: &str) -> Result<Vec<String>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT to_chunk_id FROM relationships WHERE from_chunk_id = ?1 AND to_chunk_id != ?1
                 UNION
                 SELECT from_chunk_id FROM relationships WHERE to_chunk_id = ?1 AND from_chunk_id != ?1
                 ORDER BY 1",
            )?;
            let ids = stmt
                .query_map(params![id], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn get_access_stats(&self, since: DateTime<Utc>) -> Result<Vec<AccessStats>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, access_count, last_accessed_at FROM chunks
                 WHERE last_accessed_at IS NOT NULL
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(AccessStats {
                        chunk_id: row.get(0)?,
                        access_count: row.get(1)?,
                        last_accessed_at: parse_time(2, row.get(2)?)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            // RFC 3339 strings with mixed offsets do not compare lexically
            Ok(rows
                .into_iter()
                .filter(|s| s.last_accessed_at >= since)
                .collect())
        })
        .await
    }

    async fn vacuum(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(())
        })
        .await
    }

    async fn get_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let category = conn
                .query_row(
                    "SELECT name, summary, item_count, updated_at FROM categories WHERE name = ?1",
                    params![name],
                    category_from_row,
                )
                .optional()?;
            Ok(category)
        })
        .await
    }

    async fn upsert_category(&self, category: &Category) -> Result<()> {
        let category = category.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO categories (name, summary, item_count, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(name) DO UPDATE SET
                     summary = excluded.summary,
                     item_count = excluded.item_count,
                     updated_at = excluded.updated_at",
                params![
                    category.name,
                    category.summary,
                    category.item_count as i64,
                    to_sql_time(&category.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, summary, item_count, updated_at FROM categories ORDER BY name",
            )?;
            let categories = stmt
                .query_map([], category_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(categories)
        })
        .await
    }
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let item_count: i64 = row.get(2)?;
    Ok(Category {
        name: row.get(0)?,
        summary: row.get(1)?,
        item_count: item_count.max(0) as usize,
        updated_at: parse_time(3, row.get(3)?)?,
    })
}

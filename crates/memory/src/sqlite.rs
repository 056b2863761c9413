//! SQLite persistence for memory facts and conversation sessions.
//!
//! Uses a single database file with three tables:
//! - `facts`: remembered facts, primary key `(owner_id, id)`, embedding as a
//!   little-endian `f32` blob
//! - `sessions`: one row per conversation
//! - `turns`: ordered turns, `position` gives the order within a session
//!
//! Similarity ranking happens in Rust over the owner's facts.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rookery_core::error::{ConversationError, MemoryError};
use rookery_core::memory::{FactCategory, FactMetadata, MemoryFact, ScoredFact, VectorStore};
use rookery_core::message::{ConversationSession, ConversationStore, ConversationTurn, Role};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::vector::rank_facts;

/// A pooled SQLite store implementing both [`VectorStore`] and [`ConversationStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        let statements = [
            (
                "facts table",
                r#"
                CREATE TABLE IF NOT EXISTS facts (
                    owner_id    TEXT NOT NULL,
                    id          TEXT NOT NULL,
                    text        TEXT NOT NULL,
                    category    TEXT,
                    created_at  TEXT NOT NULL,
                    embedding   BLOB NOT NULL,
                    PRIMARY KEY (owner_id, id)
                )
                "#,
            ),
            (
                "facts index",
                "CREATE INDEX IF NOT EXISTS idx_facts_owner_created ON facts(owner_id, created_at)",
            ),
            (
                "sessions table",
                r#"
                CREATE TABLE IF NOT EXISTS sessions (
                    id                  TEXT PRIMARY KEY,
                    owner_id            TEXT NOT NULL,
                    created_at          TEXT NOT NULL,
                    last_summarized_at  TEXT
                )
                "#,
            ),
            (
                "turns table",
                r#"
                CREATE TABLE IF NOT EXISTS turns (
                    session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                    position    INTEGER NOT NULL,
                    id          TEXT NOT NULL,
                    role        TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    timestamp   TEXT NOT NULL,
                    synthetic   INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (session_id, position),
                    UNIQUE (session_id, id)
                )
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_fact(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryFact, MemoryError> {
        let get = |col: &str| -> Result<String, MemoryError> {
            row.try_get(col)
                .map_err(|e| MemoryError::QueryFailed(format!("{col} column: {e}")))
        };
        let category: Option<String> = row
            .try_get("category")
            .map_err(|e| MemoryError::QueryFailed(format!("category column: {e}")))?;
        let blob: Vec<u8> = row
            .try_get("embedding")
            .map_err(|e| MemoryError::QueryFailed(format!("embedding column: {e}")))?;

        Ok(MemoryFact {
            id: get("id")?,
            owner_id: get("owner_id")?,
            text: get("text")?,
            category: category.and_then(|c| FactCategory::from_str(&c).ok()),
            created_at: parse_time(&get("created_at")?),
            embedding: Self::blob_to_embedding(&blob),
        })
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<ConversationTurn, ConversationError> {
        let get = |col: &str| -> Result<String, ConversationError> {
            row.try_get(col)
                .map_err(|e| ConversationError::Storage(format!("{col} column: {e}")))
        };
        let synthetic: i64 = row
            .try_get("synthetic")
            .map_err(|e| ConversationError::Storage(format!("synthetic column: {e}")))?;

        Ok(ConversationTurn {
            id: get("id")?,
            role: parse_role(&get("role")?)?,
            content: get("content")?,
            timestamp: parse_time(&get("timestamp")?),
            synthetic: synthetic != 0,
        })
    }

    async fn fetch_facts(&self, owner: &str) -> Result<Vec<MemoryFact>, MemoryError> {
        let rows = sqlx::query(
            "SELECT * FROM facts WHERE owner_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("SELECT facts failed: {e}")))?;

        rows.iter().map(Self::row_to_fact).collect()
    }
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_role(s: &str) -> Result<Role, ConversationError> {
    match s {
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(ConversationError::Storage(format!("unknown role '{other}'"))),
    }
}

fn storage(context: &str) -> impl Fn(sqlx::Error) -> ConversationError + '_ {
    move |e| ConversationError::Storage(format!("{context}: {e}"))
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(
        &self,
        owner: &str,
        id: &str,
        vector: Vec<f32>,
        metadata: FactMetadata,
    ) -> Result<(), MemoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO facts (owner_id, id, text, category, created_at, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(owner_id, id) DO NOTHING
            "#,
        )
        .bind(owner)
        .bind(id)
        .bind(&metadata.text)
        .bind(metadata.category.map(|c| c.as_str()))
        .bind(metadata.created_at.to_rfc3339())
        .bind(Self::embedding_to_blob(&vector))
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT fact failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(MemoryError::Duplicate {
                owner: owner.into(),
                id: id.into(),
            });
        }

        debug!(owner, id, "Stored fact");
        Ok(())
    }

    async fn query(&self, owner: &str, vector: &[f32], k: usize) -> Result<Vec<ScoredFact>, MemoryError> {
        let facts = self.fetch_facts(owner).await?;
        Ok(rank_facts(facts, vector, k))
    }

    async fn list(&self, owner: &str) -> Result<Vec<MemoryFact>, MemoryError> {
        self.fetch_facts(owner).await
    }

    async fn count(&self, owner: &str) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM facts WHERE owner_id = ?1")
            .bind(owner)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT failed: {e}")))?;
        let count: i64 = row.try_get("cnt").unwrap_or(0);
        Ok(count as usize)
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, session_id: &str) -> Result<Option<ConversationSession>, ConversationError> {
        let Some(row) = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage("SELECT session failed"))?
        else {
            return Ok(None);
        };

        let owner_id: String = row.try_get("owner_id").map_err(storage("owner_id column"))?;
        let created_at: String = row.try_get("created_at").map_err(storage("created_at column"))?;
        let last_summarized_at: Option<String> = row
            .try_get("last_summarized_at")
            .map_err(storage("last_summarized_at column"))?;

        let turn_rows = sqlx::query("SELECT * FROM turns WHERE session_id = ?1 ORDER BY position ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage("SELECT turns failed"))?;
        let turns = turn_rows
            .iter()
            .map(Self::row_to_turn)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ConversationSession {
            id: session_id.into(),
            owner_id,
            turns,
            last_summarized_at: last_summarized_at.as_deref().map(parse_time),
            created_at: parse_time(&created_at),
        }))
    }

    async fn load_or_create(
        &self,
        session_id: &str,
        owner_id: &str,
    ) -> Result<ConversationSession, ConversationError> {
        sqlx::query("INSERT OR IGNORE INTO sessions (id, owner_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(session_id)
            .bind(owner_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(storage("INSERT session failed"))?;

        self.load(session_id)
            .await?
            .ok_or_else(|| ConversationError::SessionNotFound(session_id.into()))
    }

    async fn append(
        &self,
        session_id: &str,
        owner_id: &str,
        turns: Vec<ConversationTurn>,
    ) -> Result<usize, ConversationError> {
        let mut tx = self.pool.begin().await.map_err(storage("BEGIN failed"))?;

        sqlx::query("INSERT OR IGNORE INTO sessions (id, owner_id, created_at) VALUES (?1, ?2, ?3)")
            .bind(session_id)
            .bind(owner_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(storage("INSERT session failed"))?;

        let rows = sqlx::query("SELECT id, position FROM turns WHERE session_id = ?1")
            .bind(session_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(storage("SELECT turn ids failed"))?;
        let mut seen = HashSet::with_capacity(rows.len() + turns.len());
        let mut next_position = 0i64;
        for row in &rows {
            let id: String = row.try_get("id").map_err(storage("id column"))?;
            let position: i64 = row.try_get("position").map_err(storage("position column"))?;
            next_position = next_position.max(position + 1);
            seen.insert(id);
        }

        for turn in &turns {
            if !seen.insert(turn.id.clone()) {
                return Err(ConversationError::DuplicateTurn {
                    session_id: session_id.into(),
                    turn_id: turn.id.clone(),
                });
            }
        }

        for turn in &turns {
            sqlx::query(
                r#"
                INSERT INTO turns (session_id, position, id, role, content, timestamp, synthetic)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(session_id)
            .bind(next_position)
            .bind(&turn.id)
            .bind(turn.role.to_string())
            .bind(&turn.content)
            .bind(turn.timestamp.to_rfc3339())
            .bind(turn.synthetic as i64)
            .execute(&mut *tx)
            .await
            .map_err(storage("INSERT turn failed"))?;
            next_position += 1;
        }

        tx.commit().await.map_err(storage("COMMIT failed"))?;
        Ok(seen.len())
    }

    async fn compact(
        &self,
        session_id: &str,
        prefix_ids: &[String],
        summary: ConversationTurn,
    ) -> Result<(), ConversationError> {
        if prefix_ids.is_empty() {
            return Err(ConversationError::CompactionConflict(session_id.into()));
        }

        let mut tx = self.pool.begin().await.map_err(storage("BEGIN failed"))?;

        let rows = sqlx::query(
            "SELECT id, position FROM turns WHERE session_id = ?1 ORDER BY position ASC LIMIT ?2",
        )
        .bind(session_id)
        .bind(prefix_ids.len() as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage("SELECT prefix failed"))?;

        if rows.is_empty() {
            return Err(ConversationError::SessionNotFound(session_id.into()));
        }

        let mut last_position = 0i64;
        let mut current = Vec::with_capacity(rows.len());
        for row in &rows {
            current.push(row.try_get::<String, _>("id").map_err(storage("id column"))?);
            last_position = row.try_get("position").map_err(storage("position column"))?;
        }
        if current.as_slice() != prefix_ids {
            return Err(ConversationError::CompactionConflict(session_id.into()));
        }

        sqlx::query("DELETE FROM turns WHERE session_id = ?1 AND position <= ?2")
            .bind(session_id)
            .bind(last_position)
            .execute(&mut *tx)
            .await
            .map_err(storage("DELETE prefix failed"))?;

        // The summary takes the last pruned slot so it sorts before every kept turn.
        sqlx::query(
            r#"
            INSERT INTO turns (session_id, position, id, role, content, timestamp, synthetic)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(session_id)
        .bind(last_position)
        .bind(&summary.id)
        .bind(summary.role.to_string())
        .bind(&summary.content)
        .bind(summary.timestamp.to_rfc3339())
        .bind(summary.synthetic as i64)
        .execute(&mut *tx)
        .await
        .map_err(storage("INSERT summary failed"))?;

        sqlx::query("UPDATE sessions SET last_summarized_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(storage("UPDATE session failed"))?;

        tx.commit().await.map_err(storage("COMMIT failed"))?;
        debug!(session_id, compacted = prefix_ids.len(), "Compacted session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn meta(text: &str, category: Option<FactCategory>) -> FactMetadata {
        FactMetadata {
            text: text.into(),
            category,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fact_round_trip_keeps_embedding_and_category() {
        let store = test_store().await;
        store
            .upsert("u1", "f1", vec![0.25, -1.5, 3.0], meta("likes jazz", Some(FactCategory::Hobby)))
            .await
            .unwrap();

        let facts = VectorStore::list(&store, "u1").await.unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].embedding, vec![0.25, -1.5, 3.0]);
        assert_eq!(facts[0].category, Some(FactCategory::Hobby));
        assert_eq!(VectorStore::name(&store), "sqlite");
    }

    #[tokio::test]
    async fn duplicate_fact_rejected() {
        let store = test_store().await;
        store.upsert("u1", "f1", vec![1.0], meta("a", None)).await.unwrap();
        let err = store.upsert("u1", "f1", vec![1.0], meta("b", None)).await.unwrap_err();
        assert!(matches!(err, MemoryError::Duplicate { .. }));
        // Same id under another owner is fine
        store.upsert("u2", "f1", vec![1.0], meta("c", None)).await.unwrap();
        assert_eq!(store.count("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let store = test_store().await;
        store.upsert("u1", "a", vec![0.0, 1.0], meta("a", None)).await.unwrap();
        store.upsert("u1", "b", vec![1.0, 0.0], meta("b", None)).await.unwrap();
        let hits = store.query("u1", &[1.0, 0.1], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fact.id, "b");
        assert!(store.query("nobody", &[1.0, 0.0], 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn session_append_and_load() {
        let store = test_store().await;
        assert!(store.load("c1").await.unwrap().is_none());

        let n = store
            .append("c1", "u1", vec![ConversationTurn::user("hi"), ConversationTurn::assistant("hey")])
            .await
            .unwrap();
        assert_eq!(n, 2);
        let n = store.append("c1", "u1", vec![ConversationTurn::tool("42")]).await.unwrap();
        assert_eq!(n, 3);

        let session = store.load("c1").await.unwrap().unwrap();
        assert_eq!(session.owner_id, "u1");
        let roles: Vec<_> = session.turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::Tool]);
    }

    #[tokio::test]
    async fn duplicate_turn_rolls_back_whole_batch() {
        let store = test_store().await;
        let turn = ConversationTurn::user("hi");
        store.append("c1", "u1", vec![turn.clone()]).await.unwrap();

        let err = store
            .append("c1", "u1", vec![ConversationTurn::assistant("new"), turn])
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::DuplicateTurn { .. }));
        assert_eq!(store.history("c1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn compact_replaces_prefix_in_order() {
        let store = test_store().await;
        let turns: Vec<_> = (0..5).map(|i| ConversationTurn::user(format!("t{i}"))).collect();
        let prefix: Vec<_> = turns[..3].iter().map(|t| t.id.clone()).collect();
        store.append("c1", "u1", turns).await.unwrap();

        store
            .compact("c1", &prefix, ConversationTurn::summary("digest"))
            .await
            .unwrap();

        let session = store.load("c1").await.unwrap().unwrap();
        let texts: Vec<_> = session.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(texts, ["digest", "t3", "t4"]);
        assert!(session.turns[0].synthetic);
        assert!(session.last_summarized_at.is_some());

        // Appends after compaction still land at the end
        store.append("c1", "u1", vec![ConversationTurn::user("t5")]).await.unwrap();
        let history = store.history("c1").await.unwrap();
        assert_eq!(history.last().unwrap().content, "t5");
    }

    #[tokio::test]
    async fn compact_with_stale_prefix_conflicts() {
        let store = test_store().await;
        let turns: Vec<_> = (0..3).map(|i| ConversationTurn::user(format!("t{i}"))).collect();
        store.append("c1", "u1", turns.clone()).await.unwrap();

        let stale = vec![turns[1].id.clone(), turns[2].id.clone()];
        let err = store
            .compact("c1", &stale, ConversationTurn::summary("s"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::CompactionConflict(_)));
        assert_eq!(store.history("c1").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("sqlite://{}", dir.path().join("rookery.db").display());

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.append("c1", "u1", vec![ConversationTurn::user("remember me")]).await.unwrap();
            store.upsert("u1", "f1", vec![1.0], meta("fact", None)).await.unwrap();
        }

        let store = SqliteStore::new(&path).await.unwrap();
        assert_eq!(store.history("c1").await.unwrap()[0].content, "remember me");
        assert_eq!(store.count("u1").await.unwrap(), 1);
    }
}

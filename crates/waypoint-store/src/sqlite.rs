use crate::error::{Result, StorageError};
use crate::LinkStore;
use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use waypoint_core::{LinkRecord, RecordId, ShortCode, VisitEvent};

/// SQLite implementation of [`LinkStore`].
///
/// The local database file is the registry's single persistent key space;
/// it survives process restarts. The shared code/alias namespace lives in
/// a dedicated `link_keys` table with a primary-key constraint, written in
/// the same transaction as the record row, so uniqueness enforcement is
/// atomic with the insert.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (or creates) a database file at the given path.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        Self::with_options(options).await
    }

    /// Opens an in-memory database, mainly for tests and ephemeral runs.
    pub async fn in_memory() -> Result<Self> {
        Self::with_options(SqliteConnectOptions::new().in_memory(true)).await
    }

    async fn with_options(options: SqliteConnectOptions) -> Result<Self> {
        // A single connection serializes writes, which is exactly the
        // discipline the store contract asks for; SQLite would serialize
        // writers anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(map_sqlx_error)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS links (
                id             INTEGER PRIMARY KEY,
                code           TEXT NOT NULL,
                alias          TEXT,
                original_url   TEXT NOT NULL,
                normalized_url TEXT NOT NULL,
                secret         TEXT,
                created_at     INTEGER NOT NULL,
                expires_at     INTEGER,
                visit_count    INTEGER NOT NULL DEFAULT 0,
                visit_history  TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS link_keys (
                key     TEXT PRIMARY KEY,
                link_id INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_links_normalized_url
            ON links (normalized_url)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

fn timestamp_to_millis(ts: Option<Timestamp>) -> Option<i64> {
    ts.map(|ts| ts.as_millisecond())
}

fn millis_to_timestamp(millis: Option<i64>) -> Result<Option<Timestamp>> {
    millis
        .map(|value| {
            Timestamp::from_millisecond(value).map_err(|e| {
                StorageError::InvalidData(format!("invalid timestamp '{}': {e}", value))
            })
        })
        .transpose()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn is_capacity_error(err: &sqlx::Error) -> bool {
    // SQLITE_FULL surfaces as "database or disk is full".
    err.as_database_error()
        .is_some_and(|db| db.message().contains("full"))
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    if is_capacity_error(&err) {
        return StorageError::CapacityExceeded(err.to_string());
    }

    let message = err.to_string();
    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn history_to_json(history: &[VisitEvent]) -> Result<String> {
    serde_json::to_string(history)
        .map_err(|e| StorageError::InvalidData(format!("unserializable visit history: {e}")))
}

fn record_from_row(row: &SqliteRow) -> Result<LinkRecord> {
    let id: i64 = row.try_get("id").map_err(map_sqlx_error)?;
    let code: String = row.try_get("code").map_err(map_sqlx_error)?;
    let alias: Option<String> = row.try_get("alias").map_err(map_sqlx_error)?;
    let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
    let normalized_url: String = row.try_get("normalized_url").map_err(map_sqlx_error)?;
    let secret: Option<String> = row.try_get("secret").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let expires_at: Option<i64> = row.try_get("expires_at").map_err(map_sqlx_error)?;
    let visit_count: i64 = row.try_get("visit_count").map_err(map_sqlx_error)?;
    let history_json: String = row.try_get("visit_history").map_err(map_sqlx_error)?;

    let visit_history: Vec<VisitEvent> = serde_json::from_str(&history_json)
        .map_err(|e| StorageError::InvalidData(format!("corrupt visit history: {e}")))?;

    let created_at = Timestamp::from_millisecond(created_at).map_err(|e| {
        StorageError::InvalidData(format!("invalid created_at '{}': {e}", created_at))
    })?;

    Ok(LinkRecord {
        id: RecordId::from_u64(id as u64),
        original_url,
        normalized_url,
        code: ShortCode::new_unchecked(code),
        alias: alias.map(ShortCode::new_unchecked),
        created_at,
        expires_at: millis_to_timestamp(expires_at)?,
        visit_count: visit_count as u64,
        visit_history,
        secret,
    })
}

const SELECT_COLUMNS: &str = r#"
    id, code, alias, original_url, normalized_url, secret,
    created_at, expires_at, visit_count, visit_history
"#;

#[async_trait]
impl LinkStore for SqliteStore {
    async fn insert(&self, record: LinkRecord) -> Result<()> {
        let history = history_to_json(&record.visit_history)?;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO links
                (id, code, alias, original_url, normalized_url, secret,
                 created_at, expires_at, visit_count, visit_history)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.as_u64() as i64)
        .bind(record.code.as_str())
        .bind(record.alias.as_ref().map(|a| a.as_str()))
        .bind(&record.original_url)
        .bind(&record.normalized_url)
        .bind(record.secret.as_deref())
        .bind(record.created_at.as_millisecond())
        .bind(timestamp_to_millis(record.expires_at))
        .bind(record.visit_count as i64)
        .bind(&history)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut keys = vec![record.code.as_str()];
        if let Some(alias) = &record.alias {
            // An alias equal to the code is one key, not a self-conflict.
            if alias != &record.code {
                keys.push(alias.as_str());
            }
        }

        for key in keys {
            let result = sqlx::query("INSERT INTO link_keys (key, link_id) VALUES (?, ?)")
                .bind(key)
                .bind(record.id.as_u64() as i64)
                .execute(&mut *tx)
                .await;

            if let Err(err) = result {
                // Rolling back happens on drop of the transaction.
                if is_unique_violation(&err) {
                    return Err(StorageError::Conflict(key.to_string()));
                }
                return Err(map_sqlx_error(err));
            }
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn get(&self, id: RecordId) -> Result<Option<LinkRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM links WHERE id = ? LIMIT 1"
        ))
        .bind(id.as_u64() as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn get_by_code(&self, key: &ShortCode) -> Result<Option<LinkRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM links
            WHERE id = (SELECT link_id FROM link_keys WHERE key = ?)
            LIMIT 1
            "#
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn get_by_normalized_url(&self, normalized: &str) -> Result<Option<LinkRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM links
            WHERE normalized_url = ?
            ORDER BY created_at ASC
            LIMIT 1
            "#
        ))
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn update(&self, record: LinkRecord) -> Result<bool> {
        let history = history_to_json(&record.visit_history)?;

        let result = sqlx::query(
            r#"
            UPDATE links
            SET original_url = ?, normalized_url = ?, secret = ?,
                created_at = ?, expires_at = ?, visit_count = ?, visit_history = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.original_url)
        .bind(&record.normalized_url)
        .bind(record.secret.as_deref())
        .bind(record.created_at.as_millisecond())
        .bind(timestamp_to_millis(record.expires_at))
        .bind(record.visit_count as i64)
        .bind(&history)
        .bind(record.id.as_u64() as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_visit(&self, id: RecordId, event: VisitEvent) -> Result<Option<LinkRecord>> {
        // Read-modify-write inside one transaction; SQLite's single-writer
        // model keeps concurrent visits from losing increments.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM links WHERE id = ? LIMIT 1"
        ))
        .bind(id.as_u64() as i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = record_from_row(&row)?;
        record.visit_count += 1;
        record.visit_history.push(event);
        let history = history_to_json(&record.visit_history)?;

        sqlx::query("UPDATE links SET visit_count = ?, visit_history = ? WHERE id = ?")
            .bind(record.visit_count as i64)
            .bind(&history)
            .bind(id.as_u64() as i64)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(Some(record))
    }

    async fn delete(&self, id: RecordId) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM link_keys WHERE link_id = ?")
            .bind(id.as_u64() as i64)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let result = sqlx::query("DELETE FROM links WHERE id = ?")
            .bind(id.as_u64() as i64)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, ids: &[RecordId]) -> Result<u64> {
        let mut removed = 0;
        for id in ids {
            if self.delete(*id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn list_all(&self) -> Result<Vec<LinkRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM links ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(record_from_row).collect()
    }
}

// SQLite-backed StoreRepository

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::repository::{RepositoryError, StoreRepository};
use super::types::{AuditLogEntry, NewAuditEntry, Store};
use crate::database::{decode_timestamp, encode_timestamp};

const STORE_COLUMNS: &str = "id, name, status, engine, url, admin_user, admin_password, created_at";

pub struct SqliteStoreRepository {
    pool: SqlitePool,
}

impl SqliteStoreRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn corrupt(reason: impl Into<String>) -> RepositoryError {
    RepositoryError::Corrupt { reason: reason.into() }
}

fn parse_uuid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|e| corrupt(format!("bad store id '{raw}': {e}")))
}

fn store_from_row(row: &SqliteRow) -> Result<Store, RepositoryError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let engine: String = row.try_get("engine")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Store {
        id: parse_uuid(&id)?,
        name: row.try_get("name")?,
        status: status.parse().map_err(corrupt)?,
        engine: engine.parse().map_err(corrupt)?,
        url: row.try_get("url")?,
        admin_user: row.try_get("admin_user")?,
        admin_password: row.try_get("admin_password")?,
        created_at: decode_timestamp(&created_at).map_err(corrupt)?,
    })
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditLogEntry, RepositoryError> {
    let store_id: String = row.try_get("store_id")?;
    let timestamp: String = row.try_get("timestamp")?;

    Ok(AuditLogEntry {
        id: row.try_get("id")?,
        store_id: parse_uuid(&store_id)?,
        event: row.try_get("event")?,
        details: row.try_get("details")?,
        timestamp: decode_timestamp(&timestamp).map_err(corrupt)?,
    })
}

fn map_conflict(err: sqlx::Error, name: &str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict {
            name: name.to_string(),
        },
        _ => RepositoryError::Database(err),
    }
}

#[async_trait]
impl StoreRepository for SqliteStoreRepository {
    async fn insert(&self, store: &Store) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO stores (id, name, status, engine, url, admin_user, admin_password, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(store.id.to_string())
        .bind(&store.name)
        .bind(store.status.as_str())
        .bind(store.engine.as_str())
        .bind(&store.url)
        .bind(&store.admin_user)
        .bind(&store.admin_password)
        .bind(encode_timestamp(store.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| map_conflict(e, &store.name))?;

        Ok(())
    }

    async fn update(&self, store: &Store) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE stores SET name = ?1, status = ?2, url = ?3 WHERE id = ?4")
            .bind(&store.name)
            .bind(store.status.as_str())
            .bind(&store.url)
            .bind(store.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| map_conflict(e, &store.name))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Missing { id: store.id });
        }
        Ok(())
    }

    async fn commit_transition(&self, store: &Store, entry: NewAuditEntry) -> Result<AuditLogEntry, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE stores SET name = ?1, status = ?2, url = ?3 WHERE id = ?4")
            .bind(&store.name)
            .bind(store.status.as_str())
            .bind(&store.url)
            .bind(store.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_conflict(e, &store.name))?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::Missing { id: store.id });
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO audit_logs (store_id, event, details, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(entry.store_id.to_string())
        .bind(&entry.event)
        .bind(&entry.details)
        .bind(encode_timestamp(entry.timestamp))
        .execute(&mut *tx)
        .await?;

        // Dropping `tx` on an early return rolls both statements back.
        tx.commit().await?;

        Ok(AuditLogEntry {
            id: inserted.last_insert_rowid(),
            store_id: entry.store_id,
            event: entry.event,
            details: entry.details,
            timestamp: entry.timestamp,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(store_from_row).transpose()
    }

    async fn find_active_by_name(&self, name: &str) -> Result<Option<Store>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {STORE_COLUMNS} FROM stores WHERE name = ?1 AND status <> 'DELETED' LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(store_from_row).transpose()
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<Store>, RepositoryError> {
        let sql = if include_deleted {
            format!("SELECT {STORE_COLUMNS} FROM stores ORDER BY created_at ASC, name ASC")
        } else {
            format!("SELECT {STORE_COLUMNS} FROM stores WHERE status <> 'DELETED' ORDER BY created_at ASC, name ASC")
        };

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(store_from_row).collect()
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<AuditLogEntry, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (store_id, event, details, timestamp)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(entry.store_id.to_string())
        .bind(&entry.event)
        .bind(&entry.details)
        .bind(encode_timestamp(entry.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(AuditLogEntry {
            id: result.last_insert_rowid(),
            store_id: entry.store_id,
            event: entry.event,
            details: entry.details,
            timestamp: entry.timestamp,
        })
    }

    async fn audit_trail(&self, store_id: Uuid) -> Result<Vec<AuditLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, store_id, event, details, timestamp
            FROM audit_logs
            WHERE store_id = ?1
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(store_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(audit_from_row).collect()
    }
}

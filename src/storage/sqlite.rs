use crate::models::{now_timestamp, AuthKey, Pin, PinStatus, Upload, User};
use crate::pagination::{Page, PageRequest};
use crate::storage::trait_def::cursor_key;
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;

const UPLOAD_COLUMNS: &str = "id, cid, name, dag_size, created, updated";
const USER_COLUMNS: &str = "id, issuer, email, name, customer_id, created, updated";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn push_pin_filter<'a>(
    builder: &mut QueryBuilder<'a, Sqlite>,
    user_id: i64,
    statuses: &[PinStatus],
) {
    builder.push(
        " FROM pins p JOIN uploads u ON u.id = p.upload_id WHERE u.deleted_at IS NULL AND u.user_id = ",
    );
    builder.push_bind(user_id);
    if !statuses.is_empty() {
        builder.push(" AND p.status IN (");
        let mut separated = builder.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        separated.push_unseparated(")");
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                issuer TEXT NOT NULL UNIQUE,
                email TEXT,
                name TEXT,
                customer_id TEXT,
                created TEXT NOT NULL,
                updated TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS auth_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                secret_hash TEXT NOT NULL UNIQUE,
                created TEXT NOT NULL,
                deleted_at TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_auth_keys_user ON auth_keys(user_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                cid TEXT NOT NULL,
                name TEXT,
                dag_size INTEGER,
                created TEXT NOT NULL,
                updated TEXT NOT NULL,
                deleted_at TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_uploads_live_cid ON uploads(user_id, cid) WHERE deleted_at IS NULL",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_uploads_user_created ON uploads(user_id, created)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                upload_id INTEGER NOT NULL REFERENCES uploads(id),
                location TEXT NOT NULL,
                status TEXT NOT NULL,
                created TEXT NOT NULL,
                updated TEXT NOT NULL,
                UNIQUE (upload_id, location)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn upsert_user(
        &self,
        issuer: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<User> {
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (issuer, email, name, created, updated)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (issuer) DO UPDATE SET
                email = COALESCE(excluded.email, users.email),
                name = COALESCE(excluded.name, users.name),
                updated = excluded.updated
            "#,
        )
        .bind(issuer)
        .bind(email)
        .bind(name)
        .bind(&now)
        .bind(&now)
        .execute(self.pool.as_ref())
        .await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE issuer = ?"
        ))
        .bind(issuer)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn get_user_by_issuer(&self, issuer: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE issuer = ?"
        ))
        .bind(issuer)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn get_user_by_key_hash(&self, secret_hash: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.issuer, u.email, u.name, u.customer_id, u.created, u.updated
            FROM auth_keys k
            JOIN users u ON u.id = k.user_id
            WHERE k.secret_hash = ? AND k.deleted_at IS NULL
            "#,
        )
        .bind(secret_hash)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn set_customer_id(&self, user_id: i64, customer_id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET customer_id = ?, updated = ? WHERE id = ?")
            .bind(customer_id)
            .bind(now_timestamp())
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(users)
    }

    async fn create_key(&self, user_id: i64, name: &str, secret_hash: &str) -> Result<AuthKey> {
        let key = sqlx::query_as::<_, AuthKey>(
            r#"
            INSERT INTO auth_keys (user_id, name, secret_hash, created)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, name, created
            "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(secret_hash)
        .bind(now_timestamp())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(key)
    }

    async fn list_keys(&self, user_id: i64) -> Result<Vec<AuthKey>> {
        let keys = sqlx::query_as::<_, AuthKey>(
            r#"
            SELECT id, user_id, name, created
            FROM auth_keys
            WHERE user_id = ? AND deleted_at IS NULL
            ORDER BY created DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(keys)
    }

    async fn delete_key(&self, user_id: i64, key_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE auth_keys
            SET deleted_at = ?
            WHERE id = ? AND user_id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(now_timestamp())
        .bind(key_id)
        .bind(user_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_upload(
        &self,
        user_id: i64,
        cid: &str,
        name: Option<&str>,
        dag_size: Option<i64>,
    ) -> StorageResult<Upload> {
        let now = now_timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO uploads (user_id, cid, name, dag_size, created, updated)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(cid)
        .bind(name)
        .bind(dag_size)
        .bind(&now)
        .bind(&now)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        self.get_upload(user_id, cid)
            .await?
            .ok_or_else(|| StorageError::Other(anyhow::anyhow!("upload vanished after insert")))
    }

    async fn get_upload(&self, user_id: i64, cid: &str) -> Result<Option<Upload>> {
        let upload = sqlx::query_as::<_, Upload>(&format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE user_id = ? AND cid = ? AND deleted_at IS NULL"
        ))
        .bind(user_id)
        .bind(cid)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(upload)
    }

    async fn list_uploads(
        &self,
        user_id: i64,
        request: &PageRequest,
    ) -> StorageResult<Page<Upload>> {
        match request {
            PageRequest::Offset { size, .. } => {
                let count = sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM uploads WHERE user_id = ? AND deleted_at IS NULL",
                )
                .bind(user_id)
                .fetch_one(self.pool.as_ref())
                .await? as u64;

                request.ensure_in_range(count)?;

                let items = sqlx::query_as::<_, Upload>(&format!(
                    r#"
                    SELECT {UPLOAD_COLUMNS} FROM uploads
                    WHERE user_id = ? AND deleted_at IS NULL
                    ORDER BY created DESC, id DESC
                    LIMIT ? OFFSET ?
                    "#
                ))
                .bind(user_id)
                .bind(i64::from(*size))
                .bind(request.offset() as i64)
                .fetch_all(self.pool.as_ref())
                .await?;

                Ok(Page::new(items, Some(count)))
            }
            PageRequest::Cursor {
                size,
                before,
                before_id,
            } => {
                let cursor = cursor_key(before, *before_id)?;

                let items = sqlx::query_as::<_, Upload>(&format!(
                    r#"
                    SELECT {UPLOAD_COLUMNS} FROM uploads
                    WHERE user_id = ? AND deleted_at IS NULL
                      AND (created < ? OR (created = ? AND id < ?))
                    ORDER BY created DESC, id DESC
                    LIMIT ?
                    "#
                ))
                .bind(user_id)
                .bind(&cursor.created)
                .bind(&cursor.created)
                .bind(cursor.id)
                .bind(i64::from(*size))
                .fetch_all(self.pool.as_ref())
                .await?;

                Ok(Page::new(items, None))
            }
        }
    }

    async fn rename_upload(&self, user_id: i64, cid: &str, name: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET name = ?, updated = ?
            WHERE user_id = ? AND cid = ? AND deleted_at IS NULL
            "#,
        )
        .bind(name)
        .bind(now_timestamp())
        .bind(user_id)
        .bind(cid)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_upload(&self, user_id: i64, cid: &str) -> Result<bool> {
        let now = now_timestamp();
        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET deleted_at = ?, updated = ?
            WHERE user_id = ? AND cid = ? AND deleted_at IS NULL
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(user_id)
        .bind(cid)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn used_storage(&self, user_id: i64) -> Result<i64> {
        let used = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(dag_size), 0) FROM uploads WHERE user_id = ? AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(used)
    }

    async fn upsert_pin(
        &self,
        user_id: i64,
        cid: &str,
        location: &str,
        status: PinStatus,
    ) -> Result<bool> {
        let upload_id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM uploads WHERE user_id = ? AND cid = ? AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(cid)
        .fetch_optional(self.pool.as_ref())
        .await?;

        let Some(upload_id) = upload_id else {
            return Ok(false);
        };

        let now = now_timestamp();
        sqlx::query(
            r#"
            INSERT INTO pins (upload_id, location, status, created, updated)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (upload_id, location) DO UPDATE SET
                status = excluded.status,
                updated = excluded.updated
            "#,
        )
        .bind(upload_id)
        .bind(location)
        .bind(status.as_str())
        .bind(&now)
        .bind(&now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(true)
    }

    async fn list_pins(
        &self,
        user_id: i64,
        statuses: &[PinStatus],
        request: &PageRequest,
    ) -> StorageResult<Page<Pin>> {
        let mut count = None;
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT p.id, u.cid, u.name, p.status, p.location, p.created, p.updated",
        );
        push_pin_filter(&mut builder, user_id, statuses);

        match request {
            PageRequest::Offset { .. } => {
                let mut counter = QueryBuilder::<Sqlite>::new("SELECT COUNT(*)");
                push_pin_filter(&mut counter, user_id, statuses);
                let total = counter
                    .build_query_scalar::<i64>()
                    .fetch_one(self.pool.as_ref())
                    .await? as u64;
                request.ensure_in_range(total)?;
                count = Some(total);
            }
            PageRequest::Cursor { before, before_id, .. } => {
                let cursor = cursor_key(before, *before_id)?;
                builder.push(" AND (p.created < ");
                builder.push_bind(cursor.created.clone());
                builder.push(" OR (p.created = ");
                builder.push_bind(cursor.created);
                builder.push(" AND p.id < ");
                builder.push_bind(cursor.id);
                builder.push("))");
            }
        }

        builder.push(" ORDER BY p.created DESC, p.id DESC LIMIT ");
        builder.push_bind(i64::from(request.size()));
        builder.push(" OFFSET ");
        builder.push_bind(request.offset() as i64);

        let items = builder
            .build_query_as::<Pin>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(Page::new(items, count))
    }
}

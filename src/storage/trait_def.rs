use crate::models::{AuthKey, Pin, PinStatus, Upload, User};
use crate::pagination::{Page, PageRequest, PaginationError};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Other(e.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Insert a user or refresh the profile of an existing one, keyed by issuer
    async fn upsert_user(
        &self,
        issuer: &str,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<User>;

    async fn get_user_by_issuer(&self, issuer: &str) -> Result<Option<User>>;

    /// Resolve the owner of a live (not deleted) API key by its secret hash
    async fn get_user_by_key_hash(&self, secret_hash: &str) -> Result<Option<User>>;

    async fn set_customer_id(&self, user_id: i64, customer_id: &str) -> Result<()>;

    /// List users, newest first
    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>>;

    async fn create_key(&self, user_id: i64, name: &str, secret_hash: &str) -> Result<AuthKey>;

    async fn list_keys(&self, user_id: i64) -> Result<Vec<AuthKey>>;

    /// Soft-delete a key; false when the key does not exist for this user
    async fn delete_key(&self, user_id: i64, key_id: i64) -> Result<bool>;

    /// Register an upload. Fails with `Conflict` if the user already has a
    /// live upload with this CID.
    async fn create_upload(
        &self,
        user_id: i64,
        cid: &str,
        name: Option<&str>,
        dag_size: Option<i64>,
    ) -> StorageResult<Upload>;

    async fn get_upload(&self, user_id: i64, cid: &str) -> Result<Option<Upload>>;

    /// List live uploads, newest first.
    ///
    /// Offset requests report the total count and fail with
    /// `RangeNotSatisfiable` past the end; cursor requests return uploads
    /// strictly after the `(before, before_id)` position and no count.
    async fn list_uploads(&self, user_id: i64, request: &PageRequest)
        -> StorageResult<Page<Upload>>;

    async fn rename_upload(&self, user_id: i64, cid: &str, name: &str) -> Result<bool>;

    async fn delete_upload(&self, user_id: i64, cid: &str) -> Result<bool>;

    /// Sum of the DAG sizes of the user's live uploads
    async fn used_storage(&self, user_id: i64) -> Result<i64>;

    /// Record the pin status of an upload at a location; false when the
    /// upload does not exist
    async fn upsert_pin(
        &self,
        user_id: i64,
        cid: &str,
        location: &str,
        status: PinStatus,
    ) -> Result<bool>;

    /// List pins of live uploads, newest first, optionally filtered by status.
    /// Pagination follows `list_uploads`.
    async fn list_pins(
        &self,
        user_id: i64,
        statuses: &[PinStatus],
        request: &PageRequest,
    ) -> StorageResult<Page<Pin>>;
}

/// A position in `created DESC, id DESC` order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CursorKey {
    pub created: String,
    pub id: i64,
}

/// Normalize a cursor into the canonical timestamp form used for `created`.
///
/// Row ids start at 1, so a cursor without a tiebreak id excludes every row
/// created at `before`.
pub(crate) fn cursor_key(before: &str, before_id: Option<i64>) -> Result<CursorKey, PaginationError> {
    let created = crate::models::canonical_timestamp(before)
        .ok_or_else(|| PaginationError::invalid("before", before))?;
    Ok(CursorKey {
        created,
        id: before_id.unwrap_or(0),
    })
}

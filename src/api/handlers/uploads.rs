use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::paginated;
use crate::api::AppState;
use crate::auth::AuthedUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{CreateUploadRequest, RenameUploadRequest, Upload};
use crate::pagination::{PageQuery, PageRequest, PageResponse};

const MAX_CID_LEN: usize = 128;

fn validate_cid(cid: &str) -> ApiResult<()> {
    if cid.is_empty() || cid.len() > MAX_CID_LEN || !cid.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::BadRequest(format!("invalid CID: {cid}")));
    }
    Ok(())
}

/// List the caller's uploads, newest first, by page number or by cursor
pub async fn list_uploads(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    uri: Uri,
    Query(query): Query<PageQuery>,
) -> ApiResult<PageResponse<Upload>> {
    let request = PageRequest::parse(&query, &state.pagination)?;
    let page = state.storage.list_uploads(user.id, &request).await?;
    Ok(paginated(&state, &uri, request, page))
}

pub async fn create_upload(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    Json(payload): Json<CreateUploadRequest>,
) -> ApiResult<(StatusCode, Json<Upload>)> {
    validate_cid(&payload.cid)?;
    if payload.dag_size.is_some_and(|size| size < 0) {
        return Err(ApiError::BadRequest("dagSize must not be negative".to_string()));
    }

    let upload = state
        .storage
        .create_upload(user.id, &payload.cid, payload.name.as_deref(), payload.dag_size)
        .await?;
    Ok((StatusCode::CREATED, Json(upload)))
}

pub async fn get_upload(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    Path(cid): Path<String>,
) -> ApiResult<Json<Upload>> {
    state
        .storage
        .get_upload(user.id, &cid)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("upload"))
}

pub async fn rename_upload(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    Path(cid): Path<String>,
    Json(payload): Json<RenameUploadRequest>,
) -> ApiResult<Json<RenameUploadRequest>> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }

    if !state.storage.rename_upload(user.id, &cid, &payload.name).await? {
        return Err(ApiError::NotFound("upload"));
    }
    Ok(Json(payload))
}

pub async fn delete_upload(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    Path(cid): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state.storage.delete_upload(user.id, &cid).await? {
        return Err(ApiError::NotFound("upload"));
    }
    Ok(Json(json!({ "cid": cid })))
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::info;

use super::SuccessResponse;
use crate::api::AppState;
use crate::auth::AuthedUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{AuthKey, CreateKeyRequest, CreatedKey};

const MAX_TOKEN_NAME_LEN: usize = 100;

pub async fn list_tokens(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
) -> ApiResult<Json<Vec<AuthKey>>> {
    Ok(Json(state.storage.list_keys(user.id).await?))
}

pub async fn create_token(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    Json(payload): Json<CreateKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreatedKey>)> {
    let name = payload.name.trim();
    if name.is_empty() || name.len() > MAX_TOKEN_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "token name must be 1-{MAX_TOKEN_NAME_LEN} characters"
        )));
    }

    let issued = state.auth.tokens().issue(&user.issuer)?;
    let key = state
        .storage
        .create_key(user.id, name, &issued.hash)
        .await?;

    info!(user_id = user.id, key_id = key.id, "API token created");
    Ok((
        StatusCode::CREATED,
        Json(CreatedKey {
            key,
            secret: issued.secret,
        }),
    ))
}

pub async fn delete_token(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SuccessResponse>> {
    if !state.storage.delete_key(user.id, id).await? {
        return Err(ApiError::NotFound("token"));
    }

    info!(user_id = user.id, key_id = id, "API token deleted");
    Ok(Json(SuccessResponse {
        message: "Token deleted successfully".to_string(),
    }))
}

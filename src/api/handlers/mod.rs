pub mod payment;
pub mod pins;
pub mod tokens;
pub mod uploads;

use axum::{
    extract::State,
    http::{HeaderMap, Uri},
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::AppState;
use crate::auth::{bearer_token, AuthedUser};
use crate::error::ApiResult;
use crate::models::{Account, User};
use crate::pagination::{build_links, LinkBase, Page, PageRequest, PageResponse, Timestamped};

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Attach navigation links to a page fetched for `request`.
fn paginated<T: Timestamped>(
    state: &AppState,
    uri: &Uri,
    request: PageRequest,
    page: Page<T>,
) -> PageResponse<T> {
    let links = build_links(&LinkBase::from_uri(uri), &request, &page, &state.pagination);
    PageResponse {
        request,
        page,
        links,
    }
}

/// Exchange an identity token for a user record, creating it on first login
pub async fn login(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<Json<User>> {
    let identity = state.auth.identify(bearer_token(&headers)).await?;
    let user = state
        .storage
        .upsert_user(
            &identity.issuer,
            identity.email.as_deref(),
            identity.name.as_deref(),
        )
        .await?;

    info!(user_id = user.id, "user logged in");
    Ok(Json(user))
}

pub async fn account(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
) -> ApiResult<Json<Account>> {
    let used_storage = state.storage.used_storage(user.id).await?;
    Ok(Json(Account { user, used_storage }))
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}

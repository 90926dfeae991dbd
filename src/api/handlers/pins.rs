use axum::{
    extract::{Query, State},
    http::Uri,
    Extension,
};
use serde::Deserialize;
use std::sync::Arc;

use super::paginated;
use crate::api::AppState;
use crate::auth::AuthedUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{Pin, PinStatus};
use crate::pagination::{PageQuery, PageRequest, PageResponse};

#[derive(Debug, Default, Deserialize)]
pub struct PinFilter {
    /// Comma separated statuses; all statuses when absent
    pub status: Option<String>,
}

impl PinFilter {
    fn statuses(&self) -> ApiResult<Vec<PinStatus>> {
        let mut statuses = Vec::new();
        for raw in self.status.iter().flat_map(|s| s.split(',')) {
            if raw.trim().is_empty() {
                continue;
            }
            let status = raw
                .parse::<PinStatus>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            if !statuses.contains(&status) {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }
}

/// List pins of the caller's uploads, newest first
pub async fn list_pins(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    uri: Uri,
    Query(query): Query<PageQuery>,
    Query(filter): Query<PinFilter>,
) -> ApiResult<PageResponse<Pin>> {
    let statuses = filter.statuses()?;
    let request = PageRequest::parse(&query, &state.pagination)?;
    let page = state.storage.list_pins(user.id, &statuses, &request).await?;
    Ok(paginated(&state, &uri, request, page))
}

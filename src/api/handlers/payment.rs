use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::api::AppState;
use crate::auth::AuthedUser;
use crate::billing::{is_payment_method_id, PaymentMethod};
use crate::error::{ApiError, ApiResult};
use crate::models::User;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSettings {
    pub payment_method: Option<PaymentMethod>,
}

/// The user's billing customer id, creating the customer on first use.
async fn ensure_customer(state: &AppState, user: &User) -> ApiResult<String> {
    if let Some(customer_id) = &user.customer_id {
        return Ok(customer_id.clone());
    }

    let customer_id = state.billing.create_customer(user).await?;
    state.storage.set_customer_id(user.id, &customer_id).await?;
    info!(user_id = user.id, "created billing customer");
    Ok(customer_id)
}

pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
) -> ApiResult<Json<PaymentSettings>> {
    let Some(customer_id) = user.customer_id.as_deref() else {
        return Ok(Json(PaymentSettings {
            payment_method: None,
        }));
    };

    let payment_method = state.billing.get_payment_method(customer_id).await?;
    Ok(Json(PaymentSettings { payment_method }))
}

pub async fn save_payment(
    State(state): State<Arc<AppState>>,
    Extension(AuthedUser(user)): Extension<AuthedUser>,
    Json(payload): Json<PaymentSettings>,
) -> ApiResult<Json<PaymentSettings>> {
    let payment_method_id = payload
        .payment_method
        .map(|method| method.id)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("paymentMethod.id is required".to_string()))?;
    if !is_payment_method_id(&payment_method_id) {
        return Err(ApiError::BadRequest(format!(
            "invalid payment method id: {payment_method_id}"
        )));
    }

    let customer_id = ensure_customer(&state, &user).await?;
    let saved = state
        .billing
        .save_payment_method(&customer_id, &payment_method_id)
        .await?;

    info!(user_id = user.id, "payment method updated");
    Ok(Json(PaymentSettings {
        payment_method: Some(saved),
    }))
}

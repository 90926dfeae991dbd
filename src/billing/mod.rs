//! Payment settings, delegated to an external billing provider.

mod stripe;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::User;

pub use stripe::StripeBilling;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("billing is not configured")]
    NotConfigured,
    /// The provider refused the request because of what the user sent
    /// (unknown or declined payment method).
    #[error("{message}")]
    PaymentRejected { message: String },
    #[error("billing provider returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("billing provider request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl BillingError {
    pub fn status(&self) -> StatusCode {
        match self {
            BillingError::NotConfigured => StatusCode::NOT_IMPLEMENTED,
            BillingError::PaymentRejected { .. } => StatusCode::BAD_REQUEST,
            BillingError::Provider { .. } | BillingError::Http(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message safe to show to API clients for server-side failures.
    pub fn public_message(&self) -> &'static str {
        match self {
            BillingError::NotConfigured => "billing is not configured",
            _ => "payment provider error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub brand: String,
    pub last4: String,
    #[serde(alias = "exp_month")]
    pub exp_month: u32,
    #[serde(alias = "exp_year")]
    pub exp_year: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
}

/// A provider object id such as `cus_NffrFeUfNV2Hib`: a lowercase prefix, an
/// underscore, then ASCII alphanumerics or underscores.
pub fn is_object_id(id: &str) -> bool {
    match id.split_once('_') {
        Some((prefix, rest)) => {
            !prefix.is_empty()
                && prefix.bytes().all(|b| b.is_ascii_lowercase())
                && !rest.is_empty()
                && rest.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        }
        None => false,
    }
}

pub fn is_payment_method_id(id: &str) -> bool {
    id.starts_with("pm_") && is_object_id(id)
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a provider-side customer for the user and return its id
    async fn create_customer(&self, user: &User) -> Result<String, BillingError>;

    /// The customer's default payment method, if one is set
    async fn get_payment_method(
        &self,
        customer_id: &str,
    ) -> Result<Option<PaymentMethod>, BillingError>;

    /// Attach a payment method to the customer and make it the default
    async fn save_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError>;
}

/// Provider used when `BILLING_MODE=none`.
pub struct DisabledBilling;

#[async_trait]
impl BillingProvider for DisabledBilling {
    async fn create_customer(&self, _user: &User) -> Result<String, BillingError> {
        Err(BillingError::NotConfigured)
    }

    async fn get_payment_method(
        &self,
        _customer_id: &str,
    ) -> Result<Option<PaymentMethod>, BillingError> {
        Err(BillingError::NotConfigured)
    }

    async fn save_payment_method(
        &self,
        _customer_id: &str,
        _payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        Err(BillingError::NotConfigured)
    }
}

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{is_object_id, BillingError, BillingProvider, PaymentMethod};
use crate::config::StripeConfig;
use crate::models::User;

/// Stripe REST client covering customers and default payment methods.
#[derive(Clone)]
pub struct StripeBilling {
    api_url: Url,
    secret_key: String,
    client: Client,
}

impl StripeBilling {
    pub fn from_config(config: &StripeConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .with_context(|| format!("invalid Stripe API URL '{}'", config.api_url))?;
        if api_url.cannot_be_a_base() {
            bail!("Stripe API URL '{}' cannot carry a path", config.api_url);
        }

        let client = Client::builder()
            .user_agent("depot-billing/0.1.0")
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client for Stripe")?;

        Ok(Self {
            api_url,
            secret_key: config.secret_key.clone(),
            client,
        })
    }

    /// `{api_url}/v1/{segments...}` with every segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("v1").extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BillingError> {
        let response = request.bearer_auth(&self.secret_key).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = response
            .json::<StripeErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| status.to_string());

        debug!(status = status.as_u16(), %message, "stripe request failed");

        if matches!(status.as_u16(), 400 | 402 | 404) {
            Err(BillingError::PaymentRejected { message })
        } else {
            Err(BillingError::Provider {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl BillingProvider for StripeBilling {
    async fn create_customer(&self, user: &User) -> Result<String, BillingError> {
        let user_id = user.id.to_string();
        let mut form = vec![
            ("metadata[user_id]", user_id.as_str()),
            ("metadata[issuer]", user.issuer.as_str()),
        ];
        if let Some(email) = user.email.as_deref() {
            form.push(("email", email));
        }
        if let Some(name) = user.name.as_deref() {
            form.push(("name", name));
        }

        let customer: StripeCustomer = self
            .send(self.client.post(self.url(&["customers"])).form(&form))
            .await?;
        Ok(customer.id)
    }

    async fn get_payment_method(
        &self,
        customer_id: &str,
    ) -> Result<Option<PaymentMethod>, BillingError> {
        let customer_id = object_id(customer_id)?;
        let customer: StripeCustomer = self
            .send(
                self.client
                    .get(self.url(&["customers", customer_id]))
                    .query(&[("expand[]", "invoice_settings.default_payment_method")]),
            )
            .await?;

        if customer.deleted {
            return Ok(None);
        }

        Ok(customer
            .invoice_settings
            .and_then(|settings| settings.default_payment_method))
    }

    async fn save_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        let customer_id = object_id(customer_id)?;
        let payment_method_id = object_id(payment_method_id)?;
        let method: PaymentMethod = self
            .send(
                self.client
                    .post(self.url(&["payment_methods", payment_method_id, "attach"]))
                    .form(&[("customer", customer_id)]),
            )
            .await?;

        let _: StripeCustomer = self
            .send(
                self.client
                    .post(self.url(&["customers", customer_id]))
                    .form(&[("invoice_settings[default_payment_method]", payment_method_id)]),
            )
            .await?;

        Ok(method)
    }
}

fn object_id(id: &str) -> Result<&str, BillingError> {
    if is_object_id(id) {
        Ok(id)
    } else {
        Err(BillingError::PaymentRejected {
            message: format!("invalid Stripe object id {id:?}"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    invoice_settings: Option<InvoiceSettings>,
}

#[derive(Debug, Deserialize)]
struct InvoiceSettings {
    #[serde(default)]
    default_payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

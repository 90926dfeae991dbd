pub mod magic;
pub mod oauth;
pub mod token;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::api::AppState;
use crate::config::{AuthConfig, AuthMode};
use crate::error::ApiError;
use crate::models::User;
use crate::storage::Storage;

pub use magic::MagicValidator;
pub use oauth::OAuthValidator;
pub use token::{hash_token, IssuedToken, TokenIssuer};

/// Issuer recorded for every request when authentication is disabled.
pub const DEV_ISSUER: &str = "local-dev";

/// Who the identity provider says the caller is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub issuer: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// The authenticated user, inserted into request extensions by
/// [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthedUser(pub User);

enum IdentityProvider {
    Disabled,
    Magic(MagicValidator),
    Oauth(OAuthValidator),
}

pub struct AuthService {
    provider: IdentityProvider,
    tokens: TokenIssuer,
}

impl AuthService {
    pub async fn new(config: AuthConfig) -> Result<Self> {
        let provider = match config.mode {
            AuthMode::None => IdentityProvider::Disabled,
            AuthMode::Magic => {
                let magic = config
                    .magic
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("magic-link configuration missing"))?;
                IdentityProvider::Magic(MagicValidator::from_config(magic)?)
            }
            AuthMode::Oauth => {
                let oauth = config
                    .oauth
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("OAuth configuration missing"))?;
                IdentityProvider::Oauth(OAuthValidator::from_config(oauth).await?)
            }
        };

        Ok(Self {
            provider,
            tokens: TokenIssuer::new(&config.token_secret),
        })
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.provider, IdentityProvider::Disabled)
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Validate an identity-provider token (login token).
    pub async fn identify(&self, token: Option<&str>) -> Result<Identity, ApiError> {
        let identity = match &self.provider {
            IdentityProvider::Disabled => {
                return Ok(Identity {
                    issuer: DEV_ISSUER.to_string(),
                    email: None,
                    name: Some("Local Developer".to_string()),
                })
            }
            IdentityProvider::Magic(magic) => magic.validate(require(token)?).await,
            IdentityProvider::Oauth(oauth) => oauth.validate(require(token)?).await,
        };

        identity.map_err(|e| {
            debug!(error = %e, "identity token rejected");
            ApiError::Unauthorized("invalid identity token".to_string())
        })
    }

    /// Resolve the user behind a bearer token.
    ///
    /// API tokens are checked first; anything else is treated as an identity
    /// token whose user must already have logged in.
    pub async fn authenticate(
        &self,
        storage: &dyn Storage,
        token: Option<&str>,
    ) -> Result<User, ApiError> {
        if !self.is_enabled() {
            let identity = self.identify(None).await?;
            return Ok(storage
                .upsert_user(&identity.issuer, identity.email.as_deref(), identity.name.as_deref())
                .await?);
        }

        let token = require(token)?;
        if let Some(hash) = self.tokens.verify(token) {
            return storage
                .get_user_by_key_hash(&hash)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("API token has been revoked".to_string()));
        }

        let identity = self.identify(Some(token)).await?;
        storage
            .get_user_by_issuer(&identity.issuer)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("unknown user, log in first".to_string()))
    }
}

fn require(token: Option<&str>) -> Result<&str, ApiError> {
    token.ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))
}

/// Extract the token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| {
            h.strip_prefix("Bearer ")
                .or_else(|| h.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    match state
        .auth
        .authenticate(state.storage.as_ref(), bearer_token(&headers))
        .await
    {
        Ok(user) => {
            request.extensions_mut().insert(AuthedUser(user));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

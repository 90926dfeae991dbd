use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub api_server: ServerConfig,
    pub auth: AuthConfig,
    pub billing: BillingConfig,
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    None,
    Magic,
    Oauth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub mode: AuthMode,
    /// HMAC secret for signing API tokens
    pub token_secret: String,
    #[serde(default)]
    pub magic: Option<MagicConfig>,
    #[serde(default)]
    pub oauth: Option<OAuthConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagicConfig {
    pub secret_key: String,
    #[serde(default = "MagicConfig::default_api_url")]
    pub api_url: String,
    /// Clock skew tolerated when checking a DID token's `nbf`
    #[serde(default = "MagicConfig::default_nbf_leeway_secs")]
    pub nbf_leeway_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub issuer_url: String,
    pub audience: String,
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default = "OAuthConfig::default_cache_ttl_secs")]
    pub jwks_cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingMode {
    None,
    Stripe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    pub mode: BillingMode,
    #[serde(default)]
    pub stripe: Option<StripeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    #[serde(default = "StripeConfig::default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Page size used when a request does not specify one
    pub default_size: u32,
    /// Largest page size a client may request
    pub max_size: u32,
    /// Emit `rel="last"` with `page=0` for empty offset results
    #[serde(default)]
    pub emit_last_when_empty: bool,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: 25,
            max_size: 1000,
            emit_last_when_empty: false,
        }
    }
}

impl MagicConfig {
    fn default_api_url() -> String {
        "https://api.magic.link".to_string()
    }

    const fn default_nbf_leeway_secs() -> i64 {
        300
    }
}

impl OAuthConfig {
    const fn default_cache_ttl_secs() -> u64 {
        300
    }
}

impl StripeConfig {
    fn default_api_url() -> String {
        "https://api.stripe.com".to_string()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://./depot.db?mode=rwc".to_string());
        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let api_port = std::env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("API_PORT must be a valid port number")?;

        let mut auth_mode = std::env::var("AUTH_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase();

        if env_flag("DISABLE_AUTH") {
            auth_mode = "none".to_string();
        }

        let auth_mode = match auth_mode.as_str() {
            "none" => AuthMode::None,
            "magic" => AuthMode::Magic,
            "oauth" => AuthMode::Oauth,
            other => {
                tracing::warn!(
                    "Unknown AUTH_MODE '{other}', falling back to 'none'. Supported values: none, magic, oauth"
                );
                AuthMode::None
            }
        };

        let token_secret = match std::env::var("TOKEN_SECRET") {
            Ok(secret) => secret,
            Err(_) if matches!(auth_mode, AuthMode::None) => "insecure-development-secret".to_string(),
            Err(_) => anyhow::bail!("TOKEN_SECRET must be set when authentication is enabled"),
        };

        let magic = if matches!(auth_mode, AuthMode::Magic) {
            let secret_key = std::env::var("MAGIC_SECRET_KEY")
                .context("MAGIC_SECRET_KEY must be set when AUTH_MODE=magic")?;
            let api_url = std::env::var("MAGIC_API_URL")
                .unwrap_or_else(|_| MagicConfig::default_api_url());
            let nbf_leeway_secs = std::env::var("MAGIC_NBF_LEEWAY_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or_else(MagicConfig::default_nbf_leeway_secs);
            Some(MagicConfig {
                secret_key,
                api_url,
                nbf_leeway_secs,
            })
        } else {
            None
        };

        let oauth = if matches!(auth_mode, AuthMode::Oauth) {
            let issuer_url = std::env::var("OAUTH_ISSUER_URL")
                .context("OAUTH_ISSUER_URL must be set when AUTH_MODE=oauth")?;
            let audience = std::env::var("OAUTH_AUDIENCE")
                .context("OAUTH_AUDIENCE must be set when AUTH_MODE=oauth")?;
            let jwks_url = std::env::var("OAUTH_JWKS_URL").ok();
            let jwks_cache_ttl_secs = std::env::var("OAUTH_JWKS_CACHE_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or_else(OAuthConfig::default_cache_ttl_secs);

            Some(OAuthConfig {
                issuer_url,
                audience,
                jwks_url,
                jwks_cache_ttl_secs,
            })
        } else {
            None
        };

        let billing_mode = match std::env::var("BILLING_MODE")
            .unwrap_or_else(|_| "none".to_string())
            .to_lowercase()
            .as_str()
        {
            "stripe" => BillingMode::Stripe,
            "none" => BillingMode::None,
            other => {
                tracing::warn!(
                    "Unknown BILLING_MODE '{other}', falling back to 'none'. Supported values: none, stripe"
                );
                BillingMode::None
            }
        };

        let stripe = if matches!(billing_mode, BillingMode::Stripe) {
            let secret_key = std::env::var("STRIPE_SECRET_KEY")
                .context("STRIPE_SECRET_KEY must be set when BILLING_MODE=stripe")?;
            let api_url = std::env::var("STRIPE_API_URL")
                .unwrap_or_else(|_| StripeConfig::default_api_url());
            Some(StripeConfig {
                secret_key,
                api_url,
            })
        } else {
            None
        };

        let defaults = PaginationConfig::default();
        let default_size = std::env::var("PAGINATION_DEFAULT_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.default_size);
        let max_size = std::env::var("PAGINATION_MAX_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.max_size);
        if default_size > max_size {
            anyhow::bail!(
                "PAGINATION_DEFAULT_SIZE ({default_size}) exceeds PAGINATION_MAX_SIZE ({max_size})"
            );
        }

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            api_server: ServerConfig {
                host: api_host,
                port: api_port,
            },
            auth: AuthConfig {
                mode: auth_mode,
                token_secret,
                magic,
                oauth,
            },
            billing: BillingConfig {
                mode: billing_mode,
                stripe,
            },
            pagination: PaginationConfig {
                default_size,
                max_size,
                emit_last_when_empty: env_flag("PAGINATION_EMIT_EMPTY_LAST"),
            },
        })
    }
}

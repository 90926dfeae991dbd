use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::Identity;
use crate::config::OAuthConfig;

#[derive(Default)]
struct KeyCache {
    keys: HashMap<String, Arc<DecodingKey>>,
    refreshed: Option<Instant>,
}

impl KeyCache {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.refreshed.map_or(true, |at| at.elapsed() > ttl)
    }
}

/// Validates OIDC ID tokens against the issuer's JWKS.
#[derive(Clone)]
pub struct OAuthValidator {
    issuer: String,
    audience: String,
    jwks_uri: String,
    client: Client,
    cache: Arc<RwLock<KeyCache>>,
    cache_ttl: Duration,
}

impl OAuthValidator {
    pub async fn from_config(config: &OAuthConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("depot-oauth-validator/0.1.0")
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client for OAuth validation")?;

        let jwks_uri = resolve_jwks_uri(config, &client).await?;
        let validator = Self {
            issuer: config.issuer_url.clone(),
            audience: config.audience.clone(),
            jwks_uri,
            client,
            cache: Arc::new(RwLock::new(KeyCache::default())),
            cache_ttl: Duration::from_secs(config.jwks_cache_ttl_secs.max(60)),
        };

        // Prime the key cache so the first login doesn't pay for the fetch.
        validator.refresh_keys().await?;

        Ok(validator)
    }

    pub async fn validate(&self, token: &str) -> Result<Identity> {
        let header = decode_header(token).context("failed to parse token header")?;
        if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            bail!("symmetric identity tokens are not accepted");
        }

        let kid = header
            .kid
            .ok_or_else(|| anyhow!("token header missing 'kid'"))?;

        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.validate_aud = false;

        let claims = decode::<Value>(token, key.as_ref(), &validation)
            .context("token failed signature or structural validation")?
            .claims;

        let issuer = claims
            .get("iss")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("token missing 'iss' claim"))?;
        if issuer != self.issuer {
            bail!("token issuer '{}' does not match expected issuer", issuer);
        }

        if !audience_matches(claims.get("aud"), &self.audience) {
            bail!("token audience does not include expected value");
        }

        identity_from_claims(&claims)
    }

    async fn decoding_key(&self, kid: &str) -> Result<Arc<DecodingKey>> {
        {
            let cache = self.cache.read().await;
            if !cache.is_stale(self.cache_ttl) {
                if let Some(key) = cache.keys.get(kid) {
                    return Ok(Arc::clone(key));
                }
            }
        }

        debug!(kid, "refreshing JWKS cache");
        self.refresh_keys().await?;

        self.cache
            .read()
            .await
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| anyhow!("no JWKS entry found for key id '{kid}'"))
    }

    async fn refresh_keys(&self) -> Result<()> {
        let jwks: JwkSet = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .context("failed to request JWKS")?
            .error_for_status()
            .context("JWKS endpoint returned an error status")?
            .json()
            .await
            .context("failed to parse JWKS response")?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            let Some(kid) = jwk.kid else {
                warn!("Skipping JWKS entry without 'kid'");
                continue;
            };

            if jwk.kty != "RSA" {
                warn!("Skipping unsupported JWKS key type: {}", jwk.kty);
                continue;
            }

            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                warn!("Skipping RSA JWKS entry {kid} without modulus or exponent");
                continue;
            };
            let key = DecodingKey::from_rsa_components(n, e)
                .context("failed to build RSA decoding key from JWKS entry")?;
            keys.insert(kid, Arc::new(key));
        }

        if keys.is_empty() {
            bail!("JWKS response did not contain any usable keys");
        }

        let mut cache = self.cache.write().await;
        cache.keys = keys;
        cache.refreshed = Some(Instant::now());

        Ok(())
    }
}

fn identity_from_claims(claims: &Value) -> Result<Identity> {
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .filter(|sub| !sub.is_empty())
        .ok_or_else(|| anyhow!("token missing 'sub' claim"))?;
    let text = |name: &str| claims.get(name).and_then(Value::as_str).map(String::from);

    Ok(Identity {
        issuer: format!("oauth|{subject}"),
        email: text("email"),
        name: text("name").or_else(|| text("preferred_username")),
    })
}

fn audience_matches(aud_claim: Option<&Value>, expected: &str) -> bool {
    match aud_claim {
        Some(Value::String(aud)) => aud == expected,
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(Value::as_str)
            .any(|entry| entry == expected),
        _ => false,
    }
}

async fn resolve_jwks_uri(config: &OAuthConfig, client: &Client) -> Result<String> {
    if let Some(url) = &config.jwks_url {
        return Ok(url.clone());
    }

    let issuer = config.issuer_url.trim_end_matches('/');
    let discovery_url = format!("{issuer}/.well-known/openid-configuration");
    let metadata: OpenIdProviderMetadata = client
        .get(&discovery_url)
        .send()
        .await
        .context("failed to request OpenID provider metadata")?
        .error_for_status()
        .context("OpenID provider metadata endpoint returned an error status")?
        .json()
        .await
        .context("failed to parse OpenID provider metadata")?;

    metadata
        .jwks_uri
        .ok_or_else(|| anyhow!("OpenID provider metadata did not include 'jwks_uri'"))
}

#[derive(Debug, Deserialize)]
struct OpenIdProviderMetadata {
    jwks_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    #[serde(default)]
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn audience_matching_handles_strings_and_arrays() {
        assert!(audience_matches(Some(&json!("abc")), "abc"));
        assert!(!audience_matches(Some(&json!("abc")), "def"));

        let array = json!(["def", "ghi"]);
        assert!(audience_matches(Some(&array), "def"));
        assert!(!audience_matches(Some(&array), "abc"));

        assert!(!audience_matches(None, "abc"));
    }

    #[test]
    fn identity_is_namespaced_by_subject() {
        let identity = identity_from_claims(&json!({
            "sub": "github|42",
            "email": "ada@example.com",
            "preferred_username": "ada"
        }))
        .unwrap();
        assert_eq!(identity.issuer, "oauth|github|42");
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
        assert_eq!(identity.name.as_deref(), Some("ada"));

        assert!(identity_from_claims(&json!({ "sub": "" })).is_err());
    }

    #[tokio::test]
    async fn discovers_jwks_uri_from_issuer_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jwks_uri": format!("{}/keys", server.uri())
            })))
            .mount(&server)
            .await;

        let config = OAuthConfig {
            issuer_url: format!("{}/", server.uri()),
            audience: "depot".to_string(),
            jwks_url: None,
            jwks_cache_ttl_secs: 300,
        };
        let uri = resolve_jwks_uri(&config, &Client::new()).await.unwrap();
        assert_eq!(uri, format!("{}/keys", server.uri()));
    }
}

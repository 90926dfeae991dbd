use anyhow::{Context, Result};
use base64::prelude::*;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const TOKEN_ISSUER: &str = "depot";

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: String,
    iss: String,
    iat: i64,
    jti: String,
}

/// Issues and checks API tokens.
///
/// Tokens are HS256 JWTs naming the user's issuer. A token is only honoured
/// while a key row with its SHA-256 hash exists, so deleting the key revokes
/// it.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// A freshly minted token and the hash to store for it.
pub struct IssuedToken {
    pub secret: String,
    pub hash: String,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_issuer: &str) -> Result<IssuedToken> {
        let claims = TokenClaims {
            sub: user_issuer.to_string(),
            iss: TOKEN_ISSUER.to_string(),
            iat: chrono::Utc::now().timestamp(),
            jti: BASE64_URL_SAFE_NO_PAD.encode(rand::random::<[u8; 16]>()),
        };
        let secret = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("failed to sign API token")?;
        let hash = hash_token(&secret);
        Ok(IssuedToken { secret, hash })
    }

    /// Returns the storage hash of `token` if it carries our signature.
    pub fn verify(&self, token: &str) -> Option<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["iss", "sub"]);
        validation.validate_exp = false;

        decode::<TokenClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|_| hash_token(token))
    }
}

pub fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

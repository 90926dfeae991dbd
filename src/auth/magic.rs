use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::prelude::*;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use reqwest::Client;
use serde::Deserialize;
use sha3::{Digest, Keccak256};

use super::Identity;
use crate::config::MagicConfig;

const ETHR_DID_PREFIX: &str = "did:ethr:";

/// Validates magic-link DID tokens.
///
/// The proof must be an Ethereum `personal_sign` signature over the claim by
/// the address named in the claim's `iss`. The claim is then checked for
/// expiry and the issuer resolved through the provider's admin API, which
/// also yields the email.
#[derive(Clone)]
pub struct MagicValidator {
    api_url: String,
    secret_key: String,
    nbf_leeway_secs: i64,
    client: Client,
}

/// A decoded DID token. `raw_claim` is the exact string that was signed.
#[derive(Debug)]
struct DidToken {
    proof: String,
    raw_claim: String,
    claim: DidClaim,
}

#[derive(Debug, Deserialize)]
struct DidClaim {
    iss: String,
    ext: i64,
    #[serde(default)]
    nbf: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct AdminResponse {
    data: AdminUser,
}

#[derive(Debug, Deserialize)]
struct AdminUser {
    issuer: String,
    #[serde(default)]
    email: Option<String>,
}

impl MagicValidator {
    pub fn from_config(config: &MagicConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("depot-magic-validator/0.1.0")
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client for magic-link validation")?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            nbf_leeway_secs: config.nbf_leeway_secs,
            client,
        })
    }

    pub async fn validate(&self, token: &str) -> Result<Identity> {
        let token = parse_did_token(token)?;
        verify_proof(&token)?;
        check_validity(&token.claim, chrono::Utc::now().timestamp(), self.nbf_leeway_secs)?;
        let issuer = token.claim.iss;

        let response: AdminResponse = self
            .client
            .get(format!("{}/v1/admin/auth/user/get", self.api_url))
            .query(&[("issuer", issuer.as_str())])
            .header("X-Magic-Secret-Key", &self.secret_key)
            .send()
            .await
            .context("failed to request magic-link user metadata")?
            .error_for_status()
            .context("magic-link admin API rejected the issuer")?
            .json()
            .await
            .context("failed to parse magic-link user metadata")?;

        if response.data.issuer != issuer {
            bail!("magic-link admin API returned a different issuer");
        }

        Ok(Identity {
            issuer,
            email: response.data.email,
            name: None,
        })
    }
}

/// A DID token is base64 of the JSON array `[proof, claim]` where `claim` is
/// itself a JSON document.
fn parse_did_token(token: &str) -> Result<DidToken> {
    let decoded = BASE64_STANDARD
        .decode(token.trim())
        .map_err(|_| anyhow!("DID token is not valid base64"))?;
    let [proof, raw_claim]: [String; 2] =
        serde_json::from_slice(&decoded).context("DID token is not a [proof, claim] pair")?;
    let claim = serde_json::from_str(&raw_claim).context("DID token claim is malformed")?;
    Ok(DidToken {
        proof,
        raw_claim,
        claim,
    })
}

fn verify_proof(token: &DidToken) -> Result<()> {
    let address = token
        .claim
        .iss
        .strip_prefix(ETHR_DID_PREFIX)
        .ok_or_else(|| anyhow!("DID token issuer is not a did:ethr identifier"))?;
    let signer = recover_signer(&token.raw_claim, &token.proof)?;
    if !signer.eq_ignore_ascii_case(address) {
        bail!("DID token proof was not signed by its issuer");
    }
    Ok(())
}

fn check_validity(claim: &DidClaim, now: i64, nbf_leeway_secs: i64) -> Result<()> {
    if claim.ext <= now {
        bail!("DID token has expired");
    }
    if claim.nbf.is_some_and(|nbf| nbf - nbf_leeway_secs > now) {
        bail!("DID token is not yet valid");
    }
    Ok(())
}

/// Keccak-256 of an EIP-191 `personal_sign` message.
fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(format!("\x19Ethereum Signed Message:\n{}", message.len()));
    hasher.update(message);
    hasher.finalize().into()
}

/// Address of the key behind a 65-byte `r || s || v` signature of `message`.
fn recover_signer(message: &str, proof: &str) -> Result<String> {
    let bytes = hex::decode(proof.trim_start_matches("0x"))
        .map_err(|_| anyhow!("DID token proof is not hex"))?;
    let [rs @ .., v] = bytes.as_slice() else {
        bail!("DID token proof is empty");
    };
    if rs.len() != 64 {
        bail!("DID token proof must be a 65-byte signature");
    }

    let signature =
        Signature::from_slice(rs).map_err(|_| anyhow!("DID token proof is not a valid signature"))?;
    let recovery_id = RecoveryId::from_byte(if *v >= 27 { v - 27 } else { *v })
        .ok_or_else(|| anyhow!("DID token proof has an invalid recovery id"))?;

    // Ethereum signers do not always normalize `s`
    let (signature, recovery_id) = match signature.normalize_s() {
        Some(low) => (
            low,
            RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
        ),
        None => (signature, recovery_id),
    };

    let key = VerifyingKey::recover_from_prehash(
        &personal_message_hash(message),
        &signature,
        recovery_id,
    )
    .map_err(|_| anyhow!("DID token proof does not match its claim"))?;
    Ok(ethereum_address(&key))
}

fn ethereum_address(key: &VerifyingKey) -> String {
    let point = key.as_affine().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

//! API integration tests
//!
//! These drive the full router against SQLite: pagination headers and link
//! traversal, token management, uploads, pins and payment settings.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use depot::api;
use depot::auth::{AuthService, DEV_ISSUER};
use depot::billing::{BillingError, BillingProvider, DisabledBilling, PaymentMethod};
use depot::config::{AuthConfig, AuthMode, PaginationConfig};
use depot::models::{PinStatus, User};
use depot::storage::{SqliteStorage, Storage};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const TIED: &str = "2024-05-01T12:00:00.000Z";

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// File-backed storage plus its URL, for tests that rewrite rows directly
async fn create_file_storage(name: &str) -> (Arc<dyn Storage>, String) {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let path = std::env::temp_dir().join(format!("depot-api-{name}-{nanos}.db"));
    let url = format!("sqlite://{}?mode=rwc", path.display());
    let storage = SqliteStorage::new(&url, 5).await.unwrap();
    storage.init().await.unwrap();
    (Arc::new(storage), url)
}

/// Stamp every upload and pin with the same creation time
async fn tie_timestamps(url: &str) {
    let pool = sqlx::SqlitePool::connect(url).await.unwrap();
    for table in ["uploads", "pins"] {
        sqlx::query(&format!("UPDATE {table} SET created = ?"))
            .bind(TIED)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool.close().await;
}

/// Helper to create an auth service with authentication disabled
async fn create_test_auth_service() -> Arc<AuthService> {
    let config = AuthConfig {
        mode: AuthMode::None,
        token_secret: "test-secret".to_string(),
        magic: None,
        oauth: None,
    };
    Arc::new(AuthService::new(config).await.unwrap())
}

fn app(storage: &Arc<dyn Storage>, auth: Arc<AuthService>, billing: Arc<dyn BillingProvider>) -> Router {
    api::create_api_router(Arc::clone(storage), auth, billing, PaginationConfig::default())
}

async fn dev_app(storage: &Arc<dyn Storage>) -> Router {
    app(storage, create_test_auth_service().await, Arc::new(DisabledBilling))
}

async fn dev_user(storage: &Arc<dyn Storage>) -> User {
    storage.upsert_user(DEV_ISSUER, None, None).await.unwrap()
}

/// Create `n` uploads back to back; returns CIDs newest first
async fn seed_uploads(storage: &Arc<dyn Storage>, user_id: i64, n: usize) -> Vec<String> {
    let mut cids = Vec::new();
    for i in 0..n {
        let cid = format!("bafy{i}");
        storage
            .create_upload(user_id, &cid, None, Some(10))
            .await
            .unwrap();
        cids.push(cid);
    }
    cids.reverse();
    cids
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, HeaderMap, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}

/// Extract the URL of a relation from a `Link` header
fn link(headers: &HeaderMap, rel: &str) -> Option<String> {
    let value = headers.get("link")?.to_str().ok()?;
    value.split(", ").find_map(|part| {
        let (url, relation) = part.split_once("; ")?;
        (relation == format!("rel=\"{rel}\""))
            .then(|| url.trim_start_matches('<').trim_end_matches('>').to_string())
    })
}

fn cids(body: &Value) -> Vec<String> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|item| item["cid"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_offset_pagination_headers() {
    let storage = create_test_storage().await;
    let user = dev_user(&storage).await;
    let expected = seed_uploads(&storage, user.id, 5).await;
    let app = dev_app(&storage).await;

    let (status, headers, body) = send(&app, "GET", "/user/uploads?size=2&page=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cids(&body), expected[0..2]);
    assert_eq!(headers["count"], "5");
    assert_eq!(headers["size"], "2");
    assert_eq!(headers["page"], "1");
    assert_eq!(link(&headers, "next").as_deref(), Some("/user/uploads?size=2&page=2"));
    assert_eq!(link(&headers, "last").as_deref(), Some("/user/uploads?size=2&page=3"));
    assert_eq!(link(&headers, "first").as_deref(), Some("/user/uploads?size=2&page=1"));
    assert_eq!(link(&headers, "previous"), None);

    let (_, headers, body) = send(&app, "GET", "/user/uploads?size=2&page=3", None).await;
    assert_eq!(cids(&body), expected[4..5]);
    assert_eq!(link(&headers, "next"), None);
    assert_eq!(link(&headers, "previous").as_deref(), Some("/user/uploads?size=2&page=2"));
}

#[tokio::test]
async fn test_offset_links_visit_every_upload_once() {
    let storage = create_test_storage().await;
    let user = dev_user(&storage).await;
    let expected = seed_uploads(&storage, user.id, 7).await;
    let app = dev_app(&storage).await;

    let mut seen = Vec::new();
    let mut next = Some("/user/uploads?size=3".to_string());
    while let Some(uri) = next {
        let (status, headers, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        seen.extend(cids(&body));
        next = link(&headers, "next");
    }
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_cursor_links_visit_every_upload_once() {
    let storage = create_test_storage().await;
    let user = dev_user(&storage).await;
    let expected = seed_uploads(&storage, user.id, 6).await;
    let app = dev_app(&storage).await;

    let mut seen = Vec::new();
    let mut requests = 0;
    let mut next = Some("/user/uploads?size=3&before=2999-01-01T00%3A00%3A00Z".to_string());
    while let Some(uri) = next {
        let (status, headers, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers.get("count").is_none());
        assert!(headers.get("page").is_none());
        assert!(link(&headers, "first").is_none());
        seen.extend(cids(&body));
        next = link(&headers, "next");
        requests += 1;
    }
    assert_eq!(seen, expected);
    // Two full pages, then an empty one that ends the traversal
    assert_eq!(requests, 3);
}

#[tokio::test]
async fn test_cursor_links_survive_tied_timestamps() {
    let (storage, url) = create_file_storage("tied-uploads").await;
    let user = dev_user(&storage).await;
    let expected = seed_uploads(&storage, user.id, 5).await;
    tie_timestamps(&url).await;
    let app = dev_app(&storage).await;

    let mut seen = Vec::new();
    let mut next = Some("/user/uploads?size=2&before=2999-01-01T00%3A00%3A00Z".to_string());
    while let Some(uri) = next {
        let (status, headers, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        seen.extend(cids(&body));
        next = link(&headers, "next");
        if let Some(next) = &next {
            assert!(next.contains("before=2024-05-01T12%3A00%3A00.000Z"), "{next}");
            assert!(next.contains("&before_id="), "{next}");
        }
    }
    assert_eq!(seen, expected);

    // A bare timestamp excludes every row created at that instant
    let (status, _, body) = send(&app, "GET", "/user/uploads?before=2024-05-01T12%3A00%3A00Z", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Array(vec![]));

    let (status, _, _) = send(&app, "GET", "/user/uploads?before_id=3", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pin_cursor_links_keep_status_filter() {
    let (storage, url) = create_file_storage("tied-pins").await;
    let user = dev_user(&storage).await;
    let uploads = seed_uploads(&storage, user.id, 5).await;
    for cid in &uploads {
        storage
            .upsert_pin(user.id, cid, "peer-a", PinStatus::Pinned)
            .await
            .unwrap();
    }
    storage
        .upsert_pin(user.id, &uploads[0], "peer-b", PinStatus::Queued)
        .await
        .unwrap();
    tie_timestamps(&url).await;
    let app = dev_app(&storage).await;

    let mut pins = Vec::new();
    let mut requests = 0;
    let mut next = Some("/user/pins?status=pinned&size=2&before=2999-01-01T00%3A00%3A00Z".to_string());
    while let Some(uri) = next {
        let (status, headers, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert!(headers.get("count").is_none());
        for pin in body.as_array().unwrap() {
            assert_eq!(pin["status"], "Pinned");
            pins.push(pin["id"].as_i64().unwrap());
        }
        next = link(&headers, "next");
        if let Some(next) = &next {
            assert!(next.starts_with("/user/pins?status=pinned&size=2&before="), "{next}");
            assert!(next.contains("&before_id="), "{next}");
        }
        requests += 1;
    }

    let mut unique = pins.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(pins.len(), 5);
    assert_eq!(unique.len(), 5);
    // Ties are ordered by id, newest first
    assert!(pins.windows(2).all(|pair| pair[0] > pair[1]));
    // Three pages, the last one partial and without a next link
    assert_eq!(requests, 3);
}

#[tokio::test]
async fn test_empty_listing() {
    let storage = create_test_storage().await;
    let app = dev_app(&storage).await;

    let (status, headers, body) = send(&app, "GET", "/user/uploads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Array(vec![]));
    assert_eq!(headers["count"], "0");
    assert_eq!(headers["size"], "25");
    assert_eq!(link(&headers, "first").as_deref(), Some("/user/uploads?size=25&page=1"));
    assert_eq!(link(&headers, "last"), None);
    assert_eq!(link(&headers, "next"), None);
}

#[tokio::test]
async fn test_pagination_errors() {
    let storage = create_test_storage().await;
    let user = dev_user(&storage).await;
    seed_uploads(&storage, user.id, 3).await;
    let app = dev_app(&storage).await;

    let (status, _, _) = send(&app, "GET", "/user/uploads?size=2&page=5", None).await;
    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);

    for uri in [
        "/user/uploads?size=0",
        "/user/uploads?size=abc",
        "/user/uploads?size=1001",
        "/user/uploads?page=-1",
        "/user/uploads?before=yesterday",
    ] {
        let (status, _, body) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn test_pin_listing_keeps_status_filter_in_links() {
    let storage = create_test_storage().await;
    let user = dev_user(&storage).await;
    let uploads = seed_uploads(&storage, user.id, 4).await;
    for cid in &uploads {
        storage
            .upsert_pin(user.id, cid, "peer-a", PinStatus::Pinned)
            .await
            .unwrap();
    }
    storage
        .upsert_pin(user.id, &uploads[0], "peer-b", PinStatus::Queued)
        .await
        .unwrap();
    let app = dev_app(&storage).await;

    let (status, headers, body) = send(&app, "GET", "/user/pins?status=pinned&size=3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["count"], "4");
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .all(|pin| pin["status"] == "Pinned"));
    assert_eq!(
        link(&headers, "next").as_deref(),
        Some("/user/pins?status=pinned&size=3&page=2")
    );

    let (_, headers, body) = send(&app, "GET", "/user/pins?status=queued,failed", None).await;
    assert_eq!(headers["count"], "1");
    assert_eq!(body[0]["location"], "peer-b");

    let (status, _, _) = send(&app, "GET", "/user/pins?status=lost", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_endpoints() {
    let storage = create_test_storage().await;
    let app = dev_app(&storage).await;

    let (status, _, body) = send(
        &app,
        "POST",
        "/user/uploads",
        Some(serde_json::json!({ "cid": "bafyabc", "name": "a.txt", "dagSize": 42 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["dagSize"], 42);

    let (status, _, _) = send(
        &app,
        "POST",
        "/user/uploads",
        Some(serde_json::json!({ "cid": "bafyabc" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _, _) = send(
        &app,
        "POST",
        "/user/uploads",
        Some(serde_json::json!({ "cid": "not a cid" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = send(
        &app,
        "POST",
        "/user/uploads/bafyabc/rename",
        Some(serde_json::json!({ "name": "b.txt" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "b.txt");

    let (_, _, body) = send(&app, "GET", "/user/uploads/bafyabc", None).await;
    assert_eq!(body["name"], "b.txt");

    let (_, _, body) = send(&app, "GET", "/user/account", None).await;
    assert_eq!(body["usedStorage"], 42);
    assert_eq!(body["issuer"], DEV_ISSUER);

    let (status, _, body) = send(&app, "DELETE", "/user/uploads/bafyabc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cid"], "bafyabc");

    let (status, _, _) = send(&app, "GET", "/user/uploads/bafyabc", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_token_endpoints() {
    let storage = create_test_storage().await;
    let app = dev_app(&storage).await;

    let (status, _, created) = send(
        &app,
        "POST",
        "/user/tokens",
        Some(serde_json::json!({ "name": "ci" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["secret"].as_str().unwrap().split('.').count() == 3);

    let (_, _, listed) = send(&app, "GET", "/user/tokens", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], "ci");
    assert!(listed[0].get("secret").is_none());

    let (status, _, _) = send(
        &app,
        "POST",
        "/user/tokens",
        Some(serde_json::json!({ "name": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = created["id"].as_i64().unwrap();
    let (status, _, _) = send(&app, "DELETE", &format!("/user/tokens/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, "DELETE", &format!("/user/tokens/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

/// Billing provider double that remembers what it was asked to do
#[derive(Default)]
struct RecordingBilling {
    customers: Mutex<Vec<i64>>,
    default_method: Mutex<Option<PaymentMethod>>,
}

#[async_trait]
impl BillingProvider for RecordingBilling {
    async fn create_customer(&self, user: &User) -> Result<String, BillingError> {
        self.customers.lock().unwrap().push(user.id);
        Ok(format!("cus_{}", user.id))
    }

    async fn get_payment_method(
        &self,
        _customer_id: &str,
    ) -> Result<Option<PaymentMethod>, BillingError> {
        Ok(self.default_method.lock().unwrap().clone())
    }

    async fn save_payment_method(
        &self,
        _customer_id: &str,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        if payment_method_id == "pm_declined" {
            return Err(BillingError::PaymentRejected {
                message: "Your card was declined.".to_string(),
            });
        }
        let method = PaymentMethod {
            id: payment_method_id.to_string(),
            card: None,
        };
        *self.default_method.lock().unwrap() = Some(method.clone());
        Ok(method)
    }
}

#[tokio::test]
async fn test_payment_settings() {
    let storage = create_test_storage().await;
    let billing = Arc::new(RecordingBilling::default());
    let app = app(
        &storage,
        create_test_auth_service().await,
        Arc::clone(&billing) as Arc<dyn BillingProvider>,
    );

    let (status, _, body) = send(&app, "GET", "/user/payment", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentMethod"], Value::Null);

    let (status, _, body) = send(
        &app,
        "PUT",
        "/user/payment",
        Some(serde_json::json!({ "paymentMethod": { "id": "pm_1" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentMethod"]["id"], "pm_1");

    let (_, _, body) = send(&app, "GET", "/user/payment", None).await;
    assert_eq!(body["paymentMethod"]["id"], "pm_1");

    let (status, _, body) = send(
        &app,
        "PUT",
        "/user/payment",
        Some(serde_json::json!({ "paymentMethod": { "id": "pm_declined" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Your card was declined.");

    let (status, _, _) = send(
        &app,
        "PUT",
        "/user/payment",
        Some(serde_json::json!({ "paymentMethod": null })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The customer is created once and remembered
    assert_eq!(billing.customers.lock().unwrap().len(), 1);
    let user = storage.get_user_by_issuer(DEV_ISSUER).await.unwrap().unwrap();
    assert_eq!(user.customer_id, Some(format!("cus_{}", user.id)));
}

#[tokio::test]
async fn test_payment_rejects_crafted_method_ids() {
    let storage = create_test_storage().await;
    let billing = Arc::new(RecordingBilling::default());
    let app = app(
        &storage,
        create_test_auth_service().await,
        Arc::clone(&billing) as Arc<dyn BillingProvider>,
    );

    for id in ["../customers/cus_victim?x=", "pm_1/detach", "cus_123", "pm_", ""] {
        let (status, _, body) = send(
            &app,
            "PUT",
            "/user/payment",
            Some(serde_json::json!({ "paymentMethod": { "id": id } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{id}");
        assert!(body["error"].is_string());
    }

    // Nothing reached the billing provider
    assert!(billing.customers.lock().unwrap().is_empty());
    assert!(billing.default_method.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_payment_without_billing_configured() {
    let storage = create_test_storage().await;
    let app = dev_app(&storage).await;

    let (status, _, body) = send(
        &app,
        "PUT",
        "/user/payment",
        Some(serde_json::json!({ "paymentMethod": { "id": "pm_1" } })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["error"], "billing is not configured");
}

#[tokio::test]
async fn test_health_check() {
    let storage = create_test_storage().await;
    let app = dev_app(&storage).await;

    let (status, _, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OK");
}

mod magic_auth {
    use super::*;
    use base64::prelude::*;
    use depot::config::MagicConfig;
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    use sha3::{Digest, Keccak256};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn signing_key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    /// `did:ethr` identifier of the key's Ethereum address
    fn issuer_of(key: &SigningKey) -> String {
        let point = key.verifying_key().as_affine().to_encoded_point(false);
        let hash = Keccak256::digest(&point.as_bytes()[1..]);
        format!("did:ethr:0x{}", hex::encode(&hash[12..]))
    }

    /// `personal_sign` the claim, as a wallet would
    fn sign(key: &SigningKey, claim: &str) -> String {
        let mut hasher = Keccak256::new();
        hasher.update(format!("\x19Ethereum Signed Message:\n{}", claim.len()));
        hasher.update(claim);
        let digest: [u8; 32] = hasher.finalize().into();
        let (signature, recovery_id) = key.sign_prehash_recoverable(&digest).unwrap();
        format!(
            "0x{}{:02x}",
            hex::encode(signature.to_bytes()),
            recovery_id.to_byte() + 27
        )
    }

    fn claim(iss: &str) -> String {
        let ext = chrono::Utc::now().timestamp() + 600;
        serde_json::json!({ "iss": iss, "ext": ext }).to_string()
    }

    fn encode(proof: &str, claim: &str) -> String {
        BASE64_STANDARD.encode(serde_json::json!([proof, claim]).to_string())
    }

    fn did_token(key: &SigningKey) -> String {
        let claim = claim(&issuer_of(key));
        encode(&sign(key, &claim), &claim)
    }

    async fn authed(app: &Router, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {token}"));
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn magic_app(server: &MockServer) -> Router {
        let auth = AuthService::new(AuthConfig {
            mode: AuthMode::Magic,
            token_secret: "test-secret".to_string(),
            magic: Some(MagicConfig {
                secret_key: "sk_test".to_string(),
                api_url: server.uri(),
                nbf_leeway_secs: 300,
            }),
            oauth: None,
        })
        .await
        .unwrap();

        let storage = create_test_storage().await;
        app(&storage, Arc::new(auth), Arc::new(DisabledBilling))
    }

    async fn mount_admin_user(server: &MockServer, issuer: &str) {
        Mock::given(method("GET"))
            .and(path("/v1/admin/auth/user/get"))
            .and(query_param("issuer", issuer))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "issuer": issuer, "email": "feed@example.com" }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_login_and_api_token_lifecycle() {
        let key = signing_key(7);
        let issuer = issuer_of(&key);
        let server = MockServer::start().await;
        mount_admin_user(&server, &issuer).await;

        let app = magic_app(&server).await;
        let did = did_token(&key);

        // Unknown users and missing tokens are rejected
        let (status, _, _) = send(&app, "GET", "/user/account", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = authed(&app, "GET", "/user/account", &did, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, user) = authed(&app, "POST", "/user/login", &did, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["email"], "feed@example.com");

        let (status, _) = authed(&app, "GET", "/user/account", &did, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, created) = authed(
            &app,
            "POST",
            "/user/tokens",
            &did,
            Some(serde_json::json!({ "name": "ci" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let secret = created["secret"].as_str().unwrap().to_string();

        let (status, account) = authed(&app, "GET", "/user/account", &secret, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(account["issuer"], issuer);

        let id = created["id"].as_i64().unwrap();
        let (status, _) = authed(&app, "DELETE", &format!("/user/tokens/{id}"), &secret, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = authed(&app, "GET", "/user/account", &secret, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "API token has been revoked");

        // Signed, but unknown to the provider
        let (status, _) = authed(&app, "POST", "/user/login", &did_token(&signing_key(8)), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_forged_proof_is_rejected() {
        let key = signing_key(7);
        let issuer = issuer_of(&key);
        let server = MockServer::start().await;
        // The provider knows the issuer, so only the proof stands in the way
        mount_admin_user(&server, &issuer).await;
        let app = magic_app(&server).await;

        let claim = claim(&issuer);
        let forged = [
            encode("attacker-garbage-not-a-signature", &claim),
            encode(&sign(&signing_key(9), &claim), &claim),
        ];
        for token in &forged {
            let (status, _) = authed(&app, "POST", "/user/login", token, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            let (status, _) = authed(&app, "GET", "/user/account", token, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }

        let (status, _) = authed(&app, "POST", "/user/login", &encode(&sign(&key, &claim), &claim), None).await;
        assert_eq!(status, StatusCode::OK);
    }
}

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{auth_middleware, AuthService};
use crate::billing::BillingProvider;
use crate::config::PaginationConfig;
use crate::storage::Storage;

use super::handlers::{
    account, health_check, login, payment, pins, tokens, uploads,
};
use super::AppState;

pub fn create_api_router(
    storage: Arc<dyn Storage>,
    auth_service: Arc<AuthService>,
    billing: Arc<dyn BillingProvider>,
    pagination: PaginationConfig,
) -> Router {
    let state = Arc::new(AppState {
        storage,
        auth: auth_service,
        billing,
        pagination,
    });

    let protected_routes = Router::new()
        .route("/user/account", get(account))
        .route("/user/tokens", get(tokens::list_tokens).post(tokens::create_token))
        .route("/user/tokens/{id}", delete(tokens::delete_token))
        .route(
            "/user/uploads",
            get(uploads::list_uploads).post(uploads::create_upload),
        )
        .route(
            "/user/uploads/{cid}",
            get(uploads::get_upload).delete(uploads::delete_upload),
        )
        .route("/user/uploads/{cid}/rename", post(uploads::rename_upload))
        .route("/user/pins", get(pins::list_pins))
        .route(
            "/user/payment",
            get(payment::get_payment).put(payment::save_payment),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/user/login", post(login))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

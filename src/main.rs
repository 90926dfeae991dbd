use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use depot::api;
use depot::auth::AuthService;
use depot::billing::{BillingProvider, DisabledBilling, StripeBilling};
use depot::config::{AuthMode, BillingMode, Config, DatabaseBackend};
use depot::storage::{PostgresStorage, SqliteStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    depot::logging::init("info");

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStorage::new(&config.database.url, config.database.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage");
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
    };

    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let auth_service = Arc::new(AuthService::new(config.auth.clone()).await?);
    match config.auth.mode {
        AuthMode::None => info!("Authentication is disabled - all requests act as the local developer"),
        AuthMode::Magic => info!("Magic-link authentication enabled"),
        AuthMode::Oauth => {
            if let Some(oauth) = config.auth.oauth.as_ref() {
                info!(
                    "OAuth authentication enabled (issuer: {}, audience: {})",
                    oauth.issuer_url, oauth.audience
                );
            }
        }
    }

    let billing: Arc<dyn BillingProvider> = match (&config.billing.mode, &config.billing.stripe) {
        (BillingMode::Stripe, Some(stripe)) => {
            info!("Billing through Stripe at {}", stripe.api_url);
            Arc::new(StripeBilling::from_config(stripe)?)
        }
        _ => {
            info!("Billing is disabled");
            Arc::new(DisabledBilling)
        }
    };

    info!(
        default_size = config.pagination.default_size,
        max_size = config.pagination.max_size,
        "Pagination configured"
    );

    let router = api::create_api_router(storage, auth_service, billing, config.pagination.clone());

    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use depot::auth::TokenIssuer;
use depot::config::{Config, DatabaseBackend};
use depot::models::PinStatus;
use depot::storage::{PostgresStorage, SqliteStorage, Storage};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "depot-admin")]
#[command(about = "Depot account administration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered users
    Users {
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Issue an API token for a user
    IssueToken {
        /// User issuer (identity provider subject)
        issuer: String,
        /// Display name for the token
        name: String,
    },
    /// Record the pin status of an upload at a location
    SetPin {
        /// User issuer (identity provider subject)
        issuer: String,
        /// Content identifier of the upload
        cid: String,
        /// Peer holding the pin
        location: String,
        /// queued, pinning, pinned or failed
        status: PinStatus,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    depot::logging::init("info");

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
    };

    // Ensure database is initialized
    storage.init().await?;

    match cli.command {
        Commands::Users { limit, offset } => {
            let users = storage.list_users(limit, offset).await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<8} {:<50} {}", "ID", "Issuer", "Email");
                println!("{}", "-".repeat(90));
                for user in users {
                    println!(
                        "{:<8} {:<50} {}",
                        user.id,
                        user.issuer,
                        user.email.as_deref().unwrap_or("N/A")
                    );
                }
            }
        }
        Commands::IssueToken { issuer, name } => {
            let user = storage
                .get_user_by_issuer(&issuer)
                .await?
                .with_context(|| format!("no user with issuer '{issuer}'"))?;
            let issued = TokenIssuer::new(&config.auth.token_secret).issue(&user.issuer)?;
            let key = storage.create_key(user.id, &name, &issued.hash).await?;
            println!("✓ Created token {} ('{}') for user {}", key.id, key.name, user.id);
            println!("{}", issued.secret);
        }
        Commands::SetPin {
            issuer,
            cid,
            location,
            status,
        } => {
            let user = storage
                .get_user_by_issuer(&issuer)
                .await?
                .with_context(|| format!("no user with issuer '{issuer}'"))?;
            if !storage.upsert_pin(user.id, &cid, &location, status).await? {
                bail!("user {} has no upload {}", user.id, cid);
            }
            println!("✓ Pin of {} at {} is now {}", cid, location, status);
        }
    }

    Ok(())
}

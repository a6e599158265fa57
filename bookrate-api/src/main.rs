use clap::Parser;
use std::sync::Arc;
use tracing::info;

use bookrate_api::server;
use bookrate_api::state::AppState;
use bookrate_core::database::DatabaseManager;
use bookrate_core::storage::{DatabaseStorage, InMemoryStorage, Storage};

#[derive(Parser)]
#[command(name = "bookrate-api")]
#[command(about = "REST API server for the BookRate book review platform")]
#[command(version = "0.1.0")]
struct Cli {
    /// Port to run the server on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Path of the local database file (ignored with --remote or --in-memory)
    #[arg(long, default_value = "bookrate.db")]
    db_path: String,

    /// Connect to a remote Turso database (LIBSQL_URL / LIBSQL_AUTH_TOKEN)
    #[arg(long)]
    remote: bool,

    /// Run against a volatile in-memory store (development only)
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookrate_api=info,bookrate_core=info".into()),
        )
        .init();

    println!("🚀 Starting BookRate API server on port {}...", cli.port);

    let storage: Arc<dyn Storage> = if cli.in_memory {
        info!("Using in-memory storage (volatile)");
        Arc::new(InMemoryStorage::new())
    } else {
        let manager = if cli.remote {
            DatabaseManager::new_remote().await?
        } else {
            DatabaseManager::new_local(&cli.db_path).await?
        };
        manager.run_migrations().await?;
        info!("Database storage initialized successfully");
        Arc::new(DatabaseStorage::new(Arc::new(manager)))
    };

    let state = AppState::new(storage);
    server::start_server(state, cli.port).await
}

use std::sync::Arc;

use axum::serve;
use tokio::net::TcpListener;

use erpgate::api::routes::{cors_layer, create_router, AppState};
use erpgate::config::AppConfig;
use erpgate::logic::retention;
use erpgate::remote::http::HttpConnector;
use erpgate::remote::pool::ClientPool;
use erpgate::store::PostgresStore;
use erpgate::vault::CredentialVault;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Operator helper: print a fresh vault key and exit.
    if std::env::args().any(|a| a == "--generate-key") {
        println!("{}", CredentialVault::generate_key());
        return Ok(());
    }

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .init();

    let config = AppConfig::load()?;
    log::info!(
        "configuration loaded: server={}:{}",
        config.server.host,
        config.server.port
    );

    // Missing or invalid key is fatal; stored credentials would be unreadable.
    let vault = Arc::new(CredentialVault::from_env()?);

    log::info!("connecting to PostgreSQL...");
    let database_url = config.database_url()?;
    let postgres_store = PostgresStore::new(&database_url).await?;

    log::info!("running database migrations...");
    postgres_store.migrate().await?;

    let store = Arc::new(postgres_store);
    let pool = Arc::new(ClientPool::new(
        store.clone(),
        vault.clone(),
        Arc::new(HttpConnector::new()),
    ));

    retention::spawn_sweeper(store.clone(), config.retention.sweep_interval_secs);

    let state = AppState {
        store,
        pool,
        vault,
    };
    let app = create_router()
        .with_state(state)
        .layer(cors_layer(&config.cors.allowed_origins));

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("gateway listening on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}

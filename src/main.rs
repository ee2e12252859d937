use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use taskbox::auth::{CredentialHasher, SessionManager};
use taskbox::configuration::get_configuration;
use taskbox::planner::Planner;
use taskbox::startup::{run, spawn_purge_task};
use taskbox::store::{PgAccountStore, PgPlannerStore, PgRefreshTokenStore};
use taskbox::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    // Fails closed without a signing secret
    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let store_timeout = configuration.database.timeout();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(store_timeout)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    let hasher = CredentialHasher::new(configuration.auth.password_hash_cost).map_err(|e| {
        tracing::error!("Invalid password hashing settings: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let sessions = Arc::new(SessionManager::new(
        Arc::new(PgAccountStore::new(pool.clone())),
        Arc::new(PgRefreshTokenStore::new(pool.clone())),
        hasher,
        configuration.jwt.clone(),
        store_timeout,
    ));

    let planner = Arc::new(Planner::new(
        Arc::new(PgPlannerStore::new(pool)),
        store_timeout,
    ));

    let _purge = spawn_purge_task(
        sessions.clone(),
        Duration::from_secs(configuration.application.purge_interval_seconds),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, sessions, planner, configuration.auth.clone())?.await
}

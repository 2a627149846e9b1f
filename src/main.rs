use std::sync::Arc;

use auth_service::auth::TokenMinter;
use auth_service::configuration::get_configuration;
use auth_service::coordinator::AuthCoordinator;
use auth_service::dispatcher::Dispatcher;
use auth_service::ledger::RedisLedger;
use auth_service::telemetry::init_telemetry;
use auth_service::users::PgUserStore;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting auth service");

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

    tracing::info!("Attempting to connect to database");
    let pool = PgPoolOptions::new()
        .max_connections(5)
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

    let ledger = RedisLedger::connect(&configuration.redis)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to session store: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Session store connection error",
            )
        })?;
    match ledger.health_check().await {
        Ok(true) => tracing::info!("Session store health check passed"),
        Ok(false) => tracing::warn!("Session store answered PING unexpectedly"),
        Err(e) => tracing::warn!("Session store health check failed: {}", e),
    }

    let minter = TokenMinter::from_settings(&configuration.jwt).map_err(|e| {
        tracing::error!("Invalid token settings: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
    })?;

    let coordinator = AuthCoordinator::new(
        Arc::new(PgUserStore::new(pool)),
        Arc::new(ledger),
        minter,
    );

    Dispatcher::new(Arc::new(coordinator))
        .listen(&configuration.redis)
        .await
        .map_err(|e| {
            tracing::error!("Request listener stopped: {}", e);
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, e.to_string())
        })
}

//! Visit Add-on API Server Binary
//!
//! # Usage
//!
//! ```bash
//! BONUS_PORT=8080 BONUS_DATABASE_URL=postgres://... cargo run --bin bonus-api
//! ```
//!
//! # Environment Variables
//!
//! * `BONUS_HOST` - Server host (default: 0.0.0.0)
//! * `BONUS_PORT` - Server port (default: 8080)
//! * `BONUS_DATABASE_URL` - PostgreSQL connection string (`DATABASE_URL` also accepted)
//! * `BONUS_MAX_CONNECTIONS` / `BONUS_MIN_CONNECTIONS` - Pool bounds
//! * `BONUS_LOG_LEVEL` - Log filter when `RUST_LOG` is unset (default: info)
//! * `BONUS_LOG_FORMAT` - `json` for JSON lines, anything else for text
//! * `BONUS_DEFAULT_TIMEZONE` - Zone for facilities without one (default: Asia/Tokyo)
//! * `BONUS_TERMINAL_CARE_WINDOW_DAYS` / `BONUS_TERMINAL_CARE_MIN_VISITS`

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use infra_db::{create_pool, MIGRATOR};
use interface_api::{config::ApiConfig, create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = load_config()?;
    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        default_timezone = %config.default_timezone,
        "Starting visit add-on API server"
    );

    let pool = create_pool(config.database()).await?;

    tracing::info!("Running database migrations");
    MIGRATOR.run(&pool).await?;

    let state = AppState::postgres(pool, &config)?;
    let app = create_router(state);

    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Loads `BONUS_*` configuration, accepting a bare `DATABASE_URL` as well
fn load_config() -> Result<ApiConfig, Box<dyn std::error::Error>> {
    let mut config = ApiConfig::from_env()?;
    if std::env::var("BONUS_DATABASE_URL").is_err() {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = url;
        }
    }
    Ok(config)
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("BONUS_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

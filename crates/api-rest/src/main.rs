//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! This binary is useful for development and debugging when you only want the
//! REST server (with OpenAPI/Swagger UI). The workspace's main `medilink-run`
//! binary is the deployment entry point.

use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{build_router, open_state};
use medilink_core::config::{message_key_from_env_value, session_timeout_from_env_value};
use medilink_core::CoreConfig;

/// Main entry point for the MediLink REST API server.
///
/// Starts the REST API server on the configured address (default:
/// 0.0.0.0:3000) with HTTP endpoints for every clinical records operation and
/// OpenAPI/Swagger documentation.
///
/// # Environment Variables
/// - `MEDILINK_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `MEDILINK_DB_PATH`: SQLite database file (default: "medilink.db")
/// - `MEDILINK_AUDIT_DIR`: Audit log directory (default: "audit-logs")
/// - `MEDILINK_SESSION_TIMEOUT_SECS`: Session idle timeout in seconds
/// - `MEDILINK_MESSAGE_KEY_HEX`: 64-hex-character message key override
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration or database cannot be initialised, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("MEDILINK_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("-- Starting MediLink REST API on {}", addr);

    let cfg = config_from_env()?;
    let state = open_state(&cfg)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn config_from_env() -> anyhow::Result<CoreConfig> {
    let db_path = std::env::var("MEDILINK_DB_PATH").unwrap_or_else(|_| "medilink.db".into());
    let audit_dir = std::env::var("MEDILINK_AUDIT_DIR").unwrap_or_else(|_| "audit-logs".into());

    let session_idle_timeout: Duration =
        session_timeout_from_env_value(std::env::var("MEDILINK_SESSION_TIMEOUT_SECS").ok())?;
    let message_key = message_key_from_env_value(std::env::var("MEDILINK_MESSAGE_KEY_HEX").ok())?;

    Ok(CoreConfig::new(
        db_path.into(),
        audit_dir.into(),
        session_idle_timeout,
        message_key,
    )?)
}

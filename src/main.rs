//! Deployment entry point for the MediLink clinical records API.
//!
//! Resolves configuration from the environment once, opens the database, and
//! serves the REST router built by `api-rest`.

use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{build_router, open_state};
use medilink_core::config::{message_key_from_env_value, session_timeout_from_env_value};
use medilink_core::CoreConfig;

/// Main entry point for the MediLink application.
///
/// Starts the REST server on the configured address (default: 0.0.0.0:3000).
///
/// # Environment Variables
/// - `MEDILINK_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `MEDILINK_DB_PATH`: SQLite database file (default: "medilink.db")
/// - `MEDILINK_AUDIT_DIR`: Audit log directory (default: "audit-logs")
/// - `MEDILINK_SESSION_TIMEOUT_SECS`: Session idle timeout in seconds
/// - `MEDILINK_MESSAGE_KEY_HEX`: 64-hex-character message key override
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or runtime fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medilink=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("MEDILINK_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("++ Starting MediLink REST on {}", addr);

    let db_path = std::env::var("MEDILINK_DB_PATH").unwrap_or_else(|_| "medilink.db".into());
    let audit_dir = std::env::var("MEDILINK_AUDIT_DIR").unwrap_or_else(|_| "audit-logs".into());

    let session_idle_timeout: Duration =
        session_timeout_from_env_value(std::env::var("MEDILINK_SESSION_TIMEOUT_SECS").ok())?;
    let message_key = message_key_from_env_value(std::env::var("MEDILINK_MESSAGE_KEY_HEX").ok())?;

    let cfg = CoreConfig::new(
        db_path.into(),
        audit_dir.into(),
        session_idle_timeout,
        message_key,
    )?;

    let state = open_state(&cfg)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

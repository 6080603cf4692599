//! Standalone Gatekeep server.
//!
//! Environment:
//! - `GATEKEEP_BIND`: listen address (default `0.0.0.0:8080`)
//! - `GATEKEEP_STORE`: credential store file (default `plugins/gatekeep/auth.yml`)
//! - `GATEKEEP_ENFORCE_TIMEOUT`: `1`/`true` to kick identities that stay at
//!   the challenge past the store's timeout
//! - `RUST_LOG`: log filter (default `info`)

use gatekeep::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_STORE: &str = "plugins/gatekeep/auth.yml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("GATEKEEP_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let store = std::env::var("GATEKEEP_STORE").unwrap_or_else(|_| DEFAULT_STORE.to_string());
    let enforce = std::env::var("GATEKEEP_ENFORCE_TIMEOUT")
        .map(|v| is_truthy(&v))
        .unwrap_or(false);

    let server = GatekeepServer::builder()
        .bind(&bind)
        .store_path(&store)
        .enforce_challenge_timeout(enforce)
        .build()
        .await?;
    tracing::info!(addr = %server.local_addr()?, %store, "gatekeepd listening");

    let handle = server.handle();
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    if let Err(e) = handle.flush().await {
        tracing::error!(error = %e, "final save failed");
    }
    Ok(())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Keystead - account, RSA key pair and JWT credential service
///
/// Accounts with Argon2id password hashes, one RSA key pair per account and
/// RS512-signed tokens verified against that key pair, served over HTTP on
/// top of a pluggable credential store.

mod account;
mod api;
mod config;
mod context;
mod error;
mod jwt;
mod keys;
mod manager;
mod server;
mod store;

use config::{ServerConfig, DEFAULT_LOG_FILTER};
use context::AppContext;
use error::CredResult;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> CredResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let json = config.logging.format.eq_ignore_ascii_case("json");
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        provider = %config.store.provider,
        "starting keystead"
    );

    // Register providers and connect the configured one
    let registry = context::default_registry()?;
    let ctx = AppContext::new(config, registry).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

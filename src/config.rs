/// Configuration management for Keystead
use crate::error::{CredError, CredResult};
use crate::store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Log filter used when `RUST_LOG` is unset or does not parse
pub const DEFAULT_LOG_FILTER: &str = "keystead=debug,tower_http=debug";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub store: StoreSettings,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub version: String,
}

/// Credential store selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Registered provider name ("memory", "sqlite")
    pub provider: String,
    pub path: PathBuf,
    /// Seconds
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// `*` allows any origin
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, from `RUST_LOG`
    pub level: String,
    /// "json" or "text"
    pub format: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> CredResult<Self> {
        dotenv::dotenv().ok();

        let host = env::var("KEYSTEAD_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("KEYSTEAD_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| CredError::Config("Invalid port number".to_string()))?;

        let provider = env::var("KEYSTEAD_STORE").unwrap_or_else(|_| "sqlite".to_string());
        let path = env::var("KEYSTEAD_STORE_PATH")
            .unwrap_or_else(|_| "./data/keystead.sqlite".to_string())
            .into();
        let timeout = env::var("KEYSTEAD_STORE_TIMEOUT")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| CredError::Config("Invalid store timeout".to_string()))?;

        let origins = env::var("KEYSTEAD_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
        let format = env::var("KEYSTEAD_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                host,
                port,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            store: StoreSettings {
                provider,
                path,
                timeout,
            },
            cors: CorsConfig { origins },
            logging: LoggingConfig { level, format },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> CredResult<()> {
        if self.service.host.is_empty() {
            return Err(CredError::Config("Host cannot be empty".to_string()));
        }

        if self.service.port == 0 {
            return Err(CredError::Config("Port cannot be 0".to_string()));
        }

        if self.store.provider.is_empty() {
            return Err(CredError::Config("Store provider cannot be empty".to_string()));
        }

        if self.store.timeout == 0 {
            return Err(CredError::Config("Store timeout must be positive".to_string()));
        }

        Ok(())
    }

    /// Dial parameters for the configured store
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: Some(self.store.path.clone()),
            timeout: Duration::from_secs(self.store.timeout),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            store: StoreSettings {
                provider: "sqlite".to_string(),
                path: PathBuf::from("./data/keystead.sqlite"),
                timeout: 5,
            },
            cors: CorsConfig {
                origins: vec!["*".to_string()],
            },
            logging: LoggingConfig {
                level: DEFAULT_LOG_FILTER.to_string(),
                format: "text".to_string(),
            },
        }
    }
}

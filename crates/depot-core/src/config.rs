//! Configuration module
//!
//! Settings are read once from the environment at process start and passed by
//! reference to the metadata index, the storage handlers and the HTTP surface.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::storage_types::StorageBackend;

const SERVER_NAME: &str = "depot";
const SERVER_PORT: u16 = 8080;
const DATABASE_URL: &str = "sqlite://depot.db";
const MAX_CONNECTIONS: u32 = 10;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const LOCAL_STORAGE_PATH: &str = "./data";
const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
const PROXY_TIMEOUT_SECS: u64 = 300;

/// HTTP surface and access control settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub name: String,
    pub port: u16,
    pub upload_password: Option<String>,
    pub admin_password: Option<String>,
    pub read_only: bool,
    /// Base used when building the locator returned after an upload. Falls back
    /// to the request's `Host` header when unset.
    pub public_base_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            port: SERVER_PORT,
            upload_password: None,
            admin_password: None,
            read_only: false,
            public_base_url: None,
        }
    }
}

/// Local filesystem backend settings
#[derive(Clone, Debug)]
pub struct LocalStorageConfig {
    pub storage_directory: PathBuf,
    pub max_file_size: u64,
    /// Total bytes allowed under the storage root; 0 disables the check.
    pub max_storage_size: u64,
    pub return_content_size: bool,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            storage_directory: PathBuf::from(LOCAL_STORAGE_PATH),
            max_file_size: MAX_FILE_SIZE,
            max_storage_size: 0,
            return_content_size: false,
        }
    }
}

/// Remote relay backend settings
#[derive(Clone, Debug)]
pub struct ProxyStorageConfig {
    pub endpoint: Option<String>,
    pub upload_password: Option<String>,
    pub admin_password: Option<String>,
    pub max_file_size: u64,
    pub timeout: Duration,
    pub return_content_size: bool,
}

impl Default for ProxyStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            upload_password: None,
            admin_password: None,
            max_file_size: MAX_FILE_SIZE,
            timeout: Duration::from_secs(PROXY_TIMEOUT_SECS),
            return_content_size: true,
        }
    }
}

/// Externally supplied backend settings
#[derive(Clone, Debug, Default)]
pub struct CustomStorageConfig {
    /// Name of a registered custom handler factory
    pub handler: Option<String>,
    /// Opaque settings handed to the factory
    pub config: Option<serde_json::Value>,
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub storage_backend: StorageBackend,
    pub local: LocalStorageConfig,
    pub proxy: ProxyStorageConfig,
    pub custom: CustomStorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_url: DATABASE_URL.to_string(),
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            storage_backend: StorageBackend::Local,
            local: LocalStorageConfig::default(),
            proxy: ProxyStorageConfig::default(),
            custom: CustomStorageConfig::default(),
        }
    }
}

/// Non-empty environment variable, if set
fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let storage_backend = match env_opt("STORAGE_BACKEND") {
            Some(raw) => raw.parse::<StorageBackend>()?,
            None => StorageBackend::Local,
        };

        let server = ServerConfig {
            name: env::var("DEPOT_SERVER_NAME").unwrap_or_else(|_| SERVER_NAME.to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            upload_password: env_opt("UPLOAD_PASSWORD"),
            admin_password: env_opt("ADMIN_PASSWORD"),
            read_only: env_bool("READ_ONLY", false),
            public_base_url: env_opt("PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
        };

        let local = LocalStorageConfig {
            storage_directory: PathBuf::from(
                env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| LOCAL_STORAGE_PATH.to_string()),
            ),
            max_file_size: env::var("LOCAL_MAX_FILE_SIZE")
                .unwrap_or_else(|_| MAX_FILE_SIZE.to_string())
                .parse()
                .unwrap_or(MAX_FILE_SIZE),
            max_storage_size: env::var("LOCAL_MAX_STORAGE_SIZE")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            return_content_size: env_bool("LOCAL_RETURN_CONTENT_SIZE", false),
        };

        let proxy = ProxyStorageConfig {
            endpoint: env_opt("PROXY_ENDPOINT"),
            upload_password: env_opt("PROXY_UPLOAD_PASSWORD"),
            admin_password: env_opt("PROXY_ADMIN_PASSWORD"),
            max_file_size: env::var("PROXY_MAX_FILE_SIZE")
                .unwrap_or_else(|_| MAX_FILE_SIZE.to_string())
                .parse()
                .unwrap_or(MAX_FILE_SIZE),
            timeout: Duration::from_secs(
                env::var("PROXY_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| PROXY_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(PROXY_TIMEOUT_SECS),
            ),
            return_content_size: env_bool("PROXY_RETURN_CONTENT_SIZE", true),
        };

        let custom = CustomStorageConfig {
            handler: env_opt("CUSTOM_STORAGE_HANDLER"),
            config: match env_opt("CUSTOM_STORAGE_CONFIG") {
                Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
                    anyhow::anyhow!("CUSTOM_STORAGE_CONFIG must be valid JSON: {}", e)
                })?),
                None => None,
            },
        };

        Ok(Config {
            server,
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| DATABASE_URL.to_string()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: env::var("DB_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| CONNECTION_TIMEOUT_SECS.to_string())
                .parse()
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            storage_backend,
            local,
            proxy,
            custom,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a SQLite connection string (sqlite://...)"
            ));
        }

        match self.storage_backend {
            StorageBackend::Local => {
                if self.local.storage_directory.as_os_str().is_empty() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using the local storage backend"
                    ));
                }
            }
            StorageBackend::Proxy => {
                let endpoint = self.proxy.endpoint.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("PROXY_ENDPOINT must be set when using the proxy storage backend")
                })?;
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(anyhow::anyhow!(
                        "PROXY_ENDPOINT must be an http:// or https:// URL"
                    ));
                }
            }
            StorageBackend::Custom => {
                if self.custom.handler.is_none() {
                    return Err(anyhow::anyhow!(
                        "CUSTOM_STORAGE_HANDLER must be set when using the custom storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// Fixed on a record at creation time; drives which handler serves the record.
/// Persisted in upper case (`LOCAL`, `PROXY`, `CUSTOM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageBackend {
    Local,
    Proxy,
    /// Externally supplied handler, resolved through the custom handler registry.
    Custom,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "proxy" => Ok(StorageBackend::Proxy),
            "custom" => Ok(StorageBackend::Custom),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Local => write!(f, "LOCAL"),
            StorageBackend::Proxy => write!(f, "PROXY"),
            StorageBackend::Custom => write!(f, "CUSTOM"),
        }
    }
}

pub mod delete;
pub mod download;
pub mod list;
pub mod upload;

use depot_core::AppError;
use serde::Deserialize;

/// `?uuid=` parameter addressing one stored file
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub uuid: Option<String>,
}

impl IdQuery {
    pub fn require(&self) -> Result<&str, AppError> {
        self.uuid
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Validation("Missing uuid parameter".to_string()))
    }
}

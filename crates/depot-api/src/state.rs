//! Application state shared by every handler

use crate::services::FileGateway;
use depot_core::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub gateway: FileGateway,
}

impl AppState {
    pub fn new(config: Config, gateway: FileGateway) -> Self {
        Self { config, gateway }
    }
}

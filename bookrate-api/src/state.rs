use bookrate_core::services::Services;
use bookrate_core::storage::Storage;
use std::sync::Arc;

/// Shared application state: the service bundle over the configured
/// storage backend.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            services: Services::new(storage),
        }
    }
}

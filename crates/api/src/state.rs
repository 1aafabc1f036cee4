use std::sync::Arc;

use shield_service::JobService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`. Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    /// The job service façade; every endpoint makes exactly one call on it.
    pub service: Arc<JobService>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

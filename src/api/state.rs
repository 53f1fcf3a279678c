use std::sync::Arc;

use crate::services::transport::StreamTransport;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Backend every chat and search request streams from
    pub transport: Arc<dyn StreamTransport>,
}

impl AppState {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self { transport }
    }
}

//! State shared by all request handlers.

use std::sync::Arc;

use axum::http::HeaderValue;
use dataviz_pipeline::SessionFactory;

#[derive(Clone)]
pub struct AppState {
    /// Starts one isolated generation session per chat request.
    pub sessions: Arc<SessionFactory>,
    /// Single browser origin allowed by CORS.
    pub cors_origin: HeaderValue,
}

impl AppState {
    pub fn new(sessions: SessionFactory, cors_origin: HeaderValue) -> Self {
        Self {
            sessions: Arc::new(sessions),
            cors_origin,
        }
    }
}

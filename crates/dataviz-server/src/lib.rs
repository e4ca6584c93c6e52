//! HTTP surface for the dataviz chat pipeline: `POST /chat` streams one
//! generation session as server-sent events.

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ServerError};
pub use routes::{create_router, start_server};
pub use state::AppState;

use std::sync::Arc;

use dataviz_pipeline::orchestrator::openai_from_env;
use dataviz_pipeline::{HttpQueryEngine, SessionFactory};

/// Builds the application state for a configured deployment: OpenAI sessions
/// against the HTTP query engine.
pub fn build_state(config: &Config) -> Result<AppState, ServerError> {
    let engine = HttpQueryEngine::new(config.query_engine_url.clone())?;
    let sessions = SessionFactory::new(
        openai_from_env(),
        Arc::new(engine),
        config.session_settings(),
    );
    Ok(AppState::new(sessions, config.cors_origin_header()?))
}

use dataviz_pipeline::observability::init_observability;
use dataviz_server::{Config, ServerError, build_state, start_server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let config = Config::load();
    init_observability();
    info!(
        event = "server.config",
        model = %config.model,
        query_engine = %config.query_engine_url,
        narration = %config.narration
    );

    let state = build_state(&config)?;
    start_server(state, config.bind).await
}

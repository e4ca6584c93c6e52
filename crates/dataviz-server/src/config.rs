//! Command-line and environment configuration.
//!
//! Every flag can also be set through its `DATAVIZ_*` variable; a `.env` file
//! in the working directory is loaded before parsing.

use std::net::SocketAddr;

use axum::http::HeaderValue;
use clap::Parser;
use dataviz_ai_harness::ModelRef;
use dataviz_pipeline::{NarrationMode, SessionSettings};

use crate::error::ServerError;

const OPENAI_PROVIDER: &str = "openai";

#[derive(Parser, Debug, Clone)]
#[command(name = "dataviz-server", version, about)]
pub struct Config {
    /// Address the HTTP server listens on.
    #[arg(long, env = "DATAVIZ_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// OpenAI model used for every session.
    #[arg(long, env = "DATAVIZ_MODEL", default_value = "gpt-5-nano")]
    pub model: String,

    /// Base URL of the query engine exposing `POST /query/local_duckdb`.
    /// Must point at a separate service; this server has no query route.
    #[arg(
        long,
        env = "DATAVIZ_QUERY_ENGINE_URL",
        default_value = "http://127.0.0.1:8001"
    )]
    pub query_engine_url: String,

    /// Browser origin allowed to call the API.
    #[arg(long, env = "DATAVIZ_CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// How narration preceding a tool call is reported: `thought` or `tool-call-event`.
    #[arg(long, env = "DATAVIZ_NARRATION", default_value = "thought")]
    pub narration: NarrationMode,

    /// Sampling temperature. Left unset, the provider default applies.
    #[arg(long, env = "DATAVIZ_TEMPERATURE")]
    pub temperature: Option<f32>,
}

impl Config {
    /// Loads `.env` (if any) and parses the process arguments.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }

    pub fn session_settings(&self) -> SessionSettings {
        let settings = SessionSettings::new(ModelRef::new(OPENAI_PROVIDER, self.model.clone()))
            .narration(self.narration);
        match self.temperature {
            Some(temperature) => settings.temperature(temperature),
            None => settings,
        }
    }

    pub fn cors_origin_header(&self) -> Result<HeaderValue, ServerError> {
        HeaderValue::from_str(&self.cors_origin).map_err(|err| {
            ServerError::Config(format!("invalid CORS origin `{}`: {err}", self.cors_origin))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_development_setup() {
        let config = Config::try_parse_from(["dataviz-server"]).expect("parse");
        assert_eq!(config.bind.to_string(), "127.0.0.1:8000");
        assert_eq!(config.model, "gpt-5-nano");
        assert_eq!(config.cors_origin, "http://localhost:3000");
        assert_eq!(config.narration, NarrationMode::Thought);
        assert!(config.temperature.is_none());
    }

    #[test]
    fn default_query_engine_is_not_this_server() {
        let config = Config::try_parse_from(["dataviz-server"]).expect("parse");
        let engine_authority = config
            .query_engine_url
            .trim_start_matches("http://")
            .trim_end_matches('/');
        assert_eq!(engine_authority, "127.0.0.1:8001");
        assert_ne!(engine_authority, config.bind.to_string());
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "dataviz-server",
            "--bind",
            "0.0.0.0:9000",
            "--narration",
            "tool-call-event",
            "--temperature",
            "0.2",
        ])
        .expect("parse");
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.narration, NarrationMode::ToolCallEvent);

        let settings = config.session_settings();
        assert_eq!(settings.model.provider.as_str(), "openai");
        assert_eq!(settings.narration, NarrationMode::ToolCallEvent);
        assert_eq!(settings.temperature, Some(0.2));
    }

    #[test]
    fn unknown_narration_mode_is_rejected() {
        let err = Config::try_parse_from(["dataviz-server", "--narration", "loud"])
            .expect_err("invalid mode");
        assert!(err.to_string().contains("narration"));
    }

    #[test]
    fn invalid_cors_origin_is_a_config_error() {
        let config = Config::try_parse_from(["dataviz-server", "--cors-origin", "bad\norigin"])
            .expect("parse");
        assert!(matches!(
            config.cors_origin_header(),
            Err(ServerError::Config(_))
        ));
    }
}

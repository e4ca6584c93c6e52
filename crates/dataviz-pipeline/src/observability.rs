use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// Filter used when neither `DATAVIZ_LOG_LEVEL` nor `RUST_LOG` is usable:
/// workspace crates and HTTP tracing at `info`, dependencies at `warn`.
pub const DEFAULT_FILTER: &str =
    "warn,dataviz_ai_harness=info,dataviz_pipeline=info,dataviz_server=info,tower_http=info";

const DEFAULT_JSON_LOG_FILE: &str = "dataviz.logs.jsonl";

/// Where log records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    /// Compact human-readable lines on stdout.
    Console,
    /// One JSON object per line, appended to this file.
    JsonFile(PathBuf),
}

/// Resolved logging setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilitySettings {
    pub enabled: bool,
    pub filter: String,
    pub sink: LogSink,
}

impl ObservabilitySettings {
    /// Reads `DATAVIZ_OBSERVABILITY_ENABLED`, `DATAVIZ_LOG_LEVEL`, `RUST_LOG`
    /// and `DATAVIZ_JSON_LOG_PATH` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("DATAVIZ_OBSERVABILITY_ENABLED")
            .and_then(|value| parse_flag(&value))
            .unwrap_or(true);

        // First filter that parses wins.
        let filter = ["DATAVIZ_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(|key| lookup(key))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let sink = match lookup("DATAVIZ_JSON_LOG_PATH") {
            Some(path) if !path.trim().is_empty() => LogSink::JsonFile(PathBuf::from(path.trim())),
            _ => LogSink::Console,
        };

        Self {
            enabled,
            filter,
            sink,
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Splits a log path into the directory and file name the appender wants.
fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_JSON_LOG_FILE)
        .to_string();
    (dir, file)
}

/// Installs the global subscriber from the environment, once per process.
pub fn init_observability() {
    init_with(ObservabilitySettings::from_env());
}

/// Installs the global subscriber from explicit settings. Later calls, and
/// calls after another subscriber was installed, do nothing.
pub fn init_with(settings: ObservabilitySettings) {
    INIT.get_or_init(|| {
        if !settings.enabled {
            return;
        }
        let filter = settings.env_filter();
        match &settings.sink {
            LogSink::JsonFile(path) => {
                let (dir, file) = split_log_path(path);
                let _ = std::fs::create_dir_all(&dir);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(tracing_appender::rolling::never(dir, file));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
            LogSink::Console => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stdout);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> ObservabilitySettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ObservabilitySettings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_log_workspace_crates_to_console() {
        let s = settings(&[]);
        assert!(s.enabled);
        assert_eq!(s.filter, DEFAULT_FILTER);
        assert_eq!(s.sink, LogSink::Console);
    }

    #[test]
    fn dataviz_level_wins_over_rust_log() {
        let s = settings(&[
            ("DATAVIZ_LOG_LEVEL", "dataviz_pipeline=debug"),
            ("RUST_LOG", "trace"),
        ]);
        assert_eq!(s.filter, "dataviz_pipeline=debug");
    }

    #[test]
    fn invalid_filter_falls_through_to_next_source() {
        let s = settings(&[
            ("DATAVIZ_LOG_LEVEL", "dataviz_pipeline=loud"),
            ("RUST_LOG", "debug"),
        ]);
        assert_eq!(s.filter, "debug");
    }

    #[test]
    fn json_path_and_disable_flag() {
        let s = settings(&[
            ("DATAVIZ_JSON_LOG_PATH", "logs/run.jsonl"),
            ("DATAVIZ_OBSERVABILITY_ENABLED", "off"),
        ]);
        assert!(!s.enabled);
        assert_eq!(s.sink, LogSink::JsonFile(PathBuf::from("logs/run.jsonl")));
    }

    #[test]
    fn unknown_flag_keeps_logging_enabled() {
        assert!(settings(&[("DATAVIZ_OBSERVABILITY_ENABLED", "maybe")]).enabled);
    }

    #[test]
    fn bare_file_name_logs_to_current_directory() {
        assert_eq!(
            split_log_path(Path::new("dataviz.jsonl")),
            (PathBuf::from("."), "dataviz.jsonl".to_string())
        );
        assert_eq!(
            split_log_path(Path::new("/var/log/dataviz/out.jsonl")),
            (PathBuf::from("/var/log/dataviz"), "out.jsonl".to_string())
        );
    }

    #[test]
    fn disabled_settings_install_nothing_and_repeat_calls_are_harmless() {
        init_with(settings(&[("DATAVIZ_OBSERVABILITY_ENABLED", "0")]));
        init_observability();
    }
}

//! OpenAI Responses API integration and request options.
//!
//! Any endpoint speaking the Responses streaming protocol works; point
//! `OpenAiClientConfig::base_url` at it.
mod adapter;
mod config;
mod options;
pub(crate) mod transport;

pub use adapter::OpenAiProvider;
pub use config::OpenAiClientConfig;
pub use options::{OpenAiReasoningEffort, OpenAiRequestOptions};

use crate::ProviderId;
use crate::run::RunBuilder;

/// Extension trait for attaching OpenAI-specific options to a `RunBuilder`.
pub trait OpenAiRunBuilderExt {
    /// Adds OpenAI request options for the current run.
    ///
    /// These options are stored internally under the `openai` provider key and
    /// read only by `OpenAiProvider`.
    fn openai_options(self, options: OpenAiRequestOptions) -> Self;
}

impl OpenAiRunBuilderExt for RunBuilder {
    fn openai_options(self, options: OpenAiRequestOptions) -> Self {
        match serde_json::to_value(options) {
            Ok(value) => self.set_vendor_options_json(ProviderId::new("openai"), value),
            Err(err) => {
                tracing::warn!(error = %err, "dropping unserializable OpenAI options");
                self
            }
        }
    }
}

use std::collections::HashMap;
use std::pin::Pin;

use crate::content::{InputPart, RunOutput};
use crate::errors::ProviderError;
use crate::model::{ModelRef, ProviderId, RunOptions};
use crate::stream::{Part, PartDelta};
use crate::tool::ToolDefinition;

/// Earlier turns of the current run, replayed to the provider on each tool
/// round so the model sees its own calls and their outputs.
#[derive(Clone, Debug, PartialEq)]
pub enum TranscriptItem {
    /// Text the assistant produced in an earlier round.
    AssistantText(String),
    /// A tool call the assistant issued.
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: String,
    },
    /// Output returned for a tool call.
    ToolOutput { tool_call_id: String, output: String },
}

/// Fully validated request handed to a provider adapter for one round.
#[derive(Clone, Debug)]
pub struct ProviderRequest {
    pub run_id: uuid::Uuid,
    pub session_id: uuid::Uuid,
    pub model: ModelRef,
    pub system_prompt: Option<String>,
    pub input_parts: Vec<InputPart>,
    pub tools: Vec<ToolDefinition>,
    pub transcript: Vec<TranscriptItem>,
    pub options: RunOptions,
    pub vendor_options: HashMap<ProviderId, serde_json::Value>,
}

/// Events produced by a provider adapter for one round.
///
/// `index` values are local to the round; the run loop remaps them to
/// run-wide indexes.
#[derive(Clone, Debug, PartialEq)]
pub enum ProviderEvent {
    PartStarted { index: usize, part: Part },
    PartDelta { index: usize, delta: PartDelta },
    PartFinished { index: usize, part: Part },
    /// The round finished. `output` is the provider's own view of the final
    /// output when it reports one.
    Completed {
        output: Option<RunOutput>,
        finish_reason: Option<String>,
    },
}

/// Response metadata captured when a provider stream is opened.
#[derive(Clone, Debug, Default)]
pub struct ProviderResponseMeta {
    pub request_id: Option<String>,
}

pub type ProviderEventStream =
    Pin<Box<dyn futures::Stream<Item = Result<ProviderEvent, ProviderError>> + Send + 'static>>;

/// Open stream for one provider round.
pub struct ProviderStreamHandle {
    pub stream: ProviderEventStream,
    pub metadata: ProviderResponseMeta,
}

/// Contract implemented by each vendor integration.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn start_stream(&self, req: ProviderRequest)
    -> Result<ProviderStreamHandle, ProviderError>;
}

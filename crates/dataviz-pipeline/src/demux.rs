//! Lifecycle events in, protocol events out.

use std::fmt;
use std::str::FromStr;

use dataviz_ai_harness::{LifecycleEvent, Part, PartDelta, RunFailure, ToolOutcome};
use futures::{Stream, StreamExt as _};
use tracing::debug;

use crate::errors::GenerationError;
use crate::extract::extract;
use crate::protocol::{ProtocolEvent, QueryResult};

/// Where tool call narration goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NarrationMode {
    /// As a `thought` reading `Calling tool: <name> with args: <args>`.
    #[default]
    Thought,
    /// As a dedicated `tool_call` event.
    ToolCallEvent,
}

impl FromStr for NarrationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thought" => Ok(Self::Thought),
            "tool-call-event" | "tool_call_event" | "tool_call" => Ok(Self::ToolCallEvent),
            other => Err(format!(
                "unknown narration mode `{other}` (expected `thought` or `tool-call-event`)"
            )),
        }
    }
}

impl fmt::Display for NarrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Thought => "thought",
            Self::ToolCallEvent => "tool-call-event",
        })
    }
}

/// Per-session translation state.
///
/// Holds the accumulated text of the active narration part. Each `Thought`
/// carries the whole buffer, not the latest delta.
#[derive(Debug, Default)]
pub struct Demultiplexer {
    mode: NarrationMode,
    active: Option<usize>,
    buffer: String,
}

impl Demultiplexer {
    pub fn new(mode: NarrationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Translates one lifecycle event into zero or more protocol events.
    pub fn on_event(
        &mut self,
        event: LifecycleEvent,
    ) -> Result<Vec<ProtocolEvent>, GenerationError> {
        match event {
            LifecycleEvent::PartStart {
                index,
                part: Part::Text { content },
                ..
            } => {
                self.active = Some(index);
                self.buffer = content;
                Ok(vec![self.thought()])
            }
            LifecycleEvent::PartDelta {
                index,
                delta: PartDelta::Text { content },
                ..
            } => {
                if self.active != Some(index) {
                    debug!(index, "ignoring text delta for inactive part");
                    return Ok(Vec::new());
                }
                self.buffer.push_str(&content);
                Ok(vec![self.thought()])
            }
            LifecycleEvent::PartEnd {
                part: Part::Text { content },
                ..
            } => Ok(extract(&content)
                .into_iter()
                .map(|block| ProtocolEvent::Code {
                    language: block.language,
                    content: block.content,
                })
                .collect()),
            LifecycleEvent::PartEnd {
                part: Part::ToolCall {
                    tool_name, args, ..
                },
                ..
            } => Ok(vec![self.narrate_tool_call(tool_name, args)]),
            LifecycleEvent::ToolResult {
                tool_name, outcome, ..
            } => Ok(data_event(&tool_name, outcome).into_iter().collect()),
            LifecycleEvent::Error { error, .. } => Err(GenerationError::Run(error)),
            LifecycleEvent::RunStarted { .. }
            | LifecycleEvent::Completed { .. }
            | LifecycleEvent::PartStart { .. }
            | LifecycleEvent::PartDelta { .. } => Ok(Vec::new()),
        }
    }

    fn thought(&self) -> ProtocolEvent {
        ProtocolEvent::Thought {
            content: self.buffer.clone(),
        }
    }

    fn narrate_tool_call(&self, tool_name: String, args: String) -> ProtocolEvent {
        match self.mode {
            NarrationMode::Thought => ProtocolEvent::Thought {
                content: format!("Calling tool: {tool_name} with args: {args}"),
            },
            NarrationMode::ToolCallEvent => ProtocolEvent::ToolCall { tool_name, args },
        }
    }
}

fn data_event(tool_name: &str, outcome: ToolOutcome) -> Option<ProtocolEvent> {
    match outcome {
        ToolOutcome::Success(value) => match QueryResult::from_value(value) {
            Ok(result) => Some(ProtocolEvent::Data(result)),
            Err(err) => {
                debug!(tool = tool_name, error = %err, "dropping tool result that is not a query result");
                None
            }
        },
        ToolOutcome::Failure { message } => {
            debug!(tool = tool_name, error = %message, "tool failure left to the model");
            None
        }
    }
}

/// Lazily translates a lifecycle stream. Ends when the input ends; a failure
/// is yielded once as `Err` and ends the output.
pub fn demultiplex<S>(
    events: S,
    mode: NarrationMode,
) -> impl Stream<Item = Result<ProtocolEvent, GenerationError>> + Send + 'static
where
    S: Stream<Item = Result<LifecycleEvent, RunFailure>> + Send + 'static,
{
    async_stream::stream! {
        let mut demux = Demultiplexer::new(mode);
        futures::pin_mut!(events);
        while let Some(item) = events.next().await {
            let translated = match item {
                Ok(event) => demux.on_event(event),
                Err(failure) => Err(GenerationError::Run(failure)),
            };
            match translated {
                Ok(protocol_events) => {
                    for event in protocol_events {
                        yield Ok(event);
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
    }
}

//! Streaming event-translation pipeline.
//!
//! A chat request starts one generation run ([`orchestrator`]); its lifecycle
//! events are demultiplexed into [`ProtocolEvent`]s ([`demux`]), with fenced
//! code pulled out of finished narration ([`extract`]) and `run_sql` tool
//! calls executed against the query engine ([`bridge`]). The [`emitter`]
//! frames every event for an event-stream response.

/// `run_sql` tool, LIMIT policy and the query engine client.
pub mod bridge;
/// Lifecycle events to protocol events.
pub mod demux;
/// Event-stream framing and the terminal error guarantee.
pub mod emitter;
/// Error types for the engine, the tool and the generation.
pub mod errors;
/// Fenced code block scanner.
pub mod extract;
/// Process-wide tracing subscriber setup.
pub mod observability;
/// Session factory: one provider, harness and run per chat request.
pub mod orchestrator;
/// System prompt for the SQL-and-UI contract.
pub mod prompt;
/// Protocol event types and the query result record.
pub mod protocol;

pub use bridge::{HttpQueryEngine, QueryEngine, SqlBridge, SqlTool, SqlToolRequest, limit_query};
pub use demux::{Demultiplexer, NarrationMode, demultiplex};
pub use emitter::{emit, encode_frame};
pub use errors::{EngineError, GenerationError, ProtocolViolation, ToolExecutionError};
pub use extract::{CodeBlock, extract};
pub use orchestrator::{ProviderFactory, SessionFactory, SessionSettings};
pub use protocol::{ProtocolEvent, QueryResult};

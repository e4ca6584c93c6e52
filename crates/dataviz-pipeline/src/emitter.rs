//! Event-stream framing.

use std::convert::Infallible;

use bytes::Bytes;
use futures::{Stream, StreamExt as _};
use tracing::warn;

use crate::errors::GenerationError;
use crate::protocol::{ProtocolEvent, STAGE_LLM_PROCESSING};

/// Encodes one event as `event: <kind>\ndata: <json>\n\n`.
pub fn encode_frame(event: &ProtocolEvent) -> Bytes {
    let data = match serde_json::to_string(event) {
        Ok(data) => data,
        Err(err) => serde_json::json!({
            "type": "error",
            "message": format!("failed to encode {} event: {err}", event.kind()),
            "stage": STAGE_LLM_PROCESSING,
        })
        .to_string(),
    };
    Bytes::from(format!("event: {}\ndata: {}\n\n", event.kind(), data))
}

/// Frames a protocol stream, one chunk per event.
///
/// Control is yielded after every frame. A failure produces exactly one
/// terminal `error` frame with stage `llm_processing`, after which the stream
/// closes.
pub fn emit<S>(events: S) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    S: Stream<Item = Result<ProtocolEvent, GenerationError>> + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(events);
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    yield Ok(encode_frame(&event));
                    tokio::task::yield_now().await;
                }
                Err(err) => {
                    warn!(event = "stream.failed", error = %err);
                    yield Ok(encode_frame(&ProtocolEvent::error(err.to_string(), STAGE_LLM_PROCESSING)));
                    return;
                }
            }
        }
    }
}

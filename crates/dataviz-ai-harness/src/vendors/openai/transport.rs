use crate::content::{OutputPart, RunOutput};
use crate::errors::ProviderError;
use crate::provider::ProviderEvent;
use crate::stream::{Part, PartDelta};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

#[derive(Default)]
pub(crate) struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some((idx, delim_len)) = find_frame_delimiter(&self.buf) {
            let frame_bytes = self.buf[..idx].to_vec();
            self.buf.drain(..idx + delim_len);
            if let Some(frame) = parse_sse_frame(&frame_bytes) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn find_frame_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if i + 3 < buf.len()
            && buf[i] == b'\r'
            && buf[i + 1] == b'\n'
            && buf[i + 2] == b'\r'
            && buf[i + 3] == b'\n'
        {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_sse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        }
    }
    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data_lines.join("\n"),
    })
}

pub(crate) fn map_openai_frame_to_events(
    provider: &crate::ProviderId,
    frame: &SseFrame,
) -> Result<Vec<ProviderEvent>, ProviderError> {
    if frame.data.trim().is_empty() || frame.data.trim() == "[DONE]" {
        return Ok(Vec::new());
    }
    let value: serde_json::Value = serde_json::from_str(&frame.data).map_err(|e| {
        ProviderError::transport(provider.clone(), format!("invalid SSE JSON frame: {e}"))
    })?;
    map_openai_json_to_events(provider, &value)
}

pub(crate) fn map_openai_json_to_events(
    provider: &crate::ProviderId,
    value: &serde_json::Value,
) -> Result<Vec<ProviderEvent>, ProviderError> {
    let Some(event_type) = value.get("type").and_then(|v| v.as_str()) else {
        return Ok(Vec::new());
    };
    let index = output_index(value);
    match event_type {
        "response.output_item.added" => {
            let Some(item) = value.get("item") else {
                return Ok(Vec::new());
            };
            match item_part(item, false) {
                Some(part) => Ok(vec![ProviderEvent::PartStarted { index, part }]),
                None => Ok(Vec::new()),
            }
        }
        "response.output_text.delta" => match value.get("delta").and_then(|v| v.as_str()) {
            Some(delta) => Ok(vec![ProviderEvent::PartDelta {
                index,
                delta: PartDelta::Text {
                    content: delta.to_string(),
                },
            }]),
            None => Ok(Vec::new()),
        },
        "response.function_call_arguments.delta" => {
            match value.get("delta").and_then(|v| v.as_str()) {
                Some(delta) => Ok(vec![ProviderEvent::PartDelta {
                    index,
                    delta: PartDelta::ToolCallArgs {
                        args: delta.to_string(),
                    },
                }]),
                None => Ok(Vec::new()),
            }
        }
        "response.output_item.done" => {
            let Some(item) = value.get("item") else {
                return Ok(Vec::new());
            };
            if item.get("type").and_then(|v| v.as_str()) == Some("function_call")
                && item.get("name").and_then(|v| v.as_str()).is_none()
            {
                return Err(ProviderError::protocol(
                    provider.clone(),
                    "function_call item finished without a name",
                ));
            }
            match item_part(item, true) {
                Some(part) => Ok(vec![ProviderEvent::PartFinished { index, part }]),
                None => Ok(Vec::new()),
            }
        }
        "response.completed" => {
            let response = value.get("response").unwrap_or(value);
            let finish_reason = response
                .get("finish_reason")
                .and_then(|v| v.as_str())
                .map(ToOwned::to_owned)
                .or_else(|| {
                    response
                        .get("status")
                        .and_then(|v| v.as_str())
                        .map(ToOwned::to_owned)
                });
            let output = extract_output_text(response).map(|text| RunOutput {
                parts: vec![OutputPart::Text(text)],
                finish_reason: finish_reason.clone(),
            });
            Ok(vec![ProviderEvent::Completed {
                output,
                finish_reason,
            }])
        }
        "response.error" | "response.failed" | "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .or_else(|| {
                    value
                        .get("response")
                        .and_then(|r| r.get("error"))
                        .and_then(|e| e.get("message"))
                        .and_then(|v| v.as_str())
                })
                .or_else(|| value.get("message").and_then(|v| v.as_str()))
                .unwrap_or("OpenAI stream error");
            Err(ProviderError::provider(provider.clone(), message, None))
        }
        _ => Ok(Vec::new()),
    }
}

fn output_index(value: &serde_json::Value) -> usize {
    value
        .get("output_index")
        .and_then(|v| v.as_u64())
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(0)
}

/// Maps an output item to a part. Items other than messages and function
/// calls (reasoning summaries, for example) have no part.
fn item_part(item: &serde_json::Value, finished: bool) -> Option<Part> {
    match item.get("type").and_then(|v| v.as_str())? {
        "message" => {
            let content = if finished {
                message_text(item)
            } else {
                String::new()
            };
            Some(Part::Text { content })
        }
        "function_call" => {
            let tool_call_id = item
                .get("call_id")
                .or_else(|| item.get("id"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let tool_name = item
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let args = item
                .get("arguments")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Some(Part::ToolCall {
                tool_call_id,
                tool_name,
                args,
            })
        }
        _ => None,
    }
}

fn message_text(item: &serde_json::Value) -> String {
    let mut text = String::new();
    if let Some(content) = item.get("content").and_then(|v| v.as_array()) {
        for c in content {
            if let Some(segment) = c.get("text").and_then(|v| v.as_str()) {
                text.push_str(segment);
            }
        }
    }
    text
}

pub(crate) fn extract_output_text(response: &serde_json::Value) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(items) = response.get("output").and_then(|v| v.as_array()) {
        for item in items {
            if item.get("type").and_then(|v| v.as_str()) != Some("message") {
                continue;
            }
            if let Some(content) = item.get("content").and_then(|v| v.as_array()) {
                for c in content {
                    if let Some(text) = c.get("text").and_then(|v| v.as_str()) {
                        parts.push(text.to_string());
                    }
                }
            }
        }
    }
    if !parts.is_empty() {
        return Some(parts.join(""));
    }
    response
        .get("output_text")
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
}

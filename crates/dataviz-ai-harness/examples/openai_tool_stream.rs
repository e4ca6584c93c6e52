use std::sync::Arc;

use dataviz_ai_harness::prelude::*;
use dataviz_ai_harness::vendors::openai::{
    OpenAiProvider, OpenAiRequestOptions, OpenAiRunBuilderExt,
};

struct WordCount;

#[async_trait::async_trait]
impl Tool for WordCount {
    fn name(&self) -> &str {
        "word_count"
    }

    fn description(&self) -> &str {
        "Counts the words in a piece of text."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn call(&self, args: &str) -> Result<serde_json::Value, ToolError> {
        let args: serde_json::Value = serde_json::from_str(args)
            .map_err(|e| ToolError::invalid_arguments("word_count", e.to_string()))?;
        let text = args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
        Ok(serde_json::json!({ "words": text.split_whitespace().count() }))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), HarnessError> {
    let harness = Harness::builder()
        .register_provider(Arc::new(OpenAiProvider::from_env()?))
        .build()?;

    let mut run = harness
        .session(SessionConfig::named("stream"))
        .run(ModelRef::new("openai", "gpt-5-nano"))
        .system_prompt("Use the word_count tool before answering.")
        .user_text("How many words are in 'the quick brown fox'?")
        .tools(ToolRegistry::new().with(Arc::new(WordCount))?)
        .openai_options(OpenAiRequestOptions::default().store(false))
        .start_stream()
        .await?;

    while let Some(event) = run.next_event().await {
        match event {
            LifecycleEvent::PartDelta {
                delta: PartDelta::Text { content },
                ..
            } => print!("{content}"),
            LifecycleEvent::PartEnd {
                part: Part::ToolCall { tool_name, args, .. },
                ..
            } => println!("\n[calling {tool_name} with {args}]"),
            LifecycleEvent::ToolResult { outcome, .. } => println!("[result {outcome:?}]"),
            LifecycleEvent::Completed { .. } => println!(),
            LifecycleEvent::Error { error, .. } => eprintln!("run error: {error}"),
            _ => {}
        }
    }

    let _ = run.finish().await?;
    Ok(())
}

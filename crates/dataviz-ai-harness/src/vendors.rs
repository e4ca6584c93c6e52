//! Vendor-specific provider integrations.

/// OpenAI Responses API adapter.
pub mod openai;

//! LLM provider trait for extraction, classification and answering

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::Result;

/// A document the provider has finished processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedDocument {
    /// Provider resource name (e.g. `files/abc123`)
    pub name: String,
    /// URI to reference in generation requests
    pub uri: String,
    pub mime_type: String,
    pub display_name: String,
}

/// One generation call
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Prompt text
    pub prompt: String,
    /// Attached document, sent before the prompt
    pub document: Option<UploadedDocument>,
    /// Structured-output schema; when set the response is JSON text
    pub response_schema: Option<Value>,
}

impl GenerateRequest {
    /// Free-text completion
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Schema-constrained completion over a document
    pub fn structured(prompt: impl Into<String>, document: UploadedDocument, schema: Value) -> Self {
        Self {
            prompt: prompt.into(),
            document: Some(document),
            response_schema: Some(schema),
        }
    }
}

/// Trait for the language-model backend
///
/// Implementations:
/// - `GeminiClient`: Google Generative Language API
/// - `ScriptedLlm`: in-memory scripted responses for tests
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Upload a staged file and wait until the provider has processed it
    async fn upload_document(&self, display_name: &str, path: &Path) -> Result<UploadedDocument>;

    /// Generate text (JSON text when a response schema is set)
    async fn generate(&self, request: GenerateRequest) -> Result<String>;

    /// Check if the provider is reachable with the configured credential
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}

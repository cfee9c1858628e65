//! Provider abstraction for the language-model backend

pub mod gemini;
pub mod llm;

pub use gemini::GeminiClient;
pub use llm::{GenerateRequest, LlmProvider, UploadedDocument};

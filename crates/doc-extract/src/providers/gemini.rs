//! Gemini client for the Generative Language API
//!
//! Uses the resumable Files API to stage documents on the provider side and
//! `generateContent` with `responseSchema` for structured extraction.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::providers::llm::{GenerateRequest, LlmProvider, UploadedDocument};

const API_KEY_HEADER: &str = "x-goog-api-key";
const PDF_MIME: &str = "application/pdf";

/// Gemini API client with automatic retry
pub struct GeminiClient {
    client: Client,
    api_key: SecretString,
    config: LlmConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct UploadMetadata<'a> {
    file: UploadFileMetadata<'a>,
}

#[derive(Serialize)]
struct UploadFileMetadata<'a> {
    display_name: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: RemoteFile,
}

/// File resource as reported by the Files API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteFile {
    name: String,
    #[serde(default)]
    uri: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    state: FileState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum FileState {
    #[default]
    StateUnspecified,
    Processing,
    Active,
    Failed,
}

/// A failed request attempt, classified for the retry loop
#[derive(Debug)]
enum Failure {
    /// Transport errors, 429 and 5xx; worth another attempt
    Transient(Error),
    /// Anything a retry cannot fix (other 4xx, undecodable bodies)
    Permanent(Error),
}

impl Failure {
    fn into_error(self) -> Error {
        match self {
            Failure::Transient(e) | Failure::Permanent(e) => e,
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Turn a non-success response into a classified failure
async fn status_failure(response: Response, what: &str) -> Failure {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = Error::llm(format!("{} ({}): {}", what, status, body));
    if is_retryable(status) {
        Failure::Transient(error)
    } else {
        Failure::Permanent(error)
    }
}

fn transport_failure(what: &str, e: reqwest::Error) -> Failure {
    Failure::Transient(Error::llm(format!("{}: {}", what, e)))
}

fn decode_failure(what: &str, e: reqwest::Error) -> Failure {
    Failure::Permanent(Error::llm(format!("{}: {}", what, e)))
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &LlmConfig, api_key: SecretString) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            config: config.clone(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/v1beta/files", self.config.base_url.trim_end_matches('/'))
    }

    /// Retry transient failures with exponential backoff; permanent ones return at once
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, Failure>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(Failure::Transient(e)) if attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(
                        self.config
                            .retry_base_delay_ms
                            .saturating_mul(2u64.saturating_pow(attempt)),
                    );
                    tracing::warn!(
                        "Gemini request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.config.max_retries.saturating_add(1),
                        delay,
                        e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.into_error()),
            }
        }
    }

    /// Two-step resumable upload: open a session, then send the bytes and finalize
    async fn start_upload(
        &self,
        display_name: &str,
        data: Vec<u8>,
    ) -> std::result::Result<RemoteFile, Failure> {
        let session = self
            .client
            .post(self.upload_url())
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", PDF_MIME)
            .json(&UploadMetadata {
                file: UploadFileMetadata { display_name },
            })
            .send()
            .await
            .map_err(|e| transport_failure("Upload session request failed", e))?;

        if !session.status().is_success() {
            return Err(status_failure(session, "Upload session failed").await);
        }

        let upload_url = session
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Failure::Permanent(Error::llm("Upload session returned no upload URL")))?;

        let response = self
            .client
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await
            .map_err(|e| transport_failure("Upload request failed", e))?;

        if !response.status().is_success() {
            return Err(status_failure(response, "Upload failed").await);
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| decode_failure("Failed to parse upload response", e))?;

        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> std::result::Result<RemoteFile, Failure> {
        let response = self
            .client
            .get(self.api_url(name))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| transport_failure("File status request failed", e))?;

        if !response.status().is_success() {
            return Err(status_failure(response, "File status failed").await);
        }

        response
            .json()
            .await
            .map_err(|e| decode_failure("Failed to parse file status", e))
    }

    /// Poll until the file leaves the processing state, bounded by `max_polls`
    async fn wait_until_processed(&self, mut file: RemoteFile, display_name: &str) -> Result<RemoteFile> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut polls = 0;

        while file.state == FileState::Processing {
            if polls >= self.config.max_polls {
                return Err(Error::UploadTimeout {
                    filename: display_name.to_string(),
                    polls,
                });
            }
            sleep(interval).await;
            polls += 1;
            let name = file.name.clone();
            file = self.retry_request(|| self.get_file(&name)).await?;
            tracing::debug!("{} state after poll {}: {:?}", display_name, polls, file.state);
        }

        if file.state == FileState::Failed {
            return Err(Error::llm(format!("Provider failed to process '{}'", display_name)));
        }

        Ok(file)
    }
}

#[async_trait]
impl LlmProvider for GeminiClient {
    async fn upload_document(&self, display_name: &str, path: &Path) -> Result<UploadedDocument> {
        let data = tokio::fs::read(path).await?;
        tracing::info!("Uploading {} ({} bytes)", display_name, data.len());

        let file = self
            .retry_request(|| self.start_upload(display_name, data.clone()))
            .await?;
        let file = self.wait_until_processed(file, display_name).await?;

        Ok(UploadedDocument {
            name: file.name,
            uri: file.uri,
            mime_type: if file.mime_type.is_empty() {
                PDF_MIME.to_string()
            } else {
                file.mime_type
            },
            display_name: if file.display_name.is_empty() {
                display_name.to_string()
            } else {
                file.display_name
            },
        })
    }

    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let mut parts = Vec::with_capacity(2);
        if let Some(document) = &request.document {
            parts.push(Part::File {
                file_data: FileData {
                    mime_type: document.mime_type.clone(),
                    file_uri: document.uri.clone(),
                },
            });
        }
        parts.push(Part::Text {
            text: request.prompt.clone(),
        });

        let structured = request.response_schema.is_some();
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                response_mime_type: structured.then(|| "application/json".to_string()),
                response_schema: request.response_schema.clone(),
            },
        };
        let url = self.api_url(&format!("models/{}:generateContent", self.config.model));

        self.retry_request(|| async {
            let response = self
                .client
                .post(&url)
                .header(API_KEY_HEADER, self.api_key.expose_secret())
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_failure("Gemini request failed", e))?;

            if !response.status().is_success() {
                return Err(status_failure(response, "Gemini generation failed").await);
            }

            let parsed: GenerateContentResponse = response
                .json()
                .await
                .map_err(|e| decode_failure("Failed to parse Gemini response", e))?;

            parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(|content| {
                    content
                        .parts
                        .into_iter()
                        .filter_map(|p| p.text)
                        .collect::<Vec<_>>()
                        .join("")
                })
                .ok_or_else(|| Failure::Permanent(Error::llm("No text in Gemini response")))
        })
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.api_url(&format!("models/{}", self.config.model)))
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .send()
            .await;

        match response {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

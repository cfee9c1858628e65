//! Configuration for the extraction service

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::section::{default_main_schema, default_sections};
use crate::types::{SchemaField, Section};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Default extraction schema and sections
    pub extraction: ExtractionConfig,
    /// CSV query configuration
    pub tabular: TabularConfig,
    /// Where the API credential is looked up
    pub secrets: SecretsConfig,
}

impl ExtractorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text; omitted sections take defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Generative Language API base URL
    pub base_url: String,
    /// Model used for every call
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries for transport failures, 429 and 5xx responses
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on every further attempt
    pub retry_base_delay_ms: u64,
    /// Delay between file state checks
    pub poll_interval_ms: u64,
    /// Upper bound on file state checks before giving up
    pub max_polls: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-flash-latest".to_string(),
            temperature: 0.1,
            timeout_secs: 120,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            poll_interval_ms: 2000,
            max_polls: 90, // 3 minutes at the default interval
        }
    }
}

/// Default schema workspace contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Main schema rows
    pub main_schema: Vec<SchemaField>,
    /// Multi-record section profiles
    pub sections: Vec<Section>,
    /// Whether runs scan sections unless the request says otherwise
    pub scan_sections: bool,
    /// Runs kept in memory, the latest included; older runs are evicted
    pub max_runs: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            main_schema: default_main_schema(),
            sections: default_sections(),
            scan_sections: false,
            max_runs: 8,
        }
    }
}

/// CSV query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TabularConfig {
    /// Retries after the first generated filter fails (3 attempts total by default)
    pub max_filter_retries: usize,
    /// Sample rows shown to the model
    pub sample_rows: usize,
    /// CSV sessions kept in memory; the oldest is evicted first
    pub max_sessions: usize,
}

impl Default for TabularConfig {
    fn default() -> Self {
        Self {
            max_filter_retries: 2,
            sample_rows: 3,
            max_sessions: 32,
        }
    }
}

/// Credential lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// TOML secrets file checked first
    pub path: PathBuf,
    /// Key inside the secrets file and name of the environment variable
    pub key: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".streamlit/secrets.toml"),
            key: "GEMINI_API_KEY".to_string(),
        }
    }
}

impl SecretsConfig {
    /// Resolve the API key: secrets file first, then the environment
    pub fn resolve_api_key(&self) -> Result<SecretString> {
        if let Some(key) = self.read_secrets_file() {
            tracing::debug!("API key loaded from {}", self.path.display());
            return Ok(SecretString::from(key));
        }

        match std::env::var(&self.key) {
            Ok(key) if !key.trim().is_empty() => {
                tracing::debug!("API key loaded from ${}", self.key);
                Ok(SecretString::from(key.trim().to_string()))
            }
            _ => Err(Error::MissingCredential(self.key.clone())),
        }
    }

    fn read_secrets_file(&self) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        let table: toml::Table = match toml::from_str(&content) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!("Ignoring unreadable secrets file {}: {}", self.path.display(), e);
                return None;
            }
        };
        table
            .get(&self.key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ExtractorConfig::from_toml(
            r#"
            [server]
            port = 9000

            [llm]
            model = "gemini-2.5-pro"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.llm.model, "gemini-2.5-pro");
        assert_eq!(config.llm.max_polls, 90);
        assert_eq!(config.extraction.main_schema.len(), 8);
        assert_eq!(config.tabular.max_filter_retries, 2);
        assert_eq!(config.extraction.max_runs, 8);
        assert_eq!(config.tabular.max_sessions, 32);
        assert_eq!(config.llm.retry_base_delay_ms, 1000);
    }

    #[test]
    fn test_secrets_file_takes_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DOC_EXTRACT_TEST_KEY = \"from-file\"").unwrap();

        std::env::set_var("DOC_EXTRACT_TEST_KEY", "from-env");
        let secrets = SecretsConfig {
            path: file.path().to_path_buf(),
            key: "DOC_EXTRACT_TEST_KEY".to_string(),
        };
        let key = secrets.resolve_api_key().unwrap();
        assert_eq!(key.expose_secret(), "from-file");
        std::env::remove_var("DOC_EXTRACT_TEST_KEY");
    }

    #[test]
    fn test_missing_credential() {
        let secrets = SecretsConfig {
            path: PathBuf::from("/nonexistent/secrets.toml"),
            key: "DOC_EXTRACT_TEST_ABSENT_KEY".to_string(),
        };
        assert!(matches!(
            secrets.resolve_api_key(),
            Err(Error::MissingCredential(name)) if name == "DOC_EXTRACT_TEST_ABSENT_KEY"
        ));
    }
}

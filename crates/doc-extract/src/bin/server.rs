//! Extraction server binary
//!
//! Run with: cargo run -p doc-extract --bin doc-extract-server

use anyhow::Context;
use doc_extract::{config::ExtractorConfig, server::ExtractorServer};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_extract=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::var_os("DOC_EXTRACT_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            tracing::info!("Loading configuration from {}", path.display());
            ExtractorConfig::from_file(&path)?
        }
        None => ExtractorConfig::default(),
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Model: {}", config.llm.model);
    tracing::info!("  - Main schema columns: {}", config.extraction.main_schema.len());
    tracing::info!("  - Sections: {}", config.extraction.sections.len());
    tracing::info!("  - Scan sections by default: {}", config.extraction.scan_sections);

    // A missing credential stops startup before any workflow is reachable
    let server = ExtractorServer::new(config).with_context(|| {
        "Cannot start without a Gemini API key (secrets file or GEMINI_API_KEY)"
    })?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}

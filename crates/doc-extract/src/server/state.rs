//! Application state for the extraction server

use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ExtractorConfig;
use crate::error::Result;
use crate::extraction::{ExtractionPlan, Extractor, Orchestrator};
use crate::ingestion::SourceDocument;
use crate::providers::{GeminiClient, LlmProvider};
use crate::session::{CsvSessionStore, RunRegistry, SchemaWorkspace};
use crate::tabular::QueryEngine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: ExtractorConfig,
    /// LLM provider (Gemini in production)
    llm: Arc<dyn LlmProvider>,
    /// Batch extraction driver
    orchestrator: Orchestrator,
    /// CSV filter/chat driver
    query_engine: QueryEngine,
    /// Editable schemas used by new runs
    workspace: RwLock<SchemaWorkspace>,
    /// Extraction runs
    runs: RunRegistry,
    /// CSV query sessions
    csv_sessions: CsvSessionStore,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create state backed by the Gemini API; fails when no credential is configured
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        let api_key = config.secrets.resolve_api_key()?;
        let llm = Arc::new(GeminiClient::new(&config.llm, api_key)?);
        tracing::info!("Gemini client initialized (model: {})", config.llm.model);
        Ok(Self::with_provider(config, llm))
    }

    /// Create state around an existing provider
    pub fn with_provider(config: ExtractorConfig, llm: Arc<dyn LlmProvider>) -> Self {
        let orchestrator = Orchestrator::new(Extractor::new(Arc::clone(&llm)));
        let query_engine = QueryEngine::new(Arc::clone(&llm), config.tabular.clone());
        let workspace = SchemaWorkspace::from_config(&config.extraction);
        let runs = RunRegistry::with_capacity(config.extraction.max_runs);
        let csv_sessions = CsvSessionStore::with_capacity(config.tabular.max_sessions);

        tracing::info!(
            "Application state ready ({} provider, {} main column(s), {} section(s))",
            llm.name(),
            workspace.main.len(),
            workspace.sections.len()
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                llm,
                orchestrator,
                query_engine,
                workspace: RwLock::new(workspace),
                runs,
                csv_sessions,
                ready: RwLock::new(true),
            }),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.inner.config
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.inner.llm
    }

    pub fn query_engine(&self) -> &QueryEngine {
        &self.inner.query_engine
    }

    pub fn workspace(&self) -> &RwLock<SchemaWorkspace> {
        &self.inner.workspace
    }

    pub fn runs(&self) -> &RunRegistry {
        &self.inner.runs
    }

    pub fn csv_sessions(&self) -> &CsvSessionStore {
        &self.inner.csv_sessions
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }

    /// Register a run and process it on a background task
    pub fn start_run(&self, plan: ExtractionPlan, documents: Vec<SourceDocument>) -> Uuid {
        let runs = self.inner.runs.clone();
        let run_id = runs.create(plan.clone(), documents.clone());
        let orchestrator = self.inner.orchestrator.clone();

        tokio::spawn(async move {
            runs.mark_running(run_id);

            let worker_runs = runs.clone();
            let worker = tokio::spawn(async move {
                let mut observer = worker_runs.observer(run_id);
                orchestrator.run(&plan, &documents, &mut observer).await
            });

            match worker.await {
                Ok(results) => {
                    tracing::info!("Run {} complete", run_id);
                    runs.complete(run_id, results);
                }
                Err(e) => {
                    tracing::error!("Run {} aborted: {}", run_id, e);
                    runs.fail(run_id, format!("Extraction task aborted: {}", e));
                }
            }
        });

        run_id
    }
}

//! In-memory session state: schema workspace, extraction runs and CSV sessions

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{ExtractionConfig, TabularConfig};
use crate::error::{Error, Result};
use crate::extraction::{BatchObserver, DocumentProgress, ExtractionPlan, ExtractionResults};
use crate::ingestion::SourceDocument;
use crate::tabular::CsvSession;
use crate::types::{Schema, SchemaField, Section};

/// Editable main schema and section profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaWorkspace {
    pub main: Vec<SchemaField>,
    pub sections: Vec<Section>,
    pub scan_sections: bool,
}

impl SchemaWorkspace {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            main: config.main_schema.clone(),
            sections: config.sections.clone(),
            scan_sections: config.scan_sections,
        }
    }

    /// Replace the main schema rows after validating them
    pub fn set_main(&mut self, fields: Vec<SchemaField>) -> Result<()> {
        Schema::from_fields(&fields)?;
        self.main = fields;
        Ok(())
    }

    /// Replace a section's sub-schema after validating it
    pub fn set_section_schema(&mut self, key: &str, fields: Vec<SchemaField>) -> Result<&Section> {
        Schema::from_fields(&fields)?;
        let section = self
            .sections
            .iter_mut()
            .find(|s| s.key == key)
            .ok_or_else(|| Error::NotFound(format!("Section {} not found", key)))?;
        section.schema = fields;
        Ok(section)
    }

    pub fn section(&self, key: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.key == key)
    }

    /// Freeze the current state into a plan
    pub fn plan(&self, scan_sections: Option<bool>) -> Result<ExtractionPlan> {
        ExtractionPlan::new(
            &self.main,
            &self.sections,
            scan_sections.unwrap_or(self.scan_sections),
        )
    }
}

/// Run status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// One extraction run with its documents and latest snapshot
#[derive(Debug, Clone)]
pub struct ExtractionRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub plan: ExtractionPlan,
    /// Kept for verification
    pub documents: Vec<SourceDocument>,
    pub completed_documents: usize,
    pub current_file: Option<String>,
    pub results: ExtractionResults,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionRun {
    pub fn document(&self, filename: &str) -> Option<&SourceDocument> {
        self.documents.iter().find(|d| d.filename == filename)
    }

    /// Schema columns of a table: `main` or a section key
    pub fn table_columns(&self, table: &str) -> Option<Vec<String>> {
        if table == "main" {
            return Some(self.plan.main.column_names());
        }
        self.plan
            .sections
            .iter()
            .find(|s| s.section.key == table)
            .map(|s| s.schema.column_names())
    }
}

/// Summary for run listings
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub status: RunStatus,
    pub total_documents: usize,
    pub completed_documents: usize,
    pub error_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ExtractionRun> for RunSummary {
    fn from(run: &ExtractionRun) -> Self {
        Self {
            id: run.id,
            status: run.status,
            total_documents: run.documents.len(),
            completed_documents: run.completed_documents,
            error_count: run.results.errors.len(),
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

/// Concurrent registry of the most recent runs; the newest run is "latest"
#[derive(Clone)]
pub struct RunRegistry {
    runs: Arc<DashMap<Uuid, ExtractionRun>>,
    /// Creation order, oldest first
    order: Arc<Mutex<VecDeque<Uuid>>>,
    capacity: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_capacity(ExtractionConfig::default().max_runs)
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry keeping at most `capacity` runs (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            runs: Arc::new(DashMap::new()),
            order: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn create(&self, plan: ExtractionPlan, documents: Vec<SourceDocument>) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        self.runs.insert(
            id,
            ExtractionRun {
                id,
                status: RunStatus::Pending,
                plan,
                documents,
                completed_documents: 0,
                current_file: None,
                results: ExtractionResults::default(),
                error: None,
                created_at: now,
                updated_at: now,
            },
        );

        let mut order = self.order.lock();
        order.push_back(id);
        while order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                self.runs.remove(&evicted);
                tracing::debug!("Evicted run {}", evicted);
            }
        }
        id
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut ExtractionRun)) {
        if let Some(mut run) = self.runs.get_mut(&id) {
            f(&mut run);
            run.updated_at = Utc::now();
        }
    }

    pub fn mark_running(&self, id: Uuid) {
        self.update(id, |run| {
            run.status = RunStatus::Running;
            run.current_file = run.documents.first().map(|d| d.filename.clone());
        });
    }

    /// Replace the partial snapshot after a document finishes
    pub fn record_progress(&self, id: Uuid, completed: usize, snapshot: &ExtractionResults) {
        self.update(id, |run| {
            run.completed_documents = completed;
            run.current_file = run.documents.get(completed).map(|d| d.filename.clone());
            run.results = snapshot.clone();
        });
    }

    pub fn complete(&self, id: Uuid, results: ExtractionResults) {
        self.update(id, |run| {
            run.status = RunStatus::Complete;
            run.completed_documents = run.documents.len();
            run.current_file = None;
            run.results = results;
        });
    }

    pub fn fail(&self, id: Uuid, error: impl Into<String>) {
        let error = error.into();
        self.update(id, |run| {
            run.status = RunStatus::Failed;
            run.current_file = None;
            run.error = Some(error);
        });
    }

    pub fn get(&self, id: &Uuid) -> Option<ExtractionRun> {
        self.runs.get(id).map(|r| r.clone())
    }

    pub fn latest(&self) -> Option<ExtractionRun> {
        let id = *self.order.lock().back()?;
        self.get(&id)
    }

    /// Retained runs, newest first
    pub fn list(&self) -> Vec<RunSummary> {
        let ids: Vec<Uuid> = self.order.lock().iter().rev().copied().collect();
        ids.iter()
            .filter_map(|id| self.runs.get(id).map(|run| RunSummary::from(run.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Observer that writes snapshots for `id` into this registry
    pub fn observer(&self, id: Uuid) -> RunObserver {
        RunObserver {
            registry: self.clone(),
            id,
        }
    }
}

/// Writes each partial snapshot into the run registry
pub struct RunObserver {
    registry: RunRegistry,
    id: Uuid,
}

impl BatchObserver for RunObserver {
    fn on_document(&mut self, progress: DocumentProgress<'_>, snapshot: &ExtractionResults) {
        tracing::info!(
            "Run {}: {}/{} documents done ({})",
            self.id,
            progress.completed,
            progress.total,
            progress.filename
        );
        self.registry
            .record_progress(self.id, progress.completed, snapshot);
    }
}

/// CSV sessions by id, bounded to the most recently uploaded
#[derive(Clone)]
pub struct CsvSessionStore {
    sessions: Arc<DashMap<Uuid, CsvSession>>,
    order: Arc<Mutex<VecDeque<Uuid>>>,
    capacity: usize,
}

impl Default for CsvSessionStore {
    fn default() -> Self {
        Self::with_capacity(TabularConfig::default().max_sessions)
    }
}

impl CsvSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            order: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn insert(&self, session: CsvSession) -> Uuid {
        let id = session.id;
        self.sessions.insert(id, session);

        let mut order = self.order.lock();
        order.push_back(id);
        while order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                self.sessions.remove(&evicted);
                tracing::debug!("Evicted CSV session {}", evicted);
            }
        }
        id
    }

    pub fn get(&self, id: &Uuid) -> Result<CsvSession> {
        self.sessions
            .get(id)
            .map(|s| s.clone())
            .ok_or_else(|| Error::NotFound(format!("CSV session {} not found", id)))
    }

    /// Store an updated copy of a session that is still retained
    pub fn put(&self, session: CsvSession) -> Result<()> {
        match self.sessions.get_mut(&session.id) {
            Some(mut slot) => {
                *slot = session;
                Ok(())
            }
            None => Err(Error::NotFound(format!("CSV session {} not found", session.id))),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::types::RichRecord;

    #[test]
    fn test_workspace_validates_edits() {
        let mut workspace = SchemaWorkspace::from_config(&ExtractionConfig::default());

        assert!(workspace.set_main(vec![]).is_err());
        assert!(workspace
            .set_main(vec![SchemaField::new("A", "q"), SchemaField::new("A", "q")])
            .is_err());
        assert_eq!(workspace.main.len(), 8);

        let section = workspace
            .set_section_schema("previous_nc", vec![SchemaField::new("NC number", "q")])
            .unwrap();
        assert_eq!(section.schema.len(), 1);
        assert!(matches!(
            workspace.set_section_schema("missing", vec![SchemaField::new("A", "q")]),
            Err(Error::NotFound(_))
        ));

        let plan = workspace.plan(Some(true)).unwrap();
        assert!(plan.scan_sections);
        assert_eq!(plan.sections.len(), 2);
    }

    #[test]
    fn test_registry_lifecycle() {
        let registry = RunRegistry::new();
        let plan = SchemaWorkspace::from_config(&ExtractionConfig::default())
            .plan(None)
            .unwrap();
        let documents = vec![
            SourceDocument::new("a.pdf", b"%PDF".to_vec()),
            SourceDocument::new("b.pdf", b"%PDF".to_vec()),
        ];

        let first = registry.create(plan.clone(), documents.clone());
        let second = registry.create(plan, documents);
        assert_eq!(registry.latest().unwrap().id, second);

        registry.mark_running(first);
        let mut snapshot = ExtractionResults::default();
        snapshot.main.push(RichRecord::new("a.pdf"));
        let mut observer = registry.observer(first);
        observer.on_document(
            DocumentProgress {
                completed: 1,
                total: 2,
                filename: "a.pdf",
            },
            &snapshot,
        );

        let run = registry.get(&first).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.completed_documents, 1);
        assert_eq!(run.current_file.as_deref(), Some("b.pdf"));
        assert_eq!(run.results.main.len(), 1);
        assert_eq!(run.table_columns("main").unwrap().len(), 8);
        assert!(run.table_columns("audit_nc").is_some());

        registry.complete(first, snapshot);
        assert_eq!(registry.get(&first).unwrap().status, RunStatus::Complete);
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_registry_evicts_oldest_runs() {
        let registry = RunRegistry::with_capacity(2);
        let plan = SchemaWorkspace::from_config(&ExtractionConfig::default())
            .plan(None)
            .unwrap();
        let documents = vec![SourceDocument::new("a.pdf", vec![0u8; 1024])];

        let ids: Vec<Uuid> = (0..5)
            .map(|_| registry.create(plan.clone(), documents.clone()))
            .collect();

        assert_eq!(registry.len(), 2);
        assert!(registry.get(&ids[0]).is_none());
        assert!(registry.get(&ids[2]).is_none());
        assert_eq!(registry.latest().unwrap().id, ids[4]);
        let listed: Vec<Uuid> = registry.list().iter().map(|r| r.id).collect();
        assert_eq!(listed, vec![ids[4], ids[3]]);

        // progress for an evicted run is dropped
        registry.complete(ids[0], ExtractionResults::default());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_csv_store_evicts_oldest_sessions() {
        let store = CsvSessionStore::with_capacity(2);
        let table = crate::tabular::DataTable::from_csv_bytes(b"a\n1\n").unwrap();

        let first = store.insert(CsvSession::new("one.csv", table.clone()));
        let evicted = store.get(&first).unwrap();
        let second = store.insert(CsvSession::new("two.csv", table.clone()));
        let third = store.insert(CsvSession::new("three.csv", table));

        assert_eq!(store.len(), 2);
        assert!(matches!(store.get(&first), Err(Error::NotFound(_))));
        assert!(store.get(&second).is_ok());
        assert!(store.get(&third).is_ok());

        // an evicted session is not resurrected by a late update
        assert!(store.put(evicted).is_err());
        assert_eq!(store.len(), 2);
    }
}

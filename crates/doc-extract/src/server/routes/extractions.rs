//! Extraction runs: upload, progress, results, export and verification

use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::export::records_to_csv;
use crate::extraction::{flatten_records, DocumentError, FlatRecord};
use crate::ingestion::SourceDocument;
use crate::server::routes::attachment_disposition;
use crate::server::state::AppState;
use crate::session::{ExtractionRun, RunStatus, RunSummary};
use crate::types::section::MAIN_EXPORT_FILE;
use crate::types::{RichRecord, FILENAME_COLUMN};
use crate::verification::{self, Verification};

/// Key of the main results table
const MAIN_TABLE: &str = "main";

#[derive(Debug, Default, Deserialize)]
pub struct ExtractionOptions {
    /// Overrides the workspace default when set
    #[serde(default)]
    pub scan_sections: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct StartExtractionResponse {
    pub run_id: Uuid,
    pub documents: usize,
    pub scan_sections: bool,
    pub message: String,
}

/// POST /api/extractions - Upload PDFs and start a run
pub async fn start_extraction(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StartExtractionResponse>> {
    let mut documents = Vec::new();
    let mut options = ExtractionOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == "options" {
            let data = field
                .bytes()
                .await
                .map_err(|e| Error::BadRequest(format!("Failed to read options: {}", e)))?;
            options = serde_json::from_slice(&data)?;
            continue;
        }

        let filename = field
            .file_name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("document_{}.pdf", documents.len() + 1));

        let data = field
            .bytes()
            .await
            .map_err(|e| Error::BadRequest(format!("Failed to read {}: {}", filename, e)))?;

        tracing::info!("Received document: {} ({} bytes)", filename, data.len());
        documents.push(SourceDocument::new(filename, data));
    }

    if documents.is_empty() {
        return Err(Error::BadRequest("Upload PDFs first.".to_string()));
    }

    let plan = state.workspace().read().plan(options.scan_sections)?;
    let scan_sections = plan.scan_sections;
    let count = documents.len();
    let run_id = state.start_run(plan, documents);

    Ok(Json(StartExtractionResponse {
        run_id,
        documents: count,
        scan_sections,
        message: format!(
            "Extraction started. Use /api/extractions/{} to follow progress.",
            run_id
        ),
    }))
}

/// One flattened results table
#[derive(Debug, Serialize)]
pub struct TableView {
    pub title: String,
    pub file_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<FlatRecord>,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub id: Uuid,
    pub status: RunStatus,
    pub total_documents: usize,
    pub completed_documents: usize,
    pub current_file: Option<String>,
    pub error: Option<String>,
    pub errors: Vec<DocumentError>,
    /// `main` first, then each scanned section
    pub tables: IndexMap<String, TableView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn with_filename(mut columns: Vec<String>) -> Vec<String> {
    columns.push(FILENAME_COLUMN.to_string());
    columns
}

impl From<ExtractionRun> for RunResponse {
    fn from(run: ExtractionRun) -> Self {
        let mut tables = IndexMap::new();
        tables.insert(
            MAIN_TABLE.to_string(),
            TableView {
                title: "Extracted data".to_string(),
                file_name: MAIN_EXPORT_FILE.to_string(),
                columns: with_filename(run.plan.main.column_names()),
                rows: run.results.main_table(),
            },
        );
        for planned in &run.plan.sections {
            if let Some(records) = run.results.sections.get(&planned.section.key) {
                tables.insert(
                    planned.section.key.clone(),
                    TableView {
                        title: planned.section.title.clone(),
                        file_name: planned.section.file_name.clone(),
                        columns: with_filename(planned.schema.column_names()),
                        rows: flatten_records(records),
                    },
                );
            }
        }

        Self {
            id: run.id,
            status: run.status,
            total_documents: run.documents.len(),
            completed_documents: run.completed_documents,
            current_file: run.current_file,
            error: run.error,
            errors: run.results.errors,
            tables,
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

/// GET /api/extractions - List runs, newest first
pub async fn list_extractions(State(state): State<AppState>) -> Json<Vec<RunSummary>> {
    Json(state.runs().list())
}

/// GET /api/extractions/latest - The most recently started run
pub async fn latest_extraction(State(state): State<AppState>) -> Result<Json<RunResponse>> {
    let run = state
        .runs()
        .latest()
        .ok_or_else(|| Error::NotFound("No extraction has been run yet".to_string()))?;
    Ok(Json(run.into()))
}

fn find_run(state: &AppState, id: Uuid) -> Result<ExtractionRun> {
    state
        .runs()
        .get(&id)
        .ok_or_else(|| Error::NotFound(format!("Extraction {} not found", id)))
}

/// GET /api/extractions/:id - Status, flattened tables and errors
pub async fn get_extraction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunResponse>> {
    Ok(Json(find_run(&state, id)?.into()))
}

/// Records, schema columns and export file name of a table
fn table_of<'a>(run: &'a ExtractionRun, table: &str) -> Result<(&'a [RichRecord], Vec<String>, String)> {
    if table == MAIN_TABLE {
        return Ok((
            run.results.main.as_slice(),
            run.plan.main.column_names(),
            MAIN_EXPORT_FILE.to_string(),
        ));
    }

    let planned = run
        .plan
        .sections
        .iter()
        .find(|s| s.section.key == table)
        .ok_or_else(|| Error::NotFound(format!("Table {} not found", table)))?;
    let records = run.results.sections.get(table).ok_or_else(|| {
        Error::NotFound(format!("Section {} was not scanned in this run", table))
    })?;

    Ok((
        records.as_slice(),
        planned.schema.column_names(),
        planned.section.file_name.clone(),
    ))
}

/// GET /api/extractions/:id/export/:table - CSV download
pub async fn export_table(
    State(state): State<AppState>,
    Path((id, table)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse> {
    let run = find_run(&state, id)?;
    let (records, columns, file_name) = table_of(&run, &table)?;
    let csv = records_to_csv(&columns, records)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                attachment_disposition(&file_name),
            ),
        ],
        csv,
    ))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default = "default_table")]
    pub table: String,
    pub row: usize,
    pub column: String,
}

fn default_table() -> String {
    MAIN_TABLE.to_string()
}

/// GET /api/extractions/:id/verify - Highlight the quote behind one cell
pub async fn verify_cell(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<Verification>> {
    let run = find_run(&state, id)?;
    let (records, _, _) = table_of(&run, &query.table)?;
    let record = records.get(query.row).cloned().ok_or_else(|| {
        Error::NotFound(format!("Row {} not found in {}", query.row, query.table))
    })?;
    let document = run.document(&record.filename).ok_or_else(|| {
        Error::NotFound(format!("Document {} not found in this run", record.filename))
    })?;

    let data = document.data.clone();
    Ok(Json(verification::verify(record, query.column, data).await))
}

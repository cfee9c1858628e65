//! CSV query sessions: upload, filter, chat and export

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::routes::attachment_disposition;
use crate::server::state::AppState;
use crate::tabular::{AppliedFilter, ChatMessage, ColumnType, CsvSession, DataTable, TurnOutcome};

/// Rows shown in a session preview
const PREVIEW_ROWS: usize = 20;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: usize,
    pub preview: Vec<Vec<String>>,
    pub filter: Option<AppliedFilter>,
    pub chat_rows: usize,
    pub messages: Vec<ChatMessage>,
}

impl From<&CsvSession> for SessionResponse {
    fn from(session: &CsvSession) -> Self {
        Self {
            id: session.id,
            filename: session.filename.clone(),
            created_at: session.created_at,
            columns: session.table.columns().to_vec(),
            types: session.table.types().to_vec(),
            rows: session.table.len(),
            preview: session.table.rows().iter().take(PREVIEW_ROWS).cloned().collect(),
            filter: session.filter.clone(),
            chat_rows: session.chat_table.len(),
            messages: session.messages.clone(),
        }
    }
}

/// POST /api/csv - Upload a CSV file and open a session
pub async fn upload_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SessionResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.csv").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::BadRequest(format!("Failed to read {}: {}", filename, e)))?;

        let table = DataTable::from_csv_bytes(&data)
            .map_err(|e| Error::file_parse(filename.clone(), e.to_string()))?;
        tracing::info!(
            "CSV {} loaded: {} rows, {} columns",
            filename,
            table.len(),
            table.columns().len()
        );

        let session = CsvSession::new(filename, table);
        let response = SessionResponse::from(&session);
        state.csv_sessions().insert(session);
        return Ok(Json(response));
    }

    Err(Error::BadRequest("Upload a CSV file first.".to_string()))
}

/// GET /api/csv/:id - Session state
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>> {
    let session = state.csv_sessions().get(&id)?;
    Ok(Json(SessionResponse::from(&session)))
}

#[derive(Debug, Deserialize)]
pub struct FilterRequest {
    pub request: String,
}

/// POST /api/csv/:id/filter - Filter the uploaded table; resets the chat
pub async fn filter_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<FilterRequest>,
) -> Result<Json<AppliedFilter>> {
    if request.request.trim().is_empty() {
        return Err(Error::BadRequest("Filter request is empty".to_string()));
    }

    let mut session = state.csv_sessions().get(&id)?;
    let applied = session
        .apply_filter(state.query_engine(), &request.request)
        .await
        .clone();
    state.csv_sessions().put(session)?;
    Ok(Json(applied))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

/// POST /api/csv/:id/chat - One chat turn over the current chat table
pub async fn chat_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<TurnOutcome>> {
    if request.prompt.trim().is_empty() {
        return Err(Error::BadRequest("Prompt is empty".to_string()));
    }

    let mut session = state.csv_sessions().get(&id)?;
    let outcome = session.chat(state.query_engine(), &request.prompt).await;
    state.csv_sessions().put(session)?;
    Ok(Json(outcome))
}

/// GET /api/csv/:id/export - Current chat table as CSV
pub async fn export_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let session = state.csv_sessions().get(&id)?;
    let csv = session.chat_table.to_csv_string()?;
    let stem = session
        .filename
        .strip_suffix(".csv")
        .unwrap_or(&session.filename);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                attachment_disposition(&format!("{}_filtered.csv", stem)),
            ),
        ],
        csv,
    ))
}

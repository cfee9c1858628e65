//! API routes for the extraction server

pub mod csv;
pub mod extractions;
pub mod schema;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Schema workspace
        .route("/schema", get(schema::get_schema).put(schema::update_schema))
        .route("/sections", get(schema::list_sections))
        .route("/sections/:key/schema", put(schema::update_section_schema))
        // Extraction runs - with larger body limit for PDF uploads
        .route(
            "/extractions",
            post(extractions::start_extraction)
                .layer(DefaultBodyLimit::max(max_upload_size))
                .get(extractions::list_extractions),
        )
        .route("/extractions/latest", get(extractions::latest_extraction))
        .route("/extractions/:id", get(extractions::get_extraction))
        .route("/extractions/:id/export/:table", get(extractions::export_table))
        .route("/extractions/:id/verify", get(extractions::verify_cell))
        // CSV query sessions
        .route(
            "/csv",
            post(csv::upload_csv).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/csv/:id", get(csv::get_session))
        .route("/csv/:id/filter", post(csv::filter_session))
        .route("/csv/:id/chat", post(csv::chat_session))
        .route("/csv/:id/export", get(csv::export_session))
        // Info
        .route("/info", get(info))
}

/// `Content-Disposition` value for a CSV download.
///
/// Quotes, backslashes and anything outside printable ASCII become `_` so an
/// uploaded file name can never break the header.
pub(crate) fn attachment_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "doc-extract",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Structured extraction from PDF reports with page-level citations",
        "endpoints": {
            "GET /api/schema": "Main schema rows",
            "PUT /api/schema": "Replace the main schema rows",
            "GET /api/sections": "Section profiles",
            "PUT /api/sections/:key/schema": "Replace a section's sub-schema",
            "POST /api/extractions": "Upload PDFs and start an extraction run",
            "GET /api/extractions": "List runs",
            "GET /api/extractions/latest": "Most recent run",
            "GET /api/extractions/:id": "Run status and flattened tables",
            "GET /api/extractions/:id/export/:table": "CSV download of a table",
            "GET /api/extractions/:id/verify": "Highlight the source quote of a cell",
            "POST /api/csv": "Upload a CSV file for querying",
            "GET /api/csv/:id": "CSV session state",
            "POST /api/csv/:id/filter": "Natural-language filter of the uploaded table",
            "POST /api/csv/:id/chat": "Chat over the filtered table",
            "GET /api/csv/:id/export": "CSV download of the chat table"
        }
    }))
}

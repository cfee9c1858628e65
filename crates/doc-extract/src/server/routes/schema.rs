//! Schema workspace endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{SchemaField, Section};

/// Main schema rows plus the default scan flag
#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub fields: Vec<SchemaField>,
    pub scan_sections: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSchemaRequest {
    pub fields: Vec<SchemaField>,
    /// Leave unset to keep the current default
    #[serde(default)]
    pub scan_sections: Option<bool>,
}

/// GET /api/schema - Current main schema
pub async fn get_schema(State(state): State<AppState>) -> Json<SchemaResponse> {
    let workspace = state.workspace().read();
    Json(SchemaResponse {
        fields: workspace.main.clone(),
        scan_sections: workspace.scan_sections,
    })
}

/// PUT /api/schema - Replace the main schema rows
pub async fn update_schema(
    State(state): State<AppState>,
    Json(request): Json<UpdateSchemaRequest>,
) -> Result<Json<SchemaResponse>> {
    let mut workspace = state.workspace().write();
    workspace.set_main(request.fields)?;
    if let Some(scan) = request.scan_sections {
        workspace.scan_sections = scan;
    }

    tracing::info!("Main schema updated ({} columns)", workspace.main.len());
    Ok(Json(SchemaResponse {
        fields: workspace.main.clone(),
        scan_sections: workspace.scan_sections,
    }))
}

/// GET /api/sections - Section profiles
pub async fn list_sections(State(state): State<AppState>) -> Json<Vec<Section>> {
    Json(state.workspace().read().sections.clone())
}

#[derive(Debug, Deserialize)]
pub struct UpdateSectionRequest {
    pub fields: Vec<SchemaField>,
}

/// PUT /api/sections/:key/schema - Replace a section's sub-schema
pub async fn update_section_schema(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<UpdateSectionRequest>,
) -> Result<Json<Section>> {
    let mut workspace = state.workspace().write();
    let section = workspace.set_section_schema(&key, request.fields)?;
    tracing::info!("Section {} schema updated ({} columns)", key, section.schema.len());
    Ok(Json(section.clone()))
}

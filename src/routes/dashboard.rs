use axum::{
    extract::State,
    http::{header, Method},
    response::IntoResponse,
    routing::post,
    Router,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use crate::{
    AppState,
    error::AppError,
    services::{
        dashboard::{self, DashboardView, FilterSelection, MappingView},
        export,
        file_processor::{self, FileInfo},
        normalizer::ManualMapping,
    },
};
use tower_http::cors::{CorsLayer, Any};

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/dashboard", post(render_dashboard))
        .route("/dashboard/mapping", post(inspect_mapping))
        .route("/dashboard/export", post(export_filtered))
        .layer(cors)
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    files: Vec<FileInfo>,
}

#[derive(Debug, Deserialize)]
pub struct DashboardRequest {
    files: Vec<FileInfo>,
    #[serde(default)]
    mapping: ManualMapping,
    #[serde(default)]
    filters: FilterSelection,
}

async fn inspect_mapping(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<MappingView>, AppError> {
    tracing::info!("Inspecting column mapping for {} files", request.files.len());
    let raw = file_processor::load_files(&request.files, &state.uploads, &state.config).await?;
    let view = dashboard::mapping_view(&state.normalizer, raw);
    tracing::info!(
        "Mapping inspected: {} derived, {} unmapped",
        view.report.derived.len(),
        view.report.unmapped.len()
    );
    Ok(Json(view))
}

async fn render_dashboard(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DashboardRequest>,
) -> Result<Json<DashboardView>, AppError> {
    let start = std::time::Instant::now();
    tracing::info!(
        "Rendering dashboard for {} files, filters: {:?}",
        request.files.len(),
        request.filters
    );

    let raw = file_processor::load_files(&request.files, &state.uploads, &state.config).await?;
    let view = dashboard::evaluate(&state.normalizer, raw, &request.mapping, &request.filters)?;

    tracing::info!("Total processing completed in {:?}", start.elapsed());
    Ok(Json(view))
}

async fn export_filtered(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DashboardRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!("Exporting filtered data for {} files", request.files.len());

    let raw = file_processor::load_files(&request.files, &state.uploads, &state.config).await?;
    let (_, filtered) = dashboard::prepare(&state.normalizer, raw, &request.mapping, &request.filters)?;
    let body = export::table_to_csv(&filtered)?;

    tracing::info!("Exported {} rows, {}KB", filtered.row_count(), body.len() / 1024);
    Ok((
        [
            (header::CONTENT_TYPE, export::CSV_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, export::content_disposition(&state.config.export_file_name)),
        ],
        body,
    ))
}

//! Export API handlers.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::{Validate, ValidationError};

use vexport_models::{ExportId, ExportRecord, ExportRequest, ExportStatus};
use vexport_queue::RenderExportJob;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Export submission payload.
///
/// Identifier fields carry the same character rules the renderer's
/// remote services use; catalog fields are checked against the operator
/// catalogs at submission time.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitExportRequest {
    #[validate(
        length(min = 1, max = 50),
        custom(function = validate_service_chars)
    )]
    pub service: String,

    #[validate(
        length(min = 1, max = 20),
        custom(function = validate_owner_chars)
    )]
    pub owner_id: String,

    #[validate(
        length(min = 1, max = 50),
        custom(function = validate_video_chars)
    )]
    pub video_id: String,

    pub aspect_ratio: String,
    pub resolution: String,

    #[serde(default)]
    pub outro: bool,
}

fn validate_service_chars(value: &str) -> Result<(), ValidationError> {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_service"))
    }
}

fn validate_owner_chars(value: &str) -> Result<(), ValidationError> {
    if value
        .chars()
        .all(|c| c.is_ascii_digit() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_owner_id"))
    }
}

fn validate_video_chars(value: &str) -> Result<(), ValidationError> {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_video_id"))
    }
}

/// Submit a new export.
pub async fn submit_export(
    State(state): State<AppState>,
    Json(payload): Json<SubmitExportRequest>,
) -> ApiResult<(StatusCode, Json<ExportRecord>)> {
    payload
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let ratios = state.settings.aspect_ratios().await?;
    if !ratios.contains_key(&payload.aspect_ratio) {
        return Err(ApiError::Validation(format!(
            "unknown aspect ratio '{}'",
            payload.aspect_ratio
        )));
    }

    let resolutions = state.settings.resolutions().await?;
    if !resolutions.contains_key(&payload.resolution) {
        return Err(ApiError::Validation(format!(
            "unknown resolution '{}'",
            payload.resolution
        )));
    }

    let record = ExportRecord::new(ExportRequest {
        service: payload.service,
        owner_id: payload.owner_id,
        video_id: payload.video_id,
        aspect_ratio: payload.aspect_ratio,
        resolution: payload.resolution,
        outro: payload.outro,
    });
    state.repo.create(&record).await?;

    let job = RenderExportJob::new(record.id.clone(), record.request.clone());
    if let Err(e) = state.dispatcher.dispatch(job).await {
        // No job means the record can never progress; take it back out
        warn!("Dispatch failed for export {}, removing record", record.id);
        state.repo.delete(&record.id).await.ok();
        return Err(ApiError::Queue(e));
    }

    info!("Submitted export {}", record.id);
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// Export list response.
#[derive(Serialize)]
pub struct ListExportsResponse {
    pub exports: Vec<ExportRecord>,
    pub count: usize,
}

/// List recent exports, newest first.
pub async fn list_exports(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListExportsResponse>> {
    let limit = query.limit.unwrap_or(state.config.list_limit).min(200);
    let exports = state.repo.list_recent(limit).await?;
    let count = exports.len();

    Ok(Json(ListExportsResponse { exports, count }))
}

/// Get a single export.
pub async fn get_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
) -> ApiResult<Json<ExportRecord>> {
    let record = find_export(&state, &export_id).await?;
    Ok(Json(record))
}

/// Compact status payload for polling clients.
#[derive(Serialize)]
pub struct ExportStatusResponse {
    pub id: ExportId,
    pub status: ExportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Get an export's status.
pub async fn get_export_status(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
) -> ApiResult<Json<ExportStatusResponse>> {
    let record = find_export(&state, &export_id).await?;
    Ok(Json(ExportStatusResponse {
        id: record.id,
        status: record.status,
        artifact_url: record.artifact_url,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }))
}

/// Cancel an export that has not completed.
///
/// A render already underway finishes on its own; its outcome is
/// discarded because the record is no longer `in_progress` when the
/// worker tries to resolve it.
pub async fn cancel_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
) -> ApiResult<Json<ExportRecord>> {
    let mut record = find_export(&state, &export_id).await?;

    record
        .cancel()
        .map_err(|e| ApiError::Conflict(e.to_string()))?;
    state.repo.update(&record).await?;

    info!("Cancelled export {}", record.id);
    Ok(Json(record))
}

/// Re-enqueue a failed export.
pub async fn retry_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
) -> ApiResult<Json<ExportRecord>> {
    let mut record = find_export(&state, &export_id).await?;

    record
        .reset_for_retry()
        .map_err(|e| ApiError::Conflict(e.to_string()))?;

    // Dispatch before persisting: a job pointing at a still-failed
    // record is skipped by the worker, while a pending record with no
    // job would wait forever.
    let job = RenderExportJob::new(record.id.clone(), record.request.clone());
    state.dispatcher.dispatch(job).await?;
    state.repo.update(&record).await?;

    info!("Retrying export {}", record.id);
    Ok(Json(record))
}

/// Delete an export and its artifact.
///
/// Allowed from any state. Artifact removal is best effort and never
/// blocks removing the record; a render still in flight resolves against
/// the missing record and is dropped by the worker.
pub async fn delete_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
) -> ApiResult<StatusCode> {
    let record = find_export(&state, &export_id).await?;

    if let Some(url) = &record.artifact_url {
        if let Err(e) = state.artifacts.delete(url).await {
            warn!("Could not delete artifact for export {}: {}", record.id, e);
        }
    }
    state.repo.delete(&record.id).await?;

    info!("Deleted export {}", record.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Download a completed export's artifact.
pub async fn download_export(
    State(state): State<AppState>,
    Path(export_id): Path<String>,
) -> ApiResult<Response> {
    let record = find_export(&state, &export_id).await?;

    if record.status != ExportStatus::Completed {
        return Err(ApiError::NotReady(format!(
            "export is {}",
            record.status
        )));
    }

    let Some(url) = &record.artifact_url else {
        error!("Export {} is completed but has no artifact URL", record.id);
        return Err(ApiError::MissingArtifact(
            "completed export has no artifact".to_string(),
        ));
    };

    let bytes = match state.artifacts.read(url).await {
        Ok(bytes) => bytes,
        Err(vexport_storage::StorageError::NotFound(path)) => {
            // Completed record pointing at a purged or lost file
            error!(
                "Artifact for export {} missing on disk: {}",
                record.id,
                path.display()
            );
            return Err(ApiError::MissingArtifact(
                "artifact no longer exists".to_string(),
            ));
        }
        Err(e) => return Err(ApiError::Storage(e)),
    };

    let download_name = format!(
        "{}_{}.mp4",
        record.request.owner_id, record.request.video_id
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{download_name}\""),
        )
        .body(Body::from(bytes))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

async fn find_export(state: &AppState, export_id: &str) -> ApiResult<ExportRecord> {
    let id = ExportId::from_string(export_id);
    state
        .repo
        .find(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("export {export_id} not found")))
}

//! `/api/imports` — upload, list, status, delete (`spec.md` §6).

use crate::api::AppState;
use crate::error::ApiError;
use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub import_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// `POST /api/imports/upload` — multipart file upload, `.csv` only.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if let Some(name) = field.file_name() {
            filename = Some(name.to_string());
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?
                    .to_vec(),
            );
            break;
        }
    }

    let filename = filename.ok_or_else(|| ApiError::BadRequest("no file provided".to_string()))?;
    let bytes = bytes.ok_or_else(|| ApiError::BadRequest("no file provided".to_string()))?;

    if !filename.to_lowercase().ends_with(".csv") {
        return Err(ApiError::BadRequest(
            "only .csv uploads are accepted".to_string(),
        ));
    }

    let staged_path = crate::ingestion::stage_temp_file(&bytes)?;
    let import_id = state.imports.create(&filename)?;

    info!(%import_id, %filename, "accepted upload, scheduling ingestion");

    let pipeline = state.ingestion.clone();
    let task_import_id = import_id.clone();
    tokio::spawn(async move {
        let result =
            tokio::task::spawn_blocking(move || pipeline.run(&staged_path, &task_import_id))
                .await;
        if let Err(join_err) = result {
            warn!(error = %join_err, "ingestion task panicked");
        }
    });

    Ok(Json(UploadResponse {
        import_id,
        status: "pending",
    }))
}

/// `GET /api/imports?skip=&limit=`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse<crate::models::ImportRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 1000);
    let (data, total) = state.imports.list(query.skip.max(0), limit)?;
    Ok(Json(ListResponse { data, total }))
}

/// `GET /api/imports/{id}/status`
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<crate::models::ImportRecord>, ApiError> {
    state
        .imports
        .get(&id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no import with id {id}")))
}

/// `DELETE /api/imports/{id}` — flip to `deleting` synchronously, cascade in
/// the background.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    if state.imports.get(&id)?.is_none() {
        return Err(ApiError::NotFound(format!("no import with id {id}")));
    }
    state.imports.mark_deleting(&id)?;

    let prices = state.prices.clone();
    let imports = state.imports.clone();
    let cache = state.cache.clone();
    let task_id = id.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(err) = prices.delete_by_import(&task_id) {
            warn!(import_id = %task_id, error = %err, "failed to cascade-delete price records");
            return;
        }
        if let Err(err) = imports.delete(&task_id) {
            warn!(import_id = %task_id, error = %err, "failed to delete import record");
        }
        cache.invalidate();
    });

    Ok(Json(DeleteResponse { deleted: true }))
}

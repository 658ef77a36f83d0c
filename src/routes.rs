use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    response::Response,
};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::{
    AppState,
    download::stream_download,
    error::{ApiError, FieldError},
    metadata::fetch_video_info,
    models::{DownloadRequest, NewDownloadRequest, VideoInfo},
};

pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /api/video-info
pub async fn video_info(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<VideoInfo>, ApiError> {
    let video_url = match &payload {
        Ok(Json(body)) => body.get("videoUrl").and_then(Value::as_str),
        Err(rejection) => {
            debug!("Rejected video-info body: {rejection}");
            None
        }
    }
    .ok_or_else(ApiError::invalid_url)?;

    let info = fetch_video_info(state.extractor.as_ref(), video_url).await?;
    Ok(Json(info))
}

/// POST /api/download
pub async fn download(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|rejection| {
        ApiError::validation(vec![FieldError::new(Vec::new(), rejection.body_text())])
    })?;
    let request = NewDownloadRequest::from_json(&body).map_err(ApiError::validation)?;

    stream_download(state.storage.clone(), state.extractor.as_ref(), request).await
}

/// GET /api/downloads/{id}
pub async fn get_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DownloadRequest>, ApiError> {
    let not_found = || ApiError::not_found("Download request not found");
    let id = Uuid::parse_str(&id).map_err(|_| not_found())?;

    state
        .storage
        .get_download_request(id)
        .await
        .map(Json)
        .ok_or_else(not_found)
}

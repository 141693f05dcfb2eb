use axum::{Json, Router, http::StatusCode, routing::get};

use crate::handler::{ApiError, ApiJsonResult, AppState};

pub fn system_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/devices", get(list_devices))
}

async fn index() -> &'static str {
    "system route!"
}

/// Local camera device paths usable as a source address.
async fn list_devices() -> ApiJsonResult<Vec<String>> {
    let devices = tokio::task::spawn_blocking(ffmpeg_pipe::device::v4l2_device_paths)
        .await?
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    Ok(Json(
        devices.iter().map(|d| d.display().to_string()).collect(),
    ))
}

use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::RelayConfig,
    manager::PipeManager,
    media::{relay::MetricsSender, transform::SharedEffect},
    model::ModelSlot,
};

pub mod detect;
pub mod frame;
pub mod media_pipe;
pub mod system;

pub type ApiResult<T> = Result<T, ApiError>;
pub type ApiJsonResult<T> = ApiResult<Json<T>>;

/// Everything the handlers share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub models: Arc<ModelSlot>,
    pub effect: SharedEffect,
    /// Latest metrics of any video feed.
    pub metrics: MetricsSender,
    pub pipes: Arc<PipeManager>,
    pub cancel: CancellationToken,
}

pub struct ApiError {
    status: StatusCode,
    error: anyhow::Error,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            error: error.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, anyhow::anyhow!(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("ApiError: {:?}", self.error);
        } else {
            log::debug!("ApiError: {:#}", self.error);
        }
        (self.status, format!("{:#}", self.error)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err)
    }
}

use axum::{Router, routing::get};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::handler::AppState;

pub(crate) fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .merge(crate::handler::frame::frame_router())
        .merge(crate::handler::detect::detect_router())
        .nest("/pipe", crate::handler::media_pipe::media_pipe_router())
        .nest("/system", crate::handler::system::system_router())
        .with_state(state)
}

/// Serve the API until `cancel` fires. A bind failure cancels the token so
/// the process exits.
pub(crate) fn start_api_server(state: AppState, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listen = state.config.listen.clone();
        let app = app_router(state);

        let listener = match TcpListener::bind(&listen).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("cannot listen on {}: {}", listen, e);
                cancel.cancel();
                return;
            }
        };
        log::info!("API server started on {}", listen);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("Error running API server: {}", e);
        }
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Shutting down API server...");
}

async fn index() -> &'static str {
    "frame-relay: /ws, /video_feed, /set_model?name=, /set_effect?effect=, /models, /metrics, /pipe, /system/devices"
}

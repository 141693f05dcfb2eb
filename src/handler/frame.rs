use std::time::Instant;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::{
    handler::AppState,
    media::{codec, metrics::FpsMeter, transform::FrameTransform, types::Effect},
};

pub fn frame_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ClientEvent {
    SendImage { image: String },
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum ServerEvent {
    ReceiveImage { image: String, fps: f64 },
    Error { message: String },
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_conn(socket, state))
}

/// One connection: every `send_image` is answered on the same socket, in
/// order. Bad payloads get an `error` event and the connection stays up.
async fn ws_conn(socket: WebSocket, state: AppState) {
    let (mut tx, mut rx) = socket.split();
    let mut meter = FpsMeter::new(state.config.fps_window());
    let cancel = state.cancel.clone();

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx.next() => msg,
        };
        let text = match msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                log::debug!("websocket receive failed: {}", e);
                break;
            }
        };

        let fps = meter.record(Instant::now());
        let effect = state.effect.get();
        let payload = text.as_str().to_owned();
        let reply = match tokio::task::spawn_blocking(move || handle_event(&payload, effect, fps)).await {
            Ok(reply) => reply,
            Err(e) => ServerEvent::Error {
                message: format!("processing failed: {}", e),
            },
        };

        let json = match serde_json::to_string(&reply) {
            Ok(json) => json,
            Err(e) => {
                log::error!("cannot serialize reply: {}", e);
                continue;
            }
        };
        if tx.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
    log::debug!("websocket closed, {:.1} fps over the last {:?}", meter.fps(), meter.window());
}

/// Decode, apply the effect and re-encode one inbound event.
fn handle_event(payload: &str, effect: Effect, fps: f64) -> ServerEvent {
    let event: ClientEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            return ServerEvent::Error {
                message: format!("bad event: {}", e),
            };
        }
    };
    let ClientEvent::SendImage { image } = event;

    let result = codec::decode_data_url(&image)
        .map(|frame| effect.apply(frame))
        .and_then(|frame| codec::encode_data_url(&frame));
    match result {
        Ok(image) => ServerEvent::ReceiveImage { image, fps },
        Err(e) => ServerEvent::Error {
            message: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_pipe::frame::{PixelLayout, VideoFrame};
    use serde_json::{Value, json};

    use super::*;

    fn send_image(image: &str) -> String {
        json!({"event": "send_image", "data": {"image": image}}).to_string()
    }

    #[test]
    fn test_round_trip_applies_effect() {
        let frame = VideoFrame::filled(4, 4, PixelLayout::Bgr24, &[0, 0, 255]).unwrap();
        let url = codec::encode_data_url(&frame).unwrap();

        let reply = handle_event(&send_image(&url), Effect::Gray, 12.5);
        let ServerEvent::ReceiveImage { image, fps } = reply else {
            panic!("unexpected reply {:?}", reply);
        };
        assert_eq!(fps, 12.5);
        let out = codec::decode_data_url(&image).unwrap();
        assert_eq!((out.width(), out.height()), (4, 4));
        assert_eq!(out.pixel(0, 0), Some(&[76u8, 76, 76][..]));
    }

    #[test]
    fn test_malformed_payloads_yield_error_events() {
        assert!(matches!(
            handle_event("not json", Effect::None, 0.0),
            ServerEvent::Error { .. }
        ));
        assert!(matches!(
            handle_event(&send_image("data:image/png;base64,AAAA"), Effect::None, 0.0),
            ServerEvent::Error { .. }
        ));
        assert!(matches!(
            handle_event(r#"{"event":"subscribe","data":{}}"#, Effect::None, 0.0),
            ServerEvent::Error { .. }
        ));
    }

    #[test]
    fn test_event_json_shape() {
        let reply = ServerEvent::ReceiveImage {
            image: "data:image/png;base64,xyz".to_string(),
            fps: 2.0,
        };
        let value: Value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["event"], "receive_image");
        assert_eq!(value["data"]["image"], "data:image/png;base64,xyz");
        assert_eq!(value["data"]["fps"], 2.0);

        let value = serde_json::to_value(ServerEvent::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"event": "error", "data": {"message": "boom"}}));
    }
}

//! The HTTP and WebSocket boundary: thin routing over the matchmaker's
//! `MatchExecutor` seam. No auth/session model, per the scope this system
//! carries (see the module-level docs on [`crate::state::AppState`]).

use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Json;
use runner_core::matchmaker::MatchExecutor;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    /// Comma-separated submission hex ids, one per player.
    pub submissions: String,
    #[serde(default = "default_moves")]
    pub moves: usize,
}

fn default_moves() -> usize {
    200
}

/// `GET /run?submissions=<h1,h2,...>&moves=<n>`
pub async fn run_handler(State(state): State<Arc<AppState>>, Query(query): Query<RunQuery>) -> impl IntoResponse {
    let ids: Vec<String> = query.submissions.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    if ids.len() != state.player_count() {
        return (axum::http::StatusCode::UNPROCESSABLE_ENTITY, format!("expected {} submissions, got {}", state.player_count(), ids.len())).into_response();
    }

    match state.executor.run_match(&ids).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// `WS /ws/run`: the client opens a socket, sends one JSON object naming the
/// submissions to play, and receives the final result once the match
/// completes. There is no live per-turn bridging for a human player in this
/// boundary; that would require a second, browser-facing wire shape distinct
/// from the sandbox harness protocol and is out of scope here.
pub async fn ws_run_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_over_websocket(socket, state))
}

#[derive(Deserialize)]
struct WsRunRequest {
    submissions: Vec<String>,
}

async fn run_over_websocket(mut socket: axum::extract::ws::WebSocket, state: Arc<AppState>) {
    use axum::extract::ws::Message;

    let Some(Ok(Message::Text(text))) = socket.recv().await else {
        let _ = socket.send(Message::Text(r#"{"error":"expected an initial JSON request"}"#.to_string().into())).await;
        return;
    };
    let request: Result<WsRunRequest, _> = serde_json::from_str(&text);
    let ids = match request {
        Ok(r) if r.submissions.len() == state.player_count() => r.submissions,
        Ok(_) => {
            let _ = socket.send(Message::Text(format!(r#"{{"error":"expected {} submissions"}}"#, state.player_count()).into())).await;
            return;
        }
        Err(e) => {
            let _ = socket.send(Message::Text(format!(r#"{{"error":"invalid JSON: {e}"}}"#).into())).await;
            return;
        }
    };

    match state.executor.run_match(&ids).await {
        Ok(result) => {
            let payload = serde_json::json!({"type": "result", "data": result});
            let _ = socket.send(Message::Text(payload.to_string().into())).await;
        }
        Err(e) => {
            let _ = socket.send(Message::Text(format!(r#"{{"error":"{e}"}}"#).into())).await;
        }
    }
}

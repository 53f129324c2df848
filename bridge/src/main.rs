//! Network bridge (§4.7): terminates WebSocket connections at `/ws/:id` and relays frames 1:1
//! to that session's host socket. No SPA, no job workspace API — just the WebSocket relay
//! surface.

mod relay;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use ttyrelay_core::config::Config;
use ttyrelay_core::id::SessionId;
use ttyrelay_core::paths::socket_path;
use ttyrelay_core::token;

use relay::Access;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
}

#[derive(serde::Deserialize)]
struct WsQuery {
    /// Share token (§4.6); when present, the connection is downgraded to read-only and must
    /// verify against the process-wide secret before the host connection is attempted.
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ttyrelay_core::config::ensure_loaded();
    ttyrelay_core::paths::ensure_data_dirs(&config.data_root).context("preparing data directories")?;

    let port: u16 = std::env::var("TTYRELAY_BRIDGE_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(7880);

    let state = AppState {
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        .route("/ws/{id}", get(ws_handler))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    println!("[bridge] listening on http://{addr}");
    axum::serve(listener, app).await.context("serving bridge")?;
    Ok(())
}

async fn ws_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(session_id) = SessionId::parse(&id) else {
        return (axum::http::StatusCode::BAD_REQUEST, "invalid session id").into_response();
    };

    let access = match query.token {
        None => Access::ReadWrite,
        Some(ref tok) => {
            let secret = match hex::decode(&state.config.token_secret_hex) {
                Ok(s) => s,
                Err(_) => return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "bad server secret").into_response(),
            };
            let now = now_secs();
            match token::verify(&secret, tok, "cli", now) {
                Ok(claims) if claims.session_id == session_id => Access::ReadOnly,
                Ok(_) => return reject_auth(),
                Err(_) => return reject_auth(),
            }
        }
    };

    let sock_path = socket_path(&state.config.data_root, &session_id);
    ws.on_upgrade(move |socket| relay::relay(socket, sock_path, access))
}

/// Share-token auth failures are rejected before the host is ever contacted (§7: "auth/share
/// token invalid (at bridge): reject the connection with an auth-specific close; host is not
/// involved").
fn reject_auth() -> Response {
    (axum::http::StatusCode::UNAUTHORIZED, "invalid or expired share token").into_response()
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

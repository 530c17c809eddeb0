use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;

use ssolink::TransportSession;

#[derive(Clone)]
struct AppState {
    start_time: Instant,
    session: TransportSession,
    shutdown_tx: Arc<broadcast::Sender<()>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime: u64,
    pub state: String,
    pub pending: usize,
    pub uin: u64,
}

#[derive(Deserialize)]
struct RpcRequest {
    method: String,
    #[serde(default)]
    id: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: String,
    result: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<serde_json::Value>,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let conn = state.session.state();
    Json(HealthResponse {
        status: if conn.is_connected() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        state: conn.to_string(),
        pending: state.session.pending_len(),
        uin: state.session.identity().snapshot().await.uin,
    })
}

async fn rpc_handler(
    State(state): State<AppState>,
    Json(req): Json<RpcRequest>,
) -> Json<RpcResponse> {
    match req.method.as_str() {
        "shutdown" => {
            let _ = state.shutdown_tx.send(());
            Json(RpcResponse {
                jsonrpc: "2.0".to_string(),
                result: serde_json::json!({"status": "shutting_down"}),
                id: req.id,
            })
        }
        _ => Json(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: serde_json::json!({"error": "method_not_found"}),
            id: req.id,
        }),
    }
}

fn router(session: TransportSession) -> (Router, broadcast::Receiver<()>) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let state = AppState {
        start_time: Instant::now(),
        session,
        shutdown_tx: Arc::new(shutdown_tx),
    };
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/rpc", post(rpc_handler))
        .with_state(state);
    (app, shutdown_rx)
}

/// Start the health check HTTP server.
/// Returns a broadcast receiver that signals when shutdown is requested via RPC.
pub async fn start_health_server(
    port: u16,
    session: TransportSession,
) -> anyhow::Result<broadcast::Receiver<()>> {
    let (app, shutdown_rx) = router(session);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            anyhow::anyhow!("ssolink is already running (port {} in use)", port)
        } else {
            anyhow::anyhow!("Failed to bind port {}: {}", port, e)
        }
    })?;

    info!("Health server listening on http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(shutdown_rx)
}

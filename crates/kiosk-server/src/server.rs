//! HTTP/WebSocket surface: one upgrade endpoint for the fleet protocol and
//! a small status endpoint for monitoring.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use kiosk_core::ConnectionId;
use kiosk_waiver::WaiverRenderer;

use crate::connection;
use crate::coordinator::{Command, Coordinator, CoordinatorConfig};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    /// Per-connection outbound queue depth; a peer that cannot drain this
    /// fast starts losing frames rather than stalling the coordinator.
    pub max_send_queue: usize,
    pub storage_dir: PathBuf,
    pub presence_interval: Duration,
    pub resync_interval: Duration,
    pub callback_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let defaults = CoordinatorConfig::default();
        Self {
            port: 5000,
            max_send_queue: 256,
            storage_dir: defaults.storage_dir,
            presence_interval: defaults.presence_interval,
            resync_interval: defaults.resync_interval,
            callback_timeout: defaults.callback_timeout,
        }
    }
}

#[derive(Clone)]
struct AppState {
    commands: mpsc::Sender<Command>,
    max_send_queue: usize,
}

/// A running server. Dropping the handle aborts both tasks.
pub struct ServerHandle {
    pub addr: SocketAddr,
    server: tokio::task::JoinHandle<()>,
    coordinator: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Wait for the serve task to exit.
    pub async fn join(&mut self) {
        let _ = (&mut self.server).await;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.server.abort();
        self.coordinator.abort();
    }
}

/// Bind, spawn the coordinator, and start serving. Port 0 picks a free
/// port; the bound address is on the returned handle.
pub async fn start(
    config: ServerConfig,
    renderer: Arc<dyn WaiverRenderer>,
) -> anyhow::Result<ServerHandle> {
    let (commands, command_rx) = mpsc::channel(1024);
    let coordinator = Coordinator::new(
        CoordinatorConfig {
            presence_interval: config.presence_interval,
            resync_interval: config.resync_interval,
            callback_timeout: config.callback_timeout,
            storage_dir: config.storage_dir.clone(),
        },
        renderer,
        commands.clone(),
    );
    let coordinator = tokio::spawn(coordinator.run(command_rx));

    let state = AppState {
        commands,
        max_send_queue: config.max_send_queue,
    };
    let app = build_router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Coordinator listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Server exited");
        }
    });

    Ok(ServerHandle {
        addr,
        server,
        coordinator,
    })
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = ConnectionId::new();
    let (tx, rx) = mpsc::channel(state.max_send_queue);

    // The registry owns the only strong sender; the transport keeps a weak
    // one, so eviction closes the channel and tears the socket down.
    let out = tx.downgrade();
    if state
        .commands
        .send(Command::Connected {
            conn_id: conn_id.clone(),
            tx,
        })
        .await
        .is_err()
    {
        tracing::error!(conn_id = %conn_id, "Coordinator unavailable, closing socket");
        return;
    }

    connection::handle_ws_connection(socket, conn_id, rx, out, state.commands).await;
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (reply_tx, reply_rx) = oneshot::channel();
    let queried = state
        .commands
        .send(Command::Status { reply: reply_tx })
        .await;

    match (queried, reply_rx.await) {
        (Ok(()), Ok(status)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "tablets": status.tablets,
                "connections": status.connections,
                "admins": status.admins,
                "uptimeSecs": status.uptime_secs,
            })),
        ),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "unavailable" })),
        ),
    }
}

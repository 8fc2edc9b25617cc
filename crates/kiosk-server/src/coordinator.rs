use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use kiosk_core::{ConnectionId, Envelope, EnvelopeKind, ServerEvent, TabletName};
use kiosk_waiver::{RenderError, WaiverRenderer};

use crate::callbacks::CallbackTable;
use crate::registry::{BroadcastTarget, SessionRegistry};

/// Everything that can happen to the coordinator, funneled through one
/// channel. Transport tasks and spawned renderers never touch state
/// directly; they send commands.
pub enum Command {
    /// A new WebSocket finished its handshake; `tx` is its outbound queue.
    Connected {
        conn_id: ConnectionId,
        tx: mpsc::Sender<String>,
    },
    /// An event or callback envelope arrived from a peer.
    Inbound {
        conn_id: ConnectionId,
        envelope: Envelope,
    },
    /// The peer answered a presence ping.
    Pong { conn_id: ConnectionId },
    /// The socket closed, either end.
    Disconnected { conn_id: ConnectionId },
    /// A spawned waiver render finished; re-enters the event core.
    SignatureOutcome {
        conn_id: ConnectionId,
        tablet: TabletName,
        player_name: String,
        result: Result<PathBuf, RenderError>,
    },
    /// Point-in-time counters for the status endpoint.
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
}

#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub presence_interval: Duration,
    pub resync_interval: Duration,
    pub callback_timeout: Duration,
    pub storage_dir: PathBuf,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            presence_interval: Duration::from_secs(30),
            resync_interval: Duration::from_secs(10),
            callback_timeout: Duration::from_secs(10),
            storage_dir: PathBuf::from("waivers"),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub tablets: usize,
    pub connections: usize,
    pub admins: usize,
    pub uptime_secs: u64,
}

/// Single owner of all mutable coordination state. Runs as one task
/// consuming the command channel; no locks anywhere in the event path.
pub struct Coordinator {
    pub(crate) registry: SessionRegistry,
    pub(crate) callbacks: CallbackTable,
    pub(crate) renderer: Arc<dyn WaiverRenderer>,
    pub(crate) config: CoordinatorConfig,
    /// Handle back into our own queue, cloned into spawned render tasks.
    pub(crate) commands: mpsc::Sender<Command>,
    started_at: Instant,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        renderer: Arc<dyn WaiverRenderer>,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(),
            callbacks: CallbackTable::new(config.callback_timeout),
            renderer,
            config,
            commands,
            started_at: Instant::now(),
        }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut presence = tokio::time::interval(self.config.presence_interval);
        let mut resync = tokio::time::interval(self.config.resync_interval);
        let mut sweep = tokio::time::interval(Duration::from_secs(1));
        // Intervals fire immediately on creation; skip the initial ticks.
        presence.tick().await;
        resync.tick().await;
        sweep.tick().await;

        loop {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => {
                            tracing::info!("Command channel closed, coordinator stopping");
                            break;
                        }
                    }
                }
                _ = presence.tick() => self.presence_tick(),
                _ = resync.tick() => self.resync_tick(),
                _ = sweep.tick() => {
                    let expired = self.callbacks.sweep();
                    if expired > 0 {
                        tracing::debug!(expired, "Expired unanswered callbacks");
                    }
                }
            }
        }
    }

    pub(crate) async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Connected { conn_id, tx } => {
                tracing::info!(conn_id = %conn_id, "Connection opened");
                self.registry
                    .insert_connection(crate::connection::Connection::new(conn_id, tx));
            }
            Command::Inbound { conn_id, envelope } => match envelope.kind {
                EnvelopeKind::Event => {
                    crate::handlers::dispatch(self, &conn_id, envelope).await;
                }
                EnvelopeKind::Callback => {
                    let Some(id) = envelope.id else { return };
                    let data = envelope.data.unwrap_or(serde_json::Value::Null);
                    if !self.callbacks.resolve(&id, data) {
                        tracing::debug!(callback = %id, "Reply for unknown or expired callback");
                    }
                }
                // The transport answers pings and translates pongs; these
                // only arrive here if that ever changes.
                EnvelopeKind::Ping => {
                    self.registry.send_to(&conn_id, &Envelope::pong());
                }
                EnvelopeKind::Pong => {
                    if let Some(conn) = self.registry.connection_mut(&conn_id) {
                        conn.is_alive = true;
                    }
                }
            },
            Command::Pong { conn_id } => {
                if let Some(conn) = self.registry.connection_mut(&conn_id) {
                    conn.is_alive = true;
                }
            }
            Command::Disconnected { conn_id } => {
                self.drop_connection(&conn_id, "socket closed");
            }
            Command::SignatureOutcome {
                conn_id,
                tablet,
                player_name,
                result,
            } => {
                crate::handlers::signature_outcome(self, &conn_id, &tablet, player_name, result);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    /// One presence pass: peers that never answered the previous ping are
    /// presumed dead and evicted; everyone else gets a fresh ping with the
    /// liveness flag cleared.
    pub(crate) fn presence_tick(&mut self) {
        let ping = Envelope::ping();
        for conn_id in self.registry.connection_ids() {
            let Some(conn) = self.registry.connection_mut(&conn_id) else {
                continue;
            };
            if !conn.is_alive {
                tracing::warn!(conn_id = %conn_id, "No pong since last check, evicting connection");
                self.drop_connection(&conn_id, "liveness timeout");
                continue;
            }
            conn.is_alive = false;
            self.registry.send_to(&conn_id, &ping);
        }
    }

    /// Periodic admin resync: admins converge on the true fleet state even
    /// if an incremental update was lost.
    pub(crate) fn resync_tick(&mut self) {
        let envelope = ServerEvent::TabletsUpdate(self.registry.snapshot()).into_envelope();
        self.registry.broadcast(&envelope, BroadcastTarget::Admins);
    }

    /// Remove a connection and, if a tablet session flipped to
    /// disconnected, tell everyone. Dropping the outbound sender closes
    /// the writer task; a duplicate disconnect is a no-op.
    pub(crate) fn drop_connection(&mut self, conn_id: &ConnectionId, reason: &str) {
        if self.registry.connection(conn_id).is_none() {
            return;
        }
        tracing::info!(conn_id = %conn_id, reason, "Connection closed");
        if let Some(tablet) = self.registry.unbind(conn_id) {
            tracing::info!(tablet = %tablet, "Tablet disconnected, session retained");
            self.broadcast_snapshot();
        }
    }

    pub(crate) fn broadcast_snapshot(&self) {
        let envelope = ServerEvent::TabletsUpdate(self.registry.snapshot()).into_envelope();
        self.registry.broadcast(&envelope, BroadcastTarget::All);
    }

    pub(crate) fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            tablets: self.registry.connected_tablet_count(),
            connections: self.registry.connection_count(),
            admins: self.registry.admin_count(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

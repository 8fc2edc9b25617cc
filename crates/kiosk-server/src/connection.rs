use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use kiosk_core::{ConnectionId, Envelope, EnvelopeKind, TabletName};

use crate::coordinator::Command;

/// Classification of a connection. A connection starts unclassified and is
/// promoted exactly once; admin and tablet are mutually exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionRole {
    Unclassified,
    Admin,
    Tablet(TabletName),
}

impl ConnectionRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    pub fn is_tablet(&self) -> bool {
        matches!(self, Self::Tablet(_))
    }

    pub fn tablet_name(&self) -> Option<&TabletName> {
        match self {
            Self::Tablet(name) => Some(name),
            _ => None,
        }
    }
}

/// One live transport-level link, owned by the coordinator's connection
/// table. `is_alive` is the presence monitor's two-tick flag.
pub struct Connection {
    pub id: ConnectionId,
    pub tx: mpsc::Sender<String>,
    pub is_alive: bool,
    pub role: ConnectionRole,
}

impl Connection {
    pub fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            is_alive: true,
            role: ConnectionRole::Unclassified,
        }
    }
}

/// Pump one WebSocket: writer forwards coordinator-queued frames out,
/// reader parses inbound envelopes and hands them to the coordinator.
///
/// Transport-level envelope handling lives here: malformed frames are
/// logged and dropped without closing the socket, and inbound pings are
/// answered with a pong immediately, before the coordinator sees anything.
///
/// The registry holds the only strong outbound sender; `out` is a weak
/// handle. When the coordinator evicts the connection the channel closes,
/// the writer exits, and the socket is torn down: eviction terminates the
/// peer rather than merely forgetting it.
pub async fn handle_ws_connection(
    socket: WebSocket,
    conn_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    out: mpsc::WeakSender<String>,
    commands: mpsc::Sender<Command>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(WsMessage::Close(None)).await;
    });

    let reader_cid = conn_id.clone();
    let reader_commands = commands.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            let text = match msg {
                WsMessage::Text(text) => text.to_string(),
                WsMessage::Close(_) => break,
                _ => continue,
            };

            let envelope = match Envelope::parse(&text) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!(conn_id = %reader_cid, error = %e, "Dropping malformed envelope");
                    continue;
                }
            };

            match envelope.kind {
                EnvelopeKind::Ping => {
                    if let Some(out) = out.upgrade() {
                        let _ = out.try_send(Envelope::pong().to_json());
                    }
                }
                EnvelopeKind::Pong => {
                    let _ = reader_commands
                        .send(Command::Pong {
                            conn_id: reader_cid.clone(),
                        })
                        .await;
                }
                EnvelopeKind::Event | EnvelopeKind::Callback => {
                    let _ = reader_commands
                        .send(Command::Inbound {
                            conn_id: reader_cid.clone(),
                            envelope,
                        })
                        .await;
                }
            }
        }
    });

    // Either task ending means the connection is done; abort the survivor
    // so both socket halves drop and the transport actually closes.
    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    let _ = commands.send(Command::Disconnected { conn_id }).await;
}

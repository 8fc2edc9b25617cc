//! Application-event handlers. The coordinator's dispatch funnels every
//! inbound `event` envelope here; handlers mutate the registry, answer the
//! sender, and fan out state changes.

use std::path::PathBuf;
use std::sync::Arc;

use kiosk_core::{
    events::{GetTablets, PlayerSigned, RegisterTablet, SendPlayers, UpdateTabletStatus},
    CallbackId, ClientEvent, ConnectionId, Envelope, ServerEvent, TabletName, ValidationError,
};
use kiosk_waiver::{waiver_output_path, RenderError, WaiverRequest};

use crate::coordinator::{Command, Coordinator};

/// Route one event envelope. An `isAdmin` flag anywhere in the payload is
/// an advisory classification checked before typed parsing, so any event
/// can promote its connection. Unknown or malformed events are logged and
/// ignored; the connection stays open.
pub(crate) async fn dispatch(
    coordinator: &mut Coordinator,
    conn_id: &ConnectionId,
    envelope: Envelope,
) {
    let Some(name) = envelope.event.as_deref() else {
        return;
    };

    if let Some(data) = envelope.data.as_ref() {
        if data.get("isAdmin").and_then(|v| v.as_bool()) == Some(true) {
            coordinator.registry.mark_admin(conn_id);
        }
    }

    let event = match ClientEvent::parse(name, envelope.data.clone()) {
        Ok(event) => event,
        // A recognized event with an invalid payload is a validation
        // failure the sender can hear about; an unknown event is not.
        Err(e) if ClientEvent::is_known(name) => {
            tracing::warn!(conn_id = %conn_id, event = name, error = %e, "Invalid event payload");
            reply(
                coordinator,
                conn_id,
                envelope.id,
                serde_json::json!({
                    "success": false,
                    "message": format!("invalid {name} payload: {e}"),
                }),
            );
            return;
        }
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, event = name, error = %e, "Ignoring unrecognized event");
            return;
        }
    };

    let reply_id = envelope.id;
    match event {
        ClientEvent::RegisterTablet(payload) => {
            register_tablet(coordinator, conn_id, payload, reply_id);
        }
        ClientEvent::SendPlayers(payload) => {
            send_players(coordinator, conn_id, payload, reply_id);
        }
        ClientEvent::UpdateTabletStatus(payload) => {
            update_tablet_status(coordinator, conn_id, payload, reply_id);
        }
        ClientEvent::GetTablets(payload) => {
            get_tablets(coordinator, conn_id, payload, reply_id);
        }
        ClientEvent::PlayerSigned(payload) => {
            player_signed(coordinator, conn_id, payload);
        }
    }
}

fn reply(coordinator: &Coordinator, conn_id: &ConnectionId, id: Option<CallbackId>, data: serde_json::Value) {
    if let Some(id) = id {
        coordinator
            .registry
            .send_to(conn_id, &Envelope::callback(id, data));
    }
}

fn register_tablet(
    coordinator: &mut Coordinator,
    conn_id: &ConnectionId,
    payload: RegisterTablet,
    reply_id: Option<CallbackId>,
) {
    let name = payload.tablet_name;
    match coordinator.registry.register_tablet(conn_id, name.clone()) {
        Ok(()) => {
            let data = serde_json::json!({ "success": true, "tabletName": name });
            coordinator
                .registry
                .send_to(conn_id, &Envelope::event("register-tablet-response", data.clone()));
            reply(coordinator, conn_id, reply_id, data);
            coordinator.broadcast_snapshot();
        }
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, tablet = %name, kind = e.error_kind(), error = %e, "Tablet registration refused");
            let data = serde_json::json!({ "success": false, "message": e.to_string() });
            coordinator
                .registry
                .send_to(conn_id, &Envelope::event("register-tablet-response", data.clone()));
            reply(coordinator, conn_id, reply_id, data);
        }
    }
}

fn send_players(
    coordinator: &mut Coordinator,
    conn_id: &ConnectionId,
    payload: SendPlayers,
    reply_id: Option<CallbackId>,
) {
    let name = payload.tablet_name.clone();
    let error = match coordinator.registry.session(&name) {
        None => Some(ValidationError::UnknownTablet(name.to_string())),
        Some(session) if !session.connected => {
            Some(ValidationError::TabletOffline(name.to_string()))
        }
        Some(_) if coordinator.registry.bound_connection(&name).is_none() => {
            Some(ValidationError::TabletOffline(name.to_string()))
        }
        Some(_) => None,
    };
    if let Some(e) = error {
        tracing::warn!(conn_id = %conn_id, tablet = %name, kind = e.error_kind(), error = %e, "Cannot assign players");
        reply(
            coordinator,
            conn_id,
            reply_id,
            serde_json::json!({ "success": false, "message": e.to_string() }),
        );
        return;
    }

    let roster = payload.roster();
    let Some(target) = coordinator
        .registry
        .bound_connection(&name)
        .map(|c| c.id.clone())
    else {
        return;
    };
    if let Some(session) = coordinator.registry.session_mut(&name) {
        session.status = kiosk_core::TabletStatus::Busy;
        session.players = roster.clone();
    }

    // The assignment rides a callback id so an unresponsive tablet is
    // observable; the tablet's ack (or its absence) is only logged.
    let (ack_id, ack) = coordinator.callbacks.begin();
    let event = ServerEvent::PlayersAssigned {
        player_count: roster.len(),
        players: (!roster.is_empty()).then(|| roster.clone()),
        activity_type: payload.activity_type.clone(),
    };
    coordinator
        .registry
        .send_to(&target, &event.into_envelope_with_id(ack_id));
    let ack_tablet = name.clone();
    tokio::spawn(async move {
        match ack.await {
            Ok(_) => tracing::debug!(tablet = %ack_tablet, "Assignment acknowledged"),
            Err(_) => {
                tracing::warn!(tablet = %ack_tablet, "Assignment not acknowledged before timeout")
            }
        }
    });

    tracing::info!(tablet = %name, players = roster.len(), "Players assigned");
    reply(
        coordinator,
        conn_id,
        reply_id,
        serde_json::json!({ "success": true, "tabletName": name }),
    );
    coordinator.broadcast_snapshot();
}

fn update_tablet_status(
    coordinator: &mut Coordinator,
    conn_id: &ConnectionId,
    payload: UpdateTabletStatus,
    reply_id: Option<CallbackId>,
) {
    // Only a tablet may report status; the name defaults to its own.
    let bound = coordinator
        .registry
        .connection(conn_id)
        .and_then(|c| c.role.tablet_name().cloned());
    let name = match (&bound, payload.tablet_name) {
        (Some(_), Some(name)) => name,
        (Some(own), None) => own.clone(),
        (None, _) => {
            tracing::warn!(conn_id = %conn_id, error = %ValidationError::NotATablet, "Status update refused");
            reply(
                coordinator,
                conn_id,
                reply_id,
                serde_json::json!({ "success": false, "message": ValidationError::NotATablet.to_string() }),
            );
            return;
        }
    };

    match coordinator.registry.update_status(&name, payload.status) {
        Ok(()) => {
            tracing::info!(tablet = %name, status = ?payload.status, "Tablet status updated");
            reply(coordinator, conn_id, reply_id, serde_json::json!({ "success": true }));
            coordinator.broadcast_snapshot();
        }
        Err(e) => {
            tracing::warn!(conn_id = %conn_id, tablet = %name, error = %e, "Status update refused");
            reply(
                coordinator,
                conn_id,
                reply_id,
                serde_json::json!({ "success": false, "message": e.to_string() }),
            );
        }
    }
}

fn get_tablets(
    coordinator: &mut Coordinator,
    conn_id: &ConnectionId,
    _payload: GetTablets,
    reply_id: Option<CallbackId>,
) {
    let snapshot = coordinator.registry.snapshot();
    let data = serde_json::to_value(&snapshot).unwrap_or_else(|_| serde_json::json!([]));
    coordinator
        .registry
        .send_to(conn_id, &Envelope::event("tablets-update", data.clone()));
    reply(coordinator, conn_id, reply_id, data);
}

/// First phase of sign-off: validate the session and hand the document to
/// the renderer off-thread. The outcome re-enters the coordinator as a
/// `SignatureOutcome` command.
fn player_signed(coordinator: &mut Coordinator, conn_id: &ConnectionId, payload: PlayerSigned) {
    let bound = coordinator
        .registry
        .connection(conn_id)
        .and_then(|c| c.role.tablet_name().cloned());
    let name = match payload.tablet_name.or(bound) {
        Some(name) if coordinator.registry.session(&name).is_some() => name,
        Some(name) => {
            tracing::warn!(conn_id = %conn_id, tablet = %name, "Signature for unknown tablet");
            signature_reply(coordinator, conn_id, &payload.player_name, Some("unknown tablet"));
            return;
        }
        None => {
            tracing::warn!(conn_id = %conn_id, error = %ValidationError::NoBoundTablet, "Signature refused");
            signature_reply(
                coordinator,
                conn_id,
                &payload.player_name,
                Some(&ValidationError::NoBoundTablet.to_string()),
            );
            return;
        }
    };

    let request = WaiverRequest {
        player_name: payload.player_name.clone(),
        activity_type: payload.activity_type,
        signature_data: payload.signature_data,
        birthdate: payload.birthdate,
        output_path: waiver_output_path(&coordinator.config.storage_dir, &payload.player_name),
    };

    let renderer = Arc::clone(&coordinator.renderer);
    let commands = coordinator.commands.clone();
    let conn = conn_id.clone();
    tokio::spawn(async move {
        let result = renderer.render(request).await;
        let _ = commands
            .send(Command::SignatureOutcome {
                conn_id: conn,
                tablet: name,
                player_name: payload.player_name,
                result,
            })
            .await;
    });
}

fn signature_reply(
    coordinator: &Coordinator,
    conn_id: &ConnectionId,
    player_name: &str,
    error: Option<&str>,
) {
    let event = ServerEvent::SignatureConfirmed {
        player_name: player_name.to_owned(),
        success: error.is_none(),
        error: error.map(str::to_owned),
    };
    coordinator.registry.send_to(conn_id, &event.into_envelope());
}

/// Second phase of sign-off, back on the coordinator after rendering. Only
/// the originating connection hears the confirmation; the fleet sees the
/// roster change through the usual snapshot broadcast.
pub(crate) fn signature_outcome(
    coordinator: &mut Coordinator,
    conn_id: &ConnectionId,
    tablet: &TabletName,
    player_name: String,
    result: Result<PathBuf, RenderError>,
) {
    match result {
        Ok(path) => {
            tracing::info!(tablet = %tablet, player = %player_name, path = %path.display(), "Waiver rendered");
            signature_reply(coordinator, conn_id, &player_name, None);
            let changed = coordinator
                .registry
                .session_mut(tablet)
                .map(|s| s.confirm_signature(&player_name))
                .unwrap_or(false);
            if changed {
                coordinator.broadcast_snapshot();
            }
        }
        Err(e) => {
            tracing::warn!(tablet = %tablet, player = %player_name, error = %e, "Waiver rendering failed");
            signature_reply(coordinator, conn_id, &player_name, Some(&e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use crate::coordinator::CoordinatorConfig;
    use crate::testutil::MockRenderer;
    use kiosk_core::TabletStatus;

    struct Harness {
        coordinator: Coordinator,
        commands: mpsc::Receiver<Command>,
    }

    impl Harness {
        fn new(renderer: MockRenderer) -> Self {
            let (tx, rx) = mpsc::channel(64);
            Self {
                coordinator: Coordinator::new(CoordinatorConfig::default(), Arc::new(renderer), tx),
                commands: rx,
            }
        }

        async fn connect(&mut self) -> (ConnectionId, mpsc::Receiver<String>) {
            let conn_id = ConnectionId::new();
            let (tx, rx) = mpsc::channel(32);
            self.coordinator
                .handle(Command::Connected {
                    conn_id: conn_id.clone(),
                    tx,
                })
                .await;
            (conn_id, rx)
        }

        async fn event(&mut self, conn_id: &ConnectionId, name: &str, data: serde_json::Value) {
            self.coordinator
                .handle(Command::Inbound {
                    conn_id: conn_id.clone(),
                    envelope: Envelope::event(name, data),
                })
                .await;
        }

        /// Run the render outcome queued by a `player-signed` back through
        /// the coordinator, as the event loop would.
        async fn pump_signature(&mut self) {
            let cmd = self
                .commands
                .recv()
                .await
                .expect("expected a queued command");
            assert!(matches!(cmd, Command::SignatureOutcome { .. }));
            self.coordinator.handle(cmd).await;
        }
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(text) = rx.try_recv() {
            out.push(Envelope::parse(&text).unwrap());
        }
        out
    }

    fn find<'a>(frames: &'a [Envelope], event: &str) -> Option<&'a Envelope> {
        frames.iter().find(|e| e.event.as_deref() == Some(event))
    }

    #[tokio::test]
    async fn register_tablet_confirms_and_broadcasts() {
        let mut h = Harness::new(MockRenderer::ok());
        let (tablet, mut tablet_rx) = h.connect().await;
        let (admin, mut admin_rx) = h.connect().await;
        h.event(&admin, "get-tablets", serde_json::json!({"isAdmin": true}))
            .await;
        drain(&mut admin_rx);

        h.event(&tablet, "register-tablet", serde_json::json!({"tabletName": "Kiosk-1"}))
            .await;

        let frames = drain(&mut tablet_rx);
        let response = find(&frames, "register-tablet-response").unwrap();
        assert_eq!(response.data.as_ref().unwrap()["success"], true);
        assert_eq!(response.data.as_ref().unwrap()["tabletName"], "Kiosk-1");

        let frames = drain(&mut admin_rx);
        let update = find(&frames, "tablets-update").unwrap();
        assert_eq!(update.data.as_ref().unwrap()[0]["name"], "Kiosk-1");
        assert_eq!(update.data.as_ref().unwrap()[0]["status"], "available");
    }

    #[tokio::test]
    async fn admin_connection_cannot_register_as_tablet() {
        let mut h = Harness::new(MockRenderer::ok());
        let (conn, mut rx) = h.connect().await;
        h.event(&conn, "get-tablets", serde_json::json!({"isAdmin": true}))
            .await;
        drain(&mut rx);

        h.event(&conn, "register-tablet", serde_json::json!({"tabletName": "Kiosk-1"}))
            .await;

        let frames = drain(&mut rx);
        let response = find(&frames, "register-tablet-response").unwrap();
        assert_eq!(response.data.as_ref().unwrap()["success"], false);
        assert!(h.coordinator.registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn reconnect_under_same_name_restores_state() {
        let mut h = Harness::new(MockRenderer::ok());
        let (first, _rx1) = h.connect().await;
        h.event(&first, "register-tablet", serde_json::json!({"tabletName": "Kiosk-1"}))
            .await;
        h.event(
            &first,
            "update-tablet-status",
            serde_json::json!({"status": "busy"}),
        )
        .await;
        h.coordinator
            .handle(Command::Disconnected { conn_id: first })
            .await;
        assert!(h.coordinator.registry.snapshot().is_empty());

        let (second, mut rx2) = h.connect().await;
        h.event(&second, "register-tablet", serde_json::json!({"tabletName": "Kiosk-1"}))
            .await;

        let frames = drain(&mut rx2);
        let update = find(&frames, "tablets-update").unwrap();
        assert_eq!(update.data.as_ref().unwrap()[0]["status"], "busy");
    }

    #[tokio::test]
    async fn get_tablets_on_fresh_server_returns_empty_list() {
        let mut h = Harness::new(MockRenderer::ok());
        let (conn, mut rx) = h.connect().await;
        h.event(&conn, "get-tablets", serde_json::json!({})).await;

        let frames = drain(&mut rx);
        let update = find(&frames, "tablets-update").unwrap();
        assert_eq!(update.data, Some(serde_json::json!([])));
    }

    #[tokio::test]
    async fn get_tablets_with_callback_id_also_replies_on_it() {
        let mut h = Harness::new(MockRenderer::ok());
        let (conn, mut rx) = h.connect().await;
        h.coordinator
            .handle(Command::Inbound {
                conn_id: conn.clone(),
                envelope: Envelope::event_with_id(
                    "get-tablets",
                    serde_json::json!({}),
                    CallbackId::from_raw("req_1"),
                ),
            })
            .await;

        let frames = drain(&mut rx);
        assert!(find(&frames, "tablets-update").is_some());
        let callback = frames
            .iter()
            .find(|e| e.kind == kiosk_core::EnvelopeKind::Callback)
            .unwrap();
        assert_eq!(callback.id.as_ref().unwrap().as_str(), "req_1");
        assert_eq!(callback.data, Some(serde_json::json!([])));
    }

    #[tokio::test]
    async fn send_players_delivers_one_assignment_to_the_tablet() {
        let mut h = Harness::new(MockRenderer::ok());
        let (tablet, mut tablet_rx) = h.connect().await;
        h.event(&tablet, "register-tablet", serde_json::json!({"tabletName": "Kiosk-1"}))
            .await;
        let (admin, mut admin_rx) = h.connect().await;
        h.event(&admin, "get-tablets", serde_json::json!({"isAdmin": true}))
            .await;
        drain(&mut tablet_rx);
        drain(&mut admin_rx);

        h.event(
            &admin,
            "send-players",
            serde_json::json!({"tabletName": "Kiosk-1", "playerCount": 3}),
        )
        .await;

        let frames = drain(&mut tablet_rx);
        let assignments: Vec<_> = frames
            .iter()
            .filter(|e| e.event.as_deref() == Some("players-assigned"))
            .collect();
        assert_eq!(assignments.len(), 1);
        let data = assignments[0].data.as_ref().unwrap();
        assert_eq!(data["playerCount"], 3);
        assert_eq!(data["players"][0], "Player 1");
        assert!(assignments[0].id.is_some());

        // Admins never get the assignment, only the state change.
        let frames = drain(&mut admin_rx);
        assert!(find(&frames, "players-assigned").is_none());
        let update = find(&frames, "tablets-update").unwrap();
        assert_eq!(update.data.as_ref().unwrap()[0]["status"], "busy");
    }

    #[tokio::test]
    async fn send_players_to_offline_tablet_fails_the_callback() {
        let mut h = Harness::new(MockRenderer::ok());
        let (tablet, _tablet_rx) = h.connect().await;
        h.event(&tablet, "register-tablet", serde_json::json!({"tabletName": "Kiosk-1"}))
            .await;
        h.coordinator
            .handle(Command::Disconnected { conn_id: tablet })
            .await;

        let (admin, mut admin_rx) = h.connect().await;
        h.coordinator
            .handle(Command::Inbound {
                conn_id: admin.clone(),
                envelope: Envelope::event_with_id(
                    "send-players",
                    serde_json::json!({"tabletName": "Kiosk-1", "playerCount": 2, "isAdmin": true}),
                    CallbackId::from_raw("req_9"),
                ),
            })
            .await;

        let frames = drain(&mut admin_rx);
        let callback = frames
            .iter()
            .find(|e| e.kind == kiosk_core::EnvelopeKind::Callback)
            .unwrap();
        assert_eq!(callback.data.as_ref().unwrap()["success"], false);
        assert!(callback.data.as_ref().unwrap()["message"]
            .as_str()
            .unwrap()
            .contains("not connected"));
    }

    #[tokio::test]
    async fn send_players_to_unknown_tablet_fails_the_callback() {
        let mut h = Harness::new(MockRenderer::ok());
        let (admin, mut admin_rx) = h.connect().await;
        h.coordinator
            .handle(Command::Inbound {
                conn_id: admin.clone(),
                envelope: Envelope::event_with_id(
                    "send-players",
                    serde_json::json!({"tabletName": "Ghost", "players": ["Ana"]}),
                    CallbackId::from_raw("req_2"),
                ),
            })
            .await;

        let frames = drain(&mut admin_rx);
        let callback = frames
            .iter()
            .find(|e| e.kind == kiosk_core::EnvelopeKind::Callback)
            .unwrap();
        assert_eq!(callback.data.as_ref().unwrap()["success"], false);
    }

    #[tokio::test]
    async fn roster_shrinks_per_signature_until_available() {
        let mut h = Harness::new(MockRenderer::ok());
        let (tablet, mut tablet_rx) = h.connect().await;
        h.event(&tablet, "register-tablet", serde_json::json!({"tabletName": "Kiosk-1"}))
            .await;
        let (admin, _admin_rx) = h.connect().await;
        h.event(
            &admin,
            "send-players",
            serde_json::json!({"tabletName": "Kiosk-1", "players": ["Ana", "Bo"]}),
        )
        .await;
        drain(&mut tablet_rx);

        h.event(
            &tablet,
            "player-signed",
            serde_json::json!({
                "playerName": "Ana",
                "signatureData": "data:image/png;base64,aGk=",
            }),
        )
        .await;
        h.pump_signature().await;

        let frames = drain(&mut tablet_rx);
        let confirmed = find(&frames, "signature-confirmed").unwrap();
        assert_eq!(confirmed.data.as_ref().unwrap()["success"], true);
        let session = h.coordinator.registry.session(&"Kiosk-1".into()).unwrap();
        assert_eq!(session.players, vec!["Bo".to_string()]);
        assert_eq!(session.status, TabletStatus::Busy);

        h.event(
            &tablet,
            "player-signed",
            serde_json::json!({
                "playerName": "Bo",
                "signatureData": "data:image/png;base64,aGk=",
            }),
        )
        .await;
        h.pump_signature().await;

        let session = h.coordinator.registry.session(&"Kiosk-1".into()).unwrap();
        assert!(session.players.is_empty());
        assert_eq!(session.status, TabletStatus::Available);
    }

    #[tokio::test]
    async fn failed_render_confirms_failure_and_keeps_roster() {
        let mut h = Harness::new(MockRenderer::failing("bad signature pad data"));
        let (tablet, mut tablet_rx) = h.connect().await;
        h.event(&tablet, "register-tablet", serde_json::json!({"tabletName": "Kiosk-1"}))
            .await;
        let (admin, _admin_rx) = h.connect().await;
        h.event(
            &admin,
            "send-players",
            serde_json::json!({"tabletName": "Kiosk-1", "players": ["Ana"]}),
        )
        .await;
        drain(&mut tablet_rx);

        h.event(
            &tablet,
            "player-signed",
            serde_json::json!({
                "playerName": "Ana",
                "signatureData": "garbage",
            }),
        )
        .await;
        h.pump_signature().await;

        let frames = drain(&mut tablet_rx);
        let confirmed = find(&frames, "signature-confirmed").unwrap();
        let data = confirmed.data.as_ref().unwrap();
        assert_eq!(data["success"], false);
        assert!(data["error"].as_str().unwrap().contains("bad signature"));
        let session = h.coordinator.registry.session(&"Kiosk-1".into()).unwrap();
        assert_eq!(session.players, vec!["Ana".to_string()]);
    }

    #[tokio::test]
    async fn signature_without_bound_tablet_is_refused() {
        let mut h = Harness::new(MockRenderer::ok());
        let (conn, mut rx) = h.connect().await;
        h.event(
            &conn,
            "player-signed",
            serde_json::json!({
                "playerName": "Ana",
                "signatureData": "data:image/png;base64,aGk=",
            }),
        )
        .await;

        let frames = drain(&mut rx);
        let confirmed = find(&frames, "signature-confirmed").unwrap();
        assert_eq!(confirmed.data.as_ref().unwrap()["success"], false);
        // Renderer never invoked; nothing queued for the coordinator.
        assert!(h.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn status_update_without_tablet_name_or_binding_is_refused() {
        let mut h = Harness::new(MockRenderer::ok());
        let (conn, mut rx) = h.connect().await;
        h.coordinator
            .handle(Command::Inbound {
                conn_id: conn.clone(),
                envelope: Envelope::event_with_id(
                    "update-tablet-status",
                    serde_json::json!({"status": "busy"}),
                    CallbackId::from_raw("req_3"),
                ),
            })
            .await;

        let frames = drain(&mut rx);
        let callback = frames
            .iter()
            .find(|e| e.kind == kiosk_core::EnvelopeKind::Callback)
            .unwrap();
        assert_eq!(callback.data.as_ref().unwrap()["success"], false);
    }

    #[tokio::test]
    async fn unknown_event_is_ignored_and_connection_survives() {
        let mut h = Harness::new(MockRenderer::ok());
        let (conn, mut rx) = h.connect().await;
        h.event(&conn, "reboot-universe", serde_json::json!({"now": true}))
            .await;
        // Not even a supplied correlation id gets an answer.
        h.coordinator
            .handle(Command::Inbound {
                conn_id: conn.clone(),
                envelope: Envelope::event_with_id(
                    "reboot-universe",
                    serde_json::json!({}),
                    CallbackId::from_raw("req_5"),
                ),
            })
            .await;

        assert!(drain(&mut rx).is_empty());
        assert!(h.coordinator.registry.connection(&conn).is_some());

        // The connection still works afterwards.
        h.event(&conn, "get-tablets", serde_json::json!({})).await;
        assert!(find(&drain(&mut rx), "tablets-update").is_some());
    }

    #[tokio::test]
    async fn known_event_with_invalid_payload_fails_the_callback() {
        let mut h = Harness::new(MockRenderer::ok());
        let (admin, mut rx) = h.connect().await;
        // send-players without the required tabletName.
        h.coordinator
            .handle(Command::Inbound {
                conn_id: admin.clone(),
                envelope: Envelope::event_with_id(
                    "send-players",
                    serde_json::json!({"playerCount": 3, "isAdmin": true}),
                    CallbackId::from_raw("req_6"),
                ),
            })
            .await;

        let frames = drain(&mut rx);
        let callback = frames
            .iter()
            .find(|e| e.kind == kiosk_core::EnvelopeKind::Callback)
            .unwrap();
        assert_eq!(callback.id.as_ref().unwrap().as_str(), "req_6");
        let data = callback.data.as_ref().unwrap();
        assert_eq!(data["success"], false);
        assert!(data["message"].as_str().unwrap().contains("send-players"));
        assert!(h.coordinator.registry.connection(&admin).is_some());
    }

    #[tokio::test]
    async fn status_update_reverting_to_available_clears_roster_fleetwide() {
        let mut h = Harness::new(MockRenderer::ok());
        let (tablet, mut tablet_rx) = h.connect().await;
        h.event(&tablet, "register-tablet", serde_json::json!({"tabletName": "Kiosk-1"}))
            .await;
        let (admin, mut admin_rx) = h.connect().await;
        h.event(&admin, "get-tablets", serde_json::json!({"isAdmin": true}))
            .await;
        h.event(
            &admin,
            "send-players",
            serde_json::json!({"tabletName": "Kiosk-1", "players": ["Ana"]}),
        )
        .await;
        drain(&mut tablet_rx);
        drain(&mut admin_rx);

        h.event(
            &tablet,
            "update-tablet-status",
            serde_json::json!({"status": "available"}),
        )
        .await;

        let frames = drain(&mut admin_rx);
        let update = find(&frames, "tablets-update").unwrap();
        let data = update.data.as_ref().unwrap();
        assert_eq!(data[0]["status"], "available");
        assert_eq!(data[0]["players"], serde_json::json!([]));
    }
}

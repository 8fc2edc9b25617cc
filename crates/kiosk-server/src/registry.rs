use std::collections::HashMap;

use indexmap::IndexMap;

use kiosk_core::{
    ConnectionId, Envelope, TabletName, TabletSession, TabletStatus, ValidationError,
};

use crate::connection::{Connection, ConnectionRole};

/// Audience of a broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BroadcastTarget {
    All,
    Admins,
    Tablets,
}

/// Authoritative mapping of logical identity to connection and status.
///
/// Tablet sessions are keyed by name and survive reconnects; connections
/// are ephemeral and only ever referenced by id. Insertion order of the
/// session map is the snapshot order sent to clients.
#[derive(Default)]
pub struct SessionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    sessions: IndexMap<TabletName, TabletSession>,
    bindings: HashMap<TabletName, ConnectionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_connection(&mut self, conn: Connection) {
        self.connections.insert(conn.id.clone(), conn);
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connection_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().cloned().collect()
    }

    /// Bind a connection to a tablet name. Reconnecting under an existing
    /// name updates the session in place (roster and status preserved) and
    /// supersedes any previous binding.
    pub fn register_tablet(
        &mut self,
        conn_id: &ConnectionId,
        name: TabletName,
    ) -> Result<(), ValidationError> {
        if name.is_empty() {
            return Err(ValidationError::EmptyTabletName);
        }
        let conn = self
            .connections
            .get(conn_id)
            .ok_or(ValidationError::NotATablet)?;
        if conn.role.is_admin() {
            return Err(ValidationError::AdminConnection);
        }

        // A connection re-registering under a different name gives up the
        // old session; a new connection claiming a bound name supersedes
        // the previous binding.
        if let Some(previous) = conn.role.tablet_name().cloned() {
            if previous != name {
                self.release_binding(&previous, conn_id);
            }
        }
        if let Some(old_conn_id) = self.bindings.get(&name).cloned() {
            if old_conn_id != *conn_id {
                if let Some(old_conn) = self.connections.get_mut(&old_conn_id) {
                    tracing::info!(
                        conn_id = %old_conn_id,
                        tablet = %name,
                        "Binding superseded by a newer connection"
                    );
                    old_conn.role = ConnectionRole::Unclassified;
                }
            }
        }

        match self.sessions.get_mut(&name) {
            Some(session) => {
                session.connected = true;
                tracing::info!(tablet = %name, "Tablet reconnected, session preserved");
            }
            None => {
                self.sessions.insert(name.clone(), TabletSession::new(name.clone()));
                tracing::info!(tablet = %name, "Tablet registered");
            }
        }
        self.bindings.insert(name.clone(), conn_id.clone());
        if let Some(conn) = self.connections.get_mut(conn_id) {
            conn.role = ConnectionRole::Tablet(name);
        }
        Ok(())
    }

    /// Flag a connection as administrative. Idempotent; refused (logged)
    /// for tablet connections since the roles are mutually exclusive.
    pub fn mark_admin(&mut self, conn_id: &ConnectionId) -> bool {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return false;
        };
        match conn.role {
            ConnectionRole::Unclassified => {
                conn.role = ConnectionRole::Admin;
                tracing::info!(conn_id = %conn_id, "Connection flagged as admin");
                true
            }
            ConnectionRole::Admin => false,
            ConnectionRole::Tablet(_) => {
                tracing::warn!(conn_id = %conn_id, "Ignoring admin flag on a tablet connection");
                false
            }
        }
    }

    /// Update a session's lifecycle status. Reverting to available clears
    /// the roster, defending against stale state after a completed cycle.
    pub fn update_status(
        &mut self,
        name: &TabletName,
        status: TabletStatus,
    ) -> Result<(), ValidationError> {
        let session = self
            .sessions
            .get_mut(name)
            .ok_or_else(|| ValidationError::UnknownTablet(name.to_string()))?;
        session.status = status;
        if status == TabletStatus::Available {
            session.players.clear();
        }
        Ok(())
    }

    /// Remove a connection on close. A bound tablet session is retained,
    /// only marked disconnected; returns its name so the caller can
    /// broadcast the state change.
    pub fn unbind(&mut self, conn_id: &ConnectionId) -> Option<TabletName> {
        let conn = self.connections.remove(conn_id)?;
        match conn.role {
            ConnectionRole::Tablet(name) => {
                if self.release_binding(&name, conn_id) {
                    Some(name)
                } else {
                    // A newer connection took over the name; nothing to flip.
                    None
                }
            }
            ConnectionRole::Admin | ConnectionRole::Unclassified => None,
        }
    }

    /// Drop the name→connection mapping if it still points at `conn_id`
    /// and mark the session disconnected. Returns whether state changed.
    fn release_binding(&mut self, name: &TabletName, conn_id: &ConnectionId) -> bool {
        if self.bindings.get(name) != Some(conn_id) {
            return false;
        }
        self.bindings.remove(name);
        if let Some(session) = self.sessions.get_mut(name) {
            session.connected = false;
        }
        true
    }

    pub fn session(&self, name: &TabletName) -> Option<&TabletSession> {
        self.sessions.get(name)
    }

    pub fn session_mut(&mut self, name: &TabletName) -> Option<&mut TabletSession> {
        self.sessions.get_mut(name)
    }

    /// The connection currently bound to a tablet name, if any.
    pub fn bound_connection(&self, name: &TabletName) -> Option<&Connection> {
        let conn_id = self.bindings.get(name)?;
        self.connections.get(conn_id)
    }

    /// Connected sessions in registration order. Disconnected sessions are
    /// never exposed to clients.
    pub fn snapshot(&self) -> Vec<TabletSession> {
        self.sessions
            .values()
            .filter(|s| s.connected)
            .cloned()
            .collect()
    }

    /// Send to one connection. A closed or missing peer is a silent no-op;
    /// it may have gone away concurrently.
    pub fn send_to(&self, conn_id: &ConnectionId, envelope: &Envelope) {
        if let Some(conn) = self.connections.get(conn_id) {
            if conn.tx.try_send(envelope.to_json()).is_err() {
                tracing::trace!(conn_id = %conn_id, "Send to closed or saturated connection dropped");
            }
        }
    }

    /// Fan an event out to every open connection matching the target class.
    pub fn broadcast(&self, envelope: &Envelope, target: BroadcastTarget) {
        let json = envelope.to_json();
        for conn in self.connections.values() {
            let matches = match target {
                BroadcastTarget::All => true,
                BroadcastTarget::Admins => conn.role.is_admin(),
                BroadcastTarget::Tablets => conn.role.is_tablet(),
            };
            if matches {
                let _ = conn.tx.try_send(json.clone());
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn admin_count(&self) -> usize {
        self.connections.values().filter(|c| c.role.is_admin()).count()
    }

    pub fn connected_tablet_count(&self) -> usize {
        self.sessions.values().filter(|s| s.connected).count()
    }
}

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::ids::CallbackId;
use crate::session::{TabletName, TabletSession, TabletStatus};

/// Closed set of client-to-server events, dispatched by exhaustive match.
/// Adding an event is a compile-time-checked change; an unrecognized event
/// name fails to parse and is logged and ignored by the router.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    RegisterTablet(RegisterTablet),
    SendPlayers(SendPlayers),
    UpdateTabletStatus(UpdateTabletStatus),
    GetTablets(GetTablets),
    PlayerSigned(PlayerSigned),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterTablet {
    pub tablet_name: TabletName,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPlayers {
    pub tablet_name: TabletName,
    #[serde(default)]
    pub players: Option<Vec<String>>,
    #[serde(default)]
    pub player_count: Option<u32>,
    #[serde(default)]
    pub activity_type: Option<String>,
}

impl SendPlayers {
    /// The roster to assign: an explicit list wins; a bare count generates
    /// placeholder names so downstream sign-off logic is uniform.
    pub fn roster(&self) -> Vec<String> {
        match (&self.players, self.player_count) {
            (Some(players), _) if !players.is_empty() => players.clone(),
            (_, Some(count)) => (1..=count).map(|i| format!("Player {i}")).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTabletStatus {
    #[serde(default)]
    pub tablet_name: Option<TabletName>,
    pub status: TabletStatus,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GetTablets {}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSigned {
    #[serde(default)]
    pub tablet_name: Option<TabletName>,
    pub player_name: String,
    #[serde(default)]
    pub activity_type: Option<String>,
    pub signature_data: String,
    #[serde(default)]
    pub birthdate: Option<String>,
}

impl ClientEvent {
    /// Whether `event` names a recognized client event. Used to tell a
    /// known event with a bad payload apart from an unknown event.
    pub fn is_known(event: &str) -> bool {
        matches!(
            event,
            "register-tablet"
                | "send-players"
                | "update-tablet-status"
                | "get-tablets"
                | "player-signed"
        )
    }

    /// Parse an event name plus optional payload. Absent or null payloads
    /// normalize to `{}` so events like `get-tablets` need no body.
    pub fn parse(
        event: &str,
        data: Option<serde_json::Value>,
    ) -> Result<Self, serde_json::Error> {
        let data = match data {
            None | Some(serde_json::Value::Null) => serde_json::json!({}),
            Some(v) => v,
        };
        serde_json::from_value(serde_json::json!({ "event": event, "data": data }))
    }
}

/// Server-to-client events.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ServerEvent {
    TabletsUpdate(Vec<TabletSession>),
    #[serde(rename_all = "camelCase")]
    RegisterTabletResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        tablet_name: Option<TabletName>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PlayersAssigned {
        player_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        players: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        activity_type: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    SignatureConfirmed {
        player_name: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TabletsUpdate(_) => "tablets-update",
            Self::RegisterTabletResponse { .. } => "register-tablet-response",
            Self::PlayersAssigned { .. } => "players-assigned",
            Self::SignatureConfirmed { .. } => "signature-confirmed",
        }
    }

    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    pub fn into_envelope(self) -> Envelope {
        Envelope::event(self.name(), self.data())
    }

    pub fn into_envelope_with_id(self, id: CallbackId) -> Envelope {
        Envelope::event_with_id(self.name(), self.data(), id)
    }
}

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::ids::CallbackId;

/// Discriminant of a wire envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Event,
    Ping,
    Pong,
    Callback,
}

/// The unit exchanged over a persistent connection:
/// `{ "type": "event"|"ping"|"pong"|"callback", "event"?, "data"?, "id"? }`.
///
/// `event` names an application event when `type` is `event`; `id` is
/// present for callback-style round trips in either direction.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<CallbackId>,
}

impl Envelope {
    pub fn event(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: EnvelopeKind::Event,
            event: Some(name.into()),
            data: Some(data),
            id: None,
        }
    }

    pub fn event_with_id(
        name: impl Into<String>,
        data: serde_json::Value,
        id: CallbackId,
    ) -> Self {
        Self {
            id: Some(id),
            ..Self::event(name, data)
        }
    }

    pub fn ping() -> Self {
        Self {
            kind: EnvelopeKind::Ping,
            event: None,
            data: None,
            id: None,
        }
    }

    pub fn pong() -> Self {
        Self {
            kind: EnvelopeKind::Pong,
            event: None,
            data: None,
            id: None,
        }
    }

    pub fn callback(id: CallbackId, data: serde_json::Value) -> Self {
        Self {
            kind: EnvelopeKind::Callback,
            event: None,
            data: Some(data),
            id: Some(id),
        }
    }

    /// Parse one raw text frame. Enforces the structural invariants the
    /// serde derive cannot: events carry a name, callbacks carry an id.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        match envelope.kind {
            EnvelopeKind::Event if envelope.event.is_none() => {
                Err(ProtocolError::MissingEventName)
            }
            EnvelopeKind::Callback if envelope.id.is_none() => {
                Err(ProtocolError::MissingCallbackId)
            }
            _ => Ok(envelope),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{MarkerId, TriggerEvent};

/// Command verbs accepted on the inbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Empty the whole target registry.
    Reset,
    /// Remove one target; requires `aruco_id`.
    Clear,
}

/// Inbound message forms. Field names are the collaborator contract —
/// changing them requires coordinating with the upstream server, nothing
/// else in the bridge depends on them.
///
/// Accepted payloads:
/// - `{"aruco_id": 5, "data": "x"}` — upsert one target
/// - `{"aruco_ids": [1, 2], "data": {...}}` — upsert several targets
/// - `{"command": "clear", "aruco_id": 5}` — remove one target
/// - `{"command": "reset"}` — empty the registry
///
/// Untagged variants are tried in declaration order and ignore unknown
/// fields, so `Command` must come first: a clear payload also carries
/// `aruco_id` and would otherwise match `Set` and upsert the very target
/// the server asked to remove.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InboundMessage {
    Command {
        command: Command,
        #[serde(default)]
        aruco_id: Option<MarkerId>,
    },
    Set {
        aruco_id: MarkerId,
        #[serde(default)]
        data: Value,
    },
    SetBatch {
        aruco_ids: Vec<MarkerId>,
        #[serde(default)]
        data: Value,
    },
}

/// Parse one inbound text payload.
pub fn parse_inbound(text: &str) -> Result<InboundMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Outbound trigger confirmation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerMessage {
    pub event: &'static str,
    pub marker_id: MarkerId,
    pub data: Value,
    pub timestamp: f64,
}

impl From<&TriggerEvent> for TriggerMessage {
    fn from(event: &TriggerEvent) -> Self {
        Self {
            event: "marker_triggered",
            marker_id: event.marker_id,
            data: event.payload.clone(),
            timestamp: event.timestamp,
        }
    }
}

/// Serialise a trigger event for the wire.
pub fn encode_trigger(event: &TriggerEvent) -> String {
    // TriggerMessage contains no map keys that can fail to serialise
    serde_json::to_string(&TriggerMessage::from(event)).unwrap_or_default()
}

/// Acknowledgement sent back to the server after accepting a target,
/// telling it the bridge is ready to watch for that marker.
pub fn encode_ready_ack(id: MarkerId) -> String {
    serde_json::json!({
        "id": id,
        "data": { "id": id, "status": "ready" },
    })
    .to_string()
}

//! WebSocket message types for engine/client communication.
//!
//! Both directions are closed sums tagged by a `type` field. Inbound text is
//! parsed in two steps so transport errors map onto the wire error codes
//! (`invalid_json`, `missing_type`, `unknown_message_type`, `missing_action`)
//! instead of a single opaque parse failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::command::CommandResult;
use crate::deltas::{AoiAreas, AoiPlayer, Change, ZoneInfo};

// =============================================================================
// Client Messages (client → engine)
// =============================================================================

/// Messages from client to engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat; echoed as `pong`.
    Ping,
    /// GPS fix update; triggers an AOI send.
    UpdateLocation { lat: f64, lng: f64 },
    /// A player action, dispatched to a fast handler or the interpreter.
    /// Action-specific fields ride alongside `action`.
    Action {
        action: String,
        #[serde(flatten)]
        data: Map<String, Value>,
    },
}

/// A per-message transport failure, surfaced as an `error` message on the
/// same connection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct WireError {
    pub code: String,
    pub message: String,
}

impl WireError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl ClientMessage {
    /// Parse one inbound text frame.
    pub fn from_text(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| WireError::new("invalid_json", e.to_string()))?;
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Err(WireError::new("missing_type", "message has no type field"));
        };
        match kind {
            "ping" | "update_location" | "action" => {}
            other => {
                return Err(WireError::new(
                    "unknown_message_type",
                    format!("unknown message type: {other}"),
                ))
            }
        }
        if kind == "action" && value.get("action").and_then(Value::as_str).is_none() {
            return Err(WireError::new(
                "missing_action",
                "action message has no action field",
            ));
        }
        serde_json::from_value(value).map_err(|e| WireError::new("invalid_json", e.to_string()))
    }

    /// The full command object an `action` message carries (including the
    /// `action` field itself), for the dispatcher.
    pub fn command_data(action: &str, data: &Map<String, Value>) -> Value {
        let mut command = data.clone();
        command.insert("action".to_string(), Value::String(action.to_string()));
        Value::Object(command)
    }
}

// =============================================================================
// Server Messages (engine → client)
// =============================================================================

/// Messages from engine to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Welcome, sent immediately after authentication.
    Connected {
        connection_id: String,
        user_id: String,
        experience: String,
        server_time_ms: i64,
    },
    /// Heartbeat reply.
    Pong,
    /// Reply to `update_location`: the client-visible world projection.
    AreaOfInterest {
        timestamp: i64,
        snapshot_version: i64,
        zone: Option<ZoneInfo>,
        areas: AoiAreas,
        player: AoiPlayer,
    },
    /// Reply to `action`.
    ActionResponse {
        #[serde(flatten)]
        result: CommandResult,
    },
    /// Incremental state delta, pushed from the per-user subscription.
    WorldUpdate {
        version: String,
        experience: String,
        user_id: String,
        base_version: i64,
        snapshot_version: i64,
        changes: Vec<Change>,
        timestamp: i64,
    },
    /// A per-message failure; the connection stays open.
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ping_parses() {
        assert_eq!(
            ClientMessage::from_text(r#"{"type":"ping"}"#).expect("parse"),
            ClientMessage::Ping
        );
    }

    #[test]
    fn update_location_parses_coordinates() {
        let msg =
            ClientMessage::from_text(r#"{"type":"update_location","lat":37.9,"lng":-122.5}"#)
                .expect("parse");
        assert_eq!(
            msg,
            ClientMessage::UpdateLocation {
                lat: 37.9,
                lng: -122.5
            }
        );
    }

    #[test]
    fn action_keeps_extra_fields() {
        let msg = ClientMessage::from_text(
            r#"{"type":"action","action":"collect_item","instance_id":"bottle_mystery"}"#,
        )
        .expect("parse");
        let ClientMessage::Action { action, data } = msg else {
            panic!("expected action");
        };
        assert_eq!(action, "collect_item");
        assert_eq!(data["instance_id"], "bottle_mystery");
        let command = ClientMessage::command_data(&action, &data);
        assert_eq!(command["action"], "collect_item");
        assert_eq!(command["instance_id"], "bottle_mystery");
    }

    #[test]
    fn garbage_is_invalid_json() {
        let err = ClientMessage::from_text("{nope").expect_err("should fail");
        assert_eq!(err.code, "invalid_json");
    }

    #[test]
    fn missing_type_has_its_own_code() {
        let err = ClientMessage::from_text(r#"{"lat":1.0}"#).expect_err("should fail");
        assert_eq!(err.code, "missing_type");
    }

    #[test]
    fn unknown_type_has_its_own_code() {
        let err = ClientMessage::from_text(r#"{"type":"teleport"}"#).expect_err("should fail");
        assert_eq!(err.code, "unknown_message_type");
    }

    #[test]
    fn action_without_action_field_is_missing_action() {
        let err = ClientMessage::from_text(r#"{"type":"action"}"#).expect_err("should fail");
        assert_eq!(err.code, "missing_action");
    }

    #[test]
    fn world_update_wire_shape() {
        let msg = ServerMessage::WorldUpdate {
            version: crate::DELTA_VERSION.to_string(),
            experience: "wylding-woods".into(),
            user_id: "u1".into(),
            base_version: 10,
            snapshot_version: 11,
            changes: vec![],
            timestamp: 1_700_000_000_000,
        };
        let wire = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(wire["type"], "world_update");
        assert_eq!(wire["version"], "0.4");
        assert_eq!(wire["base_version"], 10);
        assert_eq!(wire["snapshot_version"], 11);
    }

    #[test]
    fn action_response_flattens_result() {
        let msg = ServerMessage::ActionResponse {
            result: CommandResult::ok("You pick up the bottle."),
        };
        let wire = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(wire["type"], "action_response");
        assert_eq!(wire["success"], true);
        assert_eq!(wire["message_to_player"], "You pick up the bottle.");
    }

    #[test]
    fn failed_action_response_carries_error_object() {
        let msg = ServerMessage::ActionResponse {
            result: CommandResult::fail("item_not_found", "There is no ghost here."),
        };
        let wire = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(wire["type"], "action_response");
        assert_eq!(wire["success"], false);
        assert_eq!(wire["error"]["code"], "item_not_found");
    }

    #[test]
    fn aoi_reports_null_zone_explicitly() {
        let msg = ServerMessage::AreaOfInterest {
            timestamp: 0,
            snapshot_version: 1,
            zone: None,
            areas: AoiAreas::new(),
            player: AoiPlayer {
                current_location: None,
                current_area: None,
                inventory: vec![],
            },
        };
        let wire = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(wire["type"], "area_of_interest");
        assert_eq!(wire["zone"], json!(null));
        assert_eq!(wire["areas"], json!({}));
    }
}

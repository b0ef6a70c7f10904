//! Delta change lists and the area-of-interest payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Wire version of the delta envelope.
pub const DELTA_VERSION: &str = "0.4";

/// One entry in a delta's ordered change list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Change {
    /// An instance left a world list.
    Remove {
        area_id: Option<String>,
        instance_id: String,
    },
    /// An instance appeared; `path` is set (to `player.inventory`) when it
    /// entered the player's inventory rather than a world area.
    Add {
        area_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        /// Full template-merged payload.
        item: Value,
    },
    /// An instance's fields changed.
    Update {
        area_id: Option<String>,
        instance_id: String,
        item: Value,
    },
}

/// The zone block of an AOI: the matched top-level location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub gps: Value,
}

/// One area inside the AOI zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiArea {
    pub id: String,
    pub name: String,
    pub description: String,
    pub items: Vec<Value>,
    pub npcs: Vec<Value>,
}

/// The player block of an AOI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiPlayer {
    pub current_location: Option<String>,
    pub current_area: Option<String>,
    pub inventory: Vec<Value>,
}

/// Areas keyed by area id; `BTreeMap` keeps the wire order stable.
pub type AoiAreas = BTreeMap<String, AoiArea>;

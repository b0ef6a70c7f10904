//! Navigation helpers over world and player-view documents.
//!
//! Documents are `serde_json::Value` trees owned by the state manager; the
//! helpers here locate instances inside them and build the nested patch
//! sources that target those positions. Nothing in this module mutates a
//! document directly.

use serde_json::{json, Map, Value};

/// Which list inside a location an instance lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceList {
    /// The legacy `items` list directly on the location.
    LocationItems,
    /// `areas.<area_id>.items`.
    AreaItems(String),
    /// `areas.<area_id>.npcs`.
    AreaNpcs(String),
}

impl InstanceList {
    /// The `area_id` this list is published under in deltas (`None` for the
    /// legacy location-level list).
    pub fn area_id(&self) -> Option<&str> {
        match self {
            InstanceList::LocationItems => None,
            InstanceList::AreaItems(area) | InstanceList::AreaNpcs(area) => Some(area),
        }
    }

    /// Path segments from the location object down to the list.
    pub fn segments(&self) -> Vec<String> {
        match self {
            InstanceList::LocationItems => vec!["items".into()],
            InstanceList::AreaItems(area) => {
                vec!["areas".into(), area.clone(), "items".into()]
            }
            InstanceList::AreaNpcs(area) => {
                vec!["areas".into(), area.clone(), "npcs".into()]
            }
        }
    }
}

/// An instance found inside a location, with enough context to patch it.
#[derive(Debug, Clone)]
pub struct LocatedInstance {
    pub location_id: String,
    pub list: InstanceList,
    pub instance: Value,
}

/// The `instance_id` of an instance object, accepting the legacy `id` key.
pub fn instance_id(instance: &Value) -> Option<&str> {
    instance
        .get("instance_id")
        .or_else(|| instance.get("id"))
        .and_then(Value::as_str)
}

/// Search one location (legacy top-level list plus every area list) for an
/// item instance.
pub fn find_item_in_location(
    location_id: &str,
    location: &Value,
    wanted: &str,
) -> Option<LocatedInstance> {
    if let Some(items) = location.get("items").and_then(Value::as_array) {
        if let Some(instance) = items.iter().find(|i| instance_id(i) == Some(wanted)) {
            return Some(LocatedInstance {
                location_id: location_id.to_string(),
                list: InstanceList::LocationItems,
                instance: instance.clone(),
            });
        }
    }
    let areas = location.get("areas").and_then(Value::as_object)?;
    for (area_id, area) in areas {
        if let Some(items) = area.get("items").and_then(Value::as_array) {
            if let Some(instance) = items.iter().find(|i| instance_id(i) == Some(wanted)) {
                return Some(LocatedInstance {
                    location_id: location_id.to_string(),
                    list: InstanceList::AreaItems(area_id.clone()),
                    instance: instance.clone(),
                });
            }
        }
    }
    None
}

/// Search every location of a world document for an item instance.
pub fn find_item_in_world(world: &Value, wanted: &str) -> Option<LocatedInstance> {
    let locations = world.get("locations").and_then(Value::as_object)?;
    locations
        .iter()
        .find_map(|(id, location)| find_item_in_location(id, location, wanted))
}

/// Search area NPC lists across a world document for an NPC instance.
pub fn find_npc_in_areas(world: &Value, wanted: &str) -> Option<LocatedInstance> {
    let locations = world.get("locations").and_then(Value::as_object)?;
    for (location_id, location) in locations {
        let Some(areas) = location.get("areas").and_then(Value::as_object) else {
            continue;
        };
        for (area_id, area) in areas {
            if let Some(npcs) = area.get("npcs").and_then(Value::as_array) {
                if let Some(instance) = npcs.iter().find(|n| instance_id(n) == Some(wanted)) {
                    return Some(LocatedInstance {
                        location_id: location_id.clone(),
                        list: InstanceList::AreaNpcs(area_id.clone()),
                        instance: instance.clone(),
                    });
                }
            }
        }
    }
    None
}

/// Build a nested patch source that applies `leaf` at the given segments.
///
/// `nest(["locations", "woods", "items"], json!({"$append": …}))` produces
/// `{"locations": {"woods": {"items": {"$append": …}}}}`.
pub fn nest<I, S>(segments: I, leaf: Value) -> Value
where
    I: IntoIterator<Item = S>,
    I::IntoIter: DoubleEndedIterator,
    S: Into<String>,
{
    let mut value = leaf;
    for segment in segments.into_iter().rev() {
        let mut map = Map::new();
        map.insert(segment.into(), value);
        value = Value::Object(map);
    }
    value
}

/// Patch source targeting an instance list inside a location.
pub fn list_patch(location_id: &str, list: &InstanceList, operation: Value) -> Value {
    let mut segments = vec!["locations".to_string(), location_id.to_string()];
    segments.extend(list.segments());
    nest(segments, operation)
}

/// Patch source removing an instance from the player inventory.
pub fn inventory_remove(instance_id: &str) -> Value {
    json!({"player": {"inventory": {"$remove": {"instance_id": instance_id}}}})
}

/// Patch source appending an instance to the player inventory.
pub fn inventory_append(instance: Value) -> Value {
    json!({"player": {"inventory": {"$append": instance}}})
}

/// The player's current location id, if any.
pub fn current_location(view: &Value) -> Option<&str> {
    view.get("player")
        .and_then(|p| p.get("current_location"))
        .and_then(Value::as_str)
}

/// The player's current area id; `None` when the player is at the top level
/// of the location.
pub fn current_area(view: &Value) -> Option<&str> {
    view.get("player")
        .and_then(|p| p.get("current_area"))
        .and_then(Value::as_str)
}

/// The inventory list of a player view (empty slice view when absent).
pub fn inventory(view: &Value) -> &[Value] {
    view.get("player")
        .and_then(|p| p.get("inventory"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Resolve a dotted property path inside an entity object.
pub fn resolve_path<'v>(entity: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = entity;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Coerce an admin-supplied value string to the narrowest JSON scalar:
/// `true`/`false`/`null` literals, then integers, then floats, then a
/// (possibly quoted) string.
pub fn coerce_scalar(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw);
    Value::String(unquoted.to_string())
}

/// Validate an edit of `property` to the coerced `raw` value against the
/// entity's current leaf. The coerced type must match the existing leaf's
/// type exactly. Returns `(before, after)`.
pub fn typed_edit(
    entity: &Value,
    property: &str,
    raw: &str,
) -> Result<(Value, Value), crate::DomainError> {
    let Some(before) = resolve_path(entity, property) else {
        return Err(crate::DomainError::NoSuchProperty(property.to_string()));
    };
    let after = coerce_scalar(raw);
    let expected = crate::patch::type_name(before);
    let actual = crate::patch::type_name(&after);
    if expected != actual {
        return Err(crate::DomainError::TypeMismatch {
            property: property.to_string(),
            expected,
            actual,
        });
    }
    Ok((before.clone(), after))
}

/// Enumerate every leaf property of an entity as `(dotted_path, json_type)`.
///
/// Used by admin examine to report which properties are editable.
pub fn leaf_properties(entity: &Value) -> Vec<(String, &'static str)> {
    let mut out = Vec::new();
    collect_leaves(entity, &mut Vec::new(), &mut out);
    out
}

fn collect_leaves(value: &Value, path: &mut Vec<String>, out: &mut Vec<(String, &'static str)>) {
    match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                path.push(key.clone());
                collect_leaves(child, path, out);
                path.pop();
            }
        }
        // Lists are edited through $update, not leaf assignment.
        Value::Array(_) => {}
        leaf => out.push((path.join("."), crate::patch::type_name(leaf))),
    }
}

//! Instance normalization and template merging.
//!
//! Instances persist only their own state; immutable templates contribute
//! default fields at read time. Merging starts from the template's fields
//! and overlays the instance (instance wins), guaranteeing `instance_id`,
//! `template_id`, and a `state` sub-map on the way out. The same entry
//! point rewrites the legacy `id`/`type` keys to their modern names.

use serde_json::{Map, Value};

/// Rewrite legacy `id`/`type` keys to `instance_id`/`template_id`.
///
/// A missing `template_id` falls back to the `instance_id` (current content
/// frequently uses the same identifier for both).
pub fn normalize(instance: &Value) -> Value {
    let Value::Object(source) = instance else {
        return instance.clone();
    };
    let mut out = Map::new();
    for (key, value) in source {
        match key.as_str() {
            "id" if !source.contains_key("instance_id") => {
                out.insert("instance_id".to_string(), value.clone());
            }
            "type" if !source.contains_key("template_id") => {
                out.insert("template_id".to_string(), value.clone());
            }
            "id" | "type" => {}
            _ => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    if !out.contains_key("template_id") {
        if let Some(instance_id) = out.get("instance_id").cloned() {
            out.insert("template_id".to_string(), instance_id);
        }
    }
    Value::Object(out)
}

/// Merge template defaults under a normalized instance.
///
/// Template fields are copied first, instance fields overlay them (instance
/// wins on conflict, including nested `state` keys), and the result always
/// carries a `state` object. The operation is idempotent and preserves every
/// key present in the instance.
pub fn merge_template(template_fields: &Map<String, Value>, instance: &Value) -> Value {
    let normalized = normalize(instance);
    let Value::Object(instance_fields) = &normalized else {
        return normalized;
    };

    let mut merged = template_fields.clone();
    for (key, value) in instance_fields {
        match (merged.get_mut(key), value) {
            // Nested state maps combine, instance keys winning.
            (Some(Value::Object(defaults)), Value::Object(overlay)) => {
                for (k, v) in overlay {
                    defaults.insert(k.clone(), v.clone());
                }
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    ensure_state(&mut merged);
    Value::Object(merged)
}

/// Guarantee a `state` object on a merged instance.
pub fn ensure_state(fields: &mut Map<String, Value>) {
    match fields.get("state") {
        Some(Value::Object(_)) => {}
        _ => {
            fields.insert("state".to_string(), Value::Object(Map::new()));
        }
    }
}

/// Whether a merged instance should be shown to players.
///
/// Content sets the flag either at `state.visible` or directly on the
/// instance; absence means visible.
pub fn is_visible(merged: &Value) -> bool {
    let state_flag = merged
        .get("state")
        .and_then(|s| s.get("visible"))
        .and_then(Value::as_bool);
    let top_flag = merged.get("visible").and_then(Value::as_bool);
    state_flag.unwrap_or(true) && top_flag.unwrap_or(true)
}

/// Whether a merged instance can be collected.
pub fn is_collectible(merged: &Value) -> bool {
    merged
        .get("collectible")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// A display name for a merged instance: `semantic_name`, then `name`, then
/// the instance id.
pub fn display_name(merged: &Value) -> String {
    merged
        .get("semantic_name")
        .or_else(|| merged.get("name"))
        .and_then(Value::as_str)
        .or_else(|| crate::document::instance_id(merged))
        .unwrap_or("unknown")
        .to_string()
}

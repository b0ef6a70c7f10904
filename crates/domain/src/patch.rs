//! The merge-operator patch language.
//!
//! State updates are expressed as a typed tree rather than dotted-path
//! strings. Plain nested objects navigate into the target document; the
//! first operator key (`$append`, `$remove`, `$update`, `$set`) terminates
//! navigation and describes the mutation at that point. Any other
//! `$`-prefixed key is rejected at parse time.

use serde_json::{Map, Value};
use thiserror::Error;

/// One node of a parsed patch tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// Structural navigation: descend into the named children.
    Map(Vec<(String, Patch)>),
    /// Replace the target value (a non-object leaf in the patch source).
    Leaf(Value),
    /// `$append`: target must be a list; push the value.
    Append(Value),
    /// `$remove`: target is a list of objects; drop the first element whose
    /// `instance_id` matches the criteria object.
    Remove(Value),
    /// `$update`: target is a list of objects; for each entry, deep-merge
    /// the entry's remaining fields into the element with the matching
    /// `instance_id`.
    Update(Vec<Value>),
    /// `$set`: replace the target value entirely, object or not.
    Set(Value),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PatchError {
    #[error("unknown operator {operator} at {path}")]
    UnknownOperator { path: String, operator: String },
    #[error("malformed operator {operator} at {path}: {reason}")]
    MalformedOperator {
        path: String,
        operator: String,
        reason: String,
    },
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("no element with instance_id {instance_id} at {path}")]
    NoMatch { path: String, instance_id: String },
}

const OPERATORS: [&str; 4] = ["$append", "$remove", "$update", "$set"];

impl Patch {
    /// Parse a patch from its JSON representation.
    ///
    /// Objects containing an operator key become operator nodes; objects
    /// without one become navigation nodes; everything else is a leaf
    /// replacement.
    pub fn parse(source: &Value) -> Result<Patch, PatchError> {
        Self::parse_at(source, &mut Vec::new())
    }

    fn parse_at(source: &Value, path: &mut Vec<String>) -> Result<Patch, PatchError> {
        let obj = match source {
            Value::Object(obj) => obj,
            other => return Ok(Patch::Leaf(other.clone())),
        };

        if let Some((op, operand)) = obj.iter().find(|(k, _)| k.starts_with('$')) {
            if !OPERATORS.contains(&op.as_str()) {
                return Err(PatchError::UnknownOperator {
                    path: render_path(path),
                    operator: op.clone(),
                });
            }
            if obj.len() != 1 {
                return Err(PatchError::MalformedOperator {
                    path: render_path(path),
                    operator: op.clone(),
                    reason: "operator must be the only key in its object".into(),
                });
            }
            return Self::parse_operator(op, operand, path);
        }

        let mut children = Vec::with_capacity(obj.len());
        for (key, child) in obj {
            path.push(key.clone());
            children.push((key.clone(), Self::parse_at(child, path)?));
            path.pop();
        }
        Ok(Patch::Map(children))
    }

    fn parse_operator(op: &str, operand: &Value, path: &[String]) -> Result<Patch, PatchError> {
        match op {
            "$append" => Ok(Patch::Append(operand.clone())),
            "$set" => Ok(Patch::Set(operand.clone())),
            "$remove" => {
                if instance_id_of(operand).is_none() {
                    return Err(PatchError::MalformedOperator {
                        path: render_path(path),
                        operator: op.into(),
                        reason: "criteria must be an object with instance_id".into(),
                    });
                }
                Ok(Patch::Remove(operand.clone()))
            }
            "$update" => {
                let entries: Vec<Value> = match operand {
                    Value::Array(items) => items.clone(),
                    Value::Object(_) => vec![operand.clone()],
                    _ => {
                        return Err(PatchError::MalformedOperator {
                            path: render_path(path),
                            operator: op.into(),
                            reason: "expected an object or a list of objects".into(),
                        })
                    }
                };
                for entry in &entries {
                    if instance_id_of(entry).is_none() {
                        return Err(PatchError::MalformedOperator {
                            path: render_path(path),
                            operator: op.into(),
                            reason: "every entry must carry instance_id".into(),
                        });
                    }
                }
                Ok(Patch::Update(entries))
            }
            _ => Err(PatchError::UnknownOperator {
                path: render_path(path),
                operator: op.into(),
            }),
        }
    }

    /// Apply this patch to a document in place.
    ///
    /// Navigation creates missing intermediate objects (deep write); it
    /// fails if an existing value on the path is not an object. List
    /// operators fail if the target exists and is not a list, and
    /// `$remove`/`$update` fail with [`PatchError::NoMatch`] when no element
    /// carries the requested `instance_id`.
    pub fn apply(&self, target: &mut Value) -> Result<(), PatchError> {
        self.apply_at(target, &mut Vec::new())
    }

    fn apply_at(&self, target: &mut Value, path: &mut Vec<String>) -> Result<(), PatchError> {
        match self {
            Patch::Map(children) => {
                let obj = as_object_mut(target, path)?;
                for (key, child) in children {
                    path.push(key.clone());
                    match child {
                        // A leaf or $set never needs the current value.
                        Patch::Leaf(value) | Patch::Set(value) => {
                            obj.insert(key.clone(), value.clone());
                        }
                        _ => {
                            let slot = obj.entry(key.clone()).or_insert(Value::Null);
                            child.apply_at(slot, path)?;
                        }
                    }
                    path.pop();
                }
                Ok(())
            }
            Patch::Leaf(value) | Patch::Set(value) => {
                *target = value.clone();
                Ok(())
            }
            Patch::Append(value) => {
                let list = as_array_mut(target, path)?;
                list.push(value.clone());
                Ok(())
            }
            Patch::Remove(criteria) => {
                let wanted = require_instance_id(criteria, path, "$remove")?;
                let list = as_array_mut(target, path)?;
                let index = list
                    .iter()
                    .position(|element| instance_id_of(element) == Some(wanted));
                match index {
                    Some(index) => {
                        list.remove(index);
                        Ok(())
                    }
                    None => Err(PatchError::NoMatch {
                        path: render_path(path),
                        instance_id: wanted.to_string(),
                    }),
                }
            }
            Patch::Update(entries) => {
                for entry in entries {
                    let wanted = require_instance_id(entry, path, "$update")?;
                    let list = as_array_mut(target, path)?;
                    let element = list.iter_mut().find(|element| {
                        element.get("instance_id").and_then(Value::as_str) == Some(wanted)
                    });
                    let Some(element) = element else {
                        return Err(PatchError::NoMatch {
                            path: render_path(path),
                            instance_id: wanted.to_string(),
                        });
                    };
                    if let (Value::Object(into), Value::Object(fields)) = (element, entry) {
                        for (key, value) in fields {
                            if key == "instance_id" {
                                continue;
                            }
                            deep_merge_field(into, key, value);
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

/// Deep-merge one field into an object: objects merge recursively, anything
/// else replaces.
fn deep_merge_field(into: &mut Map<String, Value>, key: &str, value: &Value) {
    match (into.get_mut(key), value) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            for (k, v) in incoming {
                deep_merge_field(existing, k, v);
            }
        }
        _ => {
            into.insert(key.to_string(), value.clone());
        }
    }
}

fn instance_id_of(value: &Value) -> Option<&str> {
    value.get("instance_id").and_then(Value::as_str)
}

fn require_instance_id<'v>(
    value: &'v Value,
    path: &[String],
    operator: &str,
) -> Result<&'v str, PatchError> {
    instance_id_of(value).ok_or_else(|| PatchError::MalformedOperator {
        path: render_path(path),
        operator: operator.into(),
        reason: "criteria must carry instance_id".into(),
    })
}

fn as_object_mut<'t>(
    target: &'t mut Value,
    path: &[String],
) -> Result<&'t mut Map<String, Value>, PatchError> {
    if target.is_null() {
        *target = Value::Object(Map::new());
    }
    match target {
        Value::Object(obj) => Ok(obj),
        other => Err(PatchError::InvalidPath {
            path: render_path(path),
            reason: format!("expected an object, found {}", type_name(other)),
        }),
    }
}

fn as_array_mut<'t>(
    target: &'t mut Value,
    path: &[String],
) -> Result<&'t mut Vec<Value>, PatchError> {
    if target.is_null() {
        *target = Value::Array(Vec::new());
    }
    match target {
        Value::Array(list) => Ok(list),
        other => Err(PatchError::InvalidPath {
            path: render_path(path),
            reason: format!("expected a list, found {}", type_name(other)),
        }),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn render_path(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}

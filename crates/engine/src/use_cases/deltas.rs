//! Delta derivation.
//!
//! Converts an applied patch tree into the ordered change list of a v0.4
//! `world_update` message. Only instance-list operations produce changes;
//! scalar writes (say, `player.current_area`) advance the snapshot version
//! without an entry. `add` payloads carry the full template-merged
//! instance.

use std::sync::Arc;

use serde_json::{Map, Value};

use wayfinder_domain::Patch;
use wayfinder_shared::Change;

use super::templates::TemplateResolver;

/// Which document a patch applies to; list positions differ between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    World,
    PlayerView,
}

/// Where in the document an instance-list operation landed.
enum ListContext {
    /// A world list: `area_id` (None for the legacy location-level list)
    /// plus the template entity type.
    World {
        area_id: Option<String>,
        entity_type: &'static str,
    },
    /// The player's inventory.
    Inventory,
}

pub struct DeltaBuilder {
    resolver: Arc<TemplateResolver>,
}

impl DeltaBuilder {
    pub fn new(resolver: Arc<TemplateResolver>) -> Self {
        Self { resolver }
    }

    /// Derive the ordered change list of a patch.
    pub async fn changes(&self, experience: &str, doc: DocKind, patch: &Patch) -> Vec<Change> {
        let mut out = Vec::new();
        self.walk(experience, doc, patch, &mut Vec::new(), &mut out)
            .await;
        out
    }

    async fn walk(
        &self,
        experience: &str,
        doc: DocKind,
        patch: &Patch,
        path: &mut Vec<String>,
        out: &mut Vec<Change>,
    ) {
        match patch {
            Patch::Map(children) => {
                for (key, child) in children {
                    path.push(key.clone());
                    // Recursion through a Box keeps the future sized.
                    Box::pin(self.walk(experience, doc, child, path, out)).await;
                    path.pop();
                }
            }
            Patch::Append(value) => {
                let Some(context) = list_context(doc, path) else {
                    return;
                };
                match context {
                    ListContext::World {
                        area_id,
                        entity_type,
                    } => {
                        let item = self.resolver.merge(experience, entity_type, value).await;
                        out.push(Change::Add {
                            area_id,
                            path: None,
                            item,
                        });
                    }
                    ListContext::Inventory => {
                        let item = self.resolver.merge(experience, "items", value).await;
                        out.push(Change::Add {
                            area_id: None,
                            path: Some("player.inventory".to_string()),
                            item,
                        });
                    }
                }
            }
            Patch::Remove(criteria) => {
                let Some(context) = list_context(doc, path) else {
                    return;
                };
                let Some(instance_id) = criteria.get("instance_id").and_then(Value::as_str) else {
                    return;
                };
                let area_id = match context {
                    ListContext::World { area_id, .. } => area_id,
                    ListContext::Inventory => None,
                };
                out.push(Change::Remove {
                    area_id,
                    instance_id: instance_id.to_string(),
                });
            }
            Patch::Update(entries) => {
                let Some(context) = list_context(doc, path) else {
                    return;
                };
                let area_id = match context {
                    ListContext::World { area_id, .. } => area_id,
                    ListContext::Inventory => None,
                };
                for entry in entries {
                    let Some(instance_id) = entry.get("instance_id").and_then(Value::as_str)
                    else {
                        continue;
                    };
                    out.push(Change::Update {
                        area_id: area_id.clone(),
                        instance_id: instance_id.to_string(),
                        item: fields_without_instance_id(entry),
                    });
                }
            }
            // Whole-value writes carry no per-instance change entries.
            Patch::Leaf(_) | Patch::Set(_) => {}
        }
    }
}

fn list_context(doc: DocKind, path: &[String]) -> Option<ListContext> {
    let segments: Vec<&str> = path.iter().map(String::as_str).collect();
    match doc {
        DocKind::World => match segments.as_slice() {
            ["locations", _loc, "items"] => Some(ListContext::World {
                area_id: None,
                entity_type: "items",
            }),
            ["locations", _loc, "areas", area, "items"] => Some(ListContext::World {
                area_id: Some((*area).to_string()),
                entity_type: "items",
            }),
            ["locations", _loc, "areas", area, "npcs"] => Some(ListContext::World {
                area_id: Some((*area).to_string()),
                entity_type: "npcs",
            }),
            _ => None,
        },
        DocKind::PlayerView => match segments.as_slice() {
            ["player", "inventory"] => Some(ListContext::Inventory),
            _ => None,
        },
    }
}

fn fields_without_instance_id(entry: &Value) -> Value {
    let Value::Object(fields) = entry else {
        return entry.clone();
    };
    let filtered: Map<String, Value> = fields
        .iter()
        .filter(|(k, _)| k.as_str() != "instance_id")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{MockTemplateSource, TemplateError};
    use serde_json::json;

    fn builder() -> DeltaBuilder {
        let mut source = MockTemplateSource::new();
        source.expect_read_template().returning(|_, entity_type, template_id| {
            Err(TemplateError::NotFound {
                entity_type: entity_type.to_string(),
                template_id: template_id.to_string(),
            })
        });
        DeltaBuilder::new(Arc::new(TemplateResolver::new(Arc::new(source))))
    }

    #[tokio::test]
    async fn collect_patch_pair_yields_remove_then_add() {
        let builder = builder();

        let world_patch = Patch::parse(&json!({"locations": {"woods": {"areas":
            {"spawn_zone_1": {"items": {"$remove": {"instance_id": "bottle_mystery"}}}}}}}))
        .expect("parse");
        let view_patch = Patch::parse(&json!({"player": {"inventory":
            {"$append": {"instance_id": "bottle_mystery", "template_id": "bottle"}}}}))
        .expect("parse");

        let mut changes = builder
            .changes("wylding-woods", DocKind::World, &world_patch)
            .await;
        changes.extend(
            builder
                .changes("wylding-woods", DocKind::PlayerView, &view_patch)
                .await,
        );

        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes[0],
            Change::Remove {
                area_id: Some("spawn_zone_1".into()),
                instance_id: "bottle_mystery".into(),
            }
        );
        let Change::Add { area_id, path, item } = &changes[1] else {
            panic!("expected add");
        };
        assert_eq!(area_id, &None);
        assert_eq!(path.as_deref(), Some("player.inventory"));
        assert_eq!(item["instance_id"], "bottle_mystery");
        assert_eq!(item["state"], json!({}));
    }

    #[tokio::test]
    async fn legacy_location_list_has_null_area() {
        let builder = builder();
        let patch = Patch::parse(&json!({"locations": {"woods": {"items":
            {"$append": {"instance_id": "stick_oak"}}}}}))
        .expect("parse");

        let changes = builder.changes("wylding-woods", DocKind::World, &patch).await;
        assert_eq!(changes.len(), 1);
        let Change::Add { area_id, path, .. } = &changes[0] else {
            panic!("expected add");
        };
        assert_eq!(area_id, &None);
        assert!(path.is_none());
    }

    #[tokio::test]
    async fn update_strips_instance_id_from_item_fields() {
        let builder = builder();
        let patch = Patch::parse(&json!({"locations": {"woods": {"areas": {"spawn_zone_1":
            {"items": {"$update": [{"instance_id": "bottle_mystery", "visible": false}]}}}}}}))
        .expect("parse");

        let changes = builder.changes("wylding-woods", DocKind::World, &patch).await;
        assert_eq!(
            changes,
            vec![Change::Update {
                area_id: Some("spawn_zone_1".into()),
                instance_id: "bottle_mystery".into(),
                item: json!({"visible": false}),
            }]
        );
    }

    #[tokio::test]
    async fn scalar_writes_produce_no_changes() {
        let builder = builder();
        let patch =
            Patch::parse(&json!({"player": {"current_area": "counter"}})).expect("parse");
        let changes = builder
            .changes("wylding-woods", DocKind::PlayerView, &patch)
            .await;
        assert!(changes.is_empty());
    }
}

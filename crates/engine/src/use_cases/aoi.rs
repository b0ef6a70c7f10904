//! Area-of-interest building.
//!
//! Computes the bounded subset of world state visible to one player at a
//! GPS fix: the nearest zone anchor within the configured radius, its areas
//! with template-merged items and NPCs, and the player's own state. A fix
//! far from every anchor yields a null zone, not an error.
//!
//! The AOI is a pure read: its `snapshot_version` is the player view's
//! version at read time, so any delta published afterwards chains off the
//! value the client just saw.

use std::sync::Arc;

use serde_json::Value;

use wayfinder_domain::{geo, instance};
use wayfinder_shared::{AoiArea, AoiPlayer, ServerMessage, ZoneInfo};

use crate::infrastructure::ports::ClockPort;

use super::state::{StateError, StateManager};
use super::templates::TemplateResolver;

pub struct AoiBuilder {
    state: Arc<StateManager>,
    resolver: Arc<TemplateResolver>,
    clock: Arc<dyn ClockPort>,
    zone_radius_m: f64,
}

impl AoiBuilder {
    pub fn new(
        state: Arc<StateManager>,
        resolver: Arc<TemplateResolver>,
        clock: Arc<dyn ClockPort>,
        zone_radius_m: f64,
    ) -> Self {
        Self {
            state,
            resolver,
            clock,
            zone_radius_m,
        }
    }

    /// Build the AOI for one player at one GPS fix.
    pub async fn build(
        &self,
        experience: &str,
        user_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<ServerMessage, StateError> {
        let world = self.state.get_world_state(experience).await?;
        let view = self.state.get_player_view(experience, user_id).await?;
        let snapshot_version = view
            .get("snapshot_version")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let zone = nearest_zone(&world, lat, lng, self.zone_radius_m);
        let mut areas = wayfinder_shared::deltas::AoiAreas::new();
        let mut zone_info = None;

        if let Some((zone_id, location)) = zone {
            zone_info = Some(ZoneInfo {
                id: zone_id.clone(),
                name: str_field(location, "name"),
                description: str_field(location, "description"),
                gps: location.get("gps").cloned().unwrap_or(Value::Null),
            });

            if let Some(zone_areas) = location.get("areas").and_then(Value::as_object) {
                for (area_id, area) in zone_areas {
                    areas.insert(
                        area_id.clone(),
                        self.build_area(experience, area_id, area).await,
                    );
                }
            }
            tracing::debug!(
                experience = %experience,
                user_id = %user_id,
                zone = %zone_id,
                area_count = areas.len(),
                "AOI built"
            );
        } else {
            tracing::debug!(
                experience = %experience,
                user_id = %user_id,
                lat,
                lng,
                "No zone within radius"
            );
        }

        let mut inventory = Vec::new();
        for item in wayfinder_domain::document::inventory(&view) {
            inventory.push(self.resolver.merge(experience, "items", item).await);
        }

        Ok(ServerMessage::AreaOfInterest {
            timestamp: self.clock.now().timestamp_millis(),
            snapshot_version,
            zone: zone_info,
            areas,
            player: AoiPlayer {
                current_location: wayfinder_domain::document::current_location(&view)
                    .map(str::to_string),
                current_area: wayfinder_domain::document::current_area(&view)
                    .map(str::to_string),
                inventory,
            },
        })
    }

    async fn build_area(&self, experience: &str, area_id: &str, area: &Value) -> AoiArea {
        let mut items = Vec::new();
        for item in list_of(area, "items") {
            let merged = self.resolver.merge(experience, "items", item).await;
            // Hidden instances stay in the world document but never reach
            // the client projection.
            if instance::is_visible(&merged) {
                items.push(merged);
            }
        }
        let mut npcs = Vec::new();
        for npc in list_of(area, "npcs") {
            npcs.push(self.resolver.merge(experience, "npcs", npc).await);
        }
        AoiArea {
            id: area_id.to_string(),
            name: str_field(area, "name"),
            description: str_field(area, "description"),
            items,
            npcs,
        }
    }
}

/// The location whose GPS anchor is nearest the fix, within the radius.
fn nearest_zone(
    world: &Value,
    lat: f64,
    lng: f64,
    radius_m: f64,
) -> Option<(String, &Value)> {
    let locations = world.get("locations").and_then(Value::as_object)?;
    let entries: Vec<(&String, &Value)> = locations.iter().collect();
    let anchors: Vec<(f64, f64)> = entries
        .iter()
        .map(|(_, location)| {
            let gps = location.get("gps");
            (
                gps.and_then(|g| g.get("lat")).and_then(Value::as_f64).unwrap_or(f64::NAN),
                gps.and_then(|g| g.get("lng")).and_then(Value::as_f64).unwrap_or(f64::NAN),
            )
        })
        .collect();

    let (index, _) = geo::nearest_within(lat, lng, &anchors, radius_m)?;
    let (zone_id, location) = entries[index];
    Some((zone_id.clone(), location))
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn list_of<'v>(value: &'v Value, key: &str) -> &'v [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bus::InMemoryBus;
    use crate::infrastructure::ports::{
        DocRef, DocumentStore, MockClockPort, MockTemplateSource, RawTemplate, TemplateError,
    };
    use crate::infrastructure::store::FsDocumentStore;
    use crate::use_cases::deltas::DeltaBuilder;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    const EXP: &str = "wylding-woods";
    const ANCHOR: (f64, f64) = (37.906512, -122.544217);

    fn clock() -> Arc<MockClockPort> {
        let mut clock = MockClockPort::new();
        let time = Utc.timestamp_millis_opt(100_000).single().expect("valid");
        clock.expect_now().returning(move || time);
        Arc::new(clock)
    }

    fn resolver() -> Arc<TemplateResolver> {
        let mut source = MockTemplateSource::new();
        source.expect_read_template().returning(|_, entity_type, template_id| {
            if template_id == "bottle" {
                let Value::Object(frontmatter) = json!({
                    "semantic_name": "Mysterious Bottle",
                    "collectible": true
                }) else {
                    unreachable!()
                };
                Ok(RawTemplate {
                    frontmatter,
                    sections: vec![("Description".into(), "Sea-worn.".into())],
                })
            } else {
                Err(TemplateError::NotFound {
                    entity_type: entity_type.to_string(),
                    template_id: template_id.to_string(),
                })
            }
        });
        Arc::new(TemplateResolver::new(Arc::new(source)))
    }

    async fn builder_with_world(world: Value) -> (TempDir, AoiBuilder) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(FsDocumentStore::new(dir.path()));
        store
            .write(&DocRef::world(EXP), &world)
            .await
            .expect("seed world");
        let resolver = resolver();
        let state = Arc::new(StateManager::new(
            store,
            Arc::new(InMemoryBus::new()),
            clock(),
            DeltaBuilder::new(resolver.clone()),
        ));
        (dir, AoiBuilder::new(state, resolver, clock(), 500.0))
    }

    fn sample_world() -> Value {
        json!({
            "locations": {
                "woods": {
                    "name": "Wylding Woods",
                    "description": "Old trees.",
                    "gps": {"lat": ANCHOR.0, "lng": ANCHOR.1},
                    "areas": {
                        "spawn_zone_1": {
                            "name": "Mossy Clearing",
                            "description": "Soft ground.",
                            "items": [
                                {"instance_id": "bottle_mystery", "template_id": "bottle"},
                                {"instance_id": "hidden_coin", "visible": false}
                            ],
                            "npcs": [{"instance_id": "louisa"}]
                        }
                    }
                },
                "harbor": {
                    "name": "Harbor",
                    "description": "Salt air.",
                    "gps": {"lat": 37.86, "lng": -122.48},
                    "areas": {}
                }
            },
            "npcs": {},
            "metadata": {"_version": 10, "last_modified": "2026-01-01T00:00:00Z"}
        })
    }

    #[tokio::test]
    async fn nearby_fix_selects_the_zone_and_merges_items() {
        let (_dir, builder) = builder_with_world(sample_world()).await;
        let message = builder
            .build(EXP, "alice", ANCHOR.0 + 0.0005, ANCHOR.1)
            .await
            .expect("build");

        let ServerMessage::AreaOfInterest {
            zone,
            areas,
            player,
            snapshot_version,
            ..
        } = message
        else {
            panic!("expected AOI");
        };
        let zone = zone.expect("zone matched");
        assert_eq!(zone.id, "woods");
        assert_eq!(zone.name, "Wylding Woods");

        let area = areas.get("spawn_zone_1").expect("area present");
        // The hidden coin is filtered; the bottle arrives template-merged.
        assert_eq!(area.items.len(), 1);
        assert_eq!(area.items[0]["semantic_name"], "Mysterious Bottle");
        assert_eq!(area.npcs.len(), 1);

        assert!(player.inventory.is_empty());
        assert!(snapshot_version > 0);
    }

    #[tokio::test]
    async fn far_fix_yields_null_zone_with_player_intact() {
        let (_dir, builder) = builder_with_world(sample_world()).await;
        let message = builder
            .build(EXP, "alice", 40.0, -100.0)
            .await
            .expect("build");

        let ServerMessage::AreaOfInterest {
            zone,
            areas,
            player,
            snapshot_version,
            ..
        } = message
        else {
            panic!("expected AOI");
        };
        assert!(zone.is_none());
        assert!(areas.is_empty());
        assert!(player.inventory.is_empty());
        assert!(snapshot_version > 0);
    }

    #[tokio::test]
    async fn snapshot_version_equals_view_version_at_read_time() {
        let (_dir, builder) = builder_with_world(sample_world()).await;
        let view = builder
            .state
            .get_player_view(EXP, "alice")
            .await
            .expect("bootstrap");

        let message = builder
            .build(EXP, "alice", ANCHOR.0, ANCHOR.1)
            .await
            .expect("build");
        let ServerMessage::AreaOfInterest { snapshot_version, .. } = message else {
            panic!("expected AOI");
        };
        assert_eq!(Some(snapshot_version), view["snapshot_version"].as_i64());
    }

    #[tokio::test]
    async fn inventory_items_come_back_merged() {
        let (_dir, builder) = builder_with_world(sample_world()).await;
        builder
            .state
            .update_player_view(
                EXP,
                "alice",
                &wayfinder_domain::Patch::parse(&json!({"player": {"inventory":
                    {"$append": {"instance_id": "bottle_mystery", "template_id": "bottle"}}}}))
                .expect("parse"),
            )
            .await
            .expect("seed inventory");

        let message = builder
            .build(EXP, "alice", ANCHOR.0, ANCHOR.1)
            .await
            .expect("build");
        let ServerMessage::AreaOfInterest { player, .. } = message else {
            panic!("expected AOI");
        };
        assert_eq!(player.inventory[0]["semantic_name"], "Mysterious Bottle");
    }
}

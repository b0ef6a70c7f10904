//! Admin commands: `@reset`, `@examine`, `@edit`, `@where`,
//! `@flush_templates`.
//!
//! Admin actions are whitespace-tokenized command lines carried in the
//! `action` string itself (`@edit item bottle_mystery visible false`). They
//! route fast-path only and never touch the interpreter.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use wayfinder_domain::{document, DomainError, Patch};
use wayfinder_shared::CommandResult;

use crate::use_cases::dispatch::CommandContext;
use crate::use_cases::state::{StateError, StateManager};
use crate::use_cases::templates::TemplateResolver;

const COMMANDS: [&str; 5] = ["@reset", "@examine", "@edit", "@where", "@flush_templates"];

/// Where an entity sits in the world document, which decides how an edit
/// patch targets it.
enum EntityRef {
    /// Inside an instance list; edited through a nested `$update`.
    Listed(document::LocatedInstance),
    /// At a keyed map position (`npcs.<id>`, `locations.<id>`); edited
    /// through structural navigation.
    Keyed { path: Vec<String>, entity: Value },
}

impl EntityRef {
    fn entity(&self) -> &Value {
        match self {
            EntityRef::Listed(found) => &found.instance,
            EntityRef::Keyed { entity, .. } => entity,
        }
    }

    fn world_path(&self) -> String {
        match self {
            EntityRef::Listed(found) => {
                let mut segments = vec!["locations".to_string(), found.location_id.clone()];
                segments.extend(found.list.segments());
                segments.join(".")
            }
            EntityRef::Keyed { path, .. } => path.join("."),
        }
    }
}

pub struct AdminRouter {
    state: Arc<StateManager>,
    resolver: Arc<TemplateResolver>,
}

impl AdminRouter {
    pub fn new(state: Arc<StateManager>, resolver: Arc<TemplateResolver>) -> Self {
        Self { state, resolver }
    }

    pub async fn handle(&self, ctx: &CommandContext) -> CommandResult {
        let Some(line) = ctx.field("action") else {
            return CommandResult::fail("missing_action", "Command has no action");
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens.first().copied() {
            Some("@reset") => self.reset(ctx, &tokens).await,
            Some("@examine") => self.examine(ctx, &tokens).await,
            Some("@edit") => self.edit(ctx, &tokens).await,
            Some("@where") => self.where_am_i(ctx).await,
            Some("@flush_templates") => self.flush_templates(),
            _ => CommandResult::fail_with_hint(
                "unknown_admin_command",
                format!("Unknown admin command: {}", tokens.first().unwrap_or(&"")),
                "available_commands",
                json!(COMMANDS),
            ),
        }
    }

    // =========================================================================
    // @reset <experience|world> CONFIRM
    // =========================================================================

    async fn reset(&self, ctx: &CommandContext, tokens: &[&str]) -> CommandResult {
        let scope = tokens.get(1).copied().unwrap_or("");
        if scope != "experience" && scope != "world" {
            return CommandResult::fail(
                "invalid_reset_scope",
                "Usage: @reset <experience|world> CONFIRM",
            );
        }
        if tokens.get(2).copied() != Some("CONFIRM") {
            return CommandResult::fail(
                "confirm_required",
                format!("This is destructive. Repeat as: @reset {scope} CONFIRM"),
            );
        }

        let outcome = if scope == "experience" {
            self.state.reset_experience(&ctx.experience).await
        } else {
            self.state.reset_world(&ctx.experience).await
        };
        match outcome {
            Ok(outcome) => {
                let message = if scope == "experience" {
                    format!(
                        "Experience reset. Backup: {}. Player views cleared: {}.",
                        outcome.backup, outcome.views_cleared
                    )
                } else {
                    format!(
                        "World reset (player views kept; collected items may duplicate). Backup: {}.",
                        outcome.backup
                    )
                };
                CommandResult::ok(message).with_metadata(json!({
                    "backup": outcome.backup,
                    "views_cleared": outcome.views_cleared,
                    "new_version": outcome.new_version,
                }))
            }
            Err(StateError::NotFound(experience)) => CommandResult::fail(
                "experience_not_found",
                format!("No such experience: {experience}"),
            ),
            Err(e) => admin_failure(e),
        }
    }

    // =========================================================================
    // @examine <type> <id>
    // =========================================================================

    async fn examine(&self, ctx: &CommandContext, tokens: &[&str]) -> CommandResult {
        let (Some(entity_type), Some(id)) = (tokens.get(1).copied(), tokens.get(2).copied())
        else {
            return CommandResult::fail("invalid_arguments", "Usage: @examine <type> <id>");
        };

        let world = match self.state.get_world_state(&ctx.experience).await {
            Ok(world) => world,
            Err(e) => return admin_failure(e),
        };
        let Some(entity) = locate(&world, entity_type, id) else {
            return CommandResult::fail(
                "entity_not_found",
                format!("No {entity_type} named {id}."),
            );
        };

        let properties: Vec<Value> = document::leaf_properties(entity.entity())
            .into_iter()
            .map(|(path, kind)| json!({"path": path, "type": kind}))
            .collect();

        CommandResult::ok(format!("{entity_type} {id} at {}", entity.world_path()))
            .with_metadata(json!({
                "entity": entity.entity(),
                "world_path": entity.world_path(),
                "editable_properties": properties,
            }))
    }

    // =========================================================================
    // @edit <type> <id> <property-path> <value>
    // =========================================================================

    async fn edit(&self, ctx: &CommandContext, tokens: &[&str]) -> CommandResult {
        let (Some(entity_type), Some(id), Some(property)) = (
            tokens.get(1).copied(),
            tokens.get(2).copied(),
            tokens.get(3).copied(),
        ) else {
            return CommandResult::fail(
                "invalid_arguments",
                "Usage: @edit <type> <id> <property-path> <value>",
            );
        };
        if tokens.len() < 5 {
            return CommandResult::fail(
                "invalid_arguments",
                "Usage: @edit <type> <id> <property-path> <value>",
            );
        }
        let raw_value = tokens[4..].join(" ");

        let world = match self.state.get_world_state(&ctx.experience).await {
            Ok(world) => world,
            Err(e) => return admin_failure(e),
        };
        let Some(entity) = locate(&world, entity_type, id) else {
            return CommandResult::fail(
                "entity_not_found",
                format!("No {entity_type} named {id}."),
            );
        };

        let (before, after) = match document::typed_edit(entity.entity(), property, &raw_value)
        {
            Ok(pair) => pair,
            Err(DomainError::NoSuchProperty(_)) => {
                let properties: Vec<String> = document::leaf_properties(entity.entity())
                    .into_iter()
                    .map(|(path, _)| path)
                    .collect();
                return CommandResult::fail_with_hint(
                    "invalid_property",
                    format!("{entity_type} {id} has no property {property}."),
                    "editable_properties",
                    json!(properties),
                );
            }
            Err(e) => return CommandResult::fail("type_mismatch", e.to_string()),
        };

        let source = match &entity {
            EntityRef::Listed(found) => {
                let mut entry = nested_fields(property, after.clone());
                entry.insert("instance_id".to_string(), json!(id));
                document::list_patch(
                    &found.location_id,
                    &found.list,
                    json!({"$update": [Value::Object(entry)]}),
                )
            }
            EntityRef::Keyed { path, .. } => {
                let mut segments = path.clone();
                segments.extend(property.split('.').map(str::to_string));
                document::nest(segments, after.clone())
            }
        };
        let patch = match Patch::parse(&source) {
            Ok(patch) => patch,
            Err(e) => return CommandResult::fail("malformed_update", e.to_string()),
        };

        let outcome = match self
            .state
            .update_world_state(&ctx.experience, &patch, Some(&ctx.user_id))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return admin_failure(e),
        };

        tracing::info!(
            user_id = %ctx.user_id,
            experience = %ctx.experience,
            world_path = %entity.world_path(),
            property = %property,
            "Admin edit applied"
        );
        CommandResult::ok(format!("{property}: {before} -> {after}"))
            .with_state_changes(source)
            .with_metadata(json!({
                "world_path": entity.world_path(),
                "property": property,
                "before": before,
                "after": after,
                "snapshot_version": outcome.new_version,
            }))
    }

    // =========================================================================
    // @where
    // =========================================================================

    async fn where_am_i(&self, ctx: &CommandContext) -> CommandResult {
        let view = match self.state.get_player_view(&ctx.experience, &ctx.user_id).await {
            Ok(view) => view,
            Err(e) => return admin_failure(e),
        };
        let Some(location_id) = document::current_location(&view).map(str::to_string) else {
            return CommandResult::fail("no_location", "You are not anywhere yet.");
        };
        let current_area = document::current_area(&view).map(str::to_string);

        let world = match self.state.get_world_state(&ctx.experience).await {
            Ok(world) => world,
            Err(e) => return admin_failure(e),
        };
        let Some(location) = world
            .get("locations")
            .and_then(|l| l.get(location_id.as_str()))
        else {
            return CommandResult::fail("no_location", "Your location no longer exists.");
        };

        // Admin sight: the current area's full listing, hidden items
        // included.
        let areas = location.get("areas").and_then(Value::as_object);
        let (scope, neighbors) = match (&current_area, areas) {
            (Some(area_id), Some(areas)) => {
                let scope = areas.get(area_id.as_str());
                let mut neighbors: Vec<String> = areas
                    .keys()
                    .filter(|k| *k != area_id)
                    .cloned()
                    .collect();
                if let Some(connections) = scope
                    .and_then(|a| a.get("connections"))
                    .and_then(Value::as_object)
                {
                    neighbors.extend(connections.iter().map(|(dir, to)| {
                        format!("{dir} -> {}", to.as_str().unwrap_or("?"))
                    }));
                }
                (scope.unwrap_or(location), neighbors)
            }
            _ => (
                location,
                areas.map(|a| a.keys().cloned().collect()).unwrap_or_default(),
            ),
        };

        let mut items = Vec::new();
        for item in scope.get("items").and_then(Value::as_array).into_iter().flatten() {
            items.push(self.resolver.merge(&ctx.experience, "items", item).await);
        }
        let mut npcs = Vec::new();
        for npc in scope.get("npcs").and_then(Value::as_array).into_iter().flatten() {
            npcs.push(self.resolver.merge(&ctx.experience, "npcs", npc).await);
        }

        let area_note = current_area.as_deref().unwrap_or("(top level)");
        CommandResult::ok(format!(
            "You are in {location_id} / {area_note}: {} item(s), {} npc(s).",
            items.len(),
            npcs.len()
        ))
        .with_metadata(json!({
            "current_location": location_id,
            "current_area": current_area,
            "items": items,
            "npcs": npcs,
            "neighboring_areas": neighbors,
        }))
    }

    // =========================================================================
    // @flush_templates
    // =========================================================================

    fn flush_templates(&self) -> CommandResult {
        let evicted = self.resolver.flush();
        CommandResult::ok(format!("Template cache flushed ({evicted} entries)."))
            .with_metadata(json!({"evicted": evicted}))
    }
}

fn admin_failure(error: StateError) -> CommandResult {
    tracing::error!(error = %error, "Admin operation failed");
    CommandResult::fail("processing_error", "Something went wrong. Try again.")
}

/// Find an entity by type and id. Items are checked both at the location
/// top level and per-area.
fn locate(world: &Value, entity_type: &str, id: &str) -> Option<EntityRef> {
    match entity_type {
        "item" => document::find_item_in_world(world, id).map(EntityRef::Listed),
        "npc" => {
            if let Some(entity) = world.get("npcs").and_then(|n| n.get(id)) {
                return Some(EntityRef::Keyed {
                    path: vec!["npcs".to_string(), id.to_string()],
                    entity: entity.clone(),
                });
            }
            document::find_npc_in_areas(world, id).map(EntityRef::Listed)
        }
        "location" => world
            .get("locations")
            .and_then(|l| l.get(id))
            .map(|entity| EntityRef::Keyed {
                path: vec!["locations".to_string(), id.to_string()],
                entity: entity.clone(),
            }),
        _ => None,
    }
}

/// `"state.glowing"` + value -> `{"state": {"glowing": value}}`.
fn nested_fields(property: &str, value: Value) -> Map<String, Value> {
    let mut segments: Vec<&str> = property.split('.').collect();
    let last = segments.pop().unwrap_or(property);
    let mut current = Map::new();
    current.insert(last.to_string(), value);
    for segment in segments.into_iter().rev() {
        let mut outer = Map::new();
        outer.insert(segment.to_string(), Value::Object(current));
        current = outer;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::handlers::test_support::{harness, EXP};
    use crate::use_cases::state::user_subject;
    use crate::infrastructure::ports::BusPort;

    fn admin_ctx(line: &str) -> CommandContext {
        CommandContext {
            user_id: "ranger".to_string(),
            experience: EXP.to_string(),
            data: json!({"action": line}),
        }
    }

    #[tokio::test]
    async fn unknown_command_lists_the_available_ones() {
        let fixture = harness().await;
        let result = fixture.admin.handle(&admin_ctx("@teleport me")).await;
        assert_eq!(result.error.expect("error").code, "unknown_admin_command");
        let commands = &result.metadata.expect("metadata")["available_commands"];
        assert!(commands.as_array().expect("list").len() >= 5);
    }

    #[tokio::test]
    async fn examine_finds_items_in_areas() {
        let fixture = harness().await;
        let result = fixture
            .admin
            .handle(&admin_ctx("@examine item bottle_mystery"))
            .await;
        assert!(result.success, "{:?}", result.error);
        let metadata = result.metadata.expect("metadata");
        assert_eq!(
            metadata["world_path"],
            "locations.woods.areas.spawn_zone_1.items"
        );
        assert_eq!(metadata["entity"]["instance_id"], "bottle_mystery");
        let properties = metadata["editable_properties"].as_array().expect("list");
        assert!(properties
            .iter()
            .any(|p| p["path"] == "visible" && p["type"] == "boolean"));
    }

    #[tokio::test]
    async fn examine_finds_top_level_npcs() {
        let fixture = harness().await;
        let result = fixture.admin.handle(&admin_ctx("@examine npc louisa")).await;
        assert!(result.success);
        assert_eq!(result.metadata.expect("metadata")["world_path"], "npcs.louisa");
    }

    #[tokio::test]
    async fn examine_missing_entity_is_not_found() {
        let fixture = harness().await;
        let result = fixture.admin.handle(&admin_ctx("@examine item ghost")).await;
        assert_eq!(result.error.expect("error").code, "entity_not_found");
    }

    #[tokio::test]
    async fn edit_updates_a_listed_item_and_publishes_the_delta() {
        let fixture = harness().await;
        let mut sub = fixture.bus.subscribe(&user_subject("ranger"));

        let result = fixture
            .admin
            .handle(&admin_ctx("@edit item bottle_mystery visible false"))
            .await;
        assert!(result.success, "{:?}", result.error);
        let metadata = result.metadata.expect("metadata");
        assert_eq!(metadata["before"], json!(true));
        assert_eq!(metadata["after"], json!(false));

        let world = fixture.state.get_world_state(EXP).await.expect("world");
        assert_eq!(
            world["locations"]["woods"]["areas"]["spawn_zone_1"]["items"][0]["visible"],
            false
        );

        let delta: Value =
            serde_json::from_str(&sub.next().await.expect("delta")).expect("json");
        assert_eq!(delta["changes"][0]["operation"], "update");
        assert_eq!(delta["changes"][0]["instance_id"], "bottle_mystery");
    }

    #[tokio::test]
    async fn edit_round_trip_restores_the_value() {
        let fixture = harness().await;
        fixture
            .admin
            .handle(&admin_ctx("@edit item bottle_mystery visible false"))
            .await;
        let restore = fixture
            .admin
            .handle(&admin_ctx("@edit item bottle_mystery visible true"))
            .await;
        assert!(restore.success);

        let world = fixture.state.get_world_state(EXP).await.expect("world");
        assert_eq!(
            world["locations"]["woods"]["areas"]["spawn_zone_1"]["items"][0]["visible"],
            true
        );
    }

    #[tokio::test]
    async fn edit_rejects_type_mismatch_without_mutation() {
        let fixture = harness().await;
        let before = fixture.state.get_world_state(EXP).await.expect("world");

        let result = fixture
            .admin
            .handle(&admin_ctx("@edit item bottle_mystery visible hello"))
            .await;
        assert_eq!(result.error.expect("error").code, "type_mismatch");

        let after = fixture.state.get_world_state(EXP).await.expect("world");
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn edit_nested_property_on_keyed_npc() {
        let fixture = harness().await;
        let result = fixture
            .admin
            .handle(&admin_ctx("@edit npc louisa state.met true"))
            .await;
        assert!(result.success, "{:?}", result.error);

        let world = fixture.state.get_world_state(EXP).await.expect("world");
        assert_eq!(world["npcs"]["louisa"]["state"]["met"], true);
    }

    #[tokio::test]
    async fn edit_unknown_property_hints_the_editable_ones() {
        let fixture = harness().await;
        let result = fixture
            .admin
            .handle(&admin_ctx("@edit item bottle_mystery wings true"))
            .await;
        assert_eq!(result.error.as_ref().expect("error").code, "invalid_property");
        let hints = &result.metadata.expect("metadata")["editable_properties"];
        assert!(hints.as_array().expect("list").iter().any(|p| p == "visible"));
    }

    #[tokio::test]
    async fn where_reports_hidden_items_and_neighbors() {
        let fixture = harness().await;
        fixture
            .admin
            .handle(&admin_ctx("@edit item bottle_mystery visible false"))
            .await;

        let result = fixture.admin.handle(&admin_ctx("@where")).await;
        assert!(result.success, "{:?}", result.error);
        let metadata = result.metadata.expect("metadata");
        assert_eq!(metadata["current_location"], "woods");
        assert_eq!(metadata["current_area"], "spawn_zone_1");
        // The hidden bottle still shows for admins.
        assert_eq!(metadata["items"][0]["instance_id"], "bottle_mystery");
        assert_eq!(metadata["items"][0]["visible"], false);
        let neighbors = metadata["neighboring_areas"].as_array().expect("list");
        assert!(neighbors.iter().any(|n| n == "counter"));
    }

    #[tokio::test]
    async fn reset_requires_confirmation() {
        let fixture = harness().await;
        let result = fixture.admin.handle(&admin_ctx("@reset experience")).await;
        assert_eq!(result.error.expect("error").code, "confirm_required");
    }

    #[tokio::test]
    async fn reset_experience_restores_template_and_clears_views() {
        let fixture = harness().await;
        // Dirty the world and create a view.
        let collect = crate::use_cases::handlers::CollectItem::new(
            fixture.state.clone(),
            fixture.resolver.clone(),
        );
        let collect_ctx = CommandContext {
            user_id: "ranger".to_string(),
            experience: EXP.to_string(),
            data: json!({"action": "collect_item", "instance_id": "bottle_mystery"}),
        };
        use crate::use_cases::dispatch::FastHandler;
        assert!(collect.handle(&collect_ctx).await.success);

        let result = fixture
            .admin
            .handle(&admin_ctx("@reset experience CONFIRM"))
            .await;
        assert!(result.success, "{:?}", result.error);
        let metadata = result.metadata.expect("metadata");
        assert_eq!(metadata["views_cleared"], 1);
        assert!(metadata["backup"].as_str().expect("name").starts_with("world."));

        // The bottle is back in its area; the next view bootstraps empty.
        let world = fixture.state.get_world_state(EXP).await.expect("world");
        assert_eq!(
            world["locations"]["woods"]["areas"]["spawn_zone_1"]["items"][0]["instance_id"],
            "bottle_mystery"
        );
        let view = fixture.state.get_player_view(EXP, "ranger").await.expect("view");
        assert_eq!(view["player"]["inventory"], json!([]));
    }

    #[tokio::test]
    async fn world_only_reset_keeps_player_views() {
        let fixture = harness().await;
        fixture.state.get_player_view(EXP, "ranger").await.expect("bootstrap");

        let result = fixture.admin.handle(&admin_ctx("@reset world CONFIRM")).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.metadata.expect("metadata")["views_cleared"], 0);

        // The view file survived.
        let view = fixture
            .state
            .get_player_view(EXP, "ranger")
            .await
            .expect("view");
        assert!(view["snapshot_version"].as_i64().expect("version") > 0);
    }

    #[tokio::test]
    async fn flush_templates_reports_evictions() {
        let fixture = harness().await;
        // Warm the cache.
        fixture
            .resolver
            .merge(EXP, "items", &json!({"instance_id": "b", "template_id": "bottle"}))
            .await;
        let result = fixture.admin.handle(&admin_ctx("@flush_templates")).await;
        assert!(result.success);
        assert_eq!(result.metadata.expect("metadata")["evicted"], 1);
    }
}

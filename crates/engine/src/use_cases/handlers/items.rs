//! Item handlers: collect, drop, inventory.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use wayfinder_domain::{document, instance, Patch};
use wayfinder_shared::CommandResult;

use crate::use_cases::dispatch::{CommandContext, FastHandler};
use crate::use_cases::state::{StateError, StateManager};
use crate::use_cases::templates::TemplateResolver;

/// Move an instance from the player's current location into their
/// inventory. One delta, two changes: `remove` from the area and `add` to
/// the inventory.
pub struct CollectItem {
    state: Arc<StateManager>,
    resolver: Arc<TemplateResolver>,
}

impl CollectItem {
    pub fn new(state: Arc<StateManager>, resolver: Arc<TemplateResolver>) -> Self {
        Self { state, resolver }
    }
}

#[async_trait]
impl FastHandler for CollectItem {
    async fn handle(&self, ctx: &CommandContext) -> CommandResult {
        // `instance_id` preferred; `item_id` accepted for older clients.
        let Some(instance_id) = ctx.field("instance_id").or_else(|| ctx.field("item_id"))
        else {
            return CommandResult::fail("missing_instance_id", "Which item?");
        };

        let view = match self.state.get_player_view(&ctx.experience, &ctx.user_id).await {
            Ok(view) => view,
            Err(e) => return state_failure(e),
        };
        let Some(location_id) = document::current_location(&view).map(str::to_string) else {
            return CommandResult::fail("no_location", "You are not anywhere yet.");
        };

        let world = match self.state.get_world_state(&ctx.experience).await {
            Ok(world) => world,
            Err(e) => return state_failure(e),
        };
        let Some(location) = world
            .get("locations")
            .and_then(|l| l.get(location_id.as_str()))
        else {
            return CommandResult::fail("no_location", "Your location no longer exists.");
        };

        let Some(found) = document::find_item_in_location(&location_id, location, instance_id)
        else {
            return CommandResult::fail(
                "item_not_found",
                format!("There is no {instance_id} here."),
            );
        };

        let merged = self
            .resolver
            .merge(&ctx.experience, "items", &found.instance)
            .await;
        if !instance::is_collectible(&merged) {
            return CommandResult::fail(
                "not_collectible",
                format!("The {} cannot be taken.", instance::display_name(&merged)),
            );
        }

        let world_source = document::list_patch(
            &location_id,
            &found.list,
            json!({"$remove": {"instance_id": instance_id}}),
        );
        let view_source = document::inventory_append(instance::normalize(&found.instance));
        let (world_patch, view_patch) =
            match (Patch::parse(&world_source), Patch::parse(&view_source)) {
                (Ok(world_patch), Ok(view_patch)) => (world_patch, view_patch),
                _ => return CommandResult::fail("processing_error", "Could not build update."),
            };

        let outcome = match self
            .state
            .update_world_and_view(
                &ctx.experience,
                &ctx.user_id,
                Some(&world_patch),
                Some(&view_patch),
            )
            .await
        {
            Ok(outcome) => outcome,
            // Someone else collected it between our read and the commit.
            Err(StateError::NoMatch { .. }) => {
                return CommandResult::fail(
                    "item_not_found",
                    format!("There is no {instance_id} here."),
                )
            }
            Err(e) => return state_failure(e),
        };

        CommandResult::ok(format!("You pick up the {}.", instance::display_name(&merged)))
            .with_state_changes(json!({"world": world_source, "view": view_source}))
            .with_metadata(json!({
                "instance_id": instance_id,
                "snapshot_version": outcome.new_version,
            }))
    }
}

/// Inverse of collect: move an instance from the inventory back into the
/// player's current area.
pub struct DropItem {
    state: Arc<StateManager>,
    resolver: Arc<TemplateResolver>,
}

impl DropItem {
    pub fn new(state: Arc<StateManager>, resolver: Arc<TemplateResolver>) -> Self {
        Self { state, resolver }
    }
}

#[async_trait]
impl FastHandler for DropItem {
    async fn handle(&self, ctx: &CommandContext) -> CommandResult {
        let Some(instance_id) = ctx.field("instance_id").or_else(|| ctx.field("item_id"))
        else {
            return CommandResult::fail("missing_instance_id", "Which item?");
        };

        let view = match self.state.get_player_view(&ctx.experience, &ctx.user_id).await {
            Ok(view) => view,
            Err(e) => return state_failure(e),
        };
        let Some(held) = document::inventory(&view)
            .iter()
            .find(|item| document::instance_id(item) == Some(instance_id))
            .cloned()
        else {
            return CommandResult::fail(
                "not_in_inventory",
                format!("You are not carrying {instance_id}."),
            );
        };
        let Some(location_id) = document::current_location(&view).map(str::to_string) else {
            return CommandResult::fail("no_location", "You are not anywhere yet.");
        };

        let world = match self.state.get_world_state(&ctx.experience).await {
            Ok(world) => world,
            Err(e) => return state_failure(e),
        };
        let location = world
            .get("locations")
            .and_then(|l| l.get(location_id.as_str()));
        let Some(location) = location else {
            return CommandResult::fail("no_location", "Your location no longer exists.");
        };

        // Drop into the current area when the player is in one, otherwise
        // into the location-level list.
        let list = match document::current_area(&view) {
            Some(area)
                if location
                    .get("areas")
                    .and_then(|a| a.get(area))
                    .is_some() =>
            {
                document::InstanceList::AreaItems(area.to_string())
            }
            _ => document::InstanceList::LocationItems,
        };

        let world_source = document::list_patch(
            &location_id,
            &list,
            json!({"$append": instance::normalize(&held)}),
        );
        let view_source = document::inventory_remove(instance_id);
        let (world_patch, view_patch) =
            match (Patch::parse(&world_source), Patch::parse(&view_source)) {
                (Ok(world_patch), Ok(view_patch)) => (world_patch, view_patch),
                _ => return CommandResult::fail("processing_error", "Could not build update."),
            };

        let outcome = match self
            .state
            .update_world_and_view(
                &ctx.experience,
                &ctx.user_id,
                Some(&world_patch),
                Some(&view_patch),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(StateError::NoMatch { .. }) => {
                return CommandResult::fail(
                    "not_in_inventory",
                    format!("You are not carrying {instance_id}."),
                )
            }
            Err(e) => return state_failure(e),
        };

        let merged = self.resolver.merge(&ctx.experience, "items", &held).await;
        CommandResult::ok(format!("You set down the {}.", instance::display_name(&merged)))
            .with_state_changes(json!({"world": world_source, "view": view_source}))
            .with_metadata(json!({
                "instance_id": instance_id,
                "snapshot_version": outcome.new_version,
            }))
    }
}

/// Read-only inventory listing with template-merged items.
pub struct Inventory {
    state: Arc<StateManager>,
    resolver: Arc<TemplateResolver>,
}

impl Inventory {
    pub fn new(state: Arc<StateManager>, resolver: Arc<TemplateResolver>) -> Self {
        Self { state, resolver }
    }
}

#[async_trait]
impl FastHandler for Inventory {
    async fn handle(&self, ctx: &CommandContext) -> CommandResult {
        let view = match self.state.get_player_view(&ctx.experience, &ctx.user_id).await {
            Ok(view) => view,
            Err(e) => return state_failure(e),
        };

        let mut merged = Vec::new();
        for item in document::inventory(&view) {
            merged.push(self.resolver.merge(&ctx.experience, "items", item).await);
        }

        let message = if merged.is_empty() {
            "You are carrying nothing.".to_string()
        } else {
            let names: Vec<String> = merged.iter().map(instance::display_name).collect();
            format!("You are carrying: {}.", names.join(", "))
        };
        CommandResult::ok(message).with_metadata(json!({"inventory": merged}))
    }
}

fn state_failure(error: StateError) -> CommandResult {
    tracing::error!(error = %error, "State operation failed");
    CommandResult::fail("processing_error", "Something went wrong. Try again.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::handlers::test_support::{harness, EXP};
    use crate::use_cases::state::user_subject;
    use crate::infrastructure::ports::BusPort;
    use serde_json::Value;

    fn ctx(user: &str, data: Value) -> CommandContext {
        CommandContext {
            user_id: user.to_string(),
            experience: EXP.to_string(),
            data,
        }
    }

    #[tokio::test]
    async fn collect_moves_item_into_inventory_with_one_two_change_delta() {
        let fixture = harness().await;
        let mut sub = fixture.bus.subscribe(&user_subject("alice"));
        let handler = CollectItem::new(fixture.state.clone(), fixture.resolver.clone());

        let view = fixture.state.get_player_view(EXP, "alice").await.expect("bootstrap");
        let base = view["snapshot_version"].as_i64().expect("version");

        let result = handler
            .handle(&ctx("alice", json!({"action": "collect_item",
                "instance_id": "bottle_mystery"})))
            .await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.message_to_player.contains("Mysterious Bottle"));

        // World list emptied, inventory filled.
        let world = fixture.state.get_world_state(EXP).await.expect("world");
        assert_eq!(
            world["locations"]["woods"]["areas"]["spawn_zone_1"]["items"],
            json!([])
        );
        let view = fixture.state.get_player_view(EXP, "alice").await.expect("view");
        assert_eq!(view["player"]["inventory"][0]["instance_id"], "bottle_mystery");

        // One delta with remove + inventory add, chained off the bootstrap
        // version.
        let delta: Value =
            serde_json::from_str(&sub.next().await.expect("delta")).expect("json");
        assert_eq!(delta["base_version"].as_i64(), Some(base));
        let changes = delta["changes"].as_array().expect("changes");
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0]["operation"], "remove");
        assert_eq!(changes[0]["area_id"], "spawn_zone_1");
        assert_eq!(changes[1]["operation"], "add");
        assert_eq!(changes[1]["path"], "player.inventory");
        assert_eq!(changes[1]["item"]["semantic_name"], "Mysterious Bottle");
    }

    #[tokio::test]
    async fn collect_requires_an_instance_id() {
        let fixture = harness().await;
        let handler = CollectItem::new(fixture.state.clone(), fixture.resolver.clone());
        let result = handler
            .handle(&ctx("alice", json!({"action": "collect_item"})))
            .await;
        assert_eq!(result.error.expect("error").code, "missing_instance_id");
    }

    #[tokio::test]
    async fn collect_accepts_legacy_item_id() {
        let fixture = harness().await;
        let handler = CollectItem::new(fixture.state.clone(), fixture.resolver.clone());
        let result = handler
            .handle(&ctx("alice", json!({"action": "collect_item",
                "item_id": "bottle_mystery"})))
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn collect_unknown_item_is_not_found() {
        let fixture = harness().await;
        let handler = CollectItem::new(fixture.state.clone(), fixture.resolver.clone());
        let result = handler
            .handle(&ctx("alice", json!({"action": "collect_item", "instance_id": "ghost"})))
            .await;
        assert_eq!(result.error.expect("error").code, "item_not_found");
    }

    #[tokio::test]
    async fn collect_rejects_non_collectible_items() {
        let fixture = harness().await;
        let handler = CollectItem::new(fixture.state.clone(), fixture.resolver.clone());
        // The oak stick's template is missing, so nothing marks it
        // collectible.
        let result = handler
            .handle(&ctx("alice", json!({"action": "collect_item",
                "instance_id": "stick_oak"})))
            .await;
        assert_eq!(result.error.expect("error").code, "not_collectible");

        // Validation failure mutated nothing.
        let world = fixture.state.get_world_state(EXP).await.expect("world");
        assert_eq!(
            world["locations"]["woods"]["items"][0]["instance_id"],
            "stick_oak"
        );
    }

    #[tokio::test]
    async fn concurrent_collects_have_exactly_one_winner() {
        let fixture = harness().await;
        let handler = Arc::new(CollectItem::new(
            fixture.state.clone(),
            fixture.resolver.clone(),
        ));

        let a = {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler
                    .handle(&ctx("alice", json!({"action": "collect_item",
                        "instance_id": "bottle_mystery"})))
                    .await
            })
        };
        let b = {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler
                    .handle(&ctx("alice", json!({"action": "collect_item",
                        "instance_id": "bottle_mystery"})))
                    .await
            })
        };

        let results = [a.await.expect("join"), b.await.expect("join")];
        let wins = results.iter().filter(|r| r.success).count();
        let not_found = results
            .iter()
            .filter(|r| {
                r.error.as_ref().map(|e| e.code.as_str()) == Some("item_not_found")
            })
            .count();
        assert_eq!(wins, 1);
        assert_eq!(not_found, 1);
    }

    #[tokio::test]
    async fn drop_restores_the_area_listing() {
        let fixture = harness().await;
        let collect = CollectItem::new(fixture.state.clone(), fixture.resolver.clone());
        let drop = DropItem::new(fixture.state.clone(), fixture.resolver.clone());

        collect
            .handle(&ctx("alice", json!({"action": "collect_item",
                "instance_id": "bottle_mystery"})))
            .await;
        let result = drop
            .handle(&ctx("alice", json!({"action": "drop_item",
                "instance_id": "bottle_mystery"})))
            .await;
        assert!(result.success, "{:?}", result.error);

        // Round trip: area listing holds the instance again, inventory is
        // empty.
        let world = fixture.state.get_world_state(EXP).await.expect("world");
        let items = world["locations"]["woods"]["areas"]["spawn_zone_1"]["items"]
            .as_array()
            .expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["instance_id"], "bottle_mystery");
        let view = fixture.state.get_player_view(EXP, "alice").await.expect("view");
        assert_eq!(view["player"]["inventory"], json!([]));
    }

    #[tokio::test]
    async fn drop_without_the_item_is_rejected() {
        let fixture = harness().await;
        let handler = DropItem::new(fixture.state.clone(), fixture.resolver.clone());
        let result = handler
            .handle(&ctx("alice", json!({"action": "drop_item",
                "instance_id": "bottle_mystery"})))
            .await;
        assert_eq!(result.error.expect("error").code, "not_in_inventory");
    }

    #[tokio::test]
    async fn inventory_lists_merged_items() {
        let fixture = harness().await;
        let collect = CollectItem::new(fixture.state.clone(), fixture.resolver.clone());
        let inventory = Inventory::new(fixture.state.clone(), fixture.resolver.clone());

        let empty = inventory
            .handle(&ctx("alice", json!({"action": "inventory"})))
            .await;
        assert!(empty.success);
        assert_eq!(empty.message_to_player, "You are carrying nothing.");

        collect
            .handle(&ctx("alice", json!({"action": "collect_item",
                "instance_id": "bottle_mystery"})))
            .await;
        let full = inventory
            .handle(&ctx("alice", json!({"action": "inventory"})))
            .await;
        assert!(full.message_to_player.contains("Mysterious Bottle"));
        let metadata = full.metadata.expect("metadata");
        assert_eq!(metadata["inventory"][0]["collectible"], true);
    }
}

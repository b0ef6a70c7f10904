//! Movement handler: `go` to an area of the current location.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use wayfinder_domain::{document, Patch};
use wayfinder_shared::CommandResult;

use crate::use_cases::dispatch::{CommandContext, FastHandler};
use crate::use_cases::state::StateManager;

/// Move the player to another area of their current location, by area id
/// (`destination`) or by a direction through the current area's
/// `connections` map.
pub struct Go {
    state: Arc<StateManager>,
}

impl Go {
    pub fn new(state: Arc<StateManager>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl FastHandler for Go {
    async fn handle(&self, ctx: &CommandContext) -> CommandResult {
        let Some(target) = ctx.field("destination").or_else(|| ctx.field("direction"))
        else {
            return CommandResult::fail("missing_destination", "Where to?");
        };

        let view = match self.state.get_player_view(&ctx.experience, &ctx.user_id).await {
            Ok(view) => view,
            Err(e) => {
                tracing::error!(error = %e, "State operation failed");
                return CommandResult::fail("processing_error", "Something went wrong.");
            }
        };
        let Some(location_id) = document::current_location(&view).map(str::to_string) else {
            return CommandResult::fail("no_location", "You are not anywhere yet.");
        };

        let world = match self.state.get_world_state(&ctx.experience).await {
            Ok(world) => world,
            Err(e) => {
                tracing::error!(error = %e, "State operation failed");
                return CommandResult::fail("processing_error", "Something went wrong.");
            }
        };
        let areas = world
            .get("locations")
            .and_then(|l| l.get(location_id.as_str()))
            .and_then(|l| l.get("areas"))
            .and_then(Value::as_object);
        let Some(areas) = areas else {
            return CommandResult::fail("no_location", "There is nowhere to go from here.");
        };

        // Direct area id wins; otherwise try the current area's connections
        // as a direction ("north" -> some area id).
        let destination = if areas.contains_key(target) {
            Some(target.to_string())
        } else {
            document::current_area(&view)
                .and_then(|current| areas.get(current))
                .and_then(|area| area.get("connections"))
                .and_then(|connections| connections.get(target))
                .and_then(Value::as_str)
                .filter(|dest| areas.contains_key(*dest))
                .map(str::to_string)
        };

        let Some(destination) = destination else {
            let mut available: Vec<String> = areas.keys().cloned().collect();
            if let Some(connections) = document::current_area(&view)
                .and_then(|current| areas.get(current))
                .and_then(|area| area.get("connections"))
                .and_then(Value::as_object)
            {
                available.extend(connections.keys().cloned());
            }
            available.sort();
            available.dedup();
            return CommandResult::fail_with_hint(
                "destination_not_found",
                format!("You can't get to {target} from here."),
                "available_destinations",
                json!(available),
            );
        };

        let source = json!({"player": {"current_area": &destination}});
        let patch = match Patch::parse(&source) {
            Ok(patch) => patch,
            Err(_) => return CommandResult::fail("processing_error", "Could not build update."),
        };
        let outcome = match self
            .state
            .update_player_view(&ctx.experience, &ctx.user_id, &patch)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "State operation failed");
                return CommandResult::fail("processing_error", "Something went wrong.");
            }
        };

        let area_name = areas
            .get(&destination)
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .unwrap_or(destination.as_str());
        CommandResult::ok(format!("You head to the {area_name}."))
            .with_state_changes(source)
            .with_metadata(json!({
                "current_area": destination,
                "snapshot_version": outcome.new_version,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::handlers::test_support::{harness, EXP};

    fn ctx(data: Value) -> CommandContext {
        CommandContext {
            user_id: "alice".to_string(),
            experience: EXP.to_string(),
            data,
        }
    }

    #[tokio::test]
    async fn go_by_area_id_updates_current_area() {
        let fixture = harness().await;
        let handler = Go::new(fixture.state.clone());

        let result = handler
            .handle(&ctx(json!({"action": "go", "destination": "counter"})))
            .await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.message_to_player.contains("Ranger Counter"));

        let view = fixture.state.get_player_view(EXP, "alice").await.expect("view");
        assert_eq!(view["player"]["current_area"], "counter");
    }

    #[tokio::test]
    async fn go_by_direction_follows_connections() {
        let fixture = harness().await;
        let handler = Go::new(fixture.state.clone());

        // The spawn clearing's "north" connection leads to the counter.
        let result = handler
            .handle(&ctx(json!({"action": "go", "direction": "north"})))
            .await;
        assert!(result.success, "{:?}", result.error);

        let view = fixture.state.get_player_view(EXP, "alice").await.expect("view");
        assert_eq!(view["player"]["current_area"], "counter");
    }

    #[tokio::test]
    async fn missing_destination_is_rejected() {
        let fixture = harness().await;
        let handler = Go::new(fixture.state.clone());
        let result = handler.handle(&ctx(json!({"action": "go"}))).await;
        assert_eq!(result.error.expect("error").code, "missing_destination");
    }

    #[tokio::test]
    async fn unknown_destination_echoes_available_ones() {
        let fixture = harness().await;
        let handler = Go::new(fixture.state.clone());

        let result = handler
            .handle(&ctx(json!({"action": "go", "destination": "basement"})))
            .await;
        assert_eq!(
            result.error.as_ref().expect("error").code,
            "destination_not_found"
        );
        let available = &result.metadata.expect("metadata")["available_destinations"];
        let available: Vec<&str> = available
            .as_array()
            .expect("list")
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(available.contains(&"counter"));
        assert!(available.contains(&"spawn_zone_1"));
        assert!(available.contains(&"north"));

        // Validation failure left the player where they were.
        let view = fixture.state.get_player_view(EXP, "alice").await.expect("view");
        assert_eq!(view["player"]["current_area"], "spawn_zone_1");
    }
}

//! Full gameplay-loop scenarios over a live WebSocket.

use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use wayfinder_domain::Patch;

use super::support::{bad_token, token_for, TestServer, FAR_AWAY, IN_ZONE};
use crate::use_cases::handlers::test_support::EXP;

fn area_item_ids(aoi: &Value, area: &str) -> Vec<String> {
    aoi["areas"][area]["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["instance_id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn inventory_ids(aoi: &Value) -> Vec<String> {
    aoi["player"]["inventory"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["instance_id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

// =============================================================================
// Scenario A - bootstrap + AOI + empty inventory
// =============================================================================

#[tokio::test]
async fn scenario_a_bootstrap_and_first_aoi() {
    let server = TestServer::start().await;
    let mut client = server.connect(&token_for("alice")).await;

    let connected = client.recv_type("connected").await;
    assert_eq!(connected["experience"], EXP);
    assert_eq!(connected["user_id"], "alice");
    assert!(connected["connection_id"].as_str().is_some());

    let aoi = client.update_location(IN_ZONE).await;
    assert_eq!(aoi["zone"]["id"], "woods");
    assert_eq!(aoi["player"]["inventory"], json!([]));
    assert!(aoi["snapshot_version"].as_i64().expect("version") > 0);
}

// =============================================================================
// Scenario B - collect round trip
// =============================================================================

#[tokio::test]
async fn scenario_b_collect_produces_chained_delta() {
    let server = TestServer::start().await;
    let mut client = server.connect(&token_for("alice")).await;
    client.recv_type("connected").await;

    let aoi = client.update_location(IN_ZONE).await;
    let v0 = aoi["snapshot_version"].as_i64().expect("version");
    assert!(area_item_ids(&aoi, "spawn_zone_1").contains(&"bottle_mystery".to_string()));

    let response = client
        .action(json!({"type": "action", "action": "collect_item",
            "instance_id": "bottle_mystery"}))
        .await;
    assert_eq!(response["success"], true, "{response}");

    // The delta may arrive before or after the action response.
    let delta = client.recv_type("world_update").await;
    assert_eq!(delta["version"], "0.4");
    assert_eq!(delta["base_version"].as_i64(), Some(v0));
    let v1 = delta["snapshot_version"].as_i64().expect("version");
    assert!(v1 > v0);
    let changes = delta["changes"].as_array().expect("changes");
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().any(|c| c["operation"] == "remove"
        && c["instance_id"] == "bottle_mystery"));
    assert!(changes.iter().any(|c| c["operation"] == "add"
        && c["path"] == "player.inventory"));

    // A fresh AOI reflects the committed state at exactly v1.
    let aoi = client.update_location(IN_ZONE).await;
    assert_eq!(aoi["snapshot_version"].as_i64(), Some(v1));
    assert!(!area_item_ids(&aoi, "spawn_zone_1").contains(&"bottle_mystery".to_string()));
    assert!(inventory_ids(&aoi).contains(&"bottle_mystery".to_string()));
    // The inventory copy is template-merged.
    assert_eq!(aoi["player"]["inventory"][0]["semantic_name"], "Mysterious Bottle");
}

// =============================================================================
// Scenario C - drop then collect again
// =============================================================================

#[tokio::test]
async fn scenario_c_drop_then_collect_inverse() {
    let server = TestServer::start().await;
    let mut client = server.connect(&token_for("alice")).await;
    client.recv_type("connected").await;
    client.update_location(IN_ZONE).await;

    let collect = client
        .action(json!({"type": "action", "action": "collect_item",
            "instance_id": "bottle_mystery"}))
        .await;
    assert_eq!(collect["success"], true);
    let v1 = collect["metadata"]["snapshot_version"].as_i64().expect("version");

    let drop = client
        .action(json!({"type": "action", "action": "drop_item",
            "instance_id": "bottle_mystery"}))
        .await;
    assert_eq!(drop["success"], true, "{drop}");
    let v2 = drop["metadata"]["snapshot_version"].as_i64().expect("version");
    assert!(v2 > v1);

    let aoi = client.update_location(IN_ZONE).await;
    assert_eq!(aoi["snapshot_version"].as_i64(), Some(v2));
    assert!(inventory_ids(&aoi).is_empty());
    assert!(area_item_ids(&aoi, "spawn_zone_1").contains(&"bottle_mystery".to_string()));

    let collect_again = client
        .action(json!({"type": "action", "action": "collect_item",
            "instance_id": "bottle_mystery"}))
        .await;
    assert_eq!(collect_again["success"], true, "{collect_again}");
    let v3 = collect_again["metadata"]["snapshot_version"]
        .as_i64()
        .expect("version");
    assert!(v3 > v2);
}

// =============================================================================
// Scenario D - admin visibility edit
// =============================================================================

#[tokio::test]
async fn scenario_d_hidden_items_leave_the_aoi_but_not_admin_sight() {
    let server = TestServer::start().await;
    let mut client = server.connect(&token_for("ranger")).await;
    client.recv_type("connected").await;
    client.update_location(IN_ZONE).await;

    let edit = client
        .action(json!({"type": "action",
            "action": "@edit item bottle_mystery visible false"}))
        .await;
    assert_eq!(edit["success"], true, "{edit}");

    let aoi = client.update_location(IN_ZONE).await;
    assert!(!area_item_ids(&aoi, "spawn_zone_1").contains(&"bottle_mystery".to_string()));

    let whereami = client.action(json!({"type": "action", "action": "@where"})).await;
    assert_eq!(whereami["success"], true);
    let hidden = whereami["metadata"]["items"]
        .as_array()
        .expect("items")
        .iter()
        .find(|i| i["instance_id"] == "bottle_mystery")
        .expect("admin still sees it");
    assert_eq!(hidden["visible"], false);
}

// =============================================================================
// Scenario E - admin reset
// =============================================================================

#[tokio::test]
async fn scenario_e_reset_restores_the_pristine_experience() {
    let server = TestServer::start().await;
    let mut client = server.connect(&token_for("alice")).await;
    client.recv_type("connected").await;
    client.update_location(IN_ZONE).await;

    let collect = client
        .action(json!({"type": "action", "action": "collect_item",
            "instance_id": "bottle_mystery"}))
        .await;
    assert_eq!(collect["success"], true);

    let reset = client
        .action(json!({"type": "action", "action": "@reset experience CONFIRM"}))
        .await;
    assert_eq!(reset["success"], true, "{reset}");
    assert!(reset["metadata"]["backup"]
        .as_str()
        .expect("backup name")
        .starts_with("world."));
    assert!(reset["metadata"]["views_cleared"].as_i64().expect("count") >= 1);

    // Reconnect; the first AOI shows the pristine world and a fresh view.
    let mut reconnected = server.connect(&token_for("alice")).await;
    reconnected.recv_type("connected").await;
    let aoi = reconnected.update_location(IN_ZONE).await;
    assert!(area_item_ids(&aoi, "spawn_zone_1").contains(&"bottle_mystery".to_string()));
    assert!(inventory_ids(&aoi).is_empty());
    assert!(aoi["snapshot_version"].as_i64().expect("version") > 0);
}

// =============================================================================
// Scenario F - resync after a missed delta
// =============================================================================

#[tokio::test]
async fn scenario_f_fresh_aoi_resyncs_a_client_that_missed_deltas() {
    let server = TestServer::start().await;
    let mut client = server.connect(&token_for("alice")).await;
    client.recv_type("connected").await;
    let v0 = client.update_location(IN_ZONE).await["snapshot_version"]
        .as_i64()
        .expect("version");

    // State advances while nothing is listening on the wire for it: the
    // client's next knowledge of the world must come from a fresh AOI.
    let patch = Patch::parse(&json!({"quest_states": {"intro": {"stage": 1}}}))
        .expect("parse");
    let outcome = server
        .app
        .state
        .update_player_view(EXP, "alice", &patch)
        .await
        .expect("server-side update");
    assert!(outcome.new_version > v0);

    let aoi = client.update_location(IN_ZONE).await;
    assert_eq!(aoi["snapshot_version"].as_i64(), Some(outcome.new_version));
}

// =============================================================================
// Boundary behaviors
// =============================================================================

#[tokio::test]
async fn invalid_token_closes_with_policy_violation() {
    let server = TestServer::start().await;
    let mut client = server.connect(&bad_token()).await;
    client.expect_close(CloseCode::Policy).await;
}

#[tokio::test]
async fn missing_token_closes_with_policy_violation() {
    let server = TestServer::start().await;
    let mut client = server.connect("").await;
    client.expect_close(CloseCode::Policy).await;
}

#[tokio::test]
async fn far_from_every_zone_is_an_empty_aoi_not_an_error() {
    let server = TestServer::start().await;
    let mut client = server.connect(&token_for("alice")).await;
    client.recv_type("connected").await;

    let aoi = client.update_location(FAR_AWAY).await;
    assert_eq!(aoi["zone"], json!(null));
    assert_eq!(aoi["areas"], json!({}));
    assert!(aoi["snapshot_version"].as_i64().expect("version") > 0);
    assert_eq!(aoi["player"]["inventory"], json!([]));
}

#[tokio::test]
async fn ping_pongs_and_bad_messages_keep_the_connection_open() {
    let server = TestServer::start().await;
    let mut client = server.connect(&token_for("alice")).await;
    client.recv_type("connected").await;

    client.send(json!({"type": "ping"})).await;
    client.recv_type("pong").await;

    client.send(json!({"type": "teleport"})).await;
    let error = client.recv_type("error").await;
    assert_eq!(error["code"], "unknown_message_type");

    client.send(json!({"type": "action"})).await;
    let error = client.recv_type("error").await;
    assert_eq!(error["code"], "missing_action");

    // Still alive.
    client.send(json!({"type": "ping"})).await;
    client.recv_type("pong").await;
}

#[tokio::test]
async fn unknown_action_without_interpreter_reports_not_implemented() {
    let server = TestServer::start().await;
    let mut client = server.connect(&token_for("alice")).await;
    client.recv_type("connected").await;

    let response = client
        .action(json!({"type": "action", "action": "sing to the moon"}))
        .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["error"]["code"], "not_implemented");
}

#[tokio::test]
async fn concurrent_collect_from_two_sockets_has_one_winner() {
    let server = TestServer::start().await;
    let mut first = server.connect(&token_for("alice")).await;
    let mut second = server.connect(&token_for("alice")).await;
    first.recv_type("connected").await;
    second.recv_type("connected").await;
    first.update_location(IN_ZONE).await;

    first
        .send(json!({"type": "action", "action": "collect_item",
            "instance_id": "bottle_mystery"}))
        .await;
    second
        .send(json!({"type": "action", "action": "collect_item",
            "instance_id": "bottle_mystery"}))
        .await;

    let a = first.recv_type("action_response").await;
    let b = second.recv_type("action_response").await;
    let successes = [&a, &b].iter().filter(|r| r["success"] == true).count();
    let not_found = [&a, &b]
        .iter()
        .filter(|r| r["error"]["code"] == "item_not_found")
        .count();
    assert_eq!(successes, 1, "a={a} b={b}");
    assert_eq!(not_found, 1, "a={a} b={b}");
}

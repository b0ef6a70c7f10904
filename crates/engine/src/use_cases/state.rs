//! The unified state manager.
//!
//! The only path that reads or writes persisted documents. Serializes
//! writers per document, applies the merge-operator language, stamps
//! monotonic versions, and publishes deltas on the writing user's subject.
//!
//! Handlers that touch both the world document and a player view go through
//! [`StateManager::update_world_and_view`], which commits both under the
//! world-before-view lock order and publishes a single delta; there is no
//! lower-level API that lets a handler write the two documents
//! independently.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use wayfinder_domain::{next_version, Patch, PatchError};
use wayfinder_shared::{Change, ServerMessage, DELTA_VERSION};

use crate::infrastructure::ports::{
    BusPort, ClockPort, DocRef, DocumentStore, StoreError,
};

use super::deltas::{DeltaBuilder, DocKind};

/// The per-user delta subject.
pub fn user_subject(user_id: &str) -> String {
    format!("world.updates.user.{user_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("experience not found: {0}")]
    NotFound(String),
    #[error("invalid path in update: {0}")]
    InvalidPath(String),
    #[error("malformed update: {0}")]
    MalformedUpdate(String),
    #[error("no instance {instance_id} at {path}")]
    NoMatch { path: String, instance_id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<PatchError> for StateError {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::InvalidPath { .. } => StateError::InvalidPath(err.to_string()),
            PatchError::NoMatch { path, instance_id } => {
                StateError::NoMatch { path, instance_id }
            }
            PatchError::UnknownOperator { .. } | PatchError::MalformedOperator { .. } => {
                StateError::MalformedUpdate(err.to_string())
            }
        }
    }
}

/// What a successful update produced.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    /// The snapshot version stamped by this write (the player view's for
    /// any update made on behalf of a user).
    pub new_version: i64,
    /// The derived change list, as published.
    pub changes: Vec<Change>,
}

/// What an experience reset produced.
#[derive(Debug, Clone)]
pub struct ResetOutcome {
    pub backup: String,
    pub views_cleared: usize,
    pub new_version: i64,
}

pub struct StateManager {
    store: Arc<dyn DocumentStore>,
    bus: Arc<dyn BusPort>,
    clock: Arc<dyn ClockPort>,
    deltas: DeltaBuilder,
    locks: DashMap<DocRef, Arc<Mutex<()>>>,
}

impl StateManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        bus: Arc<dyn BusPort>,
        clock: Arc<dyn ClockPort>,
        deltas: DeltaBuilder,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            deltas,
            locks: DashMap::new(),
        }
    }

    /// The shared world document.
    pub async fn get_world_state(&self, experience: &str) -> Result<Value, StateError> {
        self.store
            .read(&DocRef::world(experience))
            .await?
            .ok_or_else(|| StateError::NotFound(experience.to_string()))
    }

    /// One player's view, created on first access.
    pub async fn get_player_view(
        &self,
        experience: &str,
        user_id: &str,
    ) -> Result<Value, StateError> {
        let doc = DocRef::player_view(experience, user_id);
        if let Some(view) = self.store.read(&doc).await? {
            return Ok(view);
        }
        // Bootstrap under the view lock so concurrent first reads agree.
        let _guard = self.lock(&doc).await;
        self.bootstrap_view_locked(experience, &doc).await
    }

    /// Apply a patch to the world document.
    ///
    /// With `by_user` set the update is committed through the composed path
    /// so the user's `snapshot_version` advances and a delta is published
    /// on their subject; without it, the world version advances silently.
    pub async fn update_world_state(
        &self,
        experience: &str,
        patch: &Patch,
        by_user: Option<&str>,
    ) -> Result<UpdateOutcome, StateError> {
        if let Some(user_id) = by_user {
            return self
                .update_world_and_view(experience, user_id, Some(patch), None)
                .await;
        }

        let doc = DocRef::world(experience);
        let _guard = self.lock(&doc).await;
        let world = self
            .store
            .read(&doc)
            .await?
            .ok_or_else(|| StateError::NotFound(experience.to_string()))?;

        let mut next = world.clone();
        patch.apply(&mut next)?;
        let new_version = self.stamp_world(&mut next);
        self.store.write(&doc, &next).await?;

        tracing::debug!(experience = %experience, new_version, "World updated");
        Ok(UpdateOutcome {
            new_version,
            changes: vec![],
        })
    }

    /// Apply a patch to a player view. Always publishes a delta.
    pub async fn update_player_view(
        &self,
        experience: &str,
        user_id: &str,
        patch: &Patch,
    ) -> Result<UpdateOutcome, StateError> {
        self.update_world_and_view(experience, user_id, None, Some(patch))
            .await
    }

    /// Commit a world patch and a view patch as one logical change.
    ///
    /// Locks world before view, applies both patches to cloned documents
    /// (so a failing patch leaves nothing half-written), stamps both
    /// versions, writes world then view, and publishes one delta whose
    /// `base_version`/`snapshot_version` pair comes from the player view.
    pub async fn update_world_and_view(
        &self,
        experience: &str,
        user_id: &str,
        world_patch: Option<&Patch>,
        view_patch: Option<&Patch>,
    ) -> Result<UpdateOutcome, StateError> {
        let world_doc = DocRef::world(experience);
        let view_doc = DocRef::player_view(experience, user_id);

        // Lock order: world before player view.
        let _world_guard = match world_patch {
            Some(_) => Some(self.lock(&world_doc).await),
            None => None,
        };
        let _view_guard = self.lock(&view_doc).await;

        let mut new_world = None;
        if let Some(patch) = world_patch {
            let world = self
                .store
                .read(&world_doc)
                .await?
                .ok_or_else(|| StateError::NotFound(experience.to_string()))?;
            let mut next = world.clone();
            patch.apply(&mut next)?;
            new_world = Some(next);
        }

        let view = match self.store.read(&view_doc).await? {
            Some(view) => view,
            None => self.bootstrap_view_locked(experience, &view_doc).await?,
        };
        let base_version = snapshot_version_of(&view);

        let mut new_view = view.clone();
        if let Some(patch) = view_patch {
            patch.apply(&mut new_view)?;
        }

        let now_ms = self.clock.now().timestamp_millis();
        let new_version = next_version(now_ms, base_version);
        set_snapshot_version(&mut new_view, new_version);

        if let Some(world) = new_world.as_mut() {
            self.stamp_world(world);
        }

        // Both patches applied cleanly; commit world first, then view.
        if let Some(world) = &new_world {
            self.store.write(&world_doc, world).await?;
        }
        self.store.write(&view_doc, &new_view).await?;

        let mut changes = Vec::new();
        if let Some(patch) = world_patch {
            changes.extend(
                self.deltas
                    .changes(experience, DocKind::World, patch)
                    .await,
            );
        }
        if let Some(patch) = view_patch {
            changes.extend(
                self.deltas
                    .changes(experience, DocKind::PlayerView, patch)
                    .await,
            );
        }

        self.publish_delta(experience, user_id, base_version, new_version, &changes, now_ms)
            .await;

        tracing::debug!(
            experience = %experience,
            user_id = %user_id,
            base_version,
            new_version,
            change_count = changes.len(),
            "State committed"
        );
        Ok(UpdateOutcome {
            new_version,
            changes,
        })
    }

    /// Full experience reset: back up the world, restore it from the
    /// template, and delete every player view.
    pub async fn reset_experience(&self, experience: &str) -> Result<ResetOutcome, StateError> {
        let (backup, new_version) = self.restore_world(experience).await?;
        let views_cleared = self.store.clear_player_views(experience).await?;
        tracing::info!(
            experience = %experience,
            backup = %backup,
            views_cleared,
            "Experience reset"
        );
        Ok(ResetOutcome {
            backup,
            views_cleared,
            new_version,
        })
    }

    /// World-only reset. Player inventories survive, so collected items may
    /// reappear in the restored world; offered for content iteration only.
    pub async fn reset_world(&self, experience: &str) -> Result<ResetOutcome, StateError> {
        let (backup, new_version) = self.restore_world(experience).await?;
        tracing::warn!(experience = %experience, backup = %backup, "World-only reset");
        Ok(ResetOutcome {
            backup,
            views_cleared: 0,
            new_version,
        })
    }

    async fn restore_world(&self, experience: &str) -> Result<(String, i64), StateError> {
        let doc = DocRef::world(experience);
        let _guard = self.lock(&doc).await;

        // Backup strictly before any destructive step.
        let backup = self.store.backup_world(experience).await.map_err(|e| {
            match e {
                StoreError::NotFound => StateError::NotFound(experience.to_string()),
                other => StateError::Store(other),
            }
        })?;
        let mut world = self.store.read_world_template(experience).await.map_err(|e| {
            match e {
                StoreError::NotFound => StateError::NotFound(experience.to_string()),
                other => StateError::Store(other),
            }
        })?;
        let new_version = self.stamp_world(&mut world);
        self.store.write(&doc, &world).await?;
        Ok((backup, new_version))
    }

    async fn bootstrap_view_locked(
        &self,
        experience: &str,
        doc: &DocRef,
    ) -> Result<Value, StateError> {
        // A concurrent bootstrap may have won the lock race.
        if let Some(view) = self.store.read(doc).await? {
            return Ok(view);
        }

        let mut view = match self.store.read_view_template(experience).await? {
            Some(template) => template,
            None => default_view(),
        };
        let now_ms = self.clock.now().timestamp_millis();
        set_snapshot_version(&mut view, next_version(now_ms, 0));
        self.store.write(doc, &view).await?;

        tracing::info!(experience = %experience, "Player view bootstrapped");
        Ok(view)
    }

    /// Bump `metadata._version` and `metadata.last_modified` in place.
    fn stamp_world(&self, world: &mut Value) -> i64 {
        let now = self.clock.now();
        let base = world
            .get("metadata")
            .and_then(|m| m.get("_version"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let new_version = next_version(now.timestamp_millis(), base);

        if !world.get("metadata").is_some_and(Value::is_object) {
            if let Some(obj) = world.as_object_mut() {
                obj.insert("metadata".to_string(), json!({}));
            }
        }
        if let Some(metadata) = world.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert("_version".to_string(), json!(new_version));
            metadata.insert("last_modified".to_string(), json!(now.to_rfc3339()));
        }
        new_version
    }

    async fn publish_delta(
        &self,
        experience: &str,
        user_id: &str,
        base_version: i64,
        snapshot_version: i64,
        changes: &[Change],
        timestamp: i64,
    ) {
        let message = ServerMessage::WorldUpdate {
            version: DELTA_VERSION.to_string(),
            experience: experience.to_string(),
            user_id: user_id.to_string(),
            base_version,
            snapshot_version,
            changes: changes.to_vec(),
            timestamp,
        };
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize delta");
                return;
            }
        };
        // Best-effort: the state write has already committed. A dropped
        // delta surfaces to the client as a base_version gap.
        if let Err(e) = self.bus.publish(&user_subject(user_id), payload).await {
            tracing::warn!(user_id = %user_id, error = %e, "Delta publish failed");
        }
    }

    async fn lock(&self, doc: &DocRef) -> tokio::sync::OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(doc.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }
}

fn snapshot_version_of(view: &Value) -> i64 {
    view.get("snapshot_version").and_then(Value::as_i64).unwrap_or(0)
}

fn set_snapshot_version(view: &mut Value, version: i64) {
    if let Some(obj) = view.as_object_mut() {
        obj.insert("snapshot_version".to_string(), json!(version));
    }
}

/// Built-in initial player view, used when an experience ships no
/// `view.template.json`.
fn default_view() -> Value {
    json!({
        "player": {
            "current_location": null,
            "current_area": null,
            "inventory": []
        },
        "quest_states": {},
        "discovered_areas": []
    })
}

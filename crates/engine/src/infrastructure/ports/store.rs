//! Document storage port.

use async_trait::async_trait;
use serde_json::Value;

use super::error::StoreError;

/// Address of one persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocRef {
    /// The shared world document of an experience.
    World { experience: String },
    /// One player's view of an experience.
    PlayerView { experience: String, user_id: String },
}

impl DocRef {
    pub fn world(experience: impl Into<String>) -> Self {
        DocRef::World {
            experience: experience.into(),
        }
    }

    pub fn player_view(experience: impl Into<String>, user_id: impl Into<String>) -> Self {
        DocRef::PlayerView {
            experience: experience.into(),
            user_id: user_id.into(),
        }
    }
}

/// Persisted JSON documents. Writes are atomic (write-temp-then-rename or
/// equivalent); readers only ever observe whole documents.
///
/// Serialization of concurrent writers is the state manager's job, not the
/// store's; the store only guarantees that each individual write is atomic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, doc: &DocRef) -> Result<Option<Value>, StoreError>;
    async fn write(&self, doc: &DocRef, value: &Value) -> Result<(), StoreError>;

    /// The pristine world template (`state/world.template.json`).
    async fn read_world_template(&self, experience: &str) -> Result<Value, StoreError>;

    /// The optional per-experience initial player view
    /// (`state/view.template.json`).
    async fn read_view_template(&self, experience: &str) -> Result<Option<Value>, StoreError>;

    /// Copy the live world document to a timestamped backup, pruning to the
    /// five most recent. Returns the backup file name.
    async fn backup_world(&self, experience: &str) -> Result<String, StoreError>;

    /// Delete every player view of the experience, returning how many were
    /// removed.
    async fn clear_player_views(&self, experience: &str) -> Result<usize, StoreError>;
}

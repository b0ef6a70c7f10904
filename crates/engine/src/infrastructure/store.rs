//! Filesystem document store.
//!
//! Documents live as pretty-printed JSON under the content root using the
//! fixed layout:
//!
//! ```text
//! <root>/<experience>/state/world.json
//! <root>/<experience>/state/world.template.json
//! <root>/<experience>/state/world.<UTC-ts>.json   (backups, newest five)
//! <root>/<experience>/state/view.template.json    (optional)
//! <root>/players/<user_id>/<experience>/view.json
//! ```
//!
//! Every write goes to a temp file first and is renamed into place, so
//! readers only ever observe whole documents.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::ports::{DocRef, DocumentStore, StoreError};

const WORLD_FILE: &str = "world.json";
const WORLD_TEMPLATE_FILE: &str = "world.template.json";
const VIEW_TEMPLATE_FILE: &str = "view.template.json";
const BACKUPS_RETAINED: usize = 5;

pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn state_dir(&self, experience: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(safe_segment(experience)?).join("state"))
    }

    fn doc_path(&self, doc: &DocRef) -> Result<PathBuf, StoreError> {
        match doc {
            DocRef::World { experience } => Ok(self.state_dir(experience)?.join(WORLD_FILE)),
            DocRef::PlayerView {
                experience,
                user_id,
            } => Ok(self
                .root
                .join("players")
                .join(safe_segment(user_id)?)
                .join(safe_segment(experience)?)
                .join("view.json")),
        }
    }

    async fn read_path(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_path(&self, path: &Path, value: &Value) -> Result<(), StoreError> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::Io("document path has no parent".into()))?;
        tokio::fs::create_dir_all(parent).await?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Backup file names sorted oldest-first.
    async fn list_backups(&self, experience: &str) -> Result<Vec<String>, StoreError> {
        let state_dir = self.state_dir(experience)?;
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&state_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_backup_name(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, doc: &DocRef) -> Result<Option<Value>, StoreError> {
        self.read_path(&self.doc_path(doc)?).await
    }

    async fn write(&self, doc: &DocRef, value: &Value) -> Result<(), StoreError> {
        self.write_path(&self.doc_path(doc)?, value).await
    }

    async fn read_world_template(&self, experience: &str) -> Result<Value, StoreError> {
        let path = self.state_dir(experience)?.join(WORLD_TEMPLATE_FILE);
        self.read_path(&path).await?.ok_or(StoreError::NotFound)
    }

    async fn read_view_template(&self, experience: &str) -> Result<Option<Value>, StoreError> {
        let path = self.state_dir(experience)?.join(VIEW_TEMPLATE_FILE);
        self.read_path(&path).await
    }

    async fn backup_world(&self, experience: &str) -> Result<String, StoreError> {
        let state_dir = self.state_dir(experience)?;
        let world = state_dir.join(WORLD_FILE);
        if !tokio::fs::try_exists(&world).await? {
            return Err(StoreError::NotFound);
        }

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
        let backup_name = format!("world.{stamp}.json");
        tokio::fs::copy(&world, state_dir.join(&backup_name)).await?;

        let backups = self.list_backups(experience).await?;
        if backups.len() > BACKUPS_RETAINED {
            for stale in &backups[..backups.len() - BACKUPS_RETAINED] {
                tokio::fs::remove_file(state_dir.join(stale)).await?;
            }
        }

        tracing::info!(experience = %experience, backup = %backup_name, "World backed up");
        Ok(backup_name)
    }

    async fn clear_player_views(&self, experience: &str) -> Result<usize, StoreError> {
        let players_dir = self.root.join("players");
        let experience = safe_segment(experience)?;
        let mut removed = 0;

        let mut entries = match tokio::fs::read_dir(&players_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let view_dir = entry.path().join(experience);
            match tokio::fs::remove_dir_all(&view_dir).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(experience = %experience, removed, "Player views cleared");
        Ok(removed)
    }
}

/// Reject identifiers that would escape the content root.
fn safe_segment(segment: &str) -> Result<&str, StoreError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(StoreError::Io(format!("invalid path segment: {segment:?}")));
    }
    Ok(segment)
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with("world.")
        && name.ends_with(".json")
        && name != WORLD_FILE
        && name != WORLD_TEMPLATE_FILE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, FsDocumentStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsDocumentStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, store) = store();
        let doc = DocRef::world("wylding-woods");
        let value = json!({"metadata": {"_version": 1}});

        store.write(&doc, &value).await.expect("write");
        let read = store.read(&doc).await.expect("read").expect("present");
        assert_eq!(read, value);
    }

    #[tokio::test]
    async fn missing_document_reads_as_none() {
        let (_dir, store) = store();
        let read = store.read(&DocRef::world("nowhere")).await.expect("read");
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn player_views_live_under_the_players_tree() {
        let (dir, store) = store();
        let doc = DocRef::player_view("wylding-woods", "alice");
        store.write(&doc, &json!({"snapshot_version": 1})).await.expect("write");
        assert!(dir
            .path()
            .join("players/alice/wylding-woods/view.json")
            .exists());
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let (dir, store) = store();
        let doc = DocRef::world("wylding-woods");
        store.write(&doc, &json!({})).await.expect("write");
        assert!(!dir
            .path()
            .join("wylding-woods/state/world.json.tmp")
            .exists());
    }

    #[tokio::test]
    async fn backups_rotate_to_five() {
        let (dir, store) = store();
        let doc = DocRef::world("wylding-woods");
        store.write(&doc, &json!({"n": 0})).await.expect("write");
        // Also plant a template to prove it survives pruning.
        tokio::fs::write(
            dir.path().join("wylding-woods/state/world.template.json"),
            "{}",
        )
        .await
        .expect("plant template");

        let mut last = String::new();
        for _ in 0..7 {
            last = store.backup_world("wylding-woods").await.expect("backup");
            // Distinct millisecond stamps.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let backups = store.list_backups("wylding-woods").await.expect("list");
        assert_eq!(backups.len(), 5);
        assert_eq!(backups.last(), Some(&last));
        assert!(dir
            .path()
            .join("wylding-woods/state/world.template.json")
            .exists());
    }

    #[tokio::test]
    async fn clear_player_views_counts_removed_users() {
        let (_dir, store) = store();
        for user in ["alice", "bob"] {
            store
                .write(
                    &DocRef::player_view("wylding-woods", user),
                    &json!({"snapshot_version": 1}),
                )
                .await
                .expect("write");
        }
        store
            .write(&DocRef::player_view("other-exp", "alice"), &json!({}))
            .await
            .expect("write");

        let removed = store
            .clear_player_views("wylding-woods")
            .await
            .expect("clear");
        assert_eq!(removed, 2);

        // The other experience's view survives.
        assert!(store
            .read(&DocRef::player_view("other-exp", "alice"))
            .await
            .expect("read")
            .is_some());
        assert!(store
            .read(&DocRef::player_view("wylding-woods", "alice"))
            .await
            .expect("read")
            .is_none());
    }

    #[tokio::test]
    async fn corrupt_document_is_a_serialization_error() {
        let (dir, store) = store();
        let state_dir = dir.path().join("wylding-woods/state");
        tokio::fs::create_dir_all(&state_dir).await.expect("mkdir");
        tokio::fs::write(state_dir.join("world.json"), b"{not json")
            .await
            .expect("plant corrupt file");

        let err = store
            .read(&DocRef::world("wylding-woods"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn traversal_segments_are_rejected() {
        let (_dir, store) = store();
        let err = store
            .read(&DocRef::world("../escape"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, StoreError::Io(_)));
    }
}

use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{Result, StoryError};
use crate::manifest::types::{Manifest, StoryFileRecord};
use crate::utils::{to_tab_pretty_json, write_atomic};

/// Owner of the story manifest.
///
/// All reads and writes go through one in-memory [`Manifest`] behind a mutex.
/// Each mutation is applied to a copy, written to disk while the lock is held,
/// and only then swapped in. Readers never see a state that failed to persist.
pub struct ManifestStore {
    path: PathBuf,
    manifest: Mutex<Manifest>,
}

impl ManifestStore {
    /// Load the manifest document. It must already exist and parse.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let unavailable = |reason: String| StoryError::ManifestUnavailable {
            path: path.clone(),
            reason,
        };

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(|e| unavailable(e.to_string()))?;

        tracing::info!(
            path = %path.display(),
            files = manifest.files.len(),
            "Loaded story manifest"
        );

        Ok(Self {
            path,
            manifest: Mutex::new(manifest),
        })
    }

    /// Build a store around an in-memory manifest, written to `path` on the
    /// first mutation.
    pub fn with_manifest(path: impl Into<PathBuf>, manifest: Manifest) -> Self {
        Self {
            path: path.into(),
            manifest: Mutex::new(manifest),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a new record, or refresh title, stories and metadata of an
    /// existing one. `fullPath` and `relativePath` are fixed by the first insert.
    pub async fn upsert(&self, record: StoryFileRecord) -> Result<()> {
        let mut manifest = self.manifest.lock().await;
        let mut next = manifest.clone();

        match next.files.get_mut(&record.id) {
            Some(existing) => {
                existing.title = record.title;
                existing.stories = record.stories;
                existing.metadata.extend(record.metadata);
            }
            None => {
                next.files.insert(record.id.clone(), record);
            }
        }

        self.persist(&next).await?;
        *manifest = next;
        Ok(())
    }

    /// Drop the record for `id`. Returns whether anything was removed; an
    /// unknown id leaves the document untouched.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let mut manifest = self.manifest.lock().await;
        if !manifest.files.contains_key(id) {
            return Ok(false);
        }

        let mut next = manifest.clone();
        next.files.shift_remove(id);
        self.persist(&next).await?;
        *manifest = next;
        Ok(true)
    }

    /// All records, in manifest key order.
    pub async fn list(&self) -> Vec<StoryFileRecord> {
        let manifest = self.manifest.lock().await;
        manifest.files.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<StoryFileRecord> {
        let manifest = self.manifest.lock().await;
        manifest.files.get(id).cloned()
    }

    /// The record owning the story with the given `<fileId>_<name>` id.
    pub async fn find_story(&self, story_id: &str) -> Option<StoryFileRecord> {
        let manifest = self.manifest.lock().await;
        manifest
            .files
            .values()
            .find(|record| record.stories.iter().any(|s| s.id == story_id))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.manifest.lock().await.files.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, manifest: &Manifest) -> Result<()> {
        let write_err = |source| StoryError::ManifestWrite {
            path: self.path.clone(),
            source,
        };
        let bytes = to_tab_pretty_json(manifest)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        write_atomic(&self.path, &bytes).await.map_err(write_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::types::{MetadataValue, StorySummary};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(id: &str, title: &str) -> StoryFileRecord {
        StoryFileRecord {
            id: id.to_string(),
            full_path: format!("/work/{}.stories.tsx", id),
            relative_path: format!("{}.stories.tsx", id),
            title: title.to_string(),
            stories: vec![StorySummary::new(id, "Default")],
            metadata: BTreeMap::new(),
        }
    }

    async fn empty_store(dir: &TempDir) -> ManifestStore {
        let path = dir.path().join("storyManifest.json");
        std::fs::write(&path, r#"{ "files": {} }"#).unwrap();
        ManifestStore::load(&path).await.unwrap()
    }

    #[tokio::test]
    async fn test_load_missing_manifest_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = ManifestStore::load(temp_dir.path().join("storyManifest.json")).await;
        assert!(matches!(result, Err(StoryError::ManifestUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_load_corrupt_manifest_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("storyManifest.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = ManifestStore::load(&path).await;
        assert!(matches!(result, Err(StoryError::ManifestUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_upsert_preserves_origin_fields() {
        let temp_dir = TempDir::new().unwrap();
        let store = empty_store(&temp_dir).await;

        store.upsert(record("foo", "First")).await.unwrap();

        let mut moved = record("foo", "Second");
        moved.full_path = "/elsewhere/foo.stories.tsx".to_string();
        moved.relative_path = "elsewhere/foo.stories.tsx".to_string();
        store.upsert(moved).await.unwrap();

        let stored = store.get("foo").await.unwrap();
        assert_eq!(stored.title, "Second");
        assert_eq!(stored.full_path, "/work/foo.stories.tsx");
        assert_eq!(stored.relative_path, "foo.stories.tsx");
    }

    #[tokio::test]
    async fn test_upsert_merges_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let store = empty_store(&temp_dir).await;

        let mut first = record("foo", "Foo");
        first
            .metadata
            .insert("order".to_string(), MetadataValue::Number(1.into()));
        first
            .metadata
            .insert("group".to_string(), MetadataValue::String("media".into()));
        store.upsert(first).await.unwrap();

        let mut second = record("foo", "Foo");
        second
            .metadata
            .insert("order".to_string(), MetadataValue::Number(2.into()));
        store.upsert(second).await.unwrap();

        let stored = store.get("foo").await.unwrap();
        assert_eq!(stored.metadata["order"], MetadataValue::Number(2.into()));
        assert_eq!(
            stored.metadata["group"],
            MetadataValue::String("media".into())
        );
    }

    #[tokio::test]
    async fn test_remove_unknown_id_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = empty_store(&temp_dir).await;
        store.upsert(record("foo", "Foo")).await.unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        let removed = store.remove("nonexistent").await.unwrap();

        assert!(!removed);
        assert_eq!(store.len().await, 1);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_list_reflects_final_set() {
        let temp_dir = TempDir::new().unwrap();
        let store = empty_store(&temp_dir).await;

        store.upsert(record("a", "A")).await.unwrap();
        store.upsert(record("b", "B")).await.unwrap();
        store.upsert(record("c", "C")).await.unwrap();
        assert!(store.remove("b").await.unwrap());
        store.upsert(record("a", "A2")).await.unwrap();

        let ids: Vec<_> = store.list().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_every_mutation_is_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let store = empty_store(&temp_dir).await;

        store.upsert(record("foo", "Foo")).await.unwrap();
        let reloaded = ManifestStore::load(store.path()).await.unwrap();
        assert_eq!(reloaded.get("foo").await.unwrap().title, "Foo");

        store.remove("foo").await.unwrap();
        let reloaded = ManifestStore::load(store.path()).await.unwrap();
        assert!(reloaded.is_empty().await);

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\n\t\"files\""));
    }

    #[tokio::test]
    async fn test_load_tolerates_nested_extra_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("storyManifest.json");
        std::fs::write(
            &path,
            r#"{"files":{"a":{"id":"a","fullPath":"/a.stories.tsx","relativePath":"a.stories.tsx","title":"A","stories":[],"group":"media","parameters":{"layout":"centered"}}}}"#,
        )
        .unwrap();

        let store = ManifestStore::load(&path).await.unwrap();

        let record = store.get("a").await.unwrap();
        assert_eq!(record.metadata["group"], MetadataValue::String("media".into()));
        assert!(!record.metadata.contains_key("parameters"));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("storyManifest.json");
        let store = ManifestStore::with_manifest(&path, Manifest::default());

        let result = store.upsert(record("foo", "Foo")).await;

        assert!(matches!(result, Err(StoryError::ManifestWrite { .. })));
        assert!(store.is_empty().await);
        assert!(store.get("foo").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_remove_keeps_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("storyManifest.json");
        let mut manifest = Manifest::default();
        manifest.files.insert("foo".to_string(), record("foo", "Foo"));
        let store = ManifestStore::with_manifest(&path, manifest);

        assert!(store.remove("foo").await.is_err());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_story_by_story_id() {
        let temp_dir = TempDir::new().unwrap();
        let store = empty_store(&temp_dir).await;
        store.upsert(record("foo", "Foo")).await.unwrap();

        let found = store.find_story("foo_Default").await.unwrap();
        assert_eq!(found.id, "foo");
        assert!(store.find_story("foo_Missing").await.is_none());
    }
}

//! Filesystem-to-manifest reconciliation.
//!
//! Each story file moves `Unseen -> Indexed -> Removed`. Events are applied
//! strictly in the order received, one at a time, and the loader artifact is
//! rewritten after every transition.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::error::{Result, StoryError};
use crate::extractor::StoryExtractor;
use crate::fs_watcher::{WatchEvent, WatchEventKind};
use crate::loader::LoaderArtifact;
use crate::manifest::ManifestStore;
use crate::story_files::StoryFileMatcher;
use crate::story_id::derive_id;
use crate::utils::slash_path;

pub struct Reconciler {
    watch_root: PathBuf,
    store: Arc<ManifestStore>,
    extractor: Arc<dyn StoryExtractor>,
    loader: LoaderArtifact,
}

impl Reconciler {
    pub fn new(
        watch_root: impl Into<PathBuf>,
        store: Arc<ManifestStore>,
        extractor: Arc<dyn StoryExtractor>,
        loader: LoaderArtifact,
    ) -> Self {
        Self {
            watch_root: watch_root.into(),
            store,
            extractor,
            loader,
        }
    }

    pub fn store(&self) -> &Arc<ManifestStore> {
        &self.store
    }

    /// Index every story file currently under the watch root.
    pub async fn initial_scan(&self, matcher: &StoryFileMatcher) -> Result<usize> {
        let found = matcher.scan();
        let mut indexed = 0;

        for relative_path in &found {
            if self.index_file(relative_path).await? {
                indexed += 1;
            }
        }
        if found.is_empty() {
            self.regenerate_loader().await?;
        }

        tracing::info!(
            found = found.len(),
            indexed,
            manifest_files = self.store.len().await,
            "Initial story scan complete"
        );
        Ok(indexed)
    }

    /// Apply one watcher event.
    pub async fn apply(&self, event: &WatchEvent) -> Result<()> {
        match event.kind {
            WatchEventKind::Add | WatchEventKind::Change => {
                self.index_file(&event.relative_path).await?;
            }
            WatchEventKind::Delete => {
                self.remove_file(&event.relative_path).await?;
            }
        }
        Ok(())
    }

    /// Re-extract one file and upsert it. Returns `false` when the file could
    /// not be read and the event was skipped.
    pub async fn index_file(&self, relative_path: &Path) -> Result<bool> {
        let full_path = self.watch_root.join(relative_path);
        let full_path_str = full_path.to_string_lossy().to_string();
        let relative_str = slash_path(relative_path);

        let source = match tokio::fs::read_to_string(&full_path).await {
            Ok(source) => source,
            Err(source) => {
                let err = StoryError::FileIo {
                    path: full_path.clone(),
                    source,
                };
                tracing::warn!(relative_path = %relative_str, error = %err, "Skipping unreadable story file");
                return Ok(false);
            }
        };

        let extraction = self
            .extractor
            .extract_or_empty(&source, &relative_str, &full_path_str);
        let story_count = extraction.stories.len();
        let record = extraction.into_record(&full_path_str, &relative_str);
        let id = record.id.clone();

        self.store.upsert(record).await?;
        self.regenerate_loader().await?;

        tracing::info!(relative_path = %relative_str, %id, stories = story_count, "Indexed story file");
        Ok(true)
    }

    /// Drop a file from the manifest. The event is trusted; the disk is not
    /// re-checked.
    pub async fn remove_file(&self, relative_path: &Path) -> Result<bool> {
        let full_path = self.watch_root.join(relative_path);
        let id = derive_id(&full_path.to_string_lossy());

        let removed = self.store.remove(&id).await?;
        self.regenerate_loader().await?;

        tracing::info!(relative_path = %slash_path(relative_path), %id, removed, "Removed story file");
        Ok(removed)
    }

    pub async fn regenerate_loader(&self) -> Result<()> {
        let records = self.store.list().await;
        self.loader.write(&records).await
    }

    /// Consume events until the channel closes or shutdown is signalled.
    /// On shutdown, events already queued are still applied.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.apply_logged(&event).await,
                    None => break,
                },
                _ = shutdown.changed() => {
                    events.close();
                    let mut drained = 0;
                    while let Some(event) = events.recv().await {
                        self.apply_logged(&event).await;
                        drained += 1;
                    }
                    tracing::info!(drained, "Reconciliation loop drained");
                    break;
                }
            }
        }
    }

    async fn apply_logged(&self, event: &WatchEvent) {
        if let Err(e) = self.apply(event).await {
            tracing::error!(
                relative_path = %event.relative_path.display(),
                kind = ?event.kind,
                error = %e,
                "Failed to reconcile story file"
            );
        }
    }
}

pub mod config;
pub mod error;
pub mod extractor;
pub mod fs_watcher;
pub mod loader;
pub mod manifest;
pub mod push_channel;
pub mod reconciler;
pub mod story_files;
pub mod story_id;
pub mod sync_server;
pub mod tree_sitter;
pub mod utils;

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::extractor::TreeSitterExtractor;
use crate::fs_watcher::StoryWatcher;
use crate::loader::LoaderArtifact;
use crate::manifest::{Manifest, ManifestStore, StoryFileRecord};
use crate::push_channel::ChannelRegistry;
use crate::reconciler::Reconciler;
use crate::story_files::StoryFileMatcher;
use crate::sync_server::AppState;
use crate::utils::to_tab_pretty_json;

pub use error::StoryError;

fn build_reconciler(config: &ServerConfig, store: Arc<ManifestStore>) -> Reconciler {
    Reconciler::new(
        &config.watch_root,
        store,
        Arc::new(TreeSitterExtractor::new()),
        LoaderArtifact::new(config.loader_path()),
    )
}

/// Load the manifest, index the watch root, then keep the manifest in sync
/// and serve it until `shutdown` resolves.
pub async fn run_server<F>(config: &ServerConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let store = Arc::new(ManifestStore::load(config.manifest_path()).await?);
    let matcher = StoryFileMatcher::new(&config.watch_root)?;
    let reconciler = Arc::new(build_reconciler(config, store.clone()));

    // Watch before scanning so nothing changed mid-scan is missed; the queued
    // events are applied once the scan is done.
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let watcher = StoryWatcher::start(matcher.clone(), event_tx)?;
    reconciler.initial_scan(&matcher).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_task = {
        let reconciler = reconciler.clone();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { reconciler.run(event_rx, shutdown_rx).await })
    };

    tokio::spawn(async move {
        shutdown.await;
        tracing::info!("Shutdown requested");
        drop(watcher);
        let _ = shutdown_tx.send(true);
    });

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let state = AppState::new(store, Arc::new(ChannelRegistry::new()));
    sync_server::serve(listener, state, shutdown_rx).await?;

    if let Err(e) = loop_task.await {
        tracing::error!(error = %e, "Reconciliation loop ended abnormally");
    }
    tracing::info!("Story server stopped");
    Ok(())
}

/// What `init_project` created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitReport {
    pub created_manifest: bool,
    pub created_loader: bool,
}

/// Create the stories directory with an empty manifest and loader, leaving
/// existing files alone.
pub async fn init_project(config: &ServerConfig) -> Result<InitReport> {
    tokio::fs::create_dir_all(config.stories_dir_path()).await?;
    let mut report = InitReport::default();

    let manifest_path = config.manifest_path();
    if !tokio::fs::try_exists(&manifest_path).await? {
        let bytes = to_tab_pretty_json(&Manifest::default())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        utils::write_atomic(&manifest_path, &bytes)
            .await
            .map_err(|source| StoryError::ManifestWrite {
                path: manifest_path.clone(),
                source,
            })?;
        report.created_manifest = true;
    }

    let loader = LoaderArtifact::new(config.loader_path());
    if !tokio::fs::try_exists(loader.path()).await? {
        loader.write(&[]).await?;
        report.created_loader = true;
    }

    tracing::info!(
        stories_dir = %config.stories_dir_path().display(),
        created_manifest = report.created_manifest,
        created_loader = report.created_loader,
        "Initialized stories directory"
    );
    Ok(report)
}

/// One-shot index of the watch root; returns the resulting manifest entries.
pub async fn index_once(config: &ServerConfig) -> Result<Vec<StoryFileRecord>> {
    let store = Arc::new(ManifestStore::load(config.manifest_path()).await?);
    let matcher = StoryFileMatcher::new(&config.watch_root)?;
    let reconciler = build_reconciler(config, store.clone());

    reconciler.initial_scan(&matcher).await?;
    Ok(store.list().await)
}

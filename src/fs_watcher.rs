use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::story_files::StoryFileMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Change,
    Delete,
}

/// A change to one story file, relative to the watch root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub relative_path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, relative_path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            relative_path: relative_path.into(),
        }
    }
}

/// Recursive watch on the story root. Dropping it stops delivery.
pub struct StoryWatcher {
    _watcher: RecommendedWatcher,
}

impl StoryWatcher {
    /// Start watching and forward story-file events to `tx` in delivery order.
    pub fn start(matcher: StoryFileMatcher, tx: mpsc::UnboundedSender<WatchEvent>) -> Result<Self> {
        let root = matcher.root().to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for story_event in translate(&event, &matcher) {
                        if tx.send(story_event).is_err() {
                            // reconciliation loop is gone; nothing left to notify
                            return;
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "File watcher error"),
            },
            Config::default(),
        )?;

        watcher.watch(&root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "Watching for story file changes");

        Ok(Self { _watcher: watcher })
    }
}

/// Map one notify event onto story-file events. Renames become a delete of
/// the old path followed by an add of the new one.
pub fn translate(event: &Event, matcher: &StoryFileMatcher) -> Vec<WatchEvent> {
    let mut raw: Vec<(WatchEventKind, &Path)> = Vec::new();

    match event.kind {
        EventKind::Create(_) => {
            raw.extend(event.paths.iter().map(|p| (WatchEventKind::Add, p.as_path())));
        }
        EventKind::Remove(_) => {
            raw.extend(event.paths.iter().map(|p| (WatchEventKind::Delete, p.as_path())));
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
            (RenameMode::Both, [from, to]) => {
                raw.push((WatchEventKind::Delete, from.as_path()));
                raw.push((WatchEventKind::Add, to.as_path()));
            }
            (RenameMode::From, paths) => {
                raw.extend(paths.iter().map(|p| (WatchEventKind::Delete, p.as_path())));
            }
            (RenameMode::To, paths) => {
                raw.extend(paths.iter().map(|p| (WatchEventKind::Add, p.as_path())));
            }
            (_, paths) => {
                raw.extend(paths.iter().map(|p| {
                    let kind = if p.exists() {
                        WatchEventKind::Add
                    } else {
                        WatchEventKind::Delete
                    };
                    (kind, p.as_path())
                }));
            }
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => {}
        EventKind::Modify(_) => {
            raw.extend(event.paths.iter().map(|p| (WatchEventKind::Change, p.as_path())));
        }
        EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
    }

    raw.into_iter()
        .filter(|(_, path)| matcher.is_story_file(path))
        .filter_map(|(kind, path)| {
            matcher
                .relative_path(path)
                .map(|relative| WatchEvent::new(kind, relative))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn matcher(root: &Path) -> StoryFileMatcher {
        StoryFileMatcher::new(root).unwrap()
    }

    #[test]
    fn test_translate_create_modify_remove() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let m = matcher(root);
        let story = root.join("src/Video.stories.tsx");

        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(story.clone());
        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(story.clone());
        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(story.clone());

        let rel = PathBuf::from("src/Video.stories.tsx");
        assert_eq!(translate(&create, &m), vec![WatchEvent::new(WatchEventKind::Add, rel.clone())]);
        assert_eq!(translate(&modify, &m), vec![WatchEvent::new(WatchEventKind::Change, rel.clone())]);
        assert_eq!(translate(&remove, &m), vec![WatchEvent::new(WatchEventKind::Delete, rel)]);
    }

    #[test]
    fn test_translate_rename_is_delete_then_add() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let m = matcher(root);

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join("Old.stories.tsx"))
            .add_path(root.join("New.stories.tsx"));

        assert_eq!(
            translate(&rename, &m),
            vec![
                WatchEvent::new(WatchEventKind::Delete, "Old.stories.tsx"),
                WatchEvent::new(WatchEventKind::Add, "New.stories.tsx"),
            ]
        );
    }

    #[test]
    fn test_translate_ignores_noise() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let m = matcher(root);

        let metadata = Event::new(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))
            .add_path(root.join("A.stories.tsx"));
        let other_file =
            Event::new(EventKind::Create(CreateKind::File)).add_path(root.join("A.tsx"));
        let dependency = Event::new(EventKind::Create(CreateKind::File))
            .add_path(root.join("node_modules/x/A.stories.tsx"));
        let hidden = Event::new(EventKind::Create(CreateKind::File))
            .add_path(root.join(".storybook/Hidden.stories.tsx"));

        assert!(translate(&metadata, &m).is_empty());
        assert!(translate(&other_file, &m).is_empty());
        assert!(translate(&dependency, &m).is_empty());
        assert!(translate(&hidden, &m).is_empty());
    }

    #[tokio::test]
    async fn test_watcher_reports_new_story_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = fs::canonicalize(temp_dir.path()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _watcher = StoryWatcher::start(matcher(&root), tx).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(root.join("Fresh.stories.tsx"), "export const A = 1;").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher did not report the new file")
            .unwrap();
        assert_eq!(event.relative_path, PathBuf::from("Fresh.stories.tsx"));
        assert!(matches!(event.kind, WatchEventKind::Add | WatchEventKind::Change));
    }
}

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StoryError};
use crate::extractor::STORY_EXTENSIONS;

/// Directory names never searched for stories (dependencies and native
/// platform projects).
pub const EXCLUDED_DIRS: [&str; 3] = ["node_modules", "ios", "android"];

/// Decides which paths under the watch root are story files.
#[derive(Clone)]
pub struct StoryFileMatcher {
    root: PathBuf,
    excluded: Gitignore,
}

impl StoryFileMatcher {
    pub fn new(root: &Path) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for dir in EXCLUDED_DIRS {
            builder
                .add_line(None, &format!("{}/", dir))
                .map_err(|e| StoryError::Config {
                    message: format!("bad exclusion pattern for {}: {}", dir, e),
                })?;
        }
        let excluded = builder.build().map_err(|e| StoryError::Config {
            message: format!("failed to build exclusion matcher: {}", e),
        })?;

        Ok(Self {
            root: root.to_path_buf(),
            excluded,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` relative to the watch root, if it lies under it.
    pub fn relative_path(&self, path: &Path) -> Option<PathBuf> {
        if path.is_absolute() {
            path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
        } else {
            Some(path.to_path_buf())
        }
    }

    /// Whether `path` (absolute or root-relative) names a story file outside
    /// every excluded and hidden directory. Agrees with what [`scan`] finds.
    ///
    /// [`scan`]: StoryFileMatcher::scan
    pub fn is_story_file(&self, path: &Path) -> bool {
        let Some(relative) = self.relative_path(path) else {
            return false;
        };
        has_story_suffix(&relative)
            && !is_hidden(&relative)
            && !self
                .excluded
                .matched_path_or_any_parents(&relative, false)
                .is_ignore()
    }

    /// All story files currently under the root, as sorted relative paths.
    pub fn scan(&self) -> Vec<PathBuf> {
        let root = self.root.clone();
        let excluded = self.excluded.clone();

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .hidden(true)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false);
                if !is_dir {
                    return true;
                }
                match entry.path().strip_prefix(&root) {
                    Ok(rel) if !rel.as_os_str().is_empty() => {
                        !excluded.matched(rel, true).is_ignore()
                    }
                    _ => true,
                }
            })
            .build();

        let mut found = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable entry during scan");
                    continue;
                }
            };
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(relative) = self.relative_path(entry.path()) {
                if has_story_suffix(&relative) {
                    found.push(relative);
                }
            }
        }

        found.sort();
        found
    }
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|c| match c {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

fn has_story_suffix(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    STORY_EXTENSIONS
        .iter()
        .any(|ext| name.ends_with(&format!(".stories.{}", ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export const A = 1;").unwrap();
    }

    #[test]
    fn test_story_suffixes() {
        let temp = tempdir().unwrap();
        let matcher = StoryFileMatcher::new(temp.path()).unwrap();

        assert!(matcher.is_story_file(Path::new("src/Video.stories.tsx")));
        assert!(matcher.is_story_file(Path::new("Audio.stories.js")));
        assert!(matcher.is_story_file(Path::new("a/B.stories.ts")));
        assert!(matcher.is_story_file(Path::new("a/B.stories.jsx")));
        assert!(!matcher.is_story_file(Path::new("src/Video.tsx")));
        assert!(!matcher.is_story_file(Path::new("src/Video.stories.md")));
    }

    #[test]
    fn test_excluded_directories() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let matcher = StoryFileMatcher::new(root).unwrap();

        assert!(!matcher.is_story_file(&root.join("node_modules/pkg/X.stories.tsx")));
        assert!(!matcher.is_story_file(&root.join("example/ios/Pods/X.stories.js")));
        assert!(!matcher.is_story_file(&root.join("android/app/X.stories.ts")));
        assert!(matcher.is_story_file(&root.join("src/iosish/X.stories.ts")));
    }

    #[test]
    fn test_hidden_paths_are_rejected() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        let matcher = StoryFileMatcher::new(root).unwrap();

        assert!(!matcher.is_story_file(&root.join(".storybook/Hidden.stories.tsx")));
        assert!(!matcher.is_story_file(Path::new("src/.cache/X.stories.js")));
        assert!(!matcher.is_story_file(Path::new(".X.stories.ts")));
    }

    #[test]
    fn test_scan_and_matcher_agree_on_hidden_dirs() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        touch(root, ".storybook/Hidden.stories.tsx");
        touch(root, "src/Shown.stories.tsx");
        let matcher = StoryFileMatcher::new(root).unwrap();

        for rel in matcher.scan() {
            assert!(matcher.is_story_file(&rel));
        }
        assert_eq!(matcher.scan(), vec![PathBuf::from("src/Shown.stories.tsx")]);
        assert!(!matcher.is_story_file(&root.join(".storybook/Hidden.stories.tsx")));
    }

    #[test]
    fn test_paths_outside_root_are_rejected() {
        let temp = tempdir().unwrap();
        let matcher = StoryFileMatcher::new(&temp.path().join("watched")).unwrap();
        assert!(!matcher.is_story_file(&temp.path().join("other/X.stories.tsx")));
    }

    #[test]
    fn test_scan_finds_story_files() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        touch(root, "src/Video.stories.tsx");
        touch(root, "src/__stories__/Audio.stories.tsx");
        touch(root, "src/Video.tsx");
        touch(root, "node_modules/dep/Dep.stories.js");
        touch(root, "ios/Native.stories.js");
        touch(root, ".hidden/Secret.stories.js");

        let matcher = StoryFileMatcher::new(root).unwrap();
        let found = matcher.scan();

        assert_eq!(
            found,
            vec![
                PathBuf::from("src/Video.stories.tsx"),
                PathBuf::from("src/__stories__/Audio.stories.tsx"),
            ]
        );
    }
}

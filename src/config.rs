use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, StoryError};

pub const DEFAULT_PORT: u16 = 7001;
pub const DEFAULT_STORIES_DIR: &str = ".stories";
pub const MANIFEST_FILE_NAME: &str = "storyManifest.json";
pub const LOADER_FILE_NAME: &str = "stories.js";

/// The `expoStories` block of a project's package.json.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageStoriesConfig {
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    #[serde(default)]
    pub watch_root: Option<PathBuf>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub stories_dir: Option<String>,
}

#[derive(Deserialize)]
struct PackageJson {
    #[serde(default, rename = "expoStories")]
    expo_stories: Option<PackageStoriesConfig>,
}

/// Values given on the command line (or through their environment variables).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project_root: Option<PathBuf>,
    pub watch_root: Option<PathBuf>,
    pub port: Option<u16>,
    pub stories_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub project_root: PathBuf,
    pub watch_root: PathBuf,
    pub port: u16,
    pub stories_dir: String,
}

impl ServerConfig {
    pub fn stories_dir_path(&self) -> PathBuf {
        self.project_root.join(&self.stories_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.stories_dir_path().join(MANIFEST_FILE_NAME)
    }

    pub fn loader_path(&self) -> PathBuf {
        self.stories_dir_path().join(LOADER_FILE_NAME)
    }

    /// Build the effective config: defaults, then `package.json`, then overrides.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let base = overrides
            .project_root
            .as_deref()
            .map(|p| absolutize(&cwd, p))
            .unwrap_or_else(|| cwd.clone());

        let package = load_package_config(&base.join("package.json"))?.unwrap_or_default();

        let project_root = match (&overrides.project_root, &package.project_root) {
            (Some(_), _) | (None, None) => base.clone(),
            (None, Some(p)) => absolutize(&base, p),
        };
        let watch_root = match (&overrides.watch_root, &package.watch_root) {
            (Some(p), _) => absolutize(&cwd, p),
            (None, Some(p)) => absolutize(&base, p),
            (None, None) => project_root.clone(),
        };

        Ok(Self {
            project_root: canonical_or_self(project_root),
            watch_root: canonical_or_self(watch_root),
            port: overrides.port.or(package.port).unwrap_or(DEFAULT_PORT),
            stories_dir: overrides
                .stories_dir
                .clone()
                .or(package.stories_dir)
                .unwrap_or_else(|| DEFAULT_STORIES_DIR.to_string()),
        })
    }
}

/// Read the `expoStories` block of a package.json. A missing file or key is
/// `None`; unparseable JSON is an error.
pub fn load_package_config(path: &Path) -> Result<Option<PackageStoriesConfig>> {
    let Ok(bytes) = fs::read(path) else {
        return Ok(None);
    };
    let package: PackageJson = serde_json::from_slice(&bytes).map_err(|e| StoryError::Config {
        message: format!("{}: {}", path.display(), e),
    })?;
    Ok(package.expo_stories)
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn canonical_or_self(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}

//! Story extraction from source text.
//!
//! [`StoryExtractor`] is the seam for language frontends. The default
//! [`TreeSitterExtractor`] handles TypeScript and JavaScript story files.

use std::collections::BTreeMap;

use crate::error::{Result, StoryError};
use crate::manifest::{MetadataValue, StoryFileRecord, StorySummary, RESERVED_KEYS};
use crate::story_id::derive_id;
use crate::tree_sitter::{parse_source, ExportCollector, Language, TreeSitterError};

/// Extensions a story file may carry after `.stories`.
pub const STORY_EXTENSIONS: [&str; 4] = ["tsx", "ts", "js", "jsx"];

/// Stories and metadata read from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub title: String,
    pub stories: Vec<StorySummary>,
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl Extraction {
    /// The fallback for a file that could not be read for exports.
    pub fn empty(relative_path: &str) -> Self {
        Self {
            title: title_from_path(relative_path),
            ..Self::default()
        }
    }

    pub fn into_record(self, full_path: &str, relative_path: &str) -> StoryFileRecord {
        StoryFileRecord {
            id: derive_id(full_path),
            full_path: full_path.to_string(),
            relative_path: relative_path.to_string(),
            title: self.title,
            stories: self.stories,
            metadata: self.metadata,
        }
    }
}

pub trait StoryExtractor: Send + Sync {
    /// Read story exports from `source`. Performs no I/O.
    fn extract(&self, source: &str, relative_path: &str, full_path: &str) -> Result<Extraction>;

    /// Like [`extract`](Self::extract), but a failure degrades to a file with
    /// no stories instead of an error.
    fn extract_or_empty(&self, source: &str, relative_path: &str, full_path: &str) -> Extraction {
        match self.extract(source, relative_path, full_path) {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::warn!(relative_path, error = %e, "Extraction failed, indexing with no stories");
                Extraction::empty(relative_path)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSitterExtractor;

impl TreeSitterExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl StoryExtractor for TreeSitterExtractor {
    fn extract(&self, source: &str, relative_path: &str, full_path: &str) -> Result<Extraction> {
        let extraction_err = |reason: String| StoryError::Extraction {
            relative_path: relative_path.to_string(),
            reason,
        };

        let language = Language::from_path(relative_path)
            .ok_or_else(|| TreeSitterError::UnsupportedLanguage(relative_path.to_string()))
            .map_err(|e| extraction_err(e.to_string()))?;
        let tree = parse_source(source, language).map_err(|e| extraction_err(e.to_string()))?;

        if tree.root_node().has_error() {
            tracing::debug!(
                relative_path,
                language = language.display_name(),
                "Story file has syntax errors, reading what parsed"
            );
        }

        let exports = ExportCollector::new(source).collect(&tree);
        let file_id = derive_id(full_path);

        let mut extraction = Extraction::empty(relative_path);
        extraction.stories = exports
            .named
            .iter()
            .map(|name| StorySummary::new(&file_id, name))
            .collect();

        for (key, value) in exports.default_properties {
            if key == "title" {
                if let Some(title) = value.as_str() {
                    extraction.title = title.to_string();
                }
                continue;
            }
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            extraction.metadata.insert(key, value);
        }

        Ok(extraction)
    }
}

/// Default title: the file name without its `.stories.<ext>` suffix.
pub fn title_from_path(relative_path: &str) -> String {
    let file_name = relative_path
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(relative_path);

    STORY_EXTENSIONS
        .iter()
        .find_map(|ext| file_name.strip_suffix(&format!(".stories.{}", ext)))
        .unwrap_or(file_name)
        .to_string()
}

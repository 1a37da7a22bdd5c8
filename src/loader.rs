//! Generated loader artifact.
//!
//! A bundler that resolves imports statically cannot load "whichever story
//! file the user picks". The generated module instead requires every indexed
//! file up front and exposes a flat `<fileId>_<exportName>` → component table
//! that the client looks stories up in at runtime.

use std::path::{Path, PathBuf};

use crate::error::{Result, StoryError};
use crate::manifest::StoryFileRecord;
use crate::utils::write_atomic;

/// Render the loader module for `records`, in order.
pub fn generate(records: &[StoryFileRecord]) -> String {
    let mut out = String::from("const stories = {}\n");

    for record in records {
        // serde_json string escaping is also valid JS string syntax
        let path_literal = serde_json::to_string(&record.full_path)
            .unwrap_or_else(|_| format!("\"{}\"", record.full_path));
        let module_var = format!("{}_module", record.id);

        out.push_str(&format!(
            r#"
const {module_var} = require({path_literal})

Object.keys({module_var}).forEach((key) => {{
  const Component = {module_var}[key]

  if (typeof Component === "function") {{
    const storyId = "{id}" + "_" + key
    stories[storyId] = Component
  }}
}})
"#,
            module_var = module_var,
            path_literal = path_literal,
            id = record.id,
        ));
    }

    out.push_str("\nmodule.exports = stories\n");
    out
}

/// The on-disk loader artifact, overwritten whole on every regeneration.
#[derive(Debug, Clone)]
pub struct LoaderArtifact {
    path: PathBuf,
}

impl LoaderArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, records: &[StoryFileRecord]) -> Result<()> {
        let source = generate(records);
        write_atomic(&self.path, source.as_bytes())
            .await
            .map_err(|source| StoryError::ArtifactWrite {
                path: self.path.clone(),
                source,
            })?;
        tracing::debug!(
            path = %self.path.display(),
            files = records.len(),
            "Regenerated story loader"
        );
        Ok(())
    }
}

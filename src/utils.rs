use serde::Serialize;
use std::path::{Path, PathBuf};

/// Pretty-print `value` as JSON indented with tabs.
pub fn to_tab_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Replace `path` with `contents` in one rename.
///
/// The bytes go to a sibling `.tmp` file first, so readers only ever see the
/// old document or the new one. Callers name the failure after what they
/// were writing.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_path_for(path);
    tokio::fs::write(&temp_path, contents).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
            tracing::debug!(path = %temp_path.display(), error = %cleanup, "Left temp file behind");
        }
        return Err(e);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Render a path with forward slashes, the form the manifest stores.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_tab_indentation() {
        let value = serde_json::json!({ "files": { "a": 1 } });
        let text = String::from_utf8(to_tab_pretty_json(&value).unwrap()).unwrap();
        assert_eq!(text, "{\n\t\"files\": {\n\t\t\"a\": 1\n\t}\n}");
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("storyManifest.json");
        std::fs::write(&target, "old").unwrap();

        write_atomic(&target, b"new").await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        assert!(!temp_dir.path().join("storyManifest.json.tmp").exists());
    }

    #[test]
    fn test_slash_path() {
        let p = Path::new("src").join("__stories__").join("Video.stories.tsx");
        assert_eq!(slash_path(&p), "src/__stories__/Video.stories.tsx");
    }
}

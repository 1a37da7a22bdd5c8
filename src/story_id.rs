use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

/// Derive the stable id of a story file from its absolute path.
///
/// The id is the base64 form of the path's SHA-256 digest with everything
/// outside `[A-Za-z_]` removed, so it is also a valid JS identifier.
pub fn derive_id(absolute_path: &str) -> String {
    let digest = Sha256::digest(absolute_path.as_bytes());
    STANDARD
        .encode(digest)
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == '_')
        .collect()
}

/// Id of a single story inside a file: `<fileId>_<name>`.
pub fn story_id(file_id: &str, name: &str) -> String {
    format!("{}_{}", file_id, name)
}

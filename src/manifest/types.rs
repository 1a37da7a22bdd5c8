use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Record keys that default-export metadata may never overwrite.
pub const RESERVED_KEYS: [&str; 5] = ["id", "fullPath", "relativePath", "title", "stories"];

/// A literal lifted from a story file's default export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The literal held by `value`, if it is one.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(MetadataValue::Bool(b)),
            Value::Number(n) => Some(MetadataValue::Number(n)),
            Value::String(s) => Some(MetadataValue::String(s)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Read a record's extra fields, keeping only literals. Hand-edited manifests
/// may carry nested values; those are dropped rather than failing the load.
fn literal_metadata<'de, D>(deserializer: D) -> Result<BTreeMap<String, MetadataValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    let mut metadata = BTreeMap::new();
    for (key, value) in raw {
        match MetadataValue::from_json(value) {
            Some(literal) => {
                metadata.insert(key, literal);
            }
            None => tracing::warn!(%key, "Dropping non-literal manifest field"),
        }
    }
    Ok(metadata)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorySummary {
    pub name: String,
    pub key: String,
    pub id: String,
}

impl StorySummary {
    pub fn new(file_id: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            key: name.to_string(),
            id: crate::story_id::story_id(file_id, name),
        }
    }
}

/// One indexed story file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryFileRecord {
    pub id: String,
    pub full_path: String,
    pub relative_path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub stories: Vec<StorySummary>,
    /// Extra default-export fields, flattened into the record on disk.
    #[serde(flatten, deserialize_with = "literal_metadata")]
    pub metadata: BTreeMap<String, MetadataValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub files: IndexMap<String, StoryFileRecord>,
}

//! The persisted story manifest: data model and its single owner.

mod store;
mod types;

pub use store::ManifestStore;
pub use types::{Manifest, MetadataValue, StoryFileRecord, StorySummary, RESERVED_KEYS};

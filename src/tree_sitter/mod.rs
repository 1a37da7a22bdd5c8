//! Tree-sitter integration for story files
//!
//! Parses TypeScript / JavaScript story sources and reads their exports
//! without executing anything.

mod exports;
mod parser;

pub use exports::{ExportCollector, ModuleExports};
pub use parser::{parse_source, Language, TreeSitterError};

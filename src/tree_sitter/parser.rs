//! Tree-sitter parser setup for story files
//!
//! Tree-sitter never rejects input outright: syntax errors become `ERROR`
//! nodes inside an otherwise usable tree, which is what lets a half-edited
//! story file still contribute its intact exports.

use tree_sitter::{Parser, Tree};

/// Languages a story file can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
    Jsx,
}

impl Language {
    /// Detect language from file path extension
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?;
        match ext.to_lowercase().as_str() {
            "ts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "js" | "mjs" | "cjs" => Some(Language::JavaScript),
            "jsx" => Some(Language::Jsx),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Language::TypeScript => "TypeScript",
            Language::Tsx => "TSX",
            Language::JavaScript => "JavaScript",
            Language::Jsx => "JSX",
        }
    }

    fn grammar(&self) -> tree_sitter::Language {
        match self {
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            // JSX uses the same grammar as JavaScript in tree-sitter-javascript
            Language::JavaScript | Language::Jsx => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// Error type for tree-sitter operations
#[derive(Debug)]
pub enum TreeSitterError {
    UnsupportedLanguage(String),
    ParseFailed,
    LanguageInitFailed(String),
}

impl std::fmt::Display for TreeSitterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TreeSitterError::UnsupportedLanguage(path) => {
                write!(f, "Unsupported story file type: {}", path)
            }
            TreeSitterError::ParseFailed => write!(f, "Failed to parse code"),
            TreeSitterError::LanguageInitFailed(msg) => {
                write!(f, "Failed to initialize language: {}", msg)
            }
        }
    }
}

impl std::error::Error for TreeSitterError {}

/// Parse `code` with a fresh parser for `language`.
///
/// Parsers are not `Sync`, so one is built per call rather than shared
/// between the reconciliation loop and anything else that extracts.
pub fn parse_source(code: &str, language: Language) -> Result<Tree, TreeSitterError> {
    let mut parser = Parser::new();
    parser
        .set_language(&language.grammar())
        .map_err(|e| TreeSitterError::LanguageInitFailed(e.to_string()))?;

    parser.parse(code, None).ok_or(TreeSitterError::ParseFailed)
}

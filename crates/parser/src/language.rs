use crate::error::{ParserError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported source language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    Rust,
    Python,
    JavaScript,
    TypeScript,
}

impl Language {
    /// Every registered language, in registry order
    pub const ALL: [Language; 5] = [
        Language::Java,
        Language::Rust,
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
    ];

    /// Resolve a language id (canonical name or common alias)
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().as_str() {
            "java" => Some(Language::Java),
            "rust" | "rs" => Some(Language::Rust),
            "python" | "py" => Some(Language::Python),
            "javascript" | "js" | "jsx" => Some(Language::JavaScript),
            "typescript" | "ts" | "tsx" => Some(Language::TypeScript),
            _ => None,
        }
    }

    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "java" => Some(Language::Java),
            "rs" => Some(Language::Rust),
            "py" | "pyw" | "pyi" => Some(Language::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" | "tsx" => Some(Language::TypeScript),
            _ => None,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical language id
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
        }
    }

    /// Get Tree-sitter language instance
    pub fn tree_sitter_language(self) -> tree_sitter::Language {
        match self {
            Language::Java => tree_sitter_java::LANGUAGE.into(),
            Language::Rust => tree_sitter_rust::LANGUAGE.into(),
            Language::Python => tree_sitter_python::LANGUAGE.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        }
    }

    /// Line comment prefix, if the language has one
    pub(crate) fn line_comment(self) -> &'static str {
        match self {
            Language::Python => "#",
            _ => "//",
        }
    }

    /// Whether `/* ... */` block comments exist
    pub(crate) fn has_block_comments(self) -> bool {
        !matches!(self, Language::Python)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete grammar for one parse: a language plus whether JSX is embedded.
///
/// JavaScript's grammar already accepts JSX; TypeScript needs the separate
/// TSX grammar, picked for the `tsx` id or a `.tsx` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Grammar {
    pub language: Language,
    pub jsx: bool,
}

impl Grammar {
    /// Resolve the grammar for a language id and the file being parsed
    pub fn resolve(language_id: &str, file_path: &str) -> Option<Self> {
        let language = Language::from_id(language_id)?;
        let tsx_path = Path::new(file_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("tsx"));
        let jsx = language == Language::TypeScript
            && (language_id.trim().eq_ignore_ascii_case("tsx") || tsx_path);
        Some(Self { language, jsx })
    }

    /// Grammar id: `tsx` for TypeScript with JSX, otherwise the language id
    pub fn id(self) -> &'static str {
        if self.jsx && self.language == Language::TypeScript {
            "tsx"
        } else {
            self.language.as_str()
        }
    }

    pub fn tree_sitter_language(self) -> tree_sitter::Language {
        if self.jsx && self.language == Language::TypeScript {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        } else {
            self.language.tree_sitter_language()
        }
    }

    /// Build a tree-sitter parser configured for this grammar
    pub(crate) fn new_parser(self) -> Result<tree_sitter::Parser> {
        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&self.tree_sitter_language())
            .map_err(|e| ParserError::tree_sitter(format!("Failed to set language: {e}")))?;
        Ok(parser)
    }
}

impl From<Language> for Grammar {
    fn from(language: Language) -> Self {
        Self {
            language,
            jsx: false,
        }
    }
}

/// Whether `id` names a registered language
pub fn supports_language(id: &str) -> bool {
    Language::from_id(id).is_some()
}

/// Canonical ids of every registered language
pub fn list_supported_languages() -> Vec<&'static str> {
    Language::ALL.iter().map(|lang| lang.as_str()).collect()
}

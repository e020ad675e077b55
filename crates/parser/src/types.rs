use crate::ast::{AstNode, SourceLocation};
use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Category of a fatal parse diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    UnsupportedLanguage,
    UnbalancedDelimiter,
    Syntax,
    MissingToken,
    Timeout,
    ResourceLimit,
    Io,
}

/// Fatal diagnostic: its presence makes the parse unsuccessful
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub location: SourceLocation,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
        }
    }
}

/// Recoverable diagnostic: the parse still succeeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseWarning {
    pub message: String,
    pub location: SourceLocation,
}

impl ParseWarning {
    pub fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

/// Size metrics; tree-derived values are zero when there is no tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseMetrics {
    pub node_count: usize,
    pub max_depth: usize,
    pub line_count: usize,
    pub syntax_node_count: usize,
}

/// Outcome of one parse call.
///
/// Built only through the constructors below so that `successful` always
/// equals `errors.is_empty()` and `metrics` always matches `root_node`.
#[derive(Debug, Clone, Serialize)]
pub struct ParseResult {
    root_node: Option<AstNode>,
    language: String,
    file_path: String,
    successful: bool,
    errors: Vec<ParseError>,
    warnings: Vec<ParseWarning>,
    parse_time_ms: f64,
    timestamp: SystemTime,
    metrics: ParseMetrics,
}

impl ParseResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root_node: Option<AstNode>,
        language: impl Into<String>,
        file_path: impl Into<String>,
        errors: Vec<ParseError>,
        warnings: Vec<ParseWarning>,
        elapsed: Duration,
        line_count: usize,
        syntax_node_count: usize,
    ) -> Self {
        let metrics = match &root_node {
            Some(root) => ParseMetrics {
                node_count: root.node_count(),
                max_depth: root.depth(),
                line_count,
                syntax_node_count,
            },
            None => ParseMetrics::default(),
        };
        Self {
            root_node,
            language: language.into(),
            file_path: file_path.into(),
            successful: errors.is_empty(),
            errors,
            warnings,
            parse_time_ms: elapsed.as_secs_f64() * 1000.0,
            timestamp: SystemTime::now(),
            metrics,
        }
    }

    /// Treeless failure with a single fatal error
    pub fn failure(
        language: impl Into<String>,
        file_path: impl Into<String>,
        error: ParseError,
        elapsed: Duration,
    ) -> Self {
        Self::new(None, language, file_path, vec![error], Vec::new(), elapsed, 0, 0)
    }

    pub fn unsupported(language: &str, file_path: &str, elapsed: Duration) -> Self {
        let error = ParseError::new(
            ParseErrorKind::UnsupportedLanguage,
            format!("Unsupported language: {language}"),
            SourceLocation::file_start(file_path),
        );
        Self::failure(language, file_path, error, elapsed)
    }

    pub fn timeout(language: &str, file_path: &str, elapsed: Duration) -> Self {
        let error = ParseError::new(
            ParseErrorKind::Timeout,
            format!("parse timeout after {} ms", elapsed.as_millis()),
            SourceLocation::file_start(file_path),
        );
        Self::failure(language, file_path, error, elapsed)
    }

    /// A file that could not be read at all
    pub fn unreadable(language: &str, file_path: &str, reason: impl std::fmt::Display) -> Self {
        let error = ParseError::new(
            ParseErrorKind::Io,
            format!("failed to read file: {reason}"),
            SourceLocation::file_start(file_path),
        );
        Self::failure(language, file_path, error, Duration::ZERO)
    }

    pub fn root_node(&self) -> Option<&AstNode> {
        self.root_node.as_ref()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn parse_time_ms(&self) -> f64 {
        self.parse_time_ms
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn metrics(&self) -> &ParseMetrics {
        &self.metrics
    }

    pub fn has_error_kind(&self, kind: ParseErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}

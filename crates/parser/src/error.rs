use thiserror::Error;

/// Result type for parser operations
pub type Result<T> = std::result::Result<T, ParserError>;

/// Errors raised by the parser service.
///
/// Malformed or unsupported source is never reported through this type; it
/// travels as [`crate::ParseError`] data inside a [`crate::ParseResult`].
#[derive(Error, Debug)]
pub enum ParserError {
    /// A required argument was empty or otherwise unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tree-sitter refused the grammar (ABI mismatch)
    #[error("Tree-sitter error: {0}")]
    TreeSitterError(String),

    /// The blocking parse task panicked or was cancelled
    #[error("Parse task failed: {0}")]
    TaskFailed(String),
}

impl ParserError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a tree-sitter error
    pub fn tree_sitter(msg: impl Into<String>) -> Self {
        Self::TreeSitterError(msg.into())
    }
}

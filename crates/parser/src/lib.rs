//! # Context Parser
//!
//! Language-agnostic AST model plus tree-sitter front-ends that lower
//! concrete syntax into it.
//!
//! ## Architecture
//!
//! ```text
//! Source Code
//!     │
//!     ├──> Language registry (id / extension → Language)
//!     │
//!     ├──> Delimiter pre-scan (comment/string aware)
//!     │
//!     ├──> Tree-sitter parse → ERROR/MISSING diagnostics
//!     │
//!     └──> Lowering → AstNode tree
//!          ├─> Class / Method / Variable declarations
//!          ├─> Statement (root, imports)
//!          └─> Expression (call sites)
//! ```
//!
//! Every call produces a [`ParseResult`]; malformed or unsupported input is
//! reported as data, never as `Err`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use context_parser::{LanguageParser, ParserConfig};
//!
//! # async fn run() -> context_parser::Result<()> {
//! let parser = LanguageParser::new(ParserConfig::default())?;
//! let result = parser
//!     .parse("public class HelloWorld {}", "java", "HelloWorld.java")
//!     .await?;
//! assert!(result.is_successful());
//! # Ok(())
//! # }
//! ```

pub mod ast;
mod cache;
mod config;
mod delimiters;
mod error;
mod frontend;
mod language;
mod parser;
mod types;

pub use ast::{
    attr, AstNode, AttrValue, ClassView, MethodView, NodeBuilder, NodeKind, SourceLocation,
    VariableView,
};
pub use cache::{CacheKey, CacheStats, LruParseCache, ParseCache};
pub use config::ParserConfig;
pub use error::{ParserError, Result};
pub use language::{list_supported_languages, supports_language, Grammar, Language};
pub use parser::{LanguageParser, PARSER_VERSION};
pub use types::{ParseError, ParseErrorKind, ParseMetrics, ParseResult, ParseWarning};

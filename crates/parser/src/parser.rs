use crate::cache::{CacheKey, ParseCache};
use crate::config::ParserConfig;
use crate::error::{ParserError, Result};
use crate::frontend;
use crate::language::{self, Grammar};
use crate::types::{ParseErrorKind, ParseResult};
use std::sync::Arc;
use std::time::Instant;

/// Version folded into cache keys; bump when lowering output changes.
pub const PARSER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parser service: language registry, front-end dispatch and optional cache.
///
/// Cheap to clone; clones share the cache.
#[derive(Clone)]
pub struct LanguageParser {
    config: ParserConfig,
    cache: Option<Arc<dyn ParseCache>>,
}

impl LanguageParser {
    pub fn new(config: ParserConfig) -> Result<Self> {
        config.validate().map_err(ParserError::invalid_config)?;
        Ok(Self {
            config,
            cache: None,
        })
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ParseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<dyn ParseCache>> {
        self.cache.as_ref()
    }

    /// Parse on the blocking pool; the caller's task is never blocked.
    ///
    /// Malformed and unsupported input come back as an unsuccessful
    /// [`ParseResult`]. `Err` is reserved for an empty `file_path` and a
    /// panicked parse task.
    pub async fn parse(
        &self,
        text: &str,
        language_id: &str,
        file_path: &str,
    ) -> Result<Arc<ParseResult>> {
        let this = self.clone();
        let text = text.to_owned();
        let language_id = language_id.to_owned();
        let file_path = file_path.to_owned();
        tokio::task::spawn_blocking(move || this.parse_blocking(&text, &language_id, &file_path))
            .await
            .map_err(|e| ParserError::TaskFailed(e.to_string()))?
    }

    /// Synchronous form of [`LanguageParser::parse`] for callers already on a worker thread
    pub fn parse_blocking(
        &self,
        text: &str,
        language_id: &str,
        file_path: &str,
    ) -> Result<Arc<ParseResult>> {
        if file_path.is_empty() {
            return Err(ParserError::invalid_argument("file_path must not be empty"));
        }
        let started = Instant::now();
        let Some(grammar) = Grammar::resolve(language_id, file_path) else {
            log::debug!("{file_path}: unsupported language `{language_id}`");
            return Ok(Arc::new(ParseResult::unsupported(
                language_id,
                file_path,
                started.elapsed(),
            )));
        };

        let key = self
            .cache
            .as_ref()
            .map(|_| CacheKey::new(grammar.id(), PARSER_VERSION, file_path, text));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                log::debug!("{file_path}: parse cache hit");
                return Ok(hit);
            }
        }

        let result = Arc::new(frontend::parse_source(grammar, text, file_path, &self.config));
        log::debug!(
            "{file_path}: parsed {} nodes in {:.2} ms ({} errors, {} warnings)",
            result.metrics().node_count,
            result.parse_time_ms(),
            result.errors().len(),
            result.warnings().len()
        );

        // A timeout says nothing about the input, only about this run.
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            if !result.has_error_kind(ParseErrorKind::Timeout) {
                cache.put(key, result.clone());
            }
        }
        Ok(result)
    }

    /// Cheap syntax check: no AST is built. Unsupported languages are invalid.
    pub async fn validate_syntax(&self, text: &str, language_id: &str) -> bool {
        let Some(grammar) = Grammar::resolve(language_id, "") else {
            return false;
        };
        let config = self.config.clone();
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || frontend::is_valid(grammar, &text, &config))
            .await
            .unwrap_or(false)
    }

    pub fn supports_language(&self, id: &str) -> bool {
        language::supports_language(id)
    }

    pub fn list_supported_languages(&self) -> Vec<&'static str> {
        language::list_supported_languages()
    }
}

impl std::fmt::Debug for LanguageParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageParser")
            .field("config", &self.config)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

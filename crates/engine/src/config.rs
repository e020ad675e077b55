use crate::error::{EngineError, Result};
use crate::limits::{default_worker_count, parse_positive, parse_worker_count};
use context_parser::ParserConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_WORKERS: &str = "CONTEXT_ENGINE_WORKERS";
pub const ENV_PARSE_TIMEOUT_MS: &str = "CONTEXT_ENGINE_PARSE_TIMEOUT_MS";
pub const ENV_BUDGET_MS: &str = "CONTEXT_ENGINE_BUDGET_MS";
pub const ENV_MAX_FILE_BYTES: &str = "CONTEXT_ENGINE_MAX_FILE_BYTES";
pub const ENV_CACHE_CAPACITY: &str = "CONTEXT_ENGINE_CACHE_CAPACITY";

/// Engine configuration.
///
/// Loadable from TOML (missing keys take defaults) and overridable from the
/// `CONTEXT_ENGINE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Concurrent per-file parse tasks
    pub worker_count: usize,

    /// Soft per-file parse timeout
    pub parse_timeout_ms: u64,

    /// Wall-clock budget for one full project analysis
    pub analysis_budget_ms: u64,

    /// Larger files are skipped by the scanner and rejected by the parser
    pub max_file_bytes: u64,

    /// Parse cache entries (0 disables the cache)
    pub cache_capacity: usize,

    /// Default result cap for related-code search
    pub related_max_results: usize,

    /// Default graph expansion depth for related-code search
    pub related_neighbor_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            parse_timeout_ms: 10_000,
            analysis_budget_ms: 30_000,
            max_file_bytes: 1_048_576,
            cache_capacity: 4_096,
            related_max_results: 20,
            related_neighbor_depth: 1,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply the `CONTEXT_ENGINE_*` environment overrides
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup; unparseable values keep the current setting
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.worker_count = parse_worker_count(lookup(ENV_WORKERS).as_deref(), self.worker_count);
        self.parse_timeout_ms =
            parse_positive(lookup(ENV_PARSE_TIMEOUT_MS).as_deref(), self.parse_timeout_ms);
        self.analysis_budget_ms =
            parse_positive(lookup(ENV_BUDGET_MS).as_deref(), self.analysis_budget_ms);
        self.max_file_bytes =
            parse_positive(lookup(ENV_MAX_FILE_BYTES).as_deref(), self.max_file_bytes);
        // 0 is meaningful here (cache off), so only garbage falls back.
        self.cache_capacity = lookup(ENV_CACHE_CAPACITY)
            .as_deref()
            .map(str::trim)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(self.cache_capacity);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(EngineError::Config("worker_count must be > 0".to_string()));
        }
        if self.parse_timeout_ms == 0 {
            return Err(EngineError::Config("parse_timeout_ms must be > 0".to_string()));
        }
        if self.analysis_budget_ms == 0 {
            return Err(EngineError::Config(
                "analysis_budget_ms must be > 0".to_string(),
            ));
        }
        if self.max_file_bytes == 0 {
            return Err(EngineError::Config("max_file_bytes must be > 0".to_string()));
        }
        if self.related_max_results == 0 {
            return Err(EngineError::Config(
                "related_max_results must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_ms)
    }

    pub fn analysis_budget(&self) -> Duration {
        Duration::from_millis(self.analysis_budget_ms)
    }

    /// Parser settings derived from the engine limits
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            max_source_bytes: usize::try_from(self.max_file_bytes).unwrap_or(usize::MAX),
            timeout_micros: self.parse_timeout_ms.saturating_mul(1_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_count >= 1);
        assert_eq!(config.parser_config().max_source_bytes, 1_048_576);
    }

    #[test]
    fn toml_fills_missing_keys_with_defaults() {
        let config = EngineConfig::from_toml_str("worker_count = 3\nparse_timeout_ms = 500\n")
            .expect("config");
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.parse_timeout(), Duration::from_millis(500));
        assert_eq!(config.analysis_budget_ms, 30_000);
        assert_eq!(config.related_max_results, 20);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = EngineConfig::from_toml_str("worker_count = \"many\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn overrides_apply_and_garbage_falls_back() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_WORKERS, "4"),
            (ENV_PARSE_TIMEOUT_MS, "abc"),
            (ENV_BUDGET_MS, "1500"),
            (ENV_MAX_FILE_BYTES, "0"),
            (ENV_CACHE_CAPACITY, "0"),
        ]);
        let config = EngineConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.parse_timeout_ms, 10_000);
        assert_eq!(config.analysis_budget_ms, 1_500);
        assert_eq!(config.max_file_bytes, 1_048_576);
        assert_eq!(config.cache_capacity, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = EngineConfig {
            analysis_budget_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let config = EngineConfig {
            related_max_results: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

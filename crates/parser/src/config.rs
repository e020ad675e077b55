use serde::{Deserialize, Serialize};

/// Configuration for the parser service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Sources larger than this are rejected with a resource-limit error
    pub max_source_bytes: usize,

    /// Tree-sitter's own parse budget in microseconds (0 = unlimited)
    pub timeout_micros: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: 4 * 1024 * 1024,
            timeout_micros: 10_000_000,
        }
    }
}

impl ParserConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_source_bytes == 0 {
            return Err("max_source_bytes must be > 0".to_string());
        }
        Ok(())
    }
}

//! Runtime configuration for query compilation and execution.
//!
//! ```rust
//! use quill_query::{QueryConfig, IsolationLevel};
//!
//! let config = QueryConfig::builder()
//!     .max_bind_params(1000)
//!     .log_queries(true)
//!     .default_isolation(IsolationLevel::Serializable)
//!     .build();
//!
//! assert_eq!(config.max_bind_params, 1000);
//! ```

use serde::Deserialize;
use std::time::Duration;
use tracing::info;

use crate::error::{QueryError, QueryResult};
use crate::transaction::{IsolationLevel, TransactionConfig};

/// PostgreSQL's limit on bound parameters per statement.
pub const DEFAULT_MAX_BIND_PARAMS: usize = 65_535;

/// Engine configuration shared by every query built from one `Db`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Bound-value limit per statement; inserts above it are split into batches.
    pub max_bind_params: usize,
    /// Log every statement at info level.
    pub log_queries: bool,
    /// Statements slower than this are logged at warn level.
    pub slow_query_threshold_ms: u64,
    /// Isolation level for implicitly opened transactions.
    pub default_isolation: IsolationLevel,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_bind_params: DEFAULT_MAX_BIND_PARAMS,
            log_queries: false,
            slow_query_threshold_ms: 1_000,
            default_isolation: IsolationLevel::default(),
        }
    }
}

impl QueryConfig {
    /// Create a configuration builder.
    pub fn builder() -> QueryConfigBuilder {
        QueryConfigBuilder::default()
    }

    /// Load configuration from `QUILL_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> QueryResult<Self> {
        let mut config = Self::default();

        if let Some(max) = env_parse::<usize>("QUILL_MAX_BIND_PARAMS")? {
            config.max_bind_params = max;
        }
        if let Ok(v) = std::env::var("QUILL_LOG_QUERIES") {
            config.log_queries = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Some(ms) = env_parse::<u64>("QUILL_SLOW_QUERY_MS")? {
            config.slow_query_threshold_ms = ms;
        }

        info!(
            max_bind_params = config.max_bind_params,
            log_queries = config.log_queries,
            slow_query_threshold_ms = config.slow_query_threshold_ms,
            "QueryConfig loaded from environment"
        );

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML document.
    pub fn from_toml(source: &str) -> QueryResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| QueryError::invalid_query(format!("invalid QueryConfig: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values are usable.
    pub fn validate(&self) -> QueryResult<()> {
        if self.max_bind_params == 0 {
            return Err(QueryError::invalid_query("max_bind_params must be at least 1")
                .with_context("validating QueryConfig"));
        }
        Ok(())
    }

    /// Slow-query threshold as a duration.
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }

    /// Transaction configuration for implicitly opened transactions.
    pub fn transaction_config(&self) -> TransactionConfig {
        TransactionConfig::new().isolation(self.default_isolation)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> QueryResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            QueryError::invalid_query(format!("{} is not a valid value: {:?}", name, raw))
                .with_context("loading QueryConfig from environment")
        }),
        Err(_) => Ok(None),
    }
}

/// Builder for [`QueryConfig`].
#[derive(Debug, Clone, Default)]
pub struct QueryConfigBuilder {
    config: QueryConfig,
}

impl QueryConfigBuilder {
    /// Set the bound-value limit per statement.
    pub fn max_bind_params(mut self, max: usize) -> Self {
        self.config.max_bind_params = max;
        self
    }

    /// Log every statement at info level.
    pub fn log_queries(mut self, enabled: bool) -> Self {
        self.config.log_queries = enabled;
        self
    }

    /// Set the slow-query threshold.
    pub fn slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.config.slow_query_threshold_ms = threshold.as_millis() as u64;
        self
    }

    /// Set the isolation level for implicit transactions.
    pub fn default_isolation(mut self, level: IsolationLevel) -> Self {
        self.config.default_isolation = level;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> QueryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.max_bind_params, 65_535);
        assert!(!config.log_queries);
        assert_eq!(config.slow_query_threshold(), Duration::from_secs(1));
        assert_eq!(config.default_isolation, IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_builder() {
        let config = QueryConfig::builder()
            .max_bind_params(10)
            .slow_query_threshold(Duration::from_millis(250))
            .build();
        assert_eq!(config.max_bind_params, 10);
        assert_eq!(config.slow_query_threshold_ms, 250);
    }

    #[test]
    fn test_from_toml() {
        let config = QueryConfig::from_toml(
            r#"
            # engine settings
            max_bind_params = 1_000
            log_queries = true
            default_isolation = "serializable"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_bind_params, 1000);
        assert!(config.log_queries);
        assert_eq!(config.slow_query_threshold_ms, 1000);
        assert_eq!(config.default_isolation, IsolationLevel::Serializable);
    }

    #[test]
    fn test_from_toml_keeps_defaults() {
        let config = QueryConfig::from_toml("slow_query_threshold_ms = 50").unwrap();
        assert_eq!(config.slow_query_threshold_ms, 50);
        assert_eq!(config.max_bind_params, DEFAULT_MAX_BIND_PARAMS);
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(QueryConfig::from_toml("max_bind_params = \"many\"").is_err());
    }

    #[test]
    fn test_zero_bind_params_rejected() {
        let config = QueryConfig::builder().max_bind_params(0).build();
        assert!(config.validate().is_err());
    }
}

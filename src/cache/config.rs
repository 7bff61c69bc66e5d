use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectrumCacheError};
use crate::io::RetryPolicy;

use super::SpectrumCache;

/// The settings of a [`SpectrumCache`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// The most spectra held at once
    pub capacity: usize,
    /// The most precursors held at once, independent of `capacity`
    pub precursor_capacity: usize,
    pub retry: RetryPolicy,
    /// Whether file indices are read from and written to sidecar files
    pub persist_indices: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            precursor_capacity: 10_000,
            retry: RetryPolicy::default(),
            persist_indices: true,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(SpectrumCacheError::PreconditionViolation(
                "The spectrum cache capacity must be at least 1".into(),
            ));
        }
        if self.precursor_capacity == 0 {
            return Err(SpectrumCacheError::PreconditionViolation(
                "The precursor cache capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configure and create a [`SpectrumCache`], optionally registering files
#[derive(Debug, Default, Clone)]
pub struct SpectrumCacheBuilder {
    config: CacheConfig,
    files: Vec<PathBuf>,
}

impl SpectrumCacheBuilder {
    /// Set the most spectra held at once
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the most precursors held at once
    pub fn precursor_capacity(mut self, capacity: usize) -> Self {
        self.config.precursor_capacity = capacity;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set whether file indices are kept in sidecar files next to their sources
    pub fn persist_indices(mut self, persist: bool) -> Self {
        self.config.persist_indices = persist;
        self
    }

    /// Register the file at `path` when the cache is built. It is indexed on
    /// first use.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files.push(path.as_ref().to_path_buf());
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn build(self) -> Result<SpectrumCache> {
        let cache = SpectrumCache::from_config(self.config)?;
        for path in self.files {
            cache.register_file(path)?;
        }
        Ok(cache)
    }
}

impl From<CacheConfig> for SpectrumCacheBuilder {
    fn from(config: CacheConfig) -> Self {
        Self {
            config,
            files: Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_config_serde() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"capacity": 5, "retry": {"initial_wait_ms": 2, "timeout_ms": 50}}"#,
        )
        .unwrap();
        assert_eq!(config.capacity, 5);
        assert_eq!(config.precursor_capacity, 10_000);
        assert_eq!(config.retry.initial_wait(), Duration::from_millis(2));
        assert!(config.persist_indices);
        config.validate().unwrap();
    }

    #[test]
    fn test_builder_validates() {
        let err = SpectrumCacheBuilder::default().capacity(0).build().unwrap_err();
        assert!(matches!(err, SpectrumCacheError::PreconditionViolation(_)));
        let builder = SpectrumCacheBuilder::from(CacheConfig::default()).precursor_capacity(3);
        assert_eq!(builder.config().precursor_capacity, 3);
        let cache = builder.build().unwrap();
        assert_eq!(cache.capacity(), 10_000);
    }
}

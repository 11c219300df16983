//! Configuration for the data manager.

use serde::{Deserialize, Serialize};

use crate::types::InterpolationOrder;

/// Configuration for the data manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataMgrConfig {
    /// Memory budget for cached regions in megabytes.
    pub cache_size_mb: usize,

    /// Exact budget in bytes; takes precedence over `cache_size_mb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size_bytes: Option<usize>,

    /// Worker threads used by readers to decode blocks (0 = one per core).
    pub reader_threads: usize,

    /// Interpolation order given to grids handed out by the manager.
    pub interpolation: InterpolationOrder,
}

impl Default for DataMgrConfig {
    fn default() -> Self {
        Self {
            cache_size_mb: 512,
            cache_size_bytes: None,
            reader_threads: 0,
            interpolation: InterpolationOrder::Linear,
        }
    }
}

impl DataMgrConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DATAMGR_CACHE_SIZE_MB") {
            if let Ok(size) = val.parse() {
                config.cache_size_mb = size;
            }
        }

        if let Ok(val) = std::env::var("DATAMGR_READER_THREADS") {
            if let Ok(threads) = val.parse() {
                config.reader_threads = threads;
            }
        }

        if let Ok(val) = std::env::var("DATAMGR_INTERPOLATION") {
            config.interpolation = InterpolationOrder::from_str(&val);
        }

        config
    }

    /// Use an exact byte budget.
    pub fn with_cache_size_bytes(mut self, bytes: usize) -> Self {
        self.cache_size_bytes = Some(bytes);
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_size_bytes() == 0 {
            return Err("cache size must be > 0".to_string());
        }

        if self.reader_threads > 1024 {
            return Err("reader_threads must be <= 1024".to_string());
        }

        Ok(())
    }

    /// Get the cache budget in bytes.
    pub fn cache_size_bytes(&self) -> usize {
        self.cache_size_bytes
            .unwrap_or(self.cache_size_mb * 1024 * 1024)
    }
}

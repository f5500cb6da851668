//! Configuration for contexts: thread pool, memory caching, hash maps and logging

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::hashmap::HashBackendType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Worker threads of the context's pool; 0 shares rayon's global pool
    pub num_threads: usize,
    /// Loops shorter than this run serially on the calling thread
    pub min_parallel_len: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            min_parallel_len: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub enable_cache: bool,
    pub max_cached_bytes: usize,
    pub alignment: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enable_cache: false,
            max_cached_bytes: 256 * 1024 * 1024, // 256MB
            alignment: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashMapConfig {
    pub default_backend: HashBackendType,
    pub min_capacity: usize,
}

impl Default for HashMapConfig {
    fn default() -> Self {
        Self {
            default_backend: HashBackendType::Default,
            min_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of "error", "warn", "info", "debug", "trace"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> CoreResult<tracing::Level> {
        self.level.parse::<tracing::Level>().map_err(|_| {
            CoreError::ConfigurationError(format!("Unknown log level '{}'", self.level))
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub parallel: ParallelConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub hashmap: HashMapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CoreConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::operation_error("config", &format!("Failed to read config file: {}", e)))?;

        let config: CoreConfig = serde_json::from_str(&content)
            .map_err(|e| CoreError::operation_error("config", &format!("Failed to parse config file: {}", e)))?;
        config.validate()?;

        tracing::info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| CoreError::operation_error("config", &format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| CoreError::operation_error("config", &format!("Failed to write config file: {}", e)))?;

        tracing::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !self.memory.alignment.is_power_of_two() {
            return Err(CoreError::ConfigurationError(format!(
                "memory.alignment must be a power of two, got {}",
                self.memory.alignment
            )));
        }
        if self.hashmap.min_capacity == 0 {
            return Err(CoreError::ConfigurationError(
                "hashmap.min_capacity must be positive".to_string(),
            ));
        }
        self.logging.level_filter()?;
        Ok(())
    }
}

/// Create a configuration builder for easy setup
pub struct ConfigBuilder {
    config: CoreConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CoreConfig::default(),
        }
    }

    pub fn parallel(mut self, f: impl FnOnce(&mut ParallelConfig)) -> Self {
        f(&mut self.config.parallel);
        self
    }

    pub fn memory(mut self, f: impl FnOnce(&mut MemoryConfig)) -> Self {
        f(&mut self.config.memory);
        self
    }

    pub fn hashmap(mut self, f: impl FnOnce(&mut HashMapConfig)) -> Self {
        f(&mut self.config.hashmap);
        self
    }

    pub fn logging(mut self, f: impl FnOnce(&mut LoggingConfig)) -> Self {
        f(&mut self.config.logging);
        self
    }

    pub fn build(self) -> CoreResult<CoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .parallel(|p| {
                p.num_threads = 2;
                p.min_parallel_len = 64;
            })
            .memory(|m| {
                m.enable_cache = true;
                m.max_cached_bytes = 512 * 1024 * 1024; // 512MB
            })
            .build()
            .unwrap();

        assert_eq!(config.parallel.num_threads, 2);
        assert_eq!(config.parallel.min_parallel_len, 64);
        assert!(config.memory.enable_cache);
        assert_eq!(config.memory.max_cached_bytes, 512 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_alignment_rejected() {
        let result = ConfigBuilder::new().memory(|m| m.alignment = 48).build();
        assert!(matches!(result, Err(CoreError::ConfigurationError(_))));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let result = ConfigBuilder::new().logging(|l| l.level = "loud".to_string()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("voxcore_config.json");

        let config = ConfigBuilder::new()
            .memory(|m| m.enable_cache = true)
            .hashmap(|h| h.min_capacity = 128)
            .build()
            .unwrap();
        config.save_to_file(&config_path).unwrap();

        let loaded = CoreConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("partial.json");
        std::fs::write(&config_path, r#"{"logging": {"level": "debug"}}"#).unwrap();

        let loaded = CoreConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.logging.level, "debug");
        assert_eq!(loaded.memory, MemoryConfig::default());
    }
}

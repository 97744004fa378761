use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    pub registry: RegistryConfig,
}

/// Model shape and scoring knobs shared by fit, train and recommend.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Dimensionality shared by all four embedding tables.
    pub embedding_dim: usize,
    /// Enable per-user/per-item bias terms plus a global bias.
    pub use_bias: bool,
    /// Items scored per inference batch. Performance knob only; results are
    /// identical for any positive value.
    pub score_batch_size: usize,
    /// Fixed seed for embedding initialization (None = entropy).
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub snapshot_dir: String,
    /// Snapshots older than this many days are eligible for purging.
    pub retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Live engines idle longer than this are evicted from the registry.
    pub idle_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            embedding_dim: 32,
            use_bias: true,
            score_batch_size: 1024,
            seed: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: "./model_cache".to_string(),
            retention_days: 7,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { idle_ttl_secs: 3600 }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            engine: EngineConfig {
                embedding_dim: env::var("EMBEDDING_DIM")
                    .unwrap_or_else(|_| "32".to_string())
                    .parse()
                    .expect("EMBEDDING_DIM must be a valid usize"),
                use_bias: env::var("USE_BIAS")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .expect("USE_BIAS must be true or false"),
                score_batch_size: env::var("SCORE_BATCH_SIZE")
                    .unwrap_or_else(|_| "1024".to_string())
                    .parse()
                    .expect("SCORE_BATCH_SIZE must be a valid usize"),
                seed: env::var("ENGINE_SEED").ok().map(|s| {
                    s.parse().expect("ENGINE_SEED must be a valid u64")
                }),
            },
            cache: CacheConfig {
                snapshot_dir: env::var("SNAPSHOT_DIR")
                    .unwrap_or_else(|_| "./model_cache".to_string()),
                retention_days: env::var("SNAPSHOT_RETENTION_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .expect("SNAPSHOT_RETENTION_DAYS must be a valid i64"),
            },
            registry: RegistryConfig {
                idle_ttl_secs: env::var("REGISTRY_IDLE_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .expect("REGISTRY_IDLE_TTL_SECS must be a valid u64"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.embedding_dim, 32);
        assert!(config.use_bias);
        assert_eq!(config.score_batch_size, 1024);
    }

    #[test]
    fn test_cache_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.retention_days, 7);
    }
}

//! Recommendation Engine
//!
//! Feature-augmented matrix factorization for personalized item ranking:
//! string identifiers are mapped to dense index spaces, categorical features
//! contribute learned embedding aggregates, and a latent factor model is
//! trained with negative sampling and AdamW. Trained models are snapshotted
//! with a data fingerprint so repeat requests over unchanged, same-day data
//! load instead of retraining.
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::{CacheConfig, Config, EngineConfig, RegistryConfig};
pub use error::{EngineError, Result};
pub use models::{Recommendation, TrainingData, TrainingParams, TrainingReport};
pub use services::cache::{FreshnessCache, FsSnapshotStore, SnapshotStore, TrainedSnapshot};
pub use services::engine::RecommendationEngine;
pub use services::registry::{ModelRegistry, TrainOutcome, GLOBAL_OWNER};

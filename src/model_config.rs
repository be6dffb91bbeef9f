//! Per-feature model settings, read from the configuration store and cached
//! for a fixed time-to-live. A failed store read degrades to built-in defaults.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::{FeatureId, ModelConfig};
use crate::storage;

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

pub type ConfigTable = HashMap<FeatureId, ModelConfig>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("configuration store unavailable: {0}")]
  Unavailable(String),
  #[error("configuration store returned no rows")]
  Empty,
}

/// Backing store for the model configuration table.
#[async_trait]
pub trait ConfigStore: Send + Sync {
  async fn load_all(&self) -> Result<ConfigTable, StoreError>;
}

pub struct SqliteConfigStore {
  db: Arc<Mutex<Connection>>,
}

impl SqliteConfigStore {
  pub fn new(db: Arc<Mutex<Connection>>) -> Self {
    Self { db }
  }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
  async fn load_all(&self) -> Result<ConfigTable, StoreError> {
    let rows = storage::load_model_configs(&self.db)
      .await
      .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    if rows.is_empty() {
      return Err(StoreError::Empty);
    }
    Ok(rows.into_iter().collect())
  }
}

fn entry(provider: &str, model: &str, max_tokens: u32, fallback: &str, temperature: Option<f32>) -> ModelConfig {
  ModelConfig {
    provider: provider.to_string(),
    model: model.to_string(),
    max_tokens,
    fallback_model: fallback.to_string(),
    temperature,
  }
}

/// Known-good settings used whenever the store cannot be read.
pub fn default_config(feature: FeatureId) -> ModelConfig {
  const PRIMARY: &str = "anthropic/claude-3.5-sonnet";
  const FAST: &str = "openai/gpt-4o-mini";
  match feature {
    FeatureId::PlanGeneration => entry("openrouter", PRIMARY, 2000, FAST, Some(0.7)),
    FeatureId::ContentGeneration => entry("openrouter", PRIMARY, 4000, FAST, Some(0.7)),
    FeatureId::RelatedQuestions => entry("openrouter", FAST, 500, FAST, Some(0.7)),
    FeatureId::QuickInsights => entry("openrouter", FAST, 1000, FAST, Some(0.5)),
    FeatureId::MarginNotes => entry("openrouter", FAST, 1500, FAST, Some(0.3)),
    FeatureId::Recommendations => entry("openrouter", FAST, 800, FAST, Some(0.7)),
  }
}

struct CachedTable {
  table: ConfigTable,
  expires_at: Instant,
}

/// Resolves model settings for a feature. The whole table is cached and
/// replaced wholesale on expiry; there is no per-entry invalidation.
pub struct ConfigService {
  store: Arc<dyn ConfigStore>,
  ttl: Duration,
  cache: RwLock<Option<CachedTable>>,
}

impl ConfigService {
  pub fn new(store: Arc<dyn ConfigStore>) -> Self {
    Self::with_ttl(store, DEFAULT_TTL)
  }

  pub fn with_ttl(store: Arc<dyn ConfigStore>, ttl: Duration) -> Self {
    Self {
      store,
      ttl,
      cache: RwLock::new(None),
    }
  }

  pub async fn get_config(&self, feature: FeatureId) -> ModelConfig {
    if let Some(config) = self.cached(feature).await {
      return config;
    }

    match self.load().await {
      Ok(table) => lookup(&table, feature),
      Err(err) => {
        warn!(feature = %feature, error = %err, "model config store unavailable, using defaults");
        default_config(feature)
      }
    }
  }

  /// Reads the full table from the store and replaces the cache.
  pub async fn load(&self) -> Result<ConfigTable, StoreError> {
    let table = self.store.load_all().await?;
    let expires_at = Instant::now() + self.ttl;
    *self.cache.write().await = Some(CachedTable {
      table: table.clone(),
      expires_at,
    });
    debug!(entries = table.len(), ttl_secs = self.ttl.as_secs(), "model config cache refreshed");
    Ok(table)
  }

  pub async fn invalidate(&self) {
    *self.cache.write().await = None;
  }

  /// Effective settings for every feature, from at most one store read.
  pub async fn snapshot(&self) -> Vec<(FeatureId, ModelConfig)> {
    let cached = {
      let cache = self.cache.read().await;
      cache
        .as_ref()
        .filter(|c| Instant::now() < c.expires_at)
        .map(|c| c.table.clone())
    };
    let table = match cached {
      Some(table) => table,
      None => match self.load().await {
        Ok(table) => table,
        Err(err) => {
          warn!(error = %err, "model config store unavailable, using defaults");
          return FeatureId::ALL.into_iter().map(|f| (f, default_config(f))).collect();
        }
      },
    };
    FeatureId::ALL.into_iter().map(|f| (f, lookup(&table, f))).collect()
  }

  async fn cached(&self, feature: FeatureId) -> Option<ModelConfig> {
    let cache = self.cache.read().await;
    let cached = cache.as_ref()?;
    if Instant::now() >= cached.expires_at {
      return None;
    }
    Some(lookup(&cached.table, feature))
  }
}

fn lookup(table: &ConfigTable, feature: FeatureId) -> ModelConfig {
  match table.get(&feature) {
    Some(config) => config.clone(),
    None => {
      warn!(feature = %feature, "feature missing from model config table, using default");
      default_config(feature)
    }
  }
}

mod client;
mod config;
mod features;
mod json_repair;
mod logger;
mod model_config;
mod models;
mod providers;
mod router;
mod slides;
mod storage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::Mutex;

use client::ChatClient;
use config::{config_path, load_or_init, ApiKeys};
use model_config::{ConfigService, SqliteConfigStore};
use providers::{OpenAiProvider, OpenRouterProvider};
use router::{run_router, RouterState};
use storage::init_db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let config_path = config_path();
  let config = load_or_init(&config_path)
    .with_context(|| format!("failed to load config from {}", config_path.display()))?;

  logger::init(config.log_path.as_deref())?;
  tracing::info!(config = %config_path.display(), "LearnFlow starting up");

  let db = init_db(&config.db_path)
    .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
  let db = Arc::new(Mutex::new(db));

  let keys = ApiKeys::resolve();
  if keys.openrouter.is_none() {
    tracing::warn!("OPENROUTER_API_KEY not set; primary provider attempts will fail");
  }
  if keys.openai.is_none() {
    tracing::warn!("OPENAI_API_KEY not set; direct provider attempts will fail");
  }

  let timeout = Duration::from_secs(config.request_timeout_secs);
  let primary = OpenRouterProvider::new(
    &config.openrouter_base_url,
    keys.openrouter,
    &config.site_url,
    &config.site_name,
    timeout,
  )?;
  let secondary = OpenAiProvider::new(&config.openai_base_url, keys.openai, timeout)?;

  let store = Arc::new(SqliteConfigStore::new(db.clone()));
  let model_configs = Arc::new(ConfigService::with_ttl(store, Duration::from_secs(config.config_ttl_secs)));
  let client = ChatClient::new(model_configs, Arc::new(primary), Arc::new(secondary)).with_timeout(timeout);

  let listener = tokio::net::TcpListener::bind(&config.bind_addr)
    .await
    .with_context(|| format!("failed to bind {}", config.bind_addr))?;

  let state = RouterState {
    started_at: Instant::now(),
    client: Arc::new(client),
    db,
  };
  run_router(listener, state).await
}

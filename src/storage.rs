use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::models::{FeatureId, ModelConfig};

pub fn init_db(path: &Path) -> anyhow::Result<Connection> {
  let conn = Connection::open(path)?;
  conn.execute_batch(
    "
    CREATE TABLE IF NOT EXISTS model_configs (
      function_type TEXT PRIMARY KEY,
      provider TEXT NOT NULL,
      model TEXT NOT NULL,
      max_tokens INTEGER NOT NULL,
      fallback_model TEXT NOT NULL,
      temperature REAL,
      updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS generations (
      id TEXT PRIMARY KEY,
      created_at TEXT NOT NULL,
      feature TEXT NOT NULL,
      model TEXT,
      provider TEXT,
      fallback_used INTEGER NOT NULL,
      tokens_used INTEGER
    );
    CREATE TABLE IF NOT EXISTS step_contents (
      path_id TEXT NOT NULL,
      step_index INTEGER NOT NULL,
      content TEXT NOT NULL,
      model TEXT,
      created_at TEXT NOT NULL,
      PRIMARY KEY (path_id, step_index)
    );
    ",
  )?;
  Ok(conn)
}

/// Raw `model_configs` rows. Unknown `function_type` values are skipped.
pub async fn load_model_configs(
  db: &Mutex<Connection>,
) -> anyhow::Result<Vec<(FeatureId, ModelConfig)>> {
  let conn = db.lock().await;
  let mut stmt = conn.prepare(
    "SELECT function_type, provider, model, max_tokens, fallback_model, temperature FROM model_configs",
  )?;
  let rows = stmt.query_map([], |row| {
    Ok((
      row.get::<_, String>(0)?,
      ModelConfig {
        provider: row.get(1)?,
        model: row.get(2)?,
        max_tokens: row.get(3)?,
        fallback_model: row.get(4)?,
        temperature: row.get::<_, Option<f64>>(5)?.map(|t| t as f32),
      },
    ))
  })?;

  let mut configs = Vec::new();
  for row in rows {
    let (function_type, config) = row?;
    match function_type.parse::<FeatureId>() {
      Ok(feature) => configs.push((feature, config)),
      Err(err) => tracing::warn!(function_type = %function_type, error = %err, "skipping model config row"),
    }
  }
  Ok(configs)
}

pub async fn upsert_model_config(
  db: &Mutex<Connection>,
  feature: FeatureId,
  config: &ModelConfig,
) -> anyhow::Result<()> {
  let updated_at = Utc::now().to_rfc3339();
  let conn = db.lock().await;
  conn.execute(
    "INSERT INTO model_configs (function_type, provider, model, max_tokens, fallback_model, temperature, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT(function_type) DO UPDATE SET
       provider = excluded.provider,
       model = excluded.model,
       max_tokens = excluded.max_tokens,
       fallback_model = excluded.fallback_model,
       temperature = excluded.temperature,
       updated_at = excluded.updated_at",
    params![
      feature.as_str(),
      config.provider,
      config.model,
      config.max_tokens,
      config.fallback_model,
      config.temperature.map(|t| t as f64),
      updated_at
    ],
  )?;
  Ok(())
}

pub async fn store_generation(
  db: &Mutex<Connection>,
  feature: FeatureId,
  model: Option<&str>,
  provider: Option<&str>,
  fallback_used: bool,
  tokens_used: Option<u32>,
) -> anyhow::Result<String> {
  let id = uuid::Uuid::new_v4().to_string();
  let created_at = Utc::now().to_rfc3339();
  let conn = db.lock().await;
  conn.execute(
    "INSERT INTO generations (id, created_at, feature, model, provider, fallback_used, tokens_used) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![id, created_at, feature.as_str(), model, provider, fallback_used, tokens_used],
  )?;
  Ok(id)
}

pub async fn get_step_content(
  db: &Mutex<Connection>,
  path_id: &str,
  step_index: u32,
) -> anyhow::Result<Option<String>> {
  let conn = db.lock().await;
  let content = conn
    .query_row(
      "SELECT content FROM step_contents WHERE path_id = ?1 AND step_index = ?2",
      params![path_id, step_index],
      |row| row.get::<_, String>(0),
    )
    .optional()?;
  Ok(content)
}

pub async fn store_step_content(
  db: &Mutex<Connection>,
  path_id: &str,
  step_index: u32,
  content: &str,
  model: &str,
) -> anyhow::Result<()> {
  let created_at = Utc::now().to_rfc3339();
  let conn = db.lock().await;
  conn.execute(
    "INSERT OR REPLACE INTO step_contents (path_id, step_index, content, model, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    params![path_id, step_index, content, model, created_at],
  )?;
  Ok(())
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, std::sync::Arc<Mutex<Connection>>) {
  let dir = tempfile::tempdir().unwrap();
  let conn = init_db(&dir.path().join("learnflow.sqlite3")).unwrap();
  (dir, std::sync::Arc::new(Mutex::new(conn)))
}

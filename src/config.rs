use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const KEYRING_SERVICE: &str = "LearnFlow";

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
  pub bind_addr: String,
  pub db_path: PathBuf,
  pub log_path: Option<PathBuf>,
  pub openrouter_base_url: String,
  pub openai_base_url: String,
  pub site_url: String,
  pub site_name: String,
  pub request_timeout_secs: u64,
  pub config_ttl_secs: u64,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      bind_addr: "127.0.0.1:8787".to_string(),
      db_path: PathBuf::from("learnflow.sqlite3"),
      log_path: None,
      openrouter_base_url: "https://openrouter.ai/api/v1".to_string(),
      openai_base_url: "https://api.openai.com/v1".to_string(),
      site_url: "http://localhost".to_string(),
      site_name: "LearnFlow".to_string(),
      request_timeout_secs: 60,
      config_ttl_secs: 300,
    }
  }
}

pub fn config_path() -> PathBuf {
  std::env::var_os("LEARNFLOW_CONFIG")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("learnflow.json"))
}

impl AppConfig {
  pub fn validate(&self) -> anyhow::Result<()> {
    if self.request_timeout_secs == 0 {
      anyhow::bail!("request_timeout_secs must be greater than zero");
    }
    Ok(())
  }
}

pub fn load_or_init(path: &Path) -> anyhow::Result<AppConfig> {
  if path.exists() {
    let data = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&data)?;
    config.validate()?;
    Ok(config)
  } else {
    let config = AppConfig::default();
    save_config(path, &config)?;
    Ok(config)
  }
}

pub fn save_config(path: &Path, config: &AppConfig) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(config)?;
  std::fs::write(path, json)?;
  Ok(())
}

/// Provider credentials. Never written to the config file.
#[derive(Clone, Default)]
pub struct ApiKeys {
  pub openrouter: Option<String>,
  pub openai: Option<String>,
}

impl ApiKeys {
  pub fn resolve() -> Self {
    Self {
      openrouter: lookup_key("OPENROUTER_API_KEY", "openrouter"),
      openai: lookup_key("OPENAI_API_KEY", "openai"),
    }
  }
}

/// Environment first, then the OS keyring.
fn lookup_key(env_var: &str, account: &str) -> Option<String> {
  if let Ok(key) = std::env::var(env_var) {
    if !key.trim().is_empty() {
      return Some(key.trim().to_string());
    }
  }

  keyring::Entry::new(KEYRING_SERVICE, account)
    .and_then(|e| e.get_password())
    .ok()
    .filter(|k| !k.trim().is_empty())
}

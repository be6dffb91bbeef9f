use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{bearer_headers, build_http_client, post_completion, ModelProvider, ProviderError, ProviderRequest};
use crate::models::ChatResult;

/// Direct OpenAI chat completions. Takes bare model names (`gpt-4o-mini`).
pub struct OpenAiProvider {
  client: Client,
  base_url: String,
  api_key: Option<String>,
}

impl OpenAiProvider {
  pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
    Ok(Self {
      client: build_http_client(timeout)?,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key,
    })
  }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
  fn name(&self) -> &str {
    "openai"
  }

  async fn send(&self, req: &ProviderRequest) -> Result<ChatResult, ProviderError> {
    let headers = bearer_headers(self.api_key.as_deref(), self.name())?;
    let url = format!("{}/chat/completions", self.base_url);
    post_completion(&self.client, &url, headers, req, self.name()).await
  }
}

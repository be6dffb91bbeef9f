use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::Client;

use super::{bearer_headers, build_http_client, post_completion, ModelProvider, ProviderError, ProviderRequest};
use crate::models::ChatResult;

/// OpenRouter chat completions. Model names carry a vendor prefix
/// (`openai/gpt-4o-mini`).
pub struct OpenRouterProvider {
  client: Client,
  base_url: String,
  api_key: Option<String>,
  site_url: String,
  site_name: String,
}

impl OpenRouterProvider {
  pub fn new(
    base_url: &str,
    api_key: Option<String>,
    site_url: &str,
    site_name: &str,
    timeout: Duration,
  ) -> Result<Self, ProviderError> {
    Ok(Self {
      client: build_http_client(timeout)?,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key,
      site_url: site_url.to_string(),
      site_name: site_name.to_string(),
    })
  }
}

#[async_trait]
impl ModelProvider for OpenRouterProvider {
  fn name(&self) -> &str {
    "openrouter"
  }

  async fn send(&self, req: &ProviderRequest) -> Result<ChatResult, ProviderError> {
    let mut headers = bearer_headers(self.api_key.as_deref(), self.name())?;
    if let Ok(value) = HeaderValue::from_str(&self.site_url) {
      headers.insert("HTTP-Referer", value);
    }
    if let Ok(value) = HeaderValue::from_str(&self.site_name) {
      headers.insert("X-Title", value);
    }

    let url = format!("{}/chat/completions", self.base_url);
    post_completion(&self.client, &url, headers, req, self.name()).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{ChatMessage, ResponseFormat};
  use crate::providers::testing;
  use crate::providers::ProviderErrorKind;
  use axum::http::StatusCode;

  fn request() -> ProviderRequest {
    ProviderRequest {
      model: "anthropic/claude-3.5-sonnet".to_string(),
      messages: vec![ChatMessage::user("Explain ownership")],
      max_tokens: 256,
      temperature: Some(0.7),
      response_format: ResponseFormat::Text,
    }
  }

  fn provider(base_url: &str, key: Option<&str>) -> OpenRouterProvider {
    OpenRouterProvider::new(
      base_url,
      key.map(str::to_string),
      "https://learnflow.test",
      "LearnFlow",
      Duration::from_secs(5),
    )
    .unwrap()
  }

  #[tokio::test]
  async fn sends_identification_headers_and_parses_reply() {
    let endpoint = testing::spawn(
      StatusCode::OK,
      testing::completion("Ownership moves values.", "anthropic/claude-3.5-sonnet"),
    )
    .await;

    let result = provider(&endpoint.base_url, Some("sk-or-test")).send(&request()).await.unwrap();
    assert_eq!(result.content, "Ownership moves values.");
    assert_eq!(result.provider, "openrouter");
    assert_eq!(result.tokens_used, Some(17));

    let captured = endpoint.captured.lock().await;
    let headers = &captured.headers[0];
    assert_eq!(headers["authorization"], "Bearer sk-or-test");
    assert_eq!(headers["http-referer"], "https://learnflow.test");
    assert_eq!(headers["x-title"], "LearnFlow");
    assert_eq!(captured.bodies[0]["model"], "anthropic/claude-3.5-sonnet");
    assert_eq!(captured.bodies[0]["max_tokens"], 256);
  }

  #[tokio::test]
  async fn non_success_status_is_an_error() {
    let endpoint = testing::spawn(
      StatusCode::TOO_MANY_REQUESTS,
      serde_json::json!({ "error": { "message": "rate limited" } }),
    )
    .await;

    let err = provider(&endpoint.base_url, Some("k")).send(&request()).await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::RateLimit);
    assert_eq!(err.status, Some(429));
  }

  #[tokio::test]
  async fn missing_key_fails_without_network() {
    let err = provider("http://127.0.0.1:1", None).send(&request()).await.unwrap_err();
    assert_eq!(err.kind, ProviderErrorKind::MissingKey);
  }
}

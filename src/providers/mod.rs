mod error;
mod openai;
mod openrouter;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;

use crate::models::{ChatMessage, ChatResult, ResponseFormat};

pub use error::{ProviderError, ProviderErrorKind};
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;

/// One call to one model on one provider.
#[derive(Clone, Debug)]
pub struct ProviderRequest {
  pub model: String,
  pub messages: Vec<ChatMessage>,
  pub max_tokens: u32,
  pub temperature: Option<f32>,
  pub response_format: ResponseFormat,
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
  fn name(&self) -> &str;

  async fn send(&self, req: &ProviderRequest) -> Result<ChatResult, ProviderError>;
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, ProviderError> {
  Client::builder()
    .timeout(timeout)
    .build()
    .map_err(|e| ProviderError::new(ProviderErrorKind::Unknown, format!("failed to build HTTP client: {e}")))
}

fn bearer_headers(key: Option<&str>, provider: &str) -> Result<HeaderMap, ProviderError> {
  let key = key.ok_or_else(|| {
    ProviderError::new(ProviderErrorKind::MissingKey, format!("{provider} API key missing"))
  })?;
  let mut headers = HeaderMap::new();
  headers.insert(
    AUTHORIZATION,
    HeaderValue::from_str(&format!("Bearer {}", key))
      .map_err(|err| ProviderError::new(ProviderErrorKind::Auth, err.to_string()))?,
  );
  Ok(headers)
}

#[derive(serde::Serialize)]
struct WireMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(serde::Serialize)]
struct WireResponseFormat {
  r#type: &'static str,
}

#[derive(serde::Serialize)]
struct CompletionRequest<'a> {
  model: &'a str,
  messages: Vec<WireMessage<'a>>,
  max_tokens: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  temperature: Option<f32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<WireResponseFormat>,
}

impl<'a> CompletionRequest<'a> {
  fn from_request(req: &'a ProviderRequest) -> Self {
    Self {
      model: &req.model,
      messages: req
        .messages
        .iter()
        .map(|m| WireMessage {
          role: m.role.as_str(),
          content: &m.content,
        })
        .collect(),
      max_tokens: req.max_tokens,
      temperature: req.temperature,
      response_format: match req.response_format {
        ResponseFormat::Json => Some(WireResponseFormat { r#type: "json_object" }),
        ResponseFormat::Text => None,
      },
    }
  }
}

/// POSTs an OpenAI-style chat completion and extracts the first choice.
async fn post_completion(
  client: &Client,
  url: &str,
  headers: HeaderMap,
  req: &ProviderRequest,
  provider: &str,
) -> Result<ChatResult, ProviderError> {
  let payload = CompletionRequest::from_request(req);

  let resp = client
    .post(url)
    .headers(headers)
    .json(&payload)
    .send()
    .await
    .map_err(|err| ProviderError::network(&err))?;

  if !resp.status().is_success() {
    let status = resp.status().as_u16();
    let text = resp
      .text()
      .await
      .unwrap_or_else(|_| format!("{provider} request failed."));
    return Err(ProviderError::from_status(status, &text));
  }

  let json_body = resp
    .json::<serde_json::Value>()
    .await
    .map_err(|err| ProviderError::new(ProviderErrorKind::MalformedResponse, err.to_string()))?;
  parse_completion(&json_body, &req.model, provider)
}

fn parse_completion(
  body: &serde_json::Value,
  requested_model: &str,
  provider: &str,
) -> Result<ChatResult, ProviderError> {
  let message = body["choices"][0].get("message").ok_or_else(|| {
    ProviderError::new(ProviderErrorKind::MalformedResponse, "response has no choices[0].message")
  })?;
  let content = message["content"]
    .as_str()
    .filter(|c| !c.trim().is_empty())
    .ok_or_else(|| ProviderError::new(ProviderErrorKind::EmptyContent, "message content is empty"))?;

  Ok(ChatResult {
    content: content.to_string(),
    model: body["model"].as_str().unwrap_or(requested_model).to_string(),
    provider: provider.to_string(),
    tokens_used: body["usage"]["total_tokens"].as_u64().map(|t| t as u32),
  })
}

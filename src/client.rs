//! Chat invocation with a strictly ordered, three-tier fallback:
//! primary provider with the configured model, primary provider with the
//! fallback model, then the secondary provider with the bare fallback model.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::json_repair::{add_json_instructions, try_repair_json};
use crate::model_config::ConfigService;
use crate::models::{ChatRequest, ChatResult, ResponseFormat};
use crate::providers::{ModelProvider, ProviderError, ProviderErrorKind, ProviderRequest};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
  #[error("all {attempts} model attempts failed; last error: {last_error}")]
  Exhausted { attempts: usize, last_error: ProviderError },
}

pub struct ChatClient {
  config: Arc<ConfigService>,
  primary: Arc<dyn ModelProvider>,
  secondary: Arc<dyn ModelProvider>,
  timeout: Duration,
}

impl ChatClient {
  pub fn new(config: Arc<ConfigService>, primary: Arc<dyn ModelProvider>, secondary: Arc<dyn ModelProvider>) -> Self {
    Self {
      config,
      primary,
      secondary,
      timeout: DEFAULT_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn config(&self) -> &Arc<ConfigService> {
    &self.config
  }

  pub async fn chat(&self, request: ChatRequest) -> Result<ChatResult, ChatError> {
    let config = self.config.get_config(request.feature).await;

    let mut messages = request.messages;
    if request.response_format == ResponseFormat::Json {
      add_json_instructions(&mut messages);
    }

    let base = ProviderRequest {
      model: config.model.clone(),
      messages,
      max_tokens: request.max_tokens.unwrap_or(config.max_tokens),
      temperature: request.temperature.or(config.temperature),
      response_format: request.response_format,
    };

    let plan: [(&Arc<dyn ModelProvider>, String); 3] = [
      (&self.primary, config.model.clone()),
      (&self.primary, config.fallback_model.clone()),
      (&self.secondary, strip_provider_prefix(&config.fallback_model).to_string()),
    ];

    let attempts = plan.len();
    let mut last_error = None;
    for (idx, (provider, model)) in plan.into_iter().enumerate() {
      let attempt = idx + 1;
      let req = ProviderRequest {
        model: model.clone(),
        ..base.clone()
      };
      let provider: &dyn ModelProvider = provider.as_ref();

      match self.attempt(provider, &req).await {
        Ok(result) => {
          info!(
            feature = %request.feature,
            attempt,
            provider = provider.name(),
            model = %model,
            degraded = attempt > 1,
            "chat attempt succeeded"
          );
          return Ok(result);
        }
        Err(err) => {
          warn!(
            feature = %request.feature,
            attempt,
            provider = provider.name(),
            model = %model,
            error = %err,
            "chat attempt failed"
          );
          last_error = Some(err);
        }
      }
    }

    Err(ChatError::Exhausted {
      attempts,
      last_error: last_error.unwrap_or_else(|| ProviderError::new(ProviderErrorKind::Unknown, "no attempts made")),
    })
  }

  async fn attempt(&self, provider: &dyn ModelProvider, req: &ProviderRequest) -> Result<ChatResult, ProviderError> {
    let mut result = match tokio::time::timeout(self.timeout, provider.send(req)).await {
      Ok(res) => res?,
      Err(_) => {
        return Err(ProviderError::new(
          ProviderErrorKind::Timeout,
          format!("no response within {}s", self.timeout.as_secs()),
        ))
      }
    };

    if req.response_format == ResponseFormat::Json {
      result.content = try_repair_json(&result.content)
        .ok_or_else(|| ProviderError::new(ProviderErrorKind::InvalidJson, "response is not valid JSON"))?;
    }
    Ok(result)
  }
}

/// `openai/gpt-4o-mini` -> `gpt-4o-mini`. Bare names pass through.
pub fn strip_provider_prefix(model: &str) -> &str {
  model.split_once('/').map(|(_, bare)| bare).unwrap_or(model)
}


#[cfg(test)]
mod tests {
  use super::testing::{client, MockProvider, Scripted};
  use super::*;
  use crate::model_config::default_config;
  use crate::models::{ChatMessage, FeatureId, Role};

  fn request() -> ChatRequest {
    ChatRequest::new(
      FeatureId::ContentGeneration,
      vec![ChatMessage::system("You are a tutor."), ChatMessage::user("Teach me Rust")],
    )
  }

  fn json_request() -> ChatRequest {
    ChatRequest {
      response_format: ResponseFormat::Json,
      ..request()
    }
  }

  #[tokio::test]
  async fn primary_failures_fall_back_in_order() {
    let primary = MockProvider::failing("openrouter");
    let secondary = MockProvider::new("openai", vec![Scripted::reply("lesson")]);
    let chat = client(primary.clone(), secondary.clone());
    let config = default_config(FeatureId::ContentGeneration);

    let result = chat.chat(request()).await.unwrap();

    assert_eq!(primary.models().await, vec![config.model.clone(), config.fallback_model.clone()]);
    assert_eq!(secondary.models().await, vec![strip_provider_prefix(&config.fallback_model).to_string()]);
    assert_eq!(result.provider, "openai");
    assert_eq!(result.model, "gpt-4o-mini");
  }

  #[tokio::test]
  async fn first_success_short_circuits() {
    let primary = MockProvider::new("openrouter", vec![Scripted::reply("lesson")]);
    let secondary = MockProvider::failing("openai");
    let chat = client(primary.clone(), secondary.clone());

    let result = chat.chat(request()).await.unwrap();

    assert_eq!(result.provider, "openrouter");
    assert_eq!(result.model, default_config(FeatureId::ContentGeneration).model);
    assert!(secondary.calls.lock().await.is_empty());
    assert_eq!(primary.calls.lock().await.len(), 1);
  }

  #[tokio::test]
  async fn second_tier_success_skips_secondary() {
    let primary = MockProvider::new("openrouter", vec![Scripted::Fail, Scripted::reply("ok")]);
    let secondary = MockProvider::failing("openai");
    let chat = client(primary.clone(), secondary.clone());

    let result = chat.chat(request()).await.unwrap();
    assert_eq!(result.model, default_config(FeatureId::ContentGeneration).fallback_model);
    assert!(secondary.calls.lock().await.is_empty());
  }

  #[tokio::test]
  async fn all_tiers_failing_is_an_error() {
    let primary = MockProvider::failing("openrouter");
    let secondary = MockProvider::failing("openai");
    let chat = client(primary.clone(), secondary.clone());

    let err = chat.chat(request()).await.unwrap_err();
    let ChatError::Exhausted { attempts, last_error } = err;
    assert_eq!(attempts, 3);
    assert_eq!(last_error.kind, ProviderErrorKind::ServerError);
    assert_eq!(primary.calls.lock().await.len(), 2);
    assert_eq!(secondary.calls.lock().await.len(), 1);
  }

  #[tokio::test]
  async fn invalid_json_advances_the_chain() {
    let primary = MockProvider::new(
      "openrouter",
      vec![Scripted::reply("I'd rather chat"), Scripted::reply("Sure:\n```json\n[\"a\"]\n```")],
    );
    let secondary = MockProvider::failing("openai");
    let chat = client(primary.clone(), secondary);

    let result = chat.chat(json_request()).await.unwrap();
    assert_eq!(result.content, "[\"a\"]");
    assert_eq!(primary.calls.lock().await.len(), 2);
  }

  #[tokio::test]
  async fn json_requests_carry_instructions() {
    let primary = MockProvider::new("openrouter", vec![Scripted::reply("{}")]);
    let chat = client(primary.clone(), MockProvider::failing("openai"));

    chat.chat(json_request()).await.unwrap();

    let calls = primary.calls.lock().await;
    let sent = &calls[0].messages;
    assert_eq!(sent[0].role, Role::System);
    assert!(sent[0].content.contains("valid JSON only"));
    assert!(sent.last().unwrap().content.contains("pure JSON"));
  }

  #[tokio::test]
  async fn request_overrides_config_budget() {
    let primary = MockProvider::new("openrouter", vec![Scripted::reply("ok")]);
    let chat = client(primary.clone(), MockProvider::failing("openai"));

    chat.chat(ChatRequest { max_tokens: Some(321), ..request() }).await.unwrap();
    let calls = primary.calls.lock().await;
    assert_eq!(calls[0].max_tokens, 321);
    assert_eq!(calls[0].temperature, default_config(FeatureId::ContentGeneration).temperature);
  }

  #[tokio::test(start_paused = true)]
  async fn timeout_moves_to_next_tier() {
    let primary = MockProvider::new("openrouter", vec![Scripted::Hang, Scripted::reply("late but fine")]);
    let chat = client(primary.clone(), MockProvider::failing("openai"));

    let result = chat.chat(request()).await.unwrap();
    assert_eq!(result.content, "late but fine");
    assert_eq!(primary.calls.lock().await.len(), 2);
  }

  #[test]
  fn strips_vendor_prefix() {
    assert_eq!(strip_provider_prefix("openai/gpt-4o-mini"), "gpt-4o-mini");
    assert_eq!(strip_provider_prefix("gpt-4o-mini"), "gpt-4o-mini");
  }
}

//! Generation features. Each one validates its input, prompts the model,
//! parses the reply into its domain shape and, whenever generation or
//! parsing fails, substitutes a static payload of the same shape.

mod content;
mod insights;
mod margin_notes;
mod plan;
mod questions;
mod recommendations;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::ChatClient;
use crate::models::{ChatMessage, ChatRequest, FeatureId, ResponseFormat};

pub use content::{generate_step_content, StepContentInput};
pub use insights::QuickInsights;
pub use margin_notes::MarginNotes;
pub use plan::PlanGeneration;
pub use questions::RelatedQuestions;
pub use recommendations::Recommendations;

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
  #[error("missing required parameter: {0}")]
  MissingParameter(&'static str),
}

/// Result of a feature call. `fallback_used` marks the static payload.
#[derive(Serialize, Debug, Clone)]
pub struct Generated<T> {
  pub data: T,
  pub fallback_used: bool,
  pub cached: bool,
  pub model: Option<String>,
  pub provider: Option<String>,
  pub tokens_used: Option<u32>,
}

impl<T> Generated<T> {
  fn fallback(data: T) -> Self {
    Self {
      data,
      fallback_used: true,
      cached: false,
      model: None,
      provider: None,
      tokens_used: None,
    }
  }
}

/// Optional personalization attached to most feature inputs.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct LearnerProfile {
  pub level: Option<String>,
  #[serde(default)]
  pub interests: Vec<String>,
  pub learning_style: Option<String>,
}

impl LearnerProfile {
  fn prompt_context(profile: Option<&LearnerProfile>) -> String {
    let Some(profile) = profile else {
      return String::new();
    };
    let mut lines = Vec::new();
    if let Some(level) = profile.level.as_deref().filter(|l| !l.trim().is_empty()) {
      lines.push(format!("- Experience level: {level}"));
    }
    if !profile.interests.is_empty() {
      lines.push(format!("- Interests: {}", profile.interests.join(", ")));
    }
    if let Some(style) = profile.learning_style.as_deref().filter(|s| !s.trim().is_empty()) {
      lines.push(format!("- Preferred learning style: {style}"));
    }
    if lines.is_empty() {
      return String::new();
    }
    format!("\n\nLearner profile:\n{}", lines.join("\n"))
  }
}

pub trait Feature {
  const ID: FeatureId;
  const FORMAT: ResponseFormat;
  /// Overrides the configured budget when the output size is fixed.
  const MAX_TOKENS: Option<u32> = None;

  type Input: Sync;
  type Output: Serialize;

  fn validate(input: &Self::Input) -> Result<(), FeatureError>;
  fn messages(input: &Self::Input) -> Vec<ChatMessage>;
  /// `None` when the reply does not have the expected shape.
  fn parse(content: &str, input: &Self::Input) -> Option<Self::Output>;
  fn fallback(input: &Self::Input) -> Self::Output;
}

pub async fn run_feature<F: Feature>(
  client: &ChatClient,
  input: &F::Input,
) -> Result<Generated<F::Output>, FeatureError> {
  F::validate(input)?;

  let mut request = ChatRequest::new(F::ID, F::messages(input));
  request.response_format = F::FORMAT;
  request.max_tokens = F::MAX_TOKENS;

  let result = match client.chat(request).await {
    Ok(result) => result,
    Err(err) => {
      warn!(feature = %F::ID, error = %err, "generation failed, serving fallback");
      return Ok(Generated::fallback(F::fallback(input)));
    }
  };

  match F::parse(&result.content, input) {
    Some(data) => Ok(Generated {
      data,
      fallback_used: false,
      cached: false,
      model: Some(result.model),
      provider: Some(result.provider),
      tokens_used: result.tokens_used,
    }),
    None => {
      warn!(feature = %F::ID, model = %result.model, "unexpected response shape, serving fallback");
      Ok(Generated::fallback(F::fallback(input)))
    }
  }
}

fn require(value: &str, name: &'static str) -> Result<(), FeatureError> {
  if value.trim().is_empty() {
    Err(FeatureError::MissingParameter(name))
  } else {
    Ok(())
  }
}

/// A JSON list, either bare or wrapped in an object under `key`.
fn parse_list<T: DeserializeOwned>(content: &str, key: &str) -> Option<Vec<T>> {
  let value: serde_json::Value = serde_json::from_str(content).ok()?;
  let list = match value {
    serde_json::Value::Array(_) => value,
    serde_json::Value::Object(mut map) => map.remove(key)?,
    _ => return None,
  };
  serde_json::from_value(list).ok()
}

/// Exactly `count` non-blank strings; extra entries are dropped.
fn take_strings(items: Vec<String>, count: usize) -> Option<Vec<String>> {
  let items: Vec<String> = items
    .into_iter()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .take(count)
    .collect();
  (items.len() == count).then_some(items)
}

/// Content excerpt sent to the model for context-bound features.
fn excerpt(content: &str, max_chars: usize) -> &str {
  match content.char_indices().nth(max_chars) {
    Some((idx, _)) => &content[..idx],
    None => content,
  }
}

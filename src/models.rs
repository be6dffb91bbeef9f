use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of generation features. Each one has its own model settings.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureId {
  PlanGeneration,
  ContentGeneration,
  RelatedQuestions,
  QuickInsights,
  MarginNotes,
  Recommendations,
}

impl FeatureId {
  pub const ALL: [FeatureId; 6] = [
    FeatureId::PlanGeneration,
    FeatureId::ContentGeneration,
    FeatureId::RelatedQuestions,
    FeatureId::QuickInsights,
    FeatureId::MarginNotes,
    FeatureId::Recommendations,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      FeatureId::PlanGeneration => "plan-generation",
      FeatureId::ContentGeneration => "content-generation",
      FeatureId::RelatedQuestions => "related-questions",
      FeatureId::QuickInsights => "quick-insights",
      FeatureId::MarginNotes => "margin-notes",
      FeatureId::Recommendations => "recommendations",
    }
  }
}

impl fmt::Display for FeatureId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FeatureId {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    FeatureId::ALL
      .iter()
      .copied()
      .find(|f| f.as_str() == s)
      .ok_or_else(|| format!("unknown feature: {s}"))
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelConfig {
  pub provider: String,
  pub model: String,
  pub max_tokens: u32,
  pub fallback_model: String,
  pub temperature: Option<f32>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
  Assistant,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::System => "system",
      Role::User => "user",
      Role::Assistant => "assistant",
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: Role::System, content: content.into() }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
  Json,
  #[default]
  Text,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatRequest {
  pub feature: FeatureId,
  pub messages: Vec<ChatMessage>,
  #[serde(default)]
  pub response_format: ResponseFormat,
  pub max_tokens: Option<u32>,
  pub temperature: Option<f32>,
}

impl ChatRequest {
  pub fn new(feature: FeatureId, messages: Vec<ChatMessage>) -> Self {
    Self {
      feature,
      messages,
      response_format: ResponseFormat::Text,
      max_tokens: None,
      temperature: None,
    }
  }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChatResult {
  pub content: String,
  pub model: String,
  pub provider: String,
  pub tokens_used: Option<u32>,
}

#[derive(Serialize, Deserialize)]
pub struct ModelsResponse {
  pub features: Vec<FeatureModel>,
}

#[derive(Serialize, Deserialize)]
pub struct FeatureModel {
  pub feature: FeatureId,
  #[serde(flatten)]
  pub config: ModelConfig,
}

use serde::{Deserialize, Serialize};

use super::{require, Feature, FeatureError, LearnerProfile};
use crate::models::{ChatMessage, FeatureId, ResponseFormat};

pub const RECOMMENDATION_COUNT: usize = 3;

#[derive(Deserialize, Clone, Debug)]
pub struct RecommendationsInput {
  #[serde(default)]
  pub topic: String,
  #[serde(default)]
  pub completed_topics: Vec<String>,
  pub profile: Option<LearnerProfile>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Recommendation {
  pub title: String,
  pub reason: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RecommendationsOutput {
  pub recommendations: Vec<Recommendation>,
}

/// Next learning paths to suggest once a topic is finished.
pub struct Recommendations;

impl Feature for Recommendations {
  const ID: FeatureId = FeatureId::Recommendations;
  const FORMAT: ResponseFormat = ResponseFormat::Json;
  const MAX_TOKENS: Option<u32> = Some(800);

  type Input = RecommendationsInput;
  type Output = RecommendationsOutput;

  fn validate(input: &RecommendationsInput) -> Result<(), FeatureError> {
    require(&input.topic, "topic")
  }

  fn messages(input: &RecommendationsInput) -> Vec<ChatMessage> {
    let completed = if input.completed_topics.is_empty() {
      String::new()
    } else {
      format!(
        "\n\nAlready completed (do not suggest these): {}",
        input.completed_topics.join(", ")
      )
    };

    vec![
      ChatMessage::system("You are a learning advisor who suggests what to study next."),
      ChatMessage::user(format!(
        "The learner just finished a learning path on \"{topic}\".{completed}{profile}\n\nRecommend {RECOMMENDATION_COUNT} topics to learn next. Respond with exactly this JSON shape: {{\"recommendations\": [{{\"title\": \"...\", \"reason\": \"one sentence\"}}]}}",
        topic = input.topic.trim(),
        profile = LearnerProfile::prompt_context(input.profile.as_ref()),
      )),
    ]
  }

  fn parse(content: &str, input: &RecommendationsInput) -> Option<RecommendationsOutput> {
    let items: Vec<Recommendation> = super::parse_list(content, "recommendations")?;
    let completed: Vec<String> = input.completed_topics.iter().map(|t| t.trim().to_lowercase()).collect();
    let recommendations: Vec<Recommendation> = items
      .into_iter()
      .filter(|r| !r.title.trim().is_empty())
      .filter(|r| !completed.contains(&r.title.trim().to_lowercase()))
      .take(RECOMMENDATION_COUNT)
      .collect();
    (recommendations.len() == RECOMMENDATION_COUNT).then_some(RecommendationsOutput { recommendations })
  }

  fn fallback(input: &RecommendationsInput) -> RecommendationsOutput {
    let topic = input.topic.trim();
    let item = |title: String, reason: String| Recommendation { title, reason };
    RecommendationsOutput {
      recommendations: vec![
        item(format!("Advanced {topic}"), format!("Go deeper into the parts of {topic} you just covered.")),
        item(format!("{topic} in Practice"), format!("Apply {topic} to a hands-on project.")),
        item(format!("Topics Related to {topic}"), format!("Broaden your view with subjects that connect to {topic}.")),
      ],
    }
  }
}

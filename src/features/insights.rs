use serde::{Deserialize, Serialize};

use super::{excerpt, require, take_strings, Feature, FeatureError, LearnerProfile};
use crate::models::{ChatMessage, FeatureId, ResponseFormat};

pub const NUGGET_COUNT: usize = 5;

#[derive(Deserialize, Clone, Debug)]
pub struct InsightsInput {
  #[serde(default)]
  pub topic: String,
  #[serde(default)]
  pub content: String,
  pub profile: Option<LearnerProfile>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Insights {
  pub nuggets: Vec<String>,
}

/// "Knowledge nuggets": five one-line takeaways for a lesson.
pub struct QuickInsights;

impl Feature for QuickInsights {
  const ID: FeatureId = FeatureId::QuickInsights;
  const FORMAT: ResponseFormat = ResponseFormat::Json;

  type Input = InsightsInput;
  type Output = Insights;

  fn validate(input: &InsightsInput) -> Result<(), FeatureError> {
    require(&input.topic, "topic")?;
    require(&input.content, "content")
  }

  fn messages(input: &InsightsInput) -> Vec<ChatMessage> {
    vec![
      ChatMessage::system("You distill lessons into short, memorable insights."),
      ChatMessage::user(format!(
        "Topic: {topic}\n\nLesson:\n{content}{profile}\n\nWrite {NUGGET_COUNT} knowledge nuggets, each a single sentence under 25 words. Respond with exactly this JSON shape: {{\"nuggets\": [\"...\"]}}",
        topic = input.topic.trim(),
        content = excerpt(&input.content, 6000),
        profile = LearnerProfile::prompt_context(input.profile.as_ref()),
      )),
    ]
  }

  fn parse(content: &str, _input: &InsightsInput) -> Option<Insights> {
    let nuggets = take_strings(super::parse_list(content, "nuggets")?, NUGGET_COUNT)?;
    Some(Insights { nuggets })
  }

  fn fallback(input: &InsightsInput) -> Insights {
    let topic = input.topic.trim();
    Insights {
      nuggets: vec![
        format!("{topic} builds on a small set of core ideas worth mastering first."),
        format!("Practicing {topic} regularly beats reading about it."),
        format!("Explaining {topic} to someone else reveals gaps in your understanding."),
        format!("Real projects are the fastest way to make {topic} stick."),
        format!("Revisit the fundamentals of {topic} as you advance."),
      ],
    }
  }
}

use serde::{Deserialize, Serialize};

use super::{excerpt, require, take_strings, Feature, FeatureError, LearnerProfile};
use crate::models::{ChatMessage, FeatureId, ResponseFormat};

pub const QUESTION_COUNT: usize = 3;

#[derive(Deserialize, Clone, Debug)]
pub struct QuestionsInput {
  #[serde(default)]
  pub topic: String,
  #[serde(default)]
  pub content: String,
  pub profile: Option<LearnerProfile>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct RelatedQuestionsOutput {
  pub questions: Vec<String>,
}

/// Follow-up questions shown under a lesson.
pub struct RelatedQuestions;

impl Feature for RelatedQuestions {
  const ID: FeatureId = FeatureId::RelatedQuestions;
  const FORMAT: ResponseFormat = ResponseFormat::Json;
  const MAX_TOKENS: Option<u32> = Some(500);

  type Input = QuestionsInput;
  type Output = RelatedQuestionsOutput;

  fn validate(input: &QuestionsInput) -> Result<(), FeatureError> {
    require(&input.topic, "topic")?;
    require(&input.content, "content")
  }

  fn messages(input: &QuestionsInput) -> Vec<ChatMessage> {
    vec![
      ChatMessage::system("You help learners go deeper by suggesting thoughtful follow-up questions."),
      ChatMessage::user(format!(
        "Topic: {topic}\n\nLesson excerpt:\n{content}{profile}\n\nSuggest {QUESTION_COUNT} short questions a curious learner might ask next. Respond with a JSON array of {QUESTION_COUNT} strings.",
        topic = input.topic.trim(),
        content = excerpt(&input.content, 3000),
        profile = LearnerProfile::prompt_context(input.profile.as_ref()),
      )),
    ]
  }

  fn parse(content: &str, _input: &QuestionsInput) -> Option<RelatedQuestionsOutput> {
    let questions = take_strings(super::parse_list(content, "questions")?, QUESTION_COUNT)?;
    Some(RelatedQuestionsOutput { questions })
  }

  fn fallback(input: &QuestionsInput) -> RelatedQuestionsOutput {
    let topic = input.topic.trim();
    RelatedQuestionsOutput {
      questions: vec![
        format!("What are the most important ideas in {topic}?"),
        format!("How is {topic} used in real-world projects?"),
        format!("What should I learn after {topic}?"),
      ],
    }
  }
}

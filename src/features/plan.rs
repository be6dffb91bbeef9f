use serde::{Deserialize, Serialize};

use super::{require, Feature, FeatureError, LearnerProfile};
use crate::models::{ChatMessage, FeatureId, ResponseFormat};

pub const PLAN_STEPS: usize = 10;

#[derive(Deserialize, Clone, Debug)]
pub struct PlanInput {
  #[serde(default)]
  pub topic: String,
  pub goals: Option<String>,
  pub profile: Option<LearnerProfile>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlanStep {
  pub title: String,
  pub description: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct LearningPlan {
  pub topic: String,
  pub steps: Vec<PlanStep>,
}

pub struct PlanGeneration;

impl Feature for PlanGeneration {
  const ID: FeatureId = FeatureId::PlanGeneration;
  const FORMAT: ResponseFormat = ResponseFormat::Json;

  type Input = PlanInput;
  type Output = LearningPlan;

  fn validate(input: &PlanInput) -> Result<(), FeatureError> {
    require(&input.topic, "topic")
  }

  fn messages(input: &PlanInput) -> Vec<ChatMessage> {
    let goals = input
      .goals
      .as_deref()
      .filter(|g| !g.trim().is_empty())
      .map(|g| format!("\n\nThe learner's goals: {g}"))
      .unwrap_or_default();

    vec![
      ChatMessage::system(
        "You are an expert curriculum designer. You break any subject into a clear, progressive learning path.",
      ),
      ChatMessage::user(format!(
        "Create a learning path for the topic \"{topic}\" with exactly {PLAN_STEPS} steps, ordered from fundamentals to advanced application.{goals}{profile}\n\nRespond with exactly this JSON shape:\n{{\"steps\": [{{\"title\": \"...\", \"description\": \"one or two sentences\"}}]}}",
        topic = input.topic.trim(),
        profile = LearnerProfile::prompt_context(input.profile.as_ref()),
      )),
    ]
  }

  fn parse(content: &str, input: &PlanInput) -> Option<LearningPlan> {
    let steps: Vec<PlanStep> = super::parse_list(content, "steps")?;
    if steps.len() != PLAN_STEPS || steps.iter().any(|s| s.title.trim().is_empty()) {
      return None;
    }
    Some(LearningPlan {
      topic: input.topic.trim().to_string(),
      steps,
    })
  }

  fn fallback(input: &PlanInput) -> LearningPlan {
    let topic = input.topic.trim();
    let outline = [
      ("Introduction to {}", "What {} is, why it matters and where it is used."),
      ("Core Concepts of {}", "The essential vocabulary and ideas behind {}."),
      ("Foundations of {}", "The building blocks you need before going deeper into {}."),
      ("Working with {}", "Hands-on basics: first exercises with {}."),
      ("Common Patterns in {}", "Recurring techniques practitioners of {} rely on."),
      ("Intermediate {}", "Combining the fundamentals of {} to solve larger problems."),
      ("Pitfalls and Best Practices in {}", "Typical mistakes in {} and how to avoid them."),
      ("Advanced Topics in {}", "Deeper material for confident learners of {}."),
      ("{} in Practice", "Applying {} to a realistic project."),
      ("Mastering {}", "Review, self-assessment and next directions for {}."),
    ];

    LearningPlan {
      topic: topic.to_string(),
      steps: outline
        .iter()
        .map(|(title, description)| PlanStep {
          title: title.replace("{}", topic),
          description: description.replace("{}", topic),
        })
        .collect(),
    }
  }
}

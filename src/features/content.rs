use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{require, run_feature, Feature, FeatureError, Generated, LearnerProfile};
use crate::client::ChatClient;
use crate::models::{ChatMessage, FeatureId, ResponseFormat};
use crate::storage;

const MIN_LESSON_CHARS: usize = 40;

#[derive(Deserialize, Clone, Debug)]
pub struct StepContentInput {
  #[serde(default)]
  pub topic: String,
  #[serde(default)]
  pub step_title: String,
  #[serde(default)]
  pub step_index: u32,
  /// Learning path the step belongs to. Enables reuse of stored content.
  pub path_id: Option<String>,
  pub step_description: Option<String>,
  pub profile: Option<LearnerProfile>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct StepContent {
  pub markdown: String,
}

pub struct StepContentGeneration;

impl Feature for StepContentGeneration {
  const ID: FeatureId = FeatureId::ContentGeneration;
  const FORMAT: ResponseFormat = ResponseFormat::Text;

  type Input = StepContentInput;
  type Output = StepContent;

  fn validate(input: &StepContentInput) -> Result<(), FeatureError> {
    require(&input.topic, "topic")?;
    require(&input.step_title, "step_title")
  }

  fn messages(input: &StepContentInput) -> Vec<ChatMessage> {
    let description = input
      .step_description
      .as_deref()
      .filter(|d| !d.trim().is_empty())
      .map(|d| format!("\nStep summary: {d}"))
      .unwrap_or_default();

    vec![
      ChatMessage::system(
        "You are a patient expert teacher. You write clear, engaging lessons in Markdown with headings, short paragraphs, concrete examples and fenced code blocks where code helps.",
      ),
      ChatMessage::user(format!(
        "Write the lesson for step {number} of a learning path on \"{topic}\".\nStep title: {title}{description}{profile}\n\nStart with a level-2 heading, explain the key ideas with examples, and finish with a short recap.",
        number = input.step_index + 1,
        topic = input.topic.trim(),
        title = input.step_title.trim(),
        profile = LearnerProfile::prompt_context(input.profile.as_ref()),
      )),
    ]
  }

  fn parse(content: &str, _input: &StepContentInput) -> Option<StepContent> {
    let markdown = content.trim();
    (markdown.chars().count() >= MIN_LESSON_CHARS).then(|| StepContent {
      markdown: markdown.to_string(),
    })
  }

  fn fallback(input: &StepContentInput) -> StepContent {
    let title = input.step_title.trim();
    let topic = input.topic.trim();
    StepContent {
      markdown: format!(
        "## {title}\n\n*This lesson could not be generated right now. Here is a short outline to get you started.*\n\n- Look up a beginner-friendly overview of {title} in the context of {topic}.\n- Note the key terms and try to explain each one in your own words.\n- Try a small exercise that uses what you learned.\n\nCome back later to load the full lesson."
      ),
    }
  }
}

/// Step lessons are stored once generated. A stored lesson for the same
/// `(path_id, step_index)` is returned without calling the model.
pub async fn generate_step_content(
  client: &ChatClient,
  db: &Mutex<Connection>,
  input: &StepContentInput,
) -> Result<Generated<StepContent>, FeatureError> {
  StepContentGeneration::validate(input)?;

  let path_id = input.path_id.as_deref().filter(|p| !p.trim().is_empty());
  if let Some(path_id) = path_id {
    match storage::get_step_content(db, path_id, input.step_index).await {
      Ok(Some(markdown)) => {
        debug!(path_id, step = input.step_index, "serving stored step content");
        return Ok(Generated {
          data: StepContent { markdown },
          fallback_used: false,
          cached: true,
          model: None,
          provider: None,
          tokens_used: None,
        });
      }
      Ok(None) => {}
      Err(err) => warn!(path_id, error = %err, "step content lookup failed"),
    }
  }

  let generated = run_feature::<StepContentGeneration>(client, input).await?;

  if let (Some(path_id), false) = (path_id, generated.fallback_used) {
    let model = generated.model.as_deref().unwrap_or_default();
    if let Err(err) = storage::store_step_content(db, path_id, input.step_index, &generated.data.markdown, model).await {
      warn!(path_id, error = %err, "failed to store step content");
    }
  }

  Ok(generated)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::testing::{client, MockProvider, Scripted};

  const LESSON: &str = "## Borrowing\n\nA reference lets you use a value without owning it.";

  fn input(path_id: Option<&str>) -> StepContentInput {
    StepContentInput {
      topic: "Rust".to_string(),
      step_title: "Borrowing".to_string(),
      step_index: 2,
      path_id: path_id.map(str::to_string),
      step_description: None,
      profile: None,
    }
  }

  #[tokio::test]
  async fn generated_content_is_stored_and_reused() {
    let (_dir, db) = storage::test_db();
    let primary = MockProvider::new("openrouter", vec![Scripted::reply(LESSON)]);
    let chat = client(primary.clone(), MockProvider::failing("openai"));

    let first = generate_step_content(&chat, &db, &input(Some("path-1"))).await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.data.markdown, LESSON);

    let second = generate_step_content(&chat, &db, &input(Some("path-1"))).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.data.markdown, LESSON);
    assert_eq!(primary.calls.lock().await.len(), 1);
  }

  #[tokio::test]
  async fn fallback_content_is_not_stored() {
    let (_dir, db) = storage::test_db();
    let chat = client(MockProvider::failing("openrouter"), MockProvider::failing("openai"));

    let generated = generate_step_content(&chat, &db, &input(Some("path-2"))).await.unwrap();
    assert!(generated.fallback_used);
    assert!(generated.data.markdown.starts_with("## Borrowing"));
    assert!(storage::get_step_content(&db, "path-2", 2).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn missing_step_title_is_rejected() {
    let (_dir, db) = storage::test_db();
    let chat = client(MockProvider::failing("openrouter"), MockProvider::failing("openai"));
    let mut input = input(None);
    input.step_title = String::new();

    let err = generate_step_content(&chat, &db, &input).await.unwrap_err();
    assert!(matches!(err, FeatureError::MissingParameter("step_title")));
  }

  #[test]
  fn prompt_uses_one_based_step_number() {
    let messages = StepContentGeneration::messages(&input(None));
    assert!(messages[1].content.contains("step 3 of a learning path on \"Rust\""));
  }

  #[test]
  fn near_empty_reply_is_rejected() {
    assert!(StepContentGeneration::parse("ok", &input(None)).is_none());
  }
}

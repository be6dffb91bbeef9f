//! Short annotations anchored to paragraphs of a lesson. The model quotes a
//! fragment of the paragraph it comments on; notes are attached to the first
//! paragraph whose text contains that fragment.

use serde::{Deserialize, Serialize};

use super::{excerpt, require, Feature, FeatureError, LearnerProfile};
use crate::models::{ChatMessage, FeatureId, ResponseFormat};
use crate::slides::paragraphs;

const MAX_NOTES: usize = 6;

#[derive(Deserialize, Clone, Debug)]
pub struct MarginNoteInput {
  #[serde(default)]
  pub content: String,
  pub topic: Option<String>,
  pub profile: Option<LearnerProfile>,
}

/// Raw note as returned by the model.
#[derive(Deserialize, Clone, Debug)]
struct QuotedNote {
  quote: String,
  note: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MarginNote {
  pub paragraph_index: usize,
  pub quote: String,
  pub note: String,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct MarginNotesOutput {
  pub notes: Vec<MarginNote>,
}

pub struct MarginNotes;

impl Feature for MarginNotes {
  const ID: FeatureId = FeatureId::MarginNotes;
  const FORMAT: ResponseFormat = ResponseFormat::Json;

  type Input = MarginNoteInput;
  type Output = MarginNotesOutput;

  fn validate(input: &MarginNoteInput) -> Result<(), FeatureError> {
    require(&input.content, "content")
  }

  fn messages(input: &MarginNoteInput) -> Vec<ChatMessage> {
    let topic = input
      .topic
      .as_deref()
      .filter(|t| !t.trim().is_empty())
      .map(|t| format!(" about \"{}\"", t.trim()))
      .unwrap_or_default();

    vec![
      ChatMessage::system(
        "You write concise margin notes for study material: clarifications, analogies, and common misconceptions.",
      ),
      ChatMessage::user(format!(
        "Read this lesson{topic}:\n\n{content}{profile}\n\nWrite up to {MAX_NOTES} margin notes. For each, copy a short exact phrase (5-12 words) from the paragraph it belongs to. Respond with exactly this JSON shape: {{\"notes\": [{{\"quote\": \"exact phrase\", \"note\": \"one or two sentences\"}}]}}",
        content = excerpt(&input.content, 8000),
        profile = LearnerProfile::prompt_context(input.profile.as_ref()),
      )),
    ]
  }

  fn parse(content: &str, input: &MarginNoteInput) -> Option<MarginNotesOutput> {
    let quoted: Vec<QuotedNote> = super::parse_list(content, "notes")?;
    let notes = attach_notes(&paragraphs(&input.content), quoted);
    (!notes.is_empty()).then_some(MarginNotesOutput { notes })
  }

  fn fallback(input: &MarginNoteInput) -> MarginNotesOutput {
    let notes = paragraphs(&input.content)
      .first()
      .map(|first| MarginNote {
        paragraph_index: 0,
        quote: excerpt(first, 60).to_string(),
        note: "Pause here and summarize this section in your own words before moving on.".to_string(),
      })
      .into_iter()
      .collect();
    MarginNotesOutput { notes }
  }
}

/// Lowercased words with markdown emphasis and punctuation stripped.
fn normalize(text: &str) -> String {
  text
    .split_whitespace()
    .map(|w| {
      w.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
    })
    .filter(|w| !w.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Whole-word containment: both sides are normalized word sequences.
fn contains_words(haystack: &str, needle: &str) -> bool {
  !haystack.is_empty() && format!(" {haystack} ").contains(&format!(" {needle} "))
}

/// Index of the paragraph a quote belongs to. A paragraph containing the
/// quote wins over an earlier, shorter paragraph the quote merely contains.
fn locate(normalized: &[String], needle: &str) -> Option<usize> {
  normalized
    .iter()
    .position(|p| contains_words(p, needle))
    .or_else(|| normalized.iter().position(|p| contains_words(needle, p)))
}

/// Notes whose quote matches no paragraph are dropped; blank notes too.
fn attach_notes(paragraphs: &[&str], quoted: Vec<QuotedNote>) -> Vec<MarginNote> {
  let normalized: Vec<String> = paragraphs.iter().map(|p| normalize(p)).collect();

  quoted
    .into_iter()
    .filter(|n| !n.note.trim().is_empty())
    .filter_map(|n| {
      let needle = normalize(&n.quote);
      if needle.is_empty() {
        return None;
      }
      let paragraph_index = locate(&normalized, &needle)?;
      Some(MarginNote {
        paragraph_index,
        quote: n.quote.trim().to_string(),
        note: n.note.trim().to_string(),
      })
    })
    .take(MAX_NOTES)
    .collect()
}

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{ChatMessage, Role};

pub const SYSTEM_JSON_INSTRUCTION: &str = "You must respond with valid JSON only. Do not include any explanatory text, markdown formatting, or code fences before or after the JSON.";

pub const USER_JSON_INSTRUCTION: &str = "Respond with pure JSON only, no prose and no markdown.";

fn json_span() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?s)\{.*\}|\[.*\]").expect("static regex"))
}

/// Best-effort recovery of a JSON document from model output. Returns the
/// trimmed input untouched when it already parses, otherwise the first
/// balanced `{...}` or `[...]` span that parses, otherwise the widest span.
pub fn try_repair_json(raw: &str) -> Option<String> {
  let trimmed = raw.trim();
  if (trimmed.starts_with('{') || trimmed.starts_with('[')) && parses(trimmed) {
    return Some(trimmed.to_string());
  }

  let balanced = trimmed
    .char_indices()
    .filter(|&(_, c)| c == '{' || c == '[')
    .filter_map(|(start, _)| balanced_span(trimmed, start))
    .find(|span| parses(span));
  if let Some(span) = balanced {
    return Some(span.to_string());
  }

  let candidate = json_span().find(trimmed)?.as_str();
  parses(candidate).then(|| candidate.to_string())
}

/// The bracketed span opening at `start`, ended by its matching closer.
/// Brackets inside string literals are ignored.
fn balanced_span(text: &str, start: usize) -> Option<&str> {
  let mut closers = Vec::new();
  let mut in_string = false;
  let mut escaped = false;

  for (offset, c) in text[start..].char_indices() {
    if in_string {
      match c {
        _ if escaped => escaped = false,
        '\\' => escaped = true,
        '"' => in_string = false,
        _ => {}
      }
      continue;
    }
    match c {
      '"' => in_string = true,
      '{' => closers.push('}'),
      '[' => closers.push(']'),
      '}' | ']' => {
        if closers.pop() != Some(c) {
          return None;
        }
        if closers.is_empty() {
          return Some(&text[start..start + offset + c.len_utf8()]);
        }
      }
      _ => {}
    }
  }
  None
}

fn parses(s: &str) -> bool {
  serde_json::from_str::<serde_json::Value>(s).is_ok()
}

/// Appends the JSON-only instruction to the first system message (inserting
/// one if there is none) and to the last user message.
pub fn add_json_instructions(messages: &mut Vec<ChatMessage>) {
  match messages.iter_mut().find(|m| m.role == Role::System) {
    Some(system) => {
      system.content.push_str("\n\n");
      system.content.push_str(SYSTEM_JSON_INSTRUCTION);
    }
    None => messages.insert(0, ChatMessage::system(SYSTEM_JSON_INSTRUCTION)),
  }

  if let Some(user) = messages.iter_mut().rev().find(|m| m.role == Role::User) {
    user.content.push_str("\n\n");
    user.content.push_str(USER_JSON_INSTRUCTION);
  }
}

//! Splits lesson markdown into slides for the presentation view.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MAX_SLIDE_CHARS: usize = 600;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlideKind {
  Text,
  Code,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SlideContent {
  #[serde(rename = "type")]
  pub kind: SlideKind,
  pub content: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub language: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub preview: Option<String>,
}

impl SlideContent {
  fn text(content: String) -> Self {
    let title = heading(&content);
    Self {
      kind: SlideKind::Text,
      content,
      title,
      language: None,
      preview: None,
    }
  }

  fn code(language: Option<String>, code: String) -> Self {
    let preview = code.lines().take(2).collect::<Vec<_>>().join("\n");
    Self {
      kind: SlideKind::Code,
      content: code,
      title: None,
      language,
      preview: Some(preview),
    }
  }
}

fn code_fence() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?s)```([\w+#.-]*)[^\n]*\n(.*?)```").expect("static regex"))
}

fn blank_line() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"\n[ \t]*\n").expect("static regex"))
}

/// Pure: the same input always yields the same slides. Never returns an
/// empty list.
pub fn split_into_slides(text: &str) -> Vec<SlideContent> {
  let mut slides = Vec::new();
  let mut cursor = 0;

  for caps in code_fence().captures_iter(text) {
    let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
    push_text_slides(&text[cursor..whole.start], &mut slides);

    let language = caps
      .get(1)
      .map(|m| m.as_str())
      .filter(|l| !l.is_empty())
      .map(str::to_string);
    let code = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    slides.push(SlideContent::code(language, code.trim_end_matches('\n').to_string()));
    cursor = whole.end;
  }
  push_text_slides(&text[cursor..], &mut slides);

  if slides.is_empty() {
    slides.push(SlideContent {
      kind: SlideKind::Text,
      content: text.to_string(),
      title: None,
      language: None,
      preview: None,
    });
  }
  slides
}

/// Blank-line separated blocks, trimmed, empty ones dropped.
pub fn paragraphs(text: &str) -> Vec<&str> {
  blank_line()
    .split(text)
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .collect()
}

fn push_text_slides(segment: &str, slides: &mut Vec<SlideContent>) {
  for paragraph in paragraphs(segment) {
    if paragraph.chars().count() <= MAX_SLIDE_CHARS {
      slides.push(SlideContent::text(paragraph.to_string()));
    } else {
      slides.extend(pack(sentences(paragraph), MAX_SLIDE_CHARS).into_iter().map(SlideContent::text));
    }
  }
}

/// Sentences end at a run of `.`, `!` or `?` followed by whitespace or the
/// end of the paragraph. Returned pieces are trimmed.
fn sentences(paragraph: &str) -> Vec<&str> {
  let mut out = Vec::new();
  let mut start = 0;
  let mut chars = paragraph.char_indices().peekable();

  while let Some((idx, ch)) = chars.next() {
    if !matches!(ch, '.' | '!' | '?') {
      continue;
    }
    let mut end = idx + ch.len_utf8();
    while let Some(&(i, c)) = chars.peek() {
      if matches!(c, '.' | '!' | '?') {
        end = i + c.len_utf8();
        chars.next();
      } else {
        break;
      }
    }
    let at_boundary = match chars.peek() {
      Some(&(_, c)) => c.is_whitespace(),
      None => true,
    };
    if at_boundary {
      let sentence = paragraph[start..end].trim();
      if !sentence.is_empty() {
        out.push(sentence);
      }
      start = end;
    }
  }

  let rest = paragraph[start..].trim();
  if !rest.is_empty() {
    out.push(rest);
  }
  out
}

/// Greedily packs pieces into chunks of at most `budget` characters.
/// A piece that alone exceeds the budget is broken at word boundaries, and a
/// single word over budget (URLs, encoded blobs) is cut at char boundaries.
fn pack(pieces: Vec<&str>, budget: usize) -> Vec<String> {
  let mut chunks = Vec::new();
  let mut current = String::new();

  for piece in pieces {
    let piece_len = piece.chars().count();
    if piece_len > budget {
      if !current.is_empty() {
        chunks.push(std::mem::take(&mut current));
      }
      let words: Vec<String> = piece.split_whitespace().flat_map(|w| hard_split(w, budget)).collect();
      chunks.extend(pack(words.iter().map(String::as_str).collect(), budget));
      continue;
    }

    let joined_len = current.chars().count() + piece_len + usize::from(!current.is_empty());
    if !current.is_empty() && joined_len > budget {
      chunks.push(std::mem::take(&mut current));
    }
    if !current.is_empty() {
      current.push(' ');
    }
    current.push_str(piece);
  }

  if !current.is_empty() {
    chunks.push(current);
  }
  chunks
}

fn hard_split(word: &str, budget: usize) -> Vec<String> {
  if word.chars().count() <= budget {
    return vec![word.to_string()];
  }
  word
    .chars()
    .collect::<Vec<_>>()
    .chunks(budget)
    .map(|chunk| chunk.iter().collect())
    .collect()
}

fn heading(content: &str) -> Option<String> {
  let first = content.lines().next()?.trim_start();
  let title = first.trim_start_matches('#');
  if title.len() == first.len() || !title.starts_with(' ') {
    return None;
  }
  Some(title.trim().to_string())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn squash(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
  }

  #[test]
  fn code_block_between_paragraphs_yields_three_slides() {
    let text = "Ownership is Rust's core idea.\n\n```rust\nlet s = String::from(\"hi\");\nlet t = s;\nprintln!(\"{t}\");\n```\n\nAfter the move, `s` is no longer usable.";
    let slides = split_into_slides(text);

    assert_eq!(slides.len(), 3);
    assert_eq!(slides[0].kind, SlideKind::Text);
    assert_eq!(slides[0].content, "Ownership is Rust's core idea.");
    assert_eq!(slides[1].kind, SlideKind::Code);
    assert_eq!(slides[1].language.as_deref(), Some("rust"));
    assert_eq!(
      slides[1].preview.as_deref(),
      Some("let s = String::from(\"hi\");\nlet t = s;")
    );
    assert_eq!(slides[2].kind, SlideKind::Text);
  }

  #[test]
  fn code_slide_serializes_type_field() {
    let slides = split_into_slides("```python\nprint(1)\n```");
    let value = serde_json::to_value(&slides[0]).unwrap();
    assert_eq!(value["type"], "code");
    assert_eq!(value["language"], "python");
  }

  #[test]
  fn fence_without_language_has_none() {
    let slides = split_into_slides("```\nplain\n```");
    assert_eq!(slides.len(), 1);
    assert!(slides[0].language.is_none());
    assert_eq!(slides[0].content, "plain");
  }

  #[test]
  fn long_paragraph_is_packed_under_budget() {
    let sentence = "Borrowing lets a function use a value without taking ownership of it. ";
    let paragraph = sentence.repeat(25);
    let paragraph = paragraph.trim();
    assert!(paragraph.len() >= 1700);

    let slides = split_into_slides(paragraph);
    assert!(slides.len() > 1);
    for slide in &slides {
      assert_eq!(slide.kind, SlideKind::Text);
      assert!(slide.content.chars().count() <= MAX_SLIDE_CHARS);
    }

    let joined: String = slides.iter().map(|s| s.content.as_str()).collect();
    assert_eq!(squash(&joined), squash(paragraph));
  }

  #[test]
  fn oversized_sentence_is_split_on_words() {
    let paragraph = "word ".repeat(200);
    let slides = split_into_slides(&paragraph);
    assert!(slides.len() >= 2);
    assert!(slides.iter().all(|s| s.content.chars().count() <= MAX_SLIDE_CHARS));
    let joined: String = slides.iter().map(|s| s.content.as_str()).collect();
    assert_eq!(squash(&joined), squash(&paragraph));
  }

  #[test]
  fn unbroken_token_longer_than_a_slide_is_cut() {
    let paragraph = format!("See https://example.com/{} for details.", "a".repeat(700));
    let slides = split_into_slides(&paragraph);

    assert!(slides.len() >= 2);
    assert!(slides.iter().all(|s| s.content.chars().count() <= MAX_SLIDE_CHARS));
    let joined: String = slides.iter().map(|s| s.content.as_str()).collect();
    assert_eq!(squash(&joined), squash(&paragraph));
  }

  #[test]
  fn hard_split_respects_multibyte_chars() {
    let word = "é".repeat(1300);
    let parts = hard_split(&word, MAX_SLIDE_CHARS);
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[2].chars().count(), 100);
  }

  #[test]
  fn each_short_paragraph_is_its_own_slide() {
    let slides = split_into_slides("## Intro\nFirst part.\n\nSecond part.\n   \nThird part.");
    assert_eq!(slides.len(), 3);
    assert_eq!(slides[0].title.as_deref(), Some("Intro"));
    assert!(slides[1].title.is_none());
  }

  #[test]
  fn empty_input_yields_single_verbatim_slide() {
    let slides = split_into_slides("");
    assert_eq!(slides.len(), 1);
    assert_eq!(slides[0].content, "");

    let slides = split_into_slides("  \n\n  ");
    assert_eq!(slides.len(), 1);
    assert_eq!(slides[0].content, "  \n\n  ");
  }

  #[test]
  fn splitting_is_deterministic() {
    let text = "A. B! C?\n\n```sh\nls\n```";
    assert_eq!(split_into_slides(text), split_into_slides(text));
  }

  #[test]
  fn decimals_do_not_end_sentences() {
    assert_eq!(sentences("Version 1.5 shipped. It works!"), vec!["Version 1.5 shipped.", "It works!"]);
  }
}

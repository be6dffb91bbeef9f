use std::fmt;

/// Why a single provider call failed. Every kind advances the fallback chain;
/// the classification is for logs.
#[derive(Debug, Clone)]
pub struct ProviderError {
  pub kind: ProviderErrorKind,
  pub status: Option<u16>,
  pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
  /// No API key configured for this provider.
  MissingKey,
  /// 401/403
  Auth,
  /// 429
  RateLimit,
  /// 404 or unknown model.
  NotFound,
  /// Request exceeded the per-attempt deadline.
  Timeout,
  /// Connection refused, DNS failure, reset.
  Network,
  /// 5xx
  ServerError,
  /// 2xx body that does not carry a chat completion.
  MalformedResponse,
  /// Completion with null or blank content.
  EmptyContent,
  /// JSON was requested and the content could not be repaired into JSON.
  InvalidJson,
  Unknown,
}

impl ProviderError {
  pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      status: None,
      message: message.into(),
    }
  }

  pub fn from_status(status: u16, body: &str) -> Self {
    let kind = match status {
      401 | 403 => ProviderErrorKind::Auth,
      404 => ProviderErrorKind::NotFound,
      408 => ProviderErrorKind::Timeout,
      429 => ProviderErrorKind::RateLimit,
      500..=599 => ProviderErrorKind::ServerError,
      _ => ProviderErrorKind::Unknown,
    };
    Self {
      kind,
      status: Some(status),
      message: truncate_body(body),
    }
  }

  pub fn network(err: &reqwest::Error) -> Self {
    let kind = if err.is_timeout() {
      ProviderErrorKind::Timeout
    } else {
      ProviderErrorKind::Network
    };
    Self::new(kind, err.to_string())
  }
}

impl fmt::Display for ProviderError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.status {
      Some(status) => write!(f, "{:?} ({}): {}", self.kind, status, self.message),
      None => write!(f, "{:?}: {}", self.kind, self.message),
    }
  }
}

impl std::error::Error for ProviderError {}

fn truncate_body(body: &str) -> String {
  const MAX: usize = 300;
  if body.chars().count() <= MAX {
    body.to_string()
  } else {
    let head: String = body.chars().take(MAX).collect();
    format!("{head}...")
  }
}

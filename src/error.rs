//! Error types for the build lifecycle client

use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
  #[error("{0}")]
  InvalidInput(String),

  #[error("{message} (Status: {status})")]
  Api { status: u16, message: String },

  #[error("No response from server. Please check your connection.")]
  Unreachable(String),

  #[error("Transport error: {0}")]
  Transport(Arc<reqwest::Error>),

  #[error("Decode error: {0}")]
  Decode(String),

  #[error("Config error: {0}")]
  Config(String),
}

impl Error {
  pub fn invalid(message: impl Into<String>) -> Self {
    Self::InvalidInput(message.into())
  }

  /// Whether the error was raised locally, before any request was sent.
  pub fn is_local(&self) -> bool {
    matches!(self, Self::InvalidInput(_) | Self::Config(_))
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Api { status, .. } => Some(*status),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    if err.is_connect() || err.is_timeout() {
      Self::Unreachable(err.to_string())
    } else if err.is_decode() {
      Self::Decode(err.to_string())
    } else {
      Self::Transport(Arc::new(err))
    }
  }
}

impl From<json::Error> for Error {
  fn from(err: json::Error) -> Self {
    Self::Decode(err.to_string())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn api_error_names_status() {
    let err = Error::Api { status: 409, message: "Study has active build".into() };
    assert_eq!(err.to_string(), "Study has active build (Status: 409)");
    assert_eq!(err.status(), Some(409));
    assert!(!err.is_local());
  }

  #[test]
  fn invalid_input_is_local() {
    let err = Error::invalid("Cancellation reason is required");
    assert!(err.is_local());
    assert_eq!(err.status(), None);
  }
}

use std::env;

use crate::prelude::*;

#[derive(Debug, Clone)]
pub struct Config {
  pub api_url: String,
  /// Status re-fetch period for a single watched build.
  pub poll_interval: Duration,
  /// Collection refresh period while any listed build is still running.
  pub refresh_interval: Duration,
  pub recent_window_days: u32,
  pub request_timeout: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: String::from("http://localhost:8081"),

      poll_interval: Duration::from_secs(10),
      refresh_interval: Duration::from_secs(30),
      recent_window_days: 30,
      request_timeout: Duration::from_secs(30),
    }
  }
}

impl Config {
  /// Reads `BUILD_*` variables (after loading `.env`), keeping defaults for
  /// anything unset.
  pub fn from_env() -> Result<Self> {
    dotenvy::dotenv().ok();
    Self::from_vars(|key| env::var(key).ok())
  }

  pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let mut config = Self::default();

    if let Some(url) = var("BUILD_API_URL") {
      config.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(raw) = var("BUILD_POLL_INTERVAL") {
      config.poll_interval = parse_interval("BUILD_POLL_INTERVAL", &raw)?;
    }
    if let Some(raw) = var("BUILD_REFRESH_INTERVAL") {
      config.refresh_interval = parse_interval("BUILD_REFRESH_INTERVAL", &raw)?;
    }
    if let Some(raw) = var("BUILD_REQUEST_TIMEOUT") {
      config.request_timeout = parse_interval("BUILD_REQUEST_TIMEOUT", &raw)?;
    }
    if let Some(raw) = var("BUILD_RECENT_DAYS") {
      config.recent_window_days = raw.trim().parse().map_err(|_| {
        Error::Config(format!("BUILD_RECENT_DAYS: invalid day count `{raw}`"))
      })?;
    }

    Ok(config)
  }
}

fn parse_interval(key: &str, raw: &str) -> Result<Duration> {
  let duration = humantime::parse_duration(raw.trim())
    .map_err(|err| Error::Config(format!("{key}: {err}")))?;

  if duration.is_zero() {
    return Err(Error::Config(format!("{key}: interval must be non-zero")));
  }
  Ok(duration)
}

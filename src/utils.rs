use crate::prelude::*;

pub fn format_date(date: DateTime) -> String {
  date.format("%d.%m.%Y %H:%M").to_string()
}

/// Renders a build duration as `1h 2m 3s`, `2m 3s` or `3s`.
pub fn format_duration(seconds: i64) -> String {
  if seconds <= 0 {
    return String::from("N/A");
  }

  let hours = seconds / 3600;
  let minutes = (seconds % 3600) / 60;
  let secs = seconds % 60;

  if hours > 0 {
    format!("{hours}h {minutes}m {secs}s")
  } else if minutes > 0 {
    format!("{minutes}m {secs}s")
  } else {
    format!("{secs}s")
  }
}

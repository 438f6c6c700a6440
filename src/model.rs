//! Build records and the request/response shapes exchanged with the backend.

use std::fmt;

use json::{Map, Value};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
  Queued,
  InProgress,
  Completed,
  Failed,
  Cancelled,
}

impl BuildStatus {
  pub const ALL: [BuildStatus; 5] = [
    BuildStatus::Queued,
    BuildStatus::InProgress,
    BuildStatus::Completed,
    BuildStatus::Failed,
    BuildStatus::Cancelled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      BuildStatus::Queued => "QUEUED",
      BuildStatus::InProgress => "IN_PROGRESS",
      BuildStatus::Completed => "COMPLETED",
      BuildStatus::Failed => "FAILED",
      BuildStatus::Cancelled => "CANCELLED",
    }
  }

  /// No further transitions are expected without a new build.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      BuildStatus::Completed | BuildStatus::Failed | BuildStatus::Cancelled
    )
  }

  pub fn color(self) -> StatusColor {
    match self {
      BuildStatus::InProgress => StatusColor::Blue,
      BuildStatus::Completed => StatusColor::Green,
      BuildStatus::Failed => StatusColor::Red,
      BuildStatus::Cancelled | BuildStatus::Queued => StatusColor::Gray,
    }
  }
}

impl fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusColor {
  Blue,
  Green,
  Red,
  Gray,
}

impl StatusColor {
  pub fn as_str(self) -> &'static str {
    match self {
      StatusColor::Blue => "blue",
      StatusColor::Green => "green",
      StatusColor::Red => "red",
      StatusColor::Gray => "gray",
    }
  }
}

/// One attempt to provision a study's operational database.
///
/// The status is the only state the client reasons about; the
/// `in_progress`/`completed`/`failed`/`cancelled` predicates are computed
/// from it on every call and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
  pub build_request_id: String,
  pub study_id: i64,
  pub build_status: BuildStatus,

  #[serde(default)]
  pub id: Option<i64>,
  #[serde(default)]
  pub aggregate_uuid: Option<String>,
  #[serde(default)]
  pub study_name: Option<String>,
  #[serde(default)]
  pub study_protocol: Option<String>,
  #[serde(default)]
  pub requested_by: Option<i64>,

  #[serde(default)]
  pub build_start_time: Option<DateTime>,
  #[serde(default)]
  pub build_end_time: Option<DateTime>,
  #[serde(default)]
  pub build_duration_seconds: Option<i64>,

  #[serde(default)]
  pub forms_configured: Option<i64>,
  #[serde(default)]
  pub tables_created: Option<i64>,
  #[serde(default)]
  pub indexes_created: Option<i64>,
  #[serde(default)]
  pub validation_rules_setup: Option<i64>,

  #[serde(default)]
  pub error_message: Option<String>,
  #[serde(default)]
  pub cancellation_reason: Option<String>,
  #[serde(default)]
  pub cancelled_by: Option<i64>,
  #[serde(default)]
  pub cancellation_time: Option<DateTime>,

  #[serde(default)]
  pub created_at: Option<DateTime>,
  #[serde(default)]
  pub updated_at: Option<DateTime>,
}

impl BuildRecord {
  pub fn new(
    build_request_id: impl Into<String>,
    study_id: i64,
    build_status: BuildStatus,
  ) -> Self {
    Self {
      build_request_id: build_request_id.into(),
      study_id,
      build_status,
      id: None,
      aggregate_uuid: None,
      study_name: None,
      study_protocol: None,
      requested_by: None,
      build_start_time: None,
      build_end_time: None,
      build_duration_seconds: None,
      forms_configured: None,
      tables_created: None,
      indexes_created: None,
      validation_rules_setup: None,
      error_message: None,
      cancellation_reason: None,
      cancelled_by: None,
      cancellation_time: None,
      created_at: None,
      updated_at: None,
    }
  }

  /// Queued or running.
  pub fn in_progress(&self) -> bool {
    !self.build_status.is_terminal()
  }

  pub fn completed(&self) -> bool {
    self.build_status == BuildStatus::Completed
  }

  pub fn failed(&self) -> bool {
    self.build_status == BuildStatus::Failed
  }

  pub fn cancelled(&self) -> bool {
    self.build_status == BuildStatus::Cancelled
  }

  pub fn is_terminal(&self) -> bool {
    self.build_status.is_terminal()
  }

  /// Ordering key for "latest" selection.
  pub fn started_or_created(&self) -> Option<DateTime> {
    self.build_start_time.or(self.created_at)
  }

  /// Completion percentage in `0..=100`.
  ///
  /// Terminal builds report 100 (completed) or 0 (failed/cancelled). A
  /// running build is weighted by which phases have reported output and
  /// never exceeds 95 until the backend marks it completed.
  pub fn progress(&self) -> u8 {
    match self.build_status {
      BuildStatus::Completed => 100,
      BuildStatus::Failed | BuildStatus::Cancelled => 0,
      BuildStatus::Queued | BuildStatus::InProgress => {
        let reported = |n: Option<i64>| n.unwrap_or(0) > 0;

        let mut progress = 0;
        if reported(self.forms_configured) {
          progress += 30;
        }
        if reported(self.tables_created) {
          progress += 30;
        }
        if reported(self.validation_rules_setup) {
          progress += 40;
        }
        progress.min(95)
      }
    }
  }

  pub fn status_color(&self) -> StatusColor {
    self.build_status.color()
  }

  pub fn formatted_duration(&self) -> String {
    match self.build_duration_seconds {
      Some(seconds) => utils::format_duration(seconds),
      None if self.in_progress() => String::from("In progress..."),
      None => String::from("N/A"),
    }
  }
}

/// Study identifier plus build parameters this layer does not interpret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
  pub study_id: i64,
  #[serde(flatten)]
  pub parameters: Map<String, Value>,
}

impl BuildRequest {
  pub fn new(study_id: i64) -> Self {
    Self { study_id, parameters: Map::new() }
  }

  pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.parameters.insert(key.into(), value.into());
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
  pub strict_validation: bool,
  pub compliance_check: bool,
  pub performance_check: bool,
}

impl Default for ValidationOptions {
  fn default() -> Self {
    Self {
      strict_validation: true,
      compliance_check: true,
      performance_check: false,
    }
  }
}

impl ValidationOptions {
  /// Applies caller overrides on top of `self`; set fields win.
  pub fn merge(self, overrides: ValidationOverrides) -> Self {
    Self {
      strict_validation: overrides
        .strict_validation
        .unwrap_or(self.strict_validation),
      compliance_check: overrides
        .compliance_check
        .unwrap_or(self.compliance_check),
      performance_check: overrides
        .performance_check
        .unwrap_or(self.performance_check),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationOverrides {
  pub strict_validation: Option<bool>,
  pub compliance_check: Option<bool>,
  pub performance_check: Option<bool>,
}

/// Diagnostic result of a validation run. Not a state transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
  #[serde(default, alias = "isValid", alias = "valid")]
  pub passed: bool,
  #[serde(default, alias = "validationErrors")]
  pub findings: Vec<String>,
  #[serde(flatten)]
  pub details: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionData {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub forms_configured: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tables_created: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub validation_rules_setup: Option<i64>,
  #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
  pub duration_seconds: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(default)]
  pub metadata: Map<String, Value>,
}

/// Tag attached to every command outcome reported through callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
  BuildCreated,
  BuildFailed,
  ValidationCompleted,
  ValidationFailed,
  BuildCancelled,
  CancelFailed,
  BuildCompleted,
  CompleteFailed,
}

impl ActionType {
  pub fn as_str(self) -> &'static str {
    match self {
      ActionType::BuildCreated => "BUILD_CREATED",
      ActionType::BuildFailed => "BUILD_FAILED",
      ActionType::ValidationCompleted => "VALIDATION_COMPLETED",
      ActionType::ValidationFailed => "VALIDATION_FAILED",
      ActionType::BuildCancelled => "BUILD_CANCELLED",
      ActionType::CancelFailed => "CANCEL_FAILED",
      ActionType::BuildCompleted => "BUILD_COMPLETED",
      ActionType::CompleteFailed => "COMPLETE_FAILED",
    }
  }

  pub fn is_failure(self) -> bool {
    matches!(
      self,
      ActionType::BuildFailed
        | ActionType::ValidationFailed
        | ActionType::CancelFailed
        | ActionType::CompleteFailed
    )
  }
}

impl fmt::Display for ActionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Per-status counts over a build collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildMetrics {
  pub queued: usize,
  pub in_progress: usize,
  pub completed: usize,
  pub failed: usize,
  pub cancelled: usize,
  pub total: usize,
  pub has_active_build: bool,
}

impl BuildMetrics {
  pub fn from_builds(builds: &[BuildRecord]) -> Self {
    let mut metrics = Self { total: builds.len(), ..Self::default() };

    for build in builds {
      match build.build_status {
        BuildStatus::Queued => metrics.queued += 1,
        BuildStatus::InProgress => metrics.in_progress += 1,
        BuildStatus::Completed => metrics.completed += 1,
        BuildStatus::Failed => metrics.failed += 1,
        BuildStatus::Cancelled => metrics.cancelled += 1,
      }
    }
    metrics.has_active_build = metrics.queued + metrics.in_progress > 0;

    metrics
  }
}

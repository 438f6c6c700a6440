//! Scripted in-memory backend for unit tests.

use std::{collections::VecDeque, sync::Mutex};

use dashmap::DashMap;
use tokio::time;

use super::Backend;
use crate::{model::*, prelude::*};

/// Queue of canned responses. The last entry repeats once the others have
/// been consumed.
pub struct Script<T> {
  steps: Mutex<VecDeque<Result<T>>>,
}

impl<T: Clone> Script<T> {
  fn empty() -> Self {
    Self { steps: Mutex::new(VecDeque::new()) }
  }

  pub fn push(&self, step: Result<T>) {
    self.steps.lock().unwrap().push_back(step);
  }

  pub fn set(&self, step: Result<T>) {
    let mut steps = self.steps.lock().unwrap();
    steps.clear();
    steps.push_back(step);
  }

  fn next(&self, op: &str) -> Result<T> {
    let mut steps = self.steps.lock().unwrap();
    match steps.len() {
      0 => panic!("no scripted response for `{op}`"),
      1 => steps[0].clone(),
      _ => steps.pop_front().unwrap(),
    }
  }
}

pub struct MockBackend {
  pub create: Script<BuildRecord>,
  pub status: Script<BuildRecord>,
  pub list: Script<Vec<BuildRecord>>,
  pub validate: Script<ValidationReport>,
  pub cancel: Script<BuildRecord>,
  pub complete: Script<BuildRecord>,
  pub has_active: Script<bool>,
  pub count: Script<u64>,
  /// Per-call latency for status fetches, consumed in order.
  pub status_delays: Mutex<VecDeque<Duration>>,
  calls: DashMap<&'static str, Vec<String>>,
}

impl MockBackend {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      create: Script::empty(),
      status: Script::empty(),
      list: Script::empty(),
      validate: Script::empty(),
      cancel: Script::empty(),
      complete: Script::empty(),
      has_active: Script::empty(),
      count: Script::empty(),
      status_delays: Mutex::new(VecDeque::new()),
      calls: DashMap::new(),
    })
  }

  fn record(&self, op: &'static str, arg: impl ToString) {
    self.calls.entry(op).or_default().push(arg.to_string());
  }

  pub fn calls(&self, op: &str) -> usize {
    self.calls.get(op).map_or(0, |args| args.len())
  }

  pub fn args(&self, op: &str) -> Vec<String> {
    self.calls.get(op).map(|args| args.clone()).unwrap_or_default()
  }

  pub fn total_calls(&self) -> usize {
    self.calls.iter().map(|entry| entry.value().len()).sum()
  }
}

pub fn build(id: &str, status: BuildStatus) -> BuildRecord {
  BuildRecord::new(id, 42, status)
}

pub fn server_error() -> Error {
  Error::Api { status: 500, message: String::from("Internal Server Error") }
}

#[async_trait]
impl Backend for MockBackend {
  async fn create_build(&self, request: &BuildRequest) -> Result<BuildRecord> {
    self.record("create_build", request.study_id);
    self.create.next("create_build")
  }

  async fn build_by_request_id(
    &self,
    build_request_id: &str,
  ) -> Result<BuildRecord> {
    self.record("build_by_request_id", build_request_id);

    let delay = self.status_delays.lock().unwrap().pop_front();
    let response = self.status.next("build_by_request_id");
    if let Some(delay) = delay {
      time::sleep(delay).await;
    }
    response
  }

  async fn builds_by_study(&self, study_id: i64) -> Result<Vec<BuildRecord>> {
    self.record("builds_by_study", study_id);
    self.list.next("builds_by_study")
  }

  async fn recent_builds(&self, days: u32) -> Result<Vec<BuildRecord>> {
    self.record("recent_builds", days);
    self.list.next("recent_builds")
  }

  async fn validate(
    &self,
    build_request_id: &str,
    options: &ValidationOptions,
  ) -> Result<ValidationReport> {
    self.record(
      "validate",
      format!(
        "{build_request_id}:{}:{}:{}",
        options.strict_validation,
        options.compliance_check,
        options.performance_check
      ),
    );
    self.validate.next("validate")
  }

  async fn cancel(
    &self,
    build_request_id: &str,
    reason: &str,
  ) -> Result<BuildRecord> {
    self.record("cancel", format!("{build_request_id}:{reason}"));
    self.cancel.next("cancel")
  }

  async fn complete(
    &self,
    build_request_id: &str,
    _data: &CompletionData,
  ) -> Result<BuildRecord> {
    self.record("complete", build_request_id);
    self.complete.next("complete")
  }

  async fn has_active_build(&self, study_id: i64) -> Result<bool> {
    self.record("has_active_build", study_id);
    self.has_active.next("has_active_build")
  }

  async fn build_count(&self, study_id: i64) -> Result<u64> {
    self.record("build_count", study_id);
    self.count.next("build_count")
  }
}

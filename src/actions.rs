//! One-shot build commands.
//!
//! [`BuildActions`] sends mutating commands to the backend and reports each
//! outcome exactly once through the success or error hook, tagged with an
//! [`ActionType`]. It never touches watcher or store state: callers re-fetch
//! after a command to learn the resulting transition.

use crate::{backend::Backend, model::*, prelude::*};

/// Payload handed to the success hook.
#[derive(Debug, Clone, Copy)]
pub enum ActionOutput<'a> {
  Build(&'a BuildRecord),
  Validation(&'a ValidationReport),
}

impl<'a> From<&'a BuildRecord> for ActionOutput<'a> {
  fn from(build: &'a BuildRecord) -> Self {
    ActionOutput::Build(build)
  }
}

impl<'a> From<&'a ValidationReport> for ActionOutput<'a> {
  fn from(report: &'a ValidationReport) -> Self {
    ActionOutput::Validation(report)
  }
}

type SuccessHook = Box<dyn Fn(ActionOutput<'_>, ActionType) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&Error, ActionType) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct ActionState {
  pub loading: bool,
  pub error: Option<Error>,
}

/// Clears `loading` when the command settles, however it settles.
struct Loading<'a>(&'a watch::Sender<ActionState>);

impl Drop for Loading<'_> {
  fn drop(&mut self) {
    self.0.send_modify(|state| state.loading = false);
  }
}

/// Issues build commands one at a time.
///
/// A single `loading` flag covers the instance, so starting a second
/// command before the first settles is a caller error.
pub struct BuildActions {
  backend: Arc<dyn Backend>,
  state: watch::Sender<ActionState>,
  on_success: Option<SuccessHook>,
  on_error: Option<ErrorHook>,
}

impl BuildActions {
  pub fn new(backend: Arc<dyn Backend>) -> Self {
    Self {
      backend,
      state: watch::Sender::new(ActionState::default()),
      on_success: None,
      on_error: None,
    }
  }

  pub fn on_success(
    mut self,
    hook: impl Fn(ActionOutput<'_>, ActionType) + Send + Sync + 'static,
  ) -> Self {
    self.on_success = Some(Box::new(hook));
    self
  }

  pub fn on_error(
    mut self,
    hook: impl Fn(&Error, ActionType) + Send + Sync + 'static,
  ) -> Self {
    self.on_error = Some(Box::new(hook));
    self
  }

  pub fn loading(&self) -> bool {
    self.state.borrow().loading
  }

  pub fn error(&self) -> Option<Error> {
    self.state.borrow().error.clone()
  }

  pub fn clear_error(&self) {
    self.state.send_if_modified(|state| state.error.take().is_some());
  }

  pub fn subscribe(&self) -> watch::Receiver<ActionState> {
    self.state.subscribe()
  }

  fn begin(&self) -> Loading<'_> {
    self.state.send_modify(|state| {
      state.loading = true;
      state.error = None;
    });
    Loading(&self.state)
  }

  fn settle<T>(
    &self,
    result: Result<T>,
    success: ActionType,
    failure: ActionType,
  ) -> Result<T>
  where
    for<'a> ActionOutput<'a>: From<&'a T>,
  {
    match result {
      Ok(value) => {
        info!(action = %success, "Build command succeeded");
        if let Some(hook) = &self.on_success {
          hook(ActionOutput::from(&value), success);
        }
        Ok(value)
      }
      Err(err) => {
        error!(action = %failure, "Build command failed: {err}");
        self.state.send_modify(|state| state.error = Some(err.clone()));
        if let Some(hook) = &self.on_error {
          hook(&err, failure);
        }
        Err(err)
      }
    }
  }

  /// Requests a new build. A rejection (for instance, the study already has
  /// an active build) is reported as `BUILD_FAILED` and not retried.
  pub async fn build_database(
    &self,
    request: &BuildRequest,
  ) -> Result<BuildRecord> {
    let _loading = self.begin();
    info!(study_id = request.study_id, "Requesting study database build");

    let result = self.backend.create_build(request).await;
    self.settle(result, ActionType::BuildCreated, ActionType::BuildFailed)
  }

  /// Runs backend validation with `overrides` applied over
  /// [`ValidationOptions::default`]. Does not change the build's status.
  pub async fn validate_database(
    &self,
    build_request_id: &str,
    overrides: ValidationOverrides,
  ) -> Result<ValidationReport> {
    let _loading = self.begin();
    let options = ValidationOptions::default().merge(overrides);
    info!(%build_request_id, ?options, "Validating study database");

    let result = self.backend.validate(build_request_id, &options).await;
    self.settle(
      result,
      ActionType::ValidationCompleted,
      ActionType::ValidationFailed,
    )
  }

  /// Cancels a build. A blank `reason` fails locally without contacting the
  /// backend.
  pub async fn cancel_build(
    &self,
    build_request_id: &str,
    reason: &str,
  ) -> Result<BuildRecord> {
    let _loading = self.begin();

    let result = if reason.trim().is_empty() {
      Err(Error::invalid("Cancellation reason is required"))
    } else {
      info!(%build_request_id, reason, "Cancelling build");
      self.backend.cancel(build_request_id, reason).await
    };
    self.settle(result, ActionType::BuildCancelled, ActionType::CancelFailed)
  }

  pub async fn complete_build(
    &self,
    build_request_id: &str,
    data: &CompletionData,
  ) -> Result<BuildRecord> {
    let _loading = self.begin();
    info!(%build_request_id, "Completing build");

    let result = self.backend.complete(build_request_id, data).await;
    self.settle(result, ActionType::BuildCompleted, ActionType::CompleteFailed)
  }

  /// Advisory check; any failure reads as "no active build".
  pub async fn check_active_build(&self, study_id: i64) -> bool {
    let _loading = self.begin();

    match self.backend.has_active_build(study_id).await {
      Ok(active) => active,
      Err(err) => {
        warn!(study_id, "Failed to check active build: {err}");
        self.state.send_modify(|state| state.error = Some(err));
        false
      }
    }
  }

  /// Advisory count; any failure reads as zero.
  pub async fn get_build_count(&self, study_id: i64) -> u64 {
    let _loading = self.begin();

    self.backend.build_count(study_id).await.unwrap_or_else(|err| {
      warn!(study_id, "Failed to get build count: {err}");
      0
    })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use tokio_test::{assert_err, assert_ok};

  use super::*;
  use crate::backend::mock::{self, MockBackend};

  type Log = Arc<Mutex<Vec<(String, ActionType)>>>;

  fn actions(backend: &Arc<MockBackend>) -> (BuildActions, Log) {
    let log: Log = Arc::default();
    let (ok, err) = (log.clone(), log.clone());

    let actions = BuildActions::new(backend.clone())
      .on_success(move |output, action| {
        let subject = match output {
          ActionOutput::Build(build) => build.build_request_id.clone(),
          ActionOutput::Validation(report) => format!("passed={}", report.passed),
        };
        ok.lock().unwrap().push((subject, action));
      })
      .on_error(move |error, action| {
        err.lock().unwrap().push((error.to_string(), action));
      });

    (actions, log)
  }

  fn rejected(status: u16, message: &str) -> Error {
    Error::Api { status, message: message.into() }
  }

  #[tokio::test]
  async fn build_created() {
    let backend = MockBackend::new();
    backend.create.set(Ok(mock::build("BUILD-42", BuildStatus::InProgress)));
    let (actions, log) = actions(&backend);

    let build = assert_ok!(actions.build_database(&BuildRequest::new(42)).await);

    assert!(build.in_progress());
    assert!(!actions.loading());
    assert!(actions.error().is_none());
    assert_eq!(
      *log.lock().unwrap(),
      [(String::from("BUILD-42"), ActionType::BuildCreated)]
    );
  }

  #[tokio::test]
  async fn rejected_build_is_reported_and_not_retried() {
    let backend = MockBackend::new();
    backend.create.set(Err(rejected(409, "Study already has an active build")));
    let (actions, log) = actions(&backend);

    let err = assert_err!(actions.build_database(&BuildRequest::new(42)).await);

    assert_eq!(err.status(), Some(409));
    assert_eq!(backend.calls("create_build"), 1);
    assert_eq!(actions.error().and_then(|err| err.status()), Some(409));
    assert!(!actions.loading());

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].1, ActionType::BuildFailed);
    assert!(log[0].0.contains("Status: 409"));
  }

  #[tokio::test]
  async fn validation_merges_caller_options() {
    let backend = MockBackend::new();
    backend.validate.set(Ok(ValidationReport { passed: true, ..Default::default() }));
    let (actions, log) = actions(&backend);

    let overrides =
      ValidationOverrides { performance_check: Some(true), ..Default::default() };
    let report = assert_ok!(actions.validate_database("BUILD-1", overrides).await);

    assert!(report.passed);
    assert_eq!(backend.args("validate"), ["BUILD-1:true:true:true"]);
    assert_eq!(backend.calls("build_by_request_id"), 0);
    assert_eq!(log.lock().unwrap()[0].1, ActionType::ValidationCompleted);

    backend.validate.set(Err(mock::server_error()));
    assert_err!(
      actions.validate_database("BUILD-1", ValidationOverrides::default()).await
    );
    assert_eq!(backend.args("validate")[1], "BUILD-1:true:true:false");
    assert_eq!(log.lock().unwrap()[1].1, ActionType::ValidationFailed);
  }

  #[tokio::test]
  async fn blank_cancellation_reason_fails_locally() {
    let backend = MockBackend::new();
    let (actions, log) = actions(&backend);

    for reason in ["", "   ", "\t\n"] {
      let err = assert_err!(actions.cancel_build("BUILD-1", reason).await);
      assert!(err.is_local());
    }

    assert_eq!(backend.total_calls(), 0);
    assert!(matches!(actions.error(), Some(Error::InvalidInput(_))));

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|(_, action)| *action == ActionType::CancelFailed));
  }

  #[tokio::test]
  async fn cancel_with_reason() {
    let backend = MockBackend::new();
    backend.cancel.set(Ok(mock::build("BUILD-1", BuildStatus::Cancelled)));
    let (actions, log) = actions(&backend);

    assert_err!(actions.cancel_build("BUILD-1", "").await);
    assert_eq!(backend.calls("cancel"), 0);

    let build =
      assert_ok!(actions.cancel_build("BUILD-1", "duplicate request").await);

    assert!(build.cancelled());
    assert!(actions.error().is_none());
    assert_eq!(backend.args("cancel"), ["BUILD-1:duplicate request"]);
    assert_eq!(
      log.lock().unwrap().last(),
      Some(&(String::from("BUILD-1"), ActionType::BuildCancelled))
    );
  }

  #[tokio::test]
  async fn complete_reports_both_outcomes() {
    let backend = MockBackend::new();
    backend.complete.push(Ok(mock::build("BUILD-1", BuildStatus::Completed)));
    backend.complete.push(Err(rejected(400, "Build is not in progress")));
    let (actions, log) = actions(&backend);

    let data = CompletionData { tables_created: Some(12), ..Default::default() };
    assert_ok!(actions.complete_build("BUILD-1", &data).await);
    let err = assert_err!(actions.complete_build("BUILD-1", &data).await);

    assert_eq!(err.to_string(), "Build is not in progress (Status: 400)");
    let actions_seen: Vec<_> =
      log.lock().unwrap().iter().map(|(_, action)| *action).collect();
    assert_eq!(actions_seen, [ActionType::BuildCompleted, ActionType::CompleteFailed]);
  }

  #[tokio::test]
  async fn advisory_queries_fall_back_to_safe_defaults() {
    let backend = MockBackend::new();
    backend.has_active.set(Err(mock::server_error()));
    backend.count.set(Err(mock::server_error()));
    let (actions, log) = actions(&backend);

    assert!(!actions.check_active_build(42).await);
    assert!(actions.error().is_some());
    assert_eq!(actions.get_build_count(42).await, 0);
    assert!(log.lock().unwrap().is_empty());

    backend.has_active.set(Ok(true));
    backend.count.set(Ok(5));
    assert!(actions.check_active_build(42).await);
    assert!(actions.error().is_none());
    assert_eq!(actions.get_build_count(42).await, 5);
  }

  #[tokio::test]
  async fn error_is_cleared_by_next_call_or_explicitly() {
    let backend = MockBackend::new();
    backend.create.push(Err(mock::server_error()));
    backend.create.push(Ok(mock::build("BUILD-2", BuildStatus::Queued)));
    let (actions, _) = actions(&backend);

    assert_err!(actions.build_database(&BuildRequest::new(42)).await);
    assert!(actions.error().is_some());
    actions.clear_error();
    assert!(actions.error().is_none());

    assert_err!(actions.cancel_build("BUILD-2", " ").await);
    assert_ok!(actions.build_database(&BuildRequest::new(42)).await);
    assert!(actions.error().is_none());
  }
}

//! Live status of a single build.
//!
//! A [`BuildWatcher`] re-fetches its build on a fixed interval while the
//! build is queued or running and goes idle once the backend reports a
//! terminal status. Every fetch replaces the whole record; nothing is
//! patched locally.

use std::{
  ops::ControlFlow,
  sync::{
    Weak,
    atomic::{AtomicU64, Ordering},
  },
};

use futures::{FutureExt, future::BoxFuture};

use crate::{
  backend::Backend,
  model::{BuildRecord, StatusColor},
  prelude::*,
  ticker::{Ticker, TickerSlot},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct WatchState {
  pub build_request_id: Option<String>,
  pub build: Option<BuildRecord>,
  pub loading: bool,
  pub error: Option<Error>,
  pub polling: bool,
}

struct Inner {
  backend: Arc<dyn Backend>,
  interval: Duration,
  state: watch::Sender<WatchState>,
  /// Bumped by every fetch and every change of the watched build.
  generation: AtomicU64,
  ticker: TickerSlot,
}

impl Inner {
  fn next_generation(&self) -> u64 {
    self.generation.fetch_add(1, Ordering::SeqCst) + 1
  }

  fn is_current(&self, generation: u64) -> bool {
    self.generation.load(Ordering::SeqCst) == generation
  }

  async fn fetch(self: &Arc<Self>) {
    let Some(build_request_id) = self.state.borrow().build_request_id.clone()
    else {
      return;
    };

    let generation = self.next_generation();
    self.state.send_modify(|state| state.loading = true);

    let result = self.backend.build_by_request_id(&build_request_id).await;

    if !self.is_current(generation) {
      debug!(%build_request_id, generation, "Discarding stale build status");
      return;
    }

    match result {
      Ok(build) => self.apply(build),
      Err(err) => {
        warn!(%build_request_id, "Failed to fetch build status: {err}");
        self.state.send_modify(|state| {
          state.loading = false;
          state.error = Some(err);
        });
      }
    }
  }

  /// Replaces the record and starts or stops polling on status edges.
  fn apply(self: &Arc<Self>, build: BuildRecord) {
    let was_running = self
      .state
      .borrow()
      .build
      .as_ref()
      .is_some_and(BuildRecord::in_progress);
    let running = build.in_progress();
    let status = build.build_status;

    self.state.send_modify(|state| {
      state.build_request_id = Some(build.build_request_id.clone());
      state.build = Some(build);
      state.loading = false;
      state.error = None;
    });

    if !running {
      if self.stop_polling() {
        info!(%status, "Build reached terminal status, polling stopped");
      }
    } else if !was_running {
      self.start_polling();
    }
  }

  fn start_polling(self: &Arc<Self>) -> bool {
    let weak = Arc::downgrade(self);
    let interval = self.interval;

    let started =
      self.ticker.ensure(|| Ticker::spawn("build-status", interval, poll(weak)));
    if started {
      self.state.send_modify(|state| state.polling = true);
    }
    started
  }

  fn stop_polling(&self) -> bool {
    let stopped = self.ticker.clear();
    self.state.send_if_modified(|state| {
      let changed = state.polling;
      state.polling = false;
      changed
    });
    stopped
  }
}

fn poll(
  weak: Weak<Inner>,
) -> impl FnMut() -> BoxFuture<'static, ControlFlow<()>> + Send + 'static {
  move || {
    let weak = weak.clone();
    async move {
      let Some(inner) = weak.upgrade() else {
        return ControlFlow::Break(());
      };
      inner.fetch().await;
      ControlFlow::Continue(())
    }
    .boxed()
  }
}

/// Tracks one build until it reaches a terminal status.
///
/// Polling starts on its own whenever the watched build is (or becomes)
/// in progress and stops when a fetch returns a terminal status. Callers can
/// pause and resume it explicitly; the watched build is kept either way.
/// Dropping the watcher tears the interval down.
pub struct BuildWatcher {
  inner: Arc<Inner>,
}

impl BuildWatcher {
  pub fn new(backend: Arc<dyn Backend>) -> Self {
    Self::with_interval(backend, DEFAULT_POLL_INTERVAL)
  }

  pub fn with_interval(backend: Arc<dyn Backend>, interval: Duration) -> Self {
    Self {
      inner: Arc::new(Inner {
        backend,
        interval,
        state: watch::Sender::new(WatchState::default()),
        generation: AtomicU64::new(0),
        ticker: TickerSlot::default(),
      }),
    }
  }

  /// Starts watching a record the caller already holds, e.g. the result of
  /// a build command. Polls right away if it is still in progress.
  pub fn attach(&self, build: BuildRecord) {
    info!(build_request_id = %build.build_request_id, "Watching build");

    self.inner.next_generation();
    self.inner.stop_polling();
    self.inner.state.send_modify(|state| *state = WatchState::default());
    self.inner.apply(build);
  }

  /// Starts watching a build known only by its request id and fetches it.
  pub async fn watch(&self, build_request_id: impl Into<String>) {
    let build_request_id = build_request_id.into();
    info!(%build_request_id, "Watching build");

    self.inner.next_generation();
    self.inner.stop_polling();
    self.inner.state.send_modify(|state| {
      *state = WatchState {
        build_request_id: Some(build_request_id),
        ..WatchState::default()
      }
    });

    self.inner.fetch().await;
  }

  /// Stops polling and forgets the watched build.
  pub fn detach(&self) {
    self.inner.next_generation();
    self.inner.stop_polling();
    self.inner.state.send_modify(|state| *state = WatchState::default());
  }

  /// Re-fetches the watched build. Does nothing when no build is attached.
  /// Failures land in [`BuildWatcher::error`] and leave polling untouched.
  pub async fn fetch_build_status(&self) {
    self.inner.fetch().await;
  }

  /// Starts the interval if it is not already running.
  pub fn start_polling(&self) {
    self.inner.start_polling();
  }

  pub fn stop_polling(&self) {
    self.inner.stop_polling();
  }

  pub fn is_polling(&self) -> bool {
    self.inner.ticker.is_running()
  }

  pub fn interval(&self) -> Duration {
    self.inner.interval
  }

  pub fn subscribe(&self) -> watch::Receiver<WatchState> {
    self.inner.state.subscribe()
  }

  pub fn state(&self) -> WatchState {
    self.inner.state.borrow().clone()
  }

  pub fn build_request_id(&self) -> Option<String> {
    self.inner.state.borrow().build_request_id.clone()
  }

  pub fn build(&self) -> Option<BuildRecord> {
    self.inner.state.borrow().build.clone()
  }

  pub fn error(&self) -> Option<Error> {
    self.inner.state.borrow().error.clone()
  }

  pub fn loading(&self) -> bool {
    self.inner.state.borrow().loading
  }

  pub fn progress(&self) -> u8 {
    self.inner.state.borrow().build.as_ref().map_or(0, BuildRecord::progress)
  }

  pub fn status_color(&self) -> StatusColor {
    self
      .inner
      .state
      .borrow()
      .build
      .as_ref()
      .map_or(StatusColor::Gray, BuildRecord::status_color)
  }

  pub fn formatted_duration(&self) -> String {
    self
      .inner
      .state
      .borrow()
      .build
      .as_ref()
      .map_or_else(|| String::from("N/A"), BuildRecord::formatted_duration)
  }
}

impl Drop for BuildWatcher {
  fn drop(&mut self) {
    self.inner.stop_polling();
  }
}

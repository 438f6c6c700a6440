//! Build collection with self-managing background refresh.
//!
//! Whether a refresh interval exists is decided from the current list alone:
//! after every fetch the store installs one if any build is still queued or
//! running and tears it down otherwise.

use std::{
  ops::ControlFlow,
  sync::atomic::{AtomicU64, Ordering},
};

use futures::FutureExt;

use crate::{
  backend::Backend,
  model::{BuildMetrics, BuildRecord, BuildStatus},
  prelude::*,
  ticker::{Ticker, TickerSlot},
};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECENT_DAYS: u32 = 30;

/// Which builds the store lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
  Study(i64),
  /// All studies, limited to builds from the last `days` days.
  Recent { days: u32 },
}

impl StoreScope {
  pub fn from_study(study_id: Option<i64>) -> Self {
    match study_id {
      Some(study_id) => StoreScope::Study(study_id),
      None => StoreScope::Recent { days: DEFAULT_RECENT_DAYS },
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct StoreState {
  pub builds: Vec<BuildRecord>,
  pub loading: bool,
  pub error: Option<Error>,
  pub refreshing: bool,
}

struct Inner {
  backend: Arc<dyn Backend>,
  scope: StoreScope,
  interval: Duration,
  state: watch::Sender<StoreState>,
  generation: AtomicU64,
  ticker: TickerSlot,
}

impl Inner {
  async fn fetch(self: &Arc<Self>) {
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    self.state.send_modify(|state| state.loading = true);

    let result = match self.scope {
      StoreScope::Study(study_id) => self.backend.builds_by_study(study_id).await,
      StoreScope::Recent { days } => self.backend.recent_builds(days).await,
    };

    if self.generation.load(Ordering::SeqCst) != generation {
      debug!(generation, "Discarding stale build list");
      return;
    }

    match result {
      Ok(builds) => {
        debug!(scope = ?self.scope, count = builds.len(), "Fetched builds");
        self.state.send_modify(|state| {
          state.builds = builds;
          state.loading = false;
          state.error = None;
        });
      }
      Err(err) => {
        error!(scope = ?self.scope, "Failed to fetch builds: {err}");
        // the last good list stays visible
        self.state.send_modify(|state| {
          state.loading = false;
          state.error = Some(err);
        });
      }
    }

    self.reconcile();
  }

  fn reconcile(self: &Arc<Self>) {
    let active = self.state.borrow().builds.iter().any(BuildRecord::in_progress);

    if active {
      let weak = Arc::downgrade(self);
      self.ticker.ensure(|| {
        Ticker::spawn("build-refresh", self.interval, move || {
          let weak = weak.clone();
          async move {
            let Some(inner) = weak.upgrade() else {
              return ControlFlow::Break(());
            };
            inner.fetch().await;
            ControlFlow::Continue(())
          }
          .boxed()
        })
      });
    } else {
      self.ticker.clear();
    }

    self.state.send_if_modified(|state| {
      let changed = state.refreshing != active;
      state.refreshing = active;
      changed
    });
  }
}

/// List of builds for one study, or recent builds across studies.
///
/// Dropping the store tears down its refresh interval.
pub struct BuildStore {
  inner: Arc<Inner>,
}

impl BuildStore {
  pub fn new(backend: Arc<dyn Backend>, scope: StoreScope) -> Self {
    Self::with_interval(backend, scope, DEFAULT_REFRESH_INTERVAL)
  }

  pub fn with_interval(
    backend: Arc<dyn Backend>,
    scope: StoreScope,
    interval: Duration,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        backend,
        scope,
        interval,
        state: watch::Sender::new(StoreState::default()),
        generation: AtomicU64::new(0),
        ticker: TickerSlot::default(),
      }),
    }
  }

  /// Re-reads the list for this store's scope. On failure the previous list
  /// is kept and the error is recorded.
  pub async fn fetch_builds(&self) {
    self.inner.fetch().await;
  }

  /// User-initiated refresh.
  pub async fn refresh_builds(&self) {
    info!(scope = ?self.inner.scope, "Refreshing builds");
    self.inner.fetch().await;
  }

  pub fn scope(&self) -> StoreScope {
    self.inner.scope
  }

  pub fn interval(&self) -> Duration {
    self.inner.interval
  }

  pub fn is_refreshing(&self) -> bool {
    self.inner.ticker.is_running()
  }

  pub fn subscribe(&self) -> watch::Receiver<StoreState> {
    self.inner.state.subscribe()
  }

  pub fn state(&self) -> StoreState {
    self.inner.state.borrow().clone()
  }

  pub fn builds(&self) -> Vec<BuildRecord> {
    self.inner.state.borrow().builds.clone()
  }

  pub fn loading(&self) -> bool {
    self.inner.state.borrow().loading
  }

  pub fn error(&self) -> Option<Error> {
    self.inner.state.borrow().error.clone()
  }

  pub fn metrics(&self) -> BuildMetrics {
    BuildMetrics::from_builds(&self.inner.state.borrow().builds)
  }

  pub fn get_builds_by_status(&self, status: BuildStatus) -> Vec<BuildRecord> {
    self
      .inner
      .state
      .borrow()
      .builds
      .iter()
      .filter(|build| build.build_status == status)
      .cloned()
      .collect()
  }

  /// Build with the latest start time, falling back to creation time. The
  /// first listed build wins a tie.
  pub fn get_latest_build(&self) -> Option<BuildRecord> {
    self
      .inner
      .state
      .borrow()
      .builds
      .iter()
      .reduce(|latest, build| {
        if build.started_or_created() > latest.started_or_created() {
          build
        } else {
          latest
        }
      })
      .cloned()
  }
}

impl Drop for BuildStore {
  fn drop(&mut self) {
    self.inner.ticker.clear();
  }
}

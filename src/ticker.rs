//! Scoped repeating background task.

use std::{
  ops::ControlFlow,
  sync::{Mutex, MutexGuard, PoisonError},
};

use futures::future::BoxFuture;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

/// Handle to a spawned interval loop. The loop stops when the handle is
/// dropped, when [`Ticker::stop`] is called, or when a tick returns
/// [`ControlFlow::Break`].
///
/// The first tick fires one full period after spawning. A tick's future is
/// awaited before the next tick is scheduled, so ticks never overlap; a tick
/// already running when the ticker is stopped is allowed to finish.
pub struct Ticker {
  name: &'static str,
  period: Duration,
  token: CancellationToken,
}

impl Ticker {
  /// # Panics
  ///
  /// Panics if called outside a Tokio runtime.
  pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Self
  where
    F: FnMut() -> BoxFuture<'static, ControlFlow<()>> + Send + 'static,
  {
    let token = CancellationToken::new();
    let cancelled = token.clone();

    tokio::spawn(async move {
      let mut interval = time::interval_at(Instant::now() + period, period);
      interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
        tokio::select! {
          biased;
          _ = cancelled.cancelled() => break,
          _ = interval.tick() => {
            if tick().await.is_break() {
              break;
            }
          }
        }
      }

      debug!(ticker = name, "Background interval finished");
    });

    debug!(ticker = name, ?period, "Background interval installed");
    Self { name, period, token }
  }

  pub fn period(&self) -> Duration {
    self.period
  }

  pub fn is_stopped(&self) -> bool {
    self.token.is_cancelled()
  }

  pub fn stop(&self) {
    if !self.token.is_cancelled() {
      debug!(ticker = self.name, "Background interval torn down");
      self.token.cancel();
    }
  }
}

impl Drop for Ticker {
  fn drop(&mut self) {
    self.stop();
  }
}

/// At most one live [`Ticker`] owned by a watcher or store.
#[derive(Default)]
pub(crate) struct TickerSlot {
  slot: Mutex<Option<Ticker>>,
}

impl TickerSlot {
  fn lock(&self) -> MutexGuard<'_, Option<Ticker>> {
    self.slot.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn is_running(&self) -> bool {
    self.lock().as_ref().is_some_and(|ticker| !ticker.is_stopped())
  }

  /// Installs the ticker built by `spawn` unless one is already running.
  /// Returns whether a new ticker was installed.
  pub fn ensure(&self, spawn: impl FnOnce() -> Ticker) -> bool {
    let mut slot = self.lock();
    if slot.as_ref().is_some_and(|ticker| !ticker.is_stopped()) {
      return false;
    }
    *slot = Some(spawn());
    true
  }

  /// Stops and drops the current ticker. Returns whether one was running.
  pub fn clear(&self) -> bool {
    let ticker = self.lock().take();
    ticker.is_some_and(|ticker| {
      let running = !ticker.is_stopped();
      ticker.stop();
      running
    })
  }
}

//! Build Monitor - follows study database builds and logs every transition
//!
//! - Lists builds for `STUDY_ID` (or recent builds across studies)
//! - Refreshes the list while any build is queued or running
//! - Polls the newest running build until it finishes

use std::{env, sync::Arc};

use anyhow::Context;
use dashmap::DashMap;
use studybuild::{
  BuildRecord, BuildStatus, BuildStore, BuildWatcher, Config, HttpBackend,
  StoreScope, format_date,
};
use tracing::{info, warn};
use tracing_subscriber::{
  EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();

  tracing_subscriber::registry()
    .with(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "studybuild=debug,reqwest=warn".into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let config = Config::from_env().context("Invalid configuration")?;
  let study_id = env::var("STUDY_ID")
    .ok()
    .map(|id| id.trim().parse::<i64>())
    .transpose()
    .context("Invalid STUDY_ID")?;

  info!("Starting Build Monitor v{}", env!("CARGO_PKG_VERSION"));

  let backend =
    Arc::new(HttpBackend::new(&config).context("Failed to build HTTP client")?);

  match backend.health().await {
    Ok(health) if health.is_up() => {
      info!(service = ?health.service, version = ?health.version, "Build service is up")
    }
    Ok(health) => warn!(status = %health.status, "Build service is not healthy"),
    Err(err) => warn!("Build service health check failed: {err}"),
  }

  let scope = match study_id {
    Some(study_id) => StoreScope::Study(study_id),
    None => StoreScope::Recent { days: config.recent_window_days },
  };
  let store =
    BuildStore::with_interval(backend.clone(), scope, config.refresh_interval);
  let watcher = BuildWatcher::with_interval(backend, config.poll_interval);
  let seen = DashMap::new();

  let mut builds = store.subscribe();
  let mut status = watcher.subscribe();

  store.fetch_builds().await;
  report_builds(&store, &watcher, &seen);

  let shutdown = tokio::signal::ctrl_c();
  tokio::pin!(shutdown);

  loop {
    tokio::select! {
      _ = &mut shutdown => {
        info!("Shutting down");
        break;
      }
      changed = builds.changed() => {
        if changed.is_err() {
          break;
        }
        report_builds(&store, &watcher, &seen);
      }
      changed = status.changed() => {
        if changed.is_err() {
          break;
        }
        let state = status.borrow_and_update().clone();
        if let Some(err) = &state.error {
          warn!("Watched build status unavailable: {err}");
        } else if let Some(build) = &state.build {
          info!(
            build_request_id = %build.build_request_id,
            status = %build.build_status,
            progress = build.progress(),
            color = build.status_color().as_str(),
            duration = %build.formatted_duration(),
            "Watched build"
          );
        }
      }
    }
  }

  watcher.stop_polling();
  drop(store);

  Ok(())
}

/// Logs status transitions and points the watcher at the newest running
/// build once the previous one has finished.
fn report_builds(
  store: &BuildStore,
  watcher: &BuildWatcher,
  seen: &DashMap<String, BuildStatus>,
) {
  if let Some(err) = store.error() {
    warn!("Build list may be stale: {err}");
  }

  let builds = store.builds();
  for build in &builds {
    let previous = seen.insert(build.build_request_id.clone(), build.build_status);
    if previous == Some(build.build_status) {
      continue;
    }

    let started =
      build.build_start_time.map(format_date).unwrap_or_else(|| "-".into());
    match previous {
      Some(previous) => info!(
        "Build {} (study {}): {} -> {}",
        build.build_request_id, build.study_id, previous, build.build_status
      ),
      None => info!(
        "Build {} (study {}): {} since {}",
        build.build_request_id, build.study_id, build.build_status, started
      ),
    }
  }
  seen.retain(|id, _| builds.iter().any(|build| &build.build_request_id == id));

  let metrics = store.metrics();
  info!(
    queued = metrics.queued,
    in_progress = metrics.in_progress,
    completed = metrics.completed,
    failed = metrics.failed,
    cancelled = metrics.cancelled,
    total = metrics.total,
    "Build metrics"
  );

  let watching = watcher.build().is_some_and(|build| build.in_progress());
  if watching {
    return;
  }

  let newest_running = builds
    .iter()
    .filter(|build| build.in_progress())
    .max_by_key(|build| build.started_or_created());
  if let Some(build) = newest_running {
    watcher.attach(BuildRecord::clone(build));
  }
}

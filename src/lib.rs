//! Study database build lifecycle client.
//!
//! - [`BuildActions`] issues build commands (create, validate, cancel,
//!   complete) and reports tagged outcomes
//! - [`BuildWatcher`] polls one build until it reaches a terminal status
//! - [`BuildStore`] lists builds and refreshes itself while any are running
//!
//! The backend is the only source of truth for build state; all three
//! re-read it rather than predicting transitions.

pub mod actions;
pub mod backend;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod ticker;
pub mod watcher;

mod prelude;
mod utils;

pub use actions::{ActionOutput, ActionState, BuildActions};
pub use backend::{Backend, Health, HttpBackend};
pub use config::Config;
pub use error::{Error, Result};
pub use model::{
  ActionType, BuildMetrics, BuildRecord, BuildRequest, BuildStatus,
  CompletionData, StatusColor, ValidationOptions, ValidationOverrides,
  ValidationReport,
};
pub use store::{BuildStore, StoreScope, StoreState};
pub use utils::{format_date, format_duration};
pub use watcher::{BuildWatcher, WatchState};

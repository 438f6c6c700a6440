//! Command/query API of the build service.
//!
//! The backend owns every build record and every state transition; this
//! crate only issues commands and re-reads results through [`Backend`].

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::{Health, HttpBackend};

use crate::{model::*, prelude::*};

#[async_trait]
pub trait Backend: Send + Sync {
  /// Starts a new build. The returned record is queued or running.
  async fn create_build(&self, request: &BuildRequest) -> Result<BuildRecord>;

  async fn build_by_request_id(
    &self,
    build_request_id: &str,
  ) -> Result<BuildRecord>;

  async fn builds_by_study(&self, study_id: i64) -> Result<Vec<BuildRecord>>;

  /// Builds created within the last `days` days, across all studies.
  async fn recent_builds(&self, days: u32) -> Result<Vec<BuildRecord>>;

  async fn validate(
    &self,
    build_request_id: &str,
    options: &ValidationOptions,
  ) -> Result<ValidationReport>;

  async fn cancel(
    &self,
    build_request_id: &str,
    reason: &str,
  ) -> Result<BuildRecord>;

  async fn complete(
    &self,
    build_request_id: &str,
    data: &CompletionData,
  ) -> Result<BuildRecord>;

  async fn has_active_build(&self, study_id: i64) -> Result<bool>;

  async fn build_count(&self, study_id: i64) -> Result<u64>;
}

use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use super::Backend;
use crate::{config::Config, model::*, prelude::*};

const BUILDS_PATH: [&str; 3] = ["api", "v1", "study-database-builds"];

#[derive(Debug, Deserialize)]
struct ErrorBody {
  message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HasActiveRes {
  has_active_build: bool,
}

#[derive(Debug, Deserialize)]
struct CountRes {
  count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
  pub status: String,
  #[serde(default)]
  pub service: Option<String>,
  #[serde(default)]
  pub version: Option<String>,
}

impl Health {
  pub fn is_up(&self) -> bool {
    self.status.eq_ignore_ascii_case("up")
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateReq {
  check_data_integrity: bool,
  validate_schema_structure: bool,
  check_business_rules: bool,
  strict_mode: bool,
  performance_check: bool,
}

impl From<&ValidationOptions> for ValidateReq {
  fn from(options: &ValidationOptions) -> Self {
    Self {
      check_data_integrity: options.strict_validation,
      validate_schema_structure: options.compliance_check,
      check_business_rules: options.compliance_check,
      strict_mode: options.strict_validation,
      performance_check: options.performance_check,
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelReq<'a> {
  build_request_id: &'a str,
  cancellation_reason: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteReq<'a> {
  build_request_id: &'a str,
  #[serde(flatten)]
  data: &'a CompletionData,
}

/// [`Backend`] over the REST endpoints under
/// `{api_url}/api/v1/study-database-builds`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
  client: Client,
  base: Url,
}

impl HttpBackend {
  pub fn new(config: &Config) -> Result<Self> {
    let client = Client::builder()
      .user_agent(concat!("studybuild/", env!("CARGO_PKG_VERSION")))
      .timeout(config.request_timeout)
      .build()?;

    Self::with_client(client, &config.api_url)
  }

  pub fn with_client(client: Client, api_url: &str) -> Result<Self> {
    let mut base = Url::parse(api_url)
      .map_err(|err| Error::Config(format!("api url `{api_url}`: {err}")))?;

    base
      .path_segments_mut()
      .map_err(|_| Error::Config(format!("api url `{api_url}` cannot be a base")))?
      .pop_if_empty()
      .extend(BUILDS_PATH);

    Ok(Self { client, base })
  }

  fn endpoint(&self, segments: &[&str]) -> Url {
    let mut url = self.base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
      path.extend(segments);
    }
    url
  }

  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
    let request_id = Uuid::new_v4().to_string();
    let response = request.header("X-Request-Id", &request_id).send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let message = json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|body| body.message)
        .or_else(|| status.canonical_reason().map(String::from))
        .unwrap_or_else(|| String::from("An error occurred"));

      debug!(%request_id, status = status.as_u16(), "Backend rejected request");
      return Err(Error::Api { status: status.as_u16(), message });
    }

    Ok(response.json().await?)
  }

  /// Most recent build of a study, as chosen by the backend.
  pub async fn latest_for_study(&self, study_id: i64) -> Result<BuildRecord> {
    let url = self.endpoint(&["study", &study_id.to_string(), "latest"]);
    self.send(self.client.get(url)).await
  }

  pub async fn builds_by_status(
    &self,
    status: BuildStatus,
  ) -> Result<Vec<BuildRecord>> {
    let url = self.endpoint(&["status", status.as_str()]);
    self.send(self.client.get(url)).await
  }

  pub async fn health(&self) -> Result<Health> {
    self.send(self.client.get(self.endpoint(&["health"]))).await
  }
}

#[async_trait]
impl Backend for HttpBackend {
  async fn create_build(&self, request: &BuildRequest) -> Result<BuildRecord> {
    self.send(self.client.post(self.endpoint(&[])).json(request)).await
  }

  async fn build_by_request_id(
    &self,
    build_request_id: &str,
  ) -> Result<BuildRecord> {
    let url = self.endpoint(&["request", build_request_id]);
    self.send(self.client.get(url)).await
  }

  async fn builds_by_study(&self, study_id: i64) -> Result<Vec<BuildRecord>> {
    let url = self.endpoint(&["study", &study_id.to_string()]);
    self.send(self.client.get(url)).await
  }

  async fn recent_builds(&self, days: u32) -> Result<Vec<BuildRecord>> {
    let request =
      self.client.get(self.endpoint(&["recent"])).query(&[("days", days)]);
    self.send(request).await
  }

  async fn validate(
    &self,
    build_request_id: &str,
    options: &ValidationOptions,
  ) -> Result<ValidationReport> {
    let url = self.endpoint(&[build_request_id, "validate"]);
    self.send(self.client.post(url).json(&ValidateReq::from(options))).await
  }

  async fn cancel(
    &self,
    build_request_id: &str,
    reason: &str,
  ) -> Result<BuildRecord> {
    let url = self.endpoint(&[build_request_id, "cancel"]);
    let body = CancelReq { build_request_id, cancellation_reason: reason };
    self.send(self.client.post(url).json(&body)).await
  }

  async fn complete(
    &self,
    build_request_id: &str,
    data: &CompletionData,
  ) -> Result<BuildRecord> {
    let url = self.endpoint(&[build_request_id, "complete"]);
    let body = CompleteReq { build_request_id, data };
    self.send(self.client.post(url).json(&body)).await
  }

  async fn has_active_build(&self, study_id: i64) -> Result<bool> {
    let url = self.endpoint(&["study", &study_id.to_string(), "has-active"]);
    let res: HasActiveRes = self.send(self.client.get(url)).await?;
    Ok(res.has_active_build)
  }

  async fn build_count(&self, study_id: i64) -> Result<u64> {
    let url = self.endpoint(&["study", &study_id.to_string(), "count"]);
    let res: CountRes = self.send(self.client.get(url)).await?;
    Ok(res.count)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn backend(api_url: &str) -> HttpBackend {
    HttpBackend::with_client(Client::new(), api_url).unwrap()
  }

  #[test]
  fn endpoints_extend_base_path() {
    let backend = backend("http://localhost:8081/");

    assert_eq!(
      backend.endpoint(&["request", "BUILD-1"]).as_str(),
      "http://localhost:8081/api/v1/study-database-builds/request/BUILD-1"
    );
    assert_eq!(
      backend.endpoint(&[]).as_str(),
      "http://localhost:8081/api/v1/study-database-builds"
    );
  }

  #[test]
  fn request_ids_are_path_escaped() {
    let backend = backend("http://localhost:8081");
    let url = backend.endpoint(&["a/b", "cancel"]);
    assert!(url.as_str().ends_with("/study-database-builds/a%2Fb/cancel"));
  }

  #[test]
  fn rejects_unusable_api_url() {
    assert!(matches!(
      HttpBackend::with_client(Client::new(), "not a url"),
      Err(Error::Config(_))
    ));
    assert!(matches!(
      HttpBackend::with_client(Client::new(), "mailto:ops@example.org"),
      Err(Error::Config(_))
    ));
  }

  #[test]
  fn validation_options_map_to_wire_flags() {
    let req = ValidateReq::from(&ValidationOptions {
      strict_validation: false,
      compliance_check: true,
      performance_check: true,
    });

    assert_eq!(
      json::to_value(&req).unwrap(),
      json::json!({
        "checkDataIntegrity": false,
        "validateSchemaStructure": true,
        "checkBusinessRules": true,
        "strictMode": false,
        "performanceCheck": true
      })
    );
  }
}

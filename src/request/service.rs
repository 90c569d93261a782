use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::StoreError;
use crate::http::ApiClient;
use crate::request::model::{BuildRequest, StatusUpdates};
use crate::syncer::model::TestConfiguration;
use crate::triggerable::model::SlaveInfo;

/// Authoritative record of build requests.
#[async_trait]
pub trait BuildRequestStore: Send + Sync {
    /// All requests of the triggerable that have not reached a terminal status.
    async fn fetch_pending_requests(&self, triggerable: &str) -> Result<Vec<BuildRequest>, StoreError>;

    async fn submit_corrections(
        &self,
        triggerable: &str,
        slave: &SlaveInfo,
        updates: &StatusUpdates,
    ) -> Result<(), StoreError>;

    async fn register_configuration(
        &self,
        triggerable: &str,
        slave: &SlaveInfo,
        configurations: &[TestConfiguration],
    ) -> Result<(), StoreError>;
}

/// Store backed by the perf dashboard's JSON API.
pub struct RemoteBuildRequestStore {
    client: ApiClient,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchResponse {
    status: String,
    #[serde(default)]
    build_requests: Vec<BuildRequest>,
}

impl RemoteBuildRequestStore {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    fn build_requests_path(triggerable: &str) -> String {
        format!("/api/build-requests/{}", triggerable)
    }
}

#[async_trait]
impl BuildRequestStore for RemoteBuildRequestStore {
    async fn fetch_pending_requests(&self, triggerable: &str) -> Result<Vec<BuildRequest>, StoreError> {
        let body = self
            .client
            .get_json(&Self::build_requests_path(triggerable), vec![])
            .await?;
        let response: FetchResponse =
            serde_json::from_value(body).map_err(|err| StoreError::Malformed(err.to_string()))?;
        if response.status != "OK" {
            return Err(StoreError::Rejected(response.status));
        }
        debug!("fetched {} build requests for {}", response.build_requests.len(), triggerable);
        Ok(response.build_requests)
    }

    async fn submit_corrections(
        &self,
        triggerable: &str,
        slave: &SlaveInfo,
        updates: &StatusUpdates,
    ) -> Result<(), StoreError> {
        let body = json!({
            "slaveName": slave.name,
            "slavePassword": slave.password,
            "buildRequestUpdates": updates,
        });
        let response = self
            .client
            .post_json(&Self::build_requests_path(triggerable), body)
            .await?;
        ensure_ok(&response)
    }

    async fn register_configuration(
        &self,
        triggerable: &str,
        slave: &SlaveInfo,
        configurations: &[TestConfiguration],
    ) -> Result<(), StoreError> {
        let body = json!({
            "slaveName": slave.name,
            "slavePassword": slave.password,
            "triggerable": triggerable,
            "configurations": configurations,
        });
        let response = self.client.post_json("/api/update-triggerable/", body).await?;
        ensure_ok(&response)
    }
}

fn ensure_ok(response: &Value) -> Result<(), StoreError> {
    match response.get("status").and_then(Value::as_str) {
        Some("OK") => Ok(()),
        Some(status) => Err(StoreError::Rejected(status.to_string())),
        None => Err(StoreError::Malformed(format!("missing status in {}", response))),
    }
}

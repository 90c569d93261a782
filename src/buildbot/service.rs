use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::FutureExt;
use tracing::debug;

use crate::buildbot::model::{parse_pending_builds, parse_recent_builds, BuilderConfig};
use crate::error::SyncerError;
use crate::http::{ApiClient, ReqParam};
use crate::request::model::BuildRequest;
use crate::syncer::model::{BuildEntry, TestConfiguration};
use crate::syncer::service::{ScheduleFuture, Syncer};

#[derive(Default)]
struct PullState {
    entries: Vec<BuildEntry>,
    /// Workers handed a build since the last pull.
    slaves_with_new_requests: HashSet<String>,
    /// A build was forced without pinning a worker since the last pull.
    forced_without_slave: bool,
}

/// Syncer for one builder of a buildbot 0.8 master.
pub struct BuildbotSyncer {
    client: ApiClient,
    config: BuilderConfig,
    build_request_argument: String,
    state: Mutex<PullState>,
}

impl BuildbotSyncer {
    pub fn new(client: ApiClient, config: BuilderConfig, build_request_argument: impl Into<String>) -> Self {
        Self {
            client,
            config,
            build_request_argument: build_request_argument.into(),
            state: Mutex::new(PullState::default()),
        }
    }

    pub fn builder_url(&self) -> String {
        format!("{}/builders/{}/", self.client.base_url(), self.config.builder)
    }

    fn state(&self) -> MutexGuard<'_, PullState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Picks the worker for a new build, or `None` when every slot is taken.
    /// The outer `Option` is the verdict, the inner one the worker to pin.
    fn claim_slave(&self, slave_name: Option<&str>) -> Option<Option<String>> {
        let mut state = self.state();
        let mut has_pending_without_slave = false;
        let mut used_slaves: HashSet<&str> = HashSet::new();
        for entry in state.entries.iter().filter(|entry| entry.is_pending()) {
            match entry.slave_name.as_deref() {
                Some(name) => {
                    used_slaves.insert(name);
                }
                None => has_pending_without_slave = true,
            }
        }

        if self.config.slave_list.is_empty() || has_pending_without_slave {
            if !used_slaves.is_empty()
                || has_pending_without_slave
                || state.forced_without_slave
                || !state.slaves_with_new_requests.is_empty()
            {
                return None;
            }
            state.forced_without_slave = true;
            return Some(None);
        }

        let candidate = match slave_name {
            Some(name) => Some(name)
                .filter(|name| !used_slaves.contains(name))
                .filter(|name| !state.slaves_with_new_requests.contains(*name))
                .map(str::to_string),
            None => self
                .config
                .slave_list
                .iter()
                .find(|name| {
                    !used_slaves.contains(name.as_str()) && !state.slaves_with_new_requests.contains(*name)
                })
                .cloned(),
        }?;
        state.slaves_with_new_requests.insert(candidate.clone());
        Some(Some(candidate))
    }

    fn force_build_fields(&self, request: &BuildRequest, slave_name: Option<&str>) -> Vec<ReqParam> {
        let scheduler = self.config.scheduler.as_deref().unwrap_or(&self.config.builder);
        let mut fields = vec![
            ReqParam::new("forcescheduler", scheduler),
            ReqParam::new(self.build_request_argument.as_str(), request.id.as_str()),
        ];
        if let Some(slave_name) = slave_name {
            fields.push(ReqParam::new("slavename", slave_name));
        }
        fields.extend(
            self.config
                .arguments
                .iter()
                .map(|(key, value)| ReqParam::new(key.as_str(), value.as_str())),
        );
        fields
    }
}

#[async_trait]
impl Syncer for BuildbotSyncer {
    fn builder_name(&self) -> &str {
        &self.config.builder
    }

    fn test_configurations(&self) -> &[TestConfiguration] {
        &self.config.configurations
    }

    async fn pull_buildbot(&self, lookback_count: usize) -> Result<Vec<BuildEntry>, SyncerError> {
        let builder = &self.config.builder;
        let builder_url = self.builder_url();

        let pending = self
            .client
            .get_json(&format!("/json/builders/{}/pendingBuilds", builder), vec![])
            .await?;
        let select = (1..=lookback_count)
            .map(|offset| ReqParam::new("select", format!("-{}", offset)))
            .collect();
        let recent = self
            .client
            .get_json(&format!("/json/builders/{}/builds/", builder), select)
            .await?;

        let mut entries = parse_pending_builds(&pending, &self.build_request_argument, &builder_url)?;
        entries.extend(parse_recent_builds(&recent, &self.build_request_argument, &builder_url)?);
        debug!("pulled {} entries from {}", entries.len(), builder);

        let mut state = self.state();
        state.entries = entries.clone();
        state.slaves_with_new_requests.clear();
        state.forced_without_slave = false;
        Ok(entries)
    }

    fn schedule_request_in_group_if_available(
        &self,
        request: &BuildRequest,
        slave_name: Option<&str>,
    ) -> Option<ScheduleFuture> {
        if !self.matches_configuration(request) {
            return None;
        }
        let slave_name = self.claim_slave(slave_name)?;
        let fields = self.force_build_fields(request, slave_name.as_deref());
        let path = format!("/builders/{}/force", self.config.builder);
        let client = self.client.clone();
        Some(
            async move {
                client.post_form(&path, fields).await?;
                Ok(())
            }
            .boxed(),
        )
    }
}

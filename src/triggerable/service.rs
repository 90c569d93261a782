use std::collections::HashSet;
use std::sync::Arc;

use bon::bon;
use futures::future::join_all;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{ConfigError, StoreError, SyncError};
use crate::request::model::{merge_updates, BuildRequest};
use crate::request::service::BuildRequestStore;
use crate::syncer::model::TestConfiguration;
use crate::syncer::service::{ScheduleFuture, Syncer};
use crate::triggerable::group::{test_groups_for_build_requests, TestGroup};
use crate::triggerable::model::{GroupAssociation, Observation, PassWarning, SlaveInfo, SyncReport};
use crate::triggerable::observe::ObservationAccumulator;

/// One configured triggerable and the syncers covering it.
pub struct Triggerable {
    name: String,
    lookback_count: usize,
    slave: SlaveInfo,
    store: Arc<dyn BuildRequestStore>,
    syncers: Vec<Arc<dyn Syncer>>,
}

struct ScheduleAttempt {
    request_id: String,
    builder_name: String,
    outcome: ScheduleFuture,
}

#[bon]
impl Triggerable {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        lookback_count: usize,
        slave: SlaveInfo,
        store: Arc<dyn BuildRequestStore>,
        syncers: Vec<Arc<dyn Syncer>>,
    ) -> Result<Self, ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::Invalid("triggerableName must be specified".to_string()));
        }
        if lookback_count == 0 {
            return Err(ConfigError::Invalid("lookbackCount must be greater than 0".to_string()));
        }
        if slave.name.is_empty() || slave.password.is_empty() {
            return Err(ConfigError::Invalid("slave name and password must be specified".to_string()));
        }
        Ok(Self {
            name,
            lookback_count,
            slave,
            store,
            syncers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every (test, platform) pair covered by a syncer, without duplicates.
    pub fn test_configurations(&self) -> Vec<TestConfiguration> {
        let mut seen = HashSet::new();
        self.syncers
            .iter()
            .flat_map(|syncer| syncer.test_configurations().iter())
            .filter(|config| seen.insert((*config).clone()))
            .cloned()
            .collect()
    }

    /// Advertises the covered configurations to the store.
    pub async fn update_triggerable(&self) -> Result<(), StoreError> {
        let configurations = self.test_configurations();
        info!(
            "Registering {} configurations for {}",
            configurations.len(),
            self.name
        );
        self.store
            .register_configuration(&self.name, &self.slave, &configurations)
            .await
    }

    /// Runs one reconciliation pass.
    pub async fn sync_once(&self) -> Result<SyncReport, SyncError> {
        let span = info_span!("sync", triggerable = %self.name, pass = %Uuid::new_v4());
        self.run_pass().instrument(span).await
    }

    async fn run_pass(&self) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        info!("Fetching build requests for {}...", self.name);
        let requests: Vec<BuildRequest> = self
            .store
            .fetch_pending_requests(&self.name)
            .await
            .map_err(|source| SyncError::Fetch {
                triggerable: self.name.clone(),
                source,
            })?
            .into_iter()
            .filter(|request| !request.has_finished())
            .collect();

        self.validate_requests(&requests, &mut report);
        let groups = test_groups_for_build_requests(&requests);

        let observation = self.pull_buildbot_on_all_syncers(&requests, &mut report).await;

        info!("Scheduling builds");
        self.schedule_next_requests(&groups, &observation, &mut report).await;

        // Pull again: the builds just scheduled show up as pending entries.
        let latest = self.pull_buildbot_on_all_syncers(&requests, &mut report).await;
        for request_id in &report.scheduled {
            let slave_name = requests
                .iter()
                .find(|request| &request.id == request_id)
                .and_then(|request| latest.associations.get(&request.test_group))
                .and_then(|association| association.slave_name.as_deref());
            if let Some(slave_name) = slave_name {
                info!("Build request {} is assigned to {}", request_id, slave_name);
            }
        }

        let updates = merge_updates(observation.updates, latest.updates);
        for (request_id, update) in &updates {
            let Some(request) = requests.iter().find(|request| &request.id == request_id) else {
                continue;
            };
            if request.status != update.status {
                info!(
                    "Updating the status of build request {} from {} to {}",
                    request_id, request.status, update.status
                );
            } else if let Some(url) = &update.url {
                info!("Setting the status URL of build request {} to {}", request_id, url);
            }
        }
        self.store
            .submit_corrections(&self.name, &self.slave, &updates)
            .await
            .map_err(|source| SyncError::Persist {
                triggerable: self.name.clone(),
                source,
            })?;
        report.updates_submitted = updates.len();

        info!(
            "Submitted {} updates, scheduled {} requests, {} warnings",
            report.updates_submitted,
            report.scheduled.len(),
            report.warnings.len()
        );
        Ok(report)
    }

    /// Reports each unmatched (platform, test) pair once.
    fn validate_requests(&self, requests: &[BuildRequest], report: &mut SyncReport) {
        let mut reported = HashSet::new();
        for request in requests {
            if self.syncers.iter().any(|syncer| syncer.matches_configuration(request)) {
                continue;
            }
            if reported.insert((request.platform.as_str(), request.test.as_str())) {
                error!(
                    "No matching configuration for test {} on platform {}.",
                    request.test, request.platform
                );
                report.warn(PassWarning::UnmatchedConfiguration {
                    test: request.test.clone(),
                    platform: request.platform.clone(),
                });
            }
        }
    }

    async fn pull_buildbot_on_all_syncers(
        &self,
        requests: &[BuildRequest],
        report: &mut SyncReport,
    ) -> Observation {
        let results = join_all(
            self.syncers
                .iter()
                .map(|syncer| syncer.pull_buildbot(self.lookback_count)),
        )
        .await;

        let mut accumulator = ObservationAccumulator::new(requests);
        let mut unreachable: Vec<&Arc<dyn Syncer>> = Vec::new();
        for (index, (syncer, result)) in self.syncers.iter().zip(results).enumerate() {
            match result {
                Ok(entries) => {
                    for entry in &entries {
                        accumulator.record(index, syncer.builder_name(), entry, report);
                    }
                }
                Err(err) => {
                    warn!("Failed to pull {}: {}", syncer.builder_name(), err);
                    report.warn(PassWarning::PullFailed {
                        builder: syncer.builder_name().to_string(),
                    });
                    unreachable.push(syncer);
                }
            }
        }
        accumulator.finish(|request| {
            unreachable
                .iter()
                .any(|syncer| syncer.matches_configuration(request))
        })
    }

    async fn schedule_next_requests(
        &self,
        groups: &[TestGroup],
        observation: &Observation,
        report: &mut SyncReport,
    ) {
        // Slots are claimed one group at a time, in discovery order, so the
        // first group wins a contended worker. Only the backend round trips
        // run concurrently, at most one per group.
        let mut attempts = Vec::new();
        for group in groups {
            let Some(request) = group.next_request(&observation.updates) else {
                continue;
            };
            let association = observation.associations.get(&group.id);
            if let Some(attempt) = self.schedule_request(request, association, report) {
                attempts.push(attempt);
            }
        }

        let results = join_all(attempts.into_iter().map(|attempt| async move {
            let result = attempt.outcome.await;
            (attempt.request_id, attempt.builder_name, result)
        }))
        .await;

        for (request_id, builder_name, result) in results {
            match result {
                Ok(()) => report.scheduled.push(request_id),
                Err(err) => {
                    warn!(
                        "Failed to schedule build request {} in {}: {}",
                        request_id, builder_name, err
                    );
                    report.warn(PassWarning::ScheduleFailed {
                        request: request_id,
                        builder: builder_name,
                    });
                }
            }
        }
    }

    fn schedule_request(
        &self,
        request: &BuildRequest,
        association: Option<&GroupAssociation>,
        report: &mut SyncReport,
    ) -> Option<ScheduleAttempt> {
        let slave_name = association.and_then(|association| association.slave_name.as_deref());

        let (syncer, outcome) = if request.has_explicit_order() {
            // Later requests of a group stay with the syncer that ran the earlier ones.
            let Some(syncer) = association
                .and_then(|association| association.syncer)
                .and_then(|index| self.syncers.get(index))
            else {
                error!("Could not identify the syncer for {}.", request.id);
                report.warn(PassWarning::MissingSyncer {
                    request: request.id.clone(),
                });
                return None;
            };
            let outcome = syncer.schedule_request_in_group_if_available(request, slave_name)?;
            (syncer, outcome)
        } else {
            self.syncers.iter().find_map(|syncer| {
                syncer
                    .schedule_request_in_group_if_available(request, None)
                    .map(|outcome| (syncer, outcome))
            })?
        };

        let on_slave = slave_name
            .map(|slave_name| format!(" on {}", slave_name))
            .unwrap_or_default();
        info!(
            "Scheduling build request {}{} in {}",
            request.id,
            on_slave,
            syncer.builder_name()
        );
        Some(ScheduleAttempt {
            request_id: request.id.clone(),
            builder_name: syncer.builder_name().to_string(),
            outcome,
        })
    }
}

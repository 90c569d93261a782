use std::collections::{HashMap, HashSet};

use tracing::{debug, error};

use crate::request::model::{BuildRequest, BuildRequestStatus, StatusUpdate};
use crate::syncer::model::BuildEntry;
use crate::triggerable::model::{Observation, PassWarning, SyncReport};

/// Pass-local sink for backend entries. Syncers are polled concurrently but
/// their entries are folded in here one syncer at a time.
pub struct ObservationAccumulator<'a> {
    requests: &'a [BuildRequest],
    requests_by_id: HashMap<&'a str, &'a BuildRequest>,
    associated: HashSet<&'a str>,
    builder_names: HashMap<usize, String>,
    observation: Observation,
}

impl<'a> ObservationAccumulator<'a> {
    pub fn new(requests: &'a [BuildRequest]) -> Self {
        Self {
            requests,
            requests_by_id: requests.iter().map(|request| (request.id.as_str(), request)).collect(),
            associated: HashSet::new(),
            builder_names: HashMap::new(),
            observation: Observation::default(),
        }
    }

    /// Folds one entry reported by the syncer at `syncer_index`.
    pub fn record(&mut self, syncer_index: usize, builder_name: &str, entry: &BuildEntry, report: &mut SyncReport) {
        let Some(request_id) = entry.build_request_id.as_deref() else {
            return;
        };
        let Some(&request) = self.requests_by_id.get(request_id) else {
            debug!("ignoring build for unknown request {} in {}", request_id, builder_name);
            return;
        };
        // The request is alive on the backend even if the entry gets discarded below.
        self.associated.insert(request.id.as_str());
        self.builder_names
            .entry(syncer_index)
            .or_insert_with(|| builder_name.to_string());

        let association = self
            .observation
            .associations
            .entry(request.test_group.clone())
            .or_default();
        match association.syncer {
            Some(owner) if owner != syncer_index => {
                let kept = self
                    .builder_names
                    .get(&owner)
                    .cloned()
                    .unwrap_or_else(|| owner.to_string());
                error!(
                    "Test group {} is claimed by {} but build request {} was found in {}; ignoring it",
                    request.test_group, kept, request.id, builder_name
                );
                report.warn(PassWarning::ConflictingSyncer {
                    group: request.test_group.clone(),
                    kept,
                    discarded: builder_name.to_string(),
                });
                return;
            }
            _ => association.syncer = Some(syncer_index),
        }
        if let Some(slave_name) = &entry.slave_name {
            match &association.slave_name {
                Some(existing) if existing != slave_name => error!(
                    "Test group {} was observed on both {} and {}",
                    request.test_group, existing, slave_name
                ),
                _ => association.slave_name = Some(slave_name.clone()),
            }
        }

        let update = match entry.build_request_status_if_update_is_needed(request) {
            Some(status) => {
                debug!(
                    "Build request {} moves from {} to {} in {}",
                    request.id, request.status, status, builder_name
                );
                StatusUpdate::new(status, entry.url.clone())
            }
            None if request.url.is_none() && entry.url.is_some() => {
                debug!(
                    "Build request {} has the status URL {}",
                    request.id,
                    entry.url.as_deref().unwrap_or_default()
                );
                StatusUpdate::new(request.status, entry.url.clone())
            }
            None => return,
        };
        let merged = match self.observation.updates.remove(&request.id) {
            Some(previous) => previous.merge(update),
            None => update,
        };
        self.observation.updates.insert(request.id.clone(), merged);
    }

    /// Stages `failedIfNotCompleted` for started requests nobody reported.
    /// `unobservable` marks requests whose syncer could not be polled.
    pub fn finish(mut self, unobservable: impl Fn(&BuildRequest) -> bool) -> Observation {
        for request in self.requests {
            if !request.has_started() || request.has_finished() {
                continue;
            }
            if self.associated.contains(request.id.as_str())
                || self.observation.updates.contains_key(&request.id)
            {
                continue;
            }
            if unobservable(request) {
                debug!("not failing build request {}: its builder could not be polled", request.id);
                continue;
            }
            debug!("Build request {} was not found on any builder", request.id);
            self.observation.updates.insert(
                request.id.clone(),
                StatusUpdate::new(BuildRequestStatus::FailedIfNotCompleted, None),
            );
        }
        self.observation
    }
}

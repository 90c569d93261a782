//! In-memory store and backend used by the engine tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;

use crate::error::{StoreError, SyncerError};
use crate::http::HttpError;
use crate::request::model::{BuildRequest, BuildRequestStatus, StatusUpdates};
use crate::request::service::BuildRequestStore;
use crate::syncer::model::{BuildEntry, BuildEntryState, TestConfiguration};
use crate::syncer::service::{ScheduleFuture, Syncer};
use crate::triggerable::model::SlaveInfo;

pub fn slave() -> SlaveInfo {
    SlaveInfo {
        name: "sync-slave".to_string(),
        password: "secret".to_string(),
    }
}

pub fn request(id: &str, group: &str, order: i64, status: BuildRequestStatus) -> BuildRequest {
    BuildRequest::builder()
        .id(id)
        .test("1")
        .platform("2")
        .test_group(group)
        .order(order)
        .status(status)
        .build()
}

#[derive(Default)]
pub struct MockStore {
    pub requests: Mutex<Vec<BuildRequest>>,
    pub submitted: Mutex<Vec<StatusUpdates>>,
    pub registered: Mutex<Vec<Vec<TestConfiguration>>>,
    /// Ids returned by each fetch.
    pub fetched: Mutex<Vec<Vec<String>>>,
    pub fail_fetch: Mutex<bool>,
    pub fail_submit: Mutex<bool>,
}

impl MockStore {
    pub fn with_requests(requests: Vec<BuildRequest>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(requests),
            ..Default::default()
        })
    }

    pub fn status_of(&self, id: &str) -> BuildRequestStatus {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|request| request.id == id)
            .map(|request| request.status)
            .unwrap()
    }

    pub fn last_submitted(&self) -> StatusUpdates {
        self.submitted.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl BuildRequestStore for MockStore {
    async fn fetch_pending_requests(&self, _triggerable: &str) -> Result<Vec<BuildRequest>, StoreError> {
        if *self.fail_fetch.lock().unwrap() {
            return Err(StoreError::Http(HttpError::Io("connection refused".to_string())));
        }
        let requests: Vec<BuildRequest> = self
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| !request.has_finished())
            .cloned()
            .collect();
        self.fetched
            .lock()
            .unwrap()
            .push(requests.iter().map(|request| request.id.clone()).collect());
        Ok(requests)
    }

    async fn submit_corrections(
        &self,
        _triggerable: &str,
        _slave: &SlaveInfo,
        updates: &StatusUpdates,
    ) -> Result<(), StoreError> {
        if *self.fail_submit.lock().unwrap() {
            return Err(StoreError::Rejected("InvalidSlave".to_string()));
        }
        let mut requests = self.requests.lock().unwrap();
        for request in requests.iter_mut() {
            if let Some(update) = updates.get(&request.id) {
                request.status = update.status;
                if update.url.is_some() {
                    request.url = update.url.clone();
                }
            }
        }
        self.submitted.lock().unwrap().push(updates.clone());
        Ok(())
    }

    async fn register_configuration(
        &self,
        _triggerable: &str,
        _slave: &SlaveInfo,
        configurations: &[TestConfiguration],
    ) -> Result<(), StoreError> {
        self.registered.lock().unwrap().push(configurations.to_vec());
        Ok(())
    }
}

/// Backend double: returns whatever entries the test put in and queues a
/// pending entry for every accepted schedule.
pub struct MockSyncer {
    pub name: String,
    pub configurations: Vec<TestConfiguration>,
    pub entries: Mutex<Vec<BuildEntry>>,
    pub free_slots: Mutex<usize>,
    pub fail_pull: Mutex<bool>,
    /// Upcoming pulls that come back empty, as if the backend lagged.
    pub blind_pulls: Mutex<usize>,
    pub fail_schedule: Mutex<bool>,
    pub attempts: Mutex<Vec<(String, Option<String>)>>,
}

impl MockSyncer {
    pub fn new(name: &str, configurations: Vec<TestConfiguration>, free_slots: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            configurations,
            entries: Mutex::new(vec![]),
            free_slots: Mutex::new(free_slots),
            fail_pull: Mutex::new(false),
            blind_pulls: Mutex::new(0),
            fail_schedule: Mutex::new(false),
            attempts: Mutex::new(vec![]),
        })
    }

    pub fn set_state(&self, request_id: &str, state: BuildEntryState, slave_name: Option<&str>) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|entry| entry.build_request_id.as_deref() != Some(request_id));
        entries.push(
            BuildEntry::builder()
                .build_request_id(request_id)
                .maybe_slave_name(slave_name)
                .url(format!("http://build.example.org/builders/{}/{}", self.name, request_id))
                .state(state)
                .build(),
        );
    }

    pub fn forget(&self, request_id: &str) {
        self.entries
            .lock()
            .unwrap()
            .retain(|entry| entry.build_request_id.as_deref() != Some(request_id));
    }

    pub fn attempted_ids(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl Syncer for MockSyncer {
    fn builder_name(&self) -> &str {
        &self.name
    }

    fn test_configurations(&self) -> &[TestConfiguration] {
        &self.configurations
    }

    async fn pull_buildbot(&self, _lookback_count: usize) -> Result<Vec<BuildEntry>, SyncerError> {
        if *self.fail_pull.lock().unwrap() {
            return Err(SyncerError::Malformed("not json".to_string()));
        }
        let mut blind_pulls = self.blind_pulls.lock().unwrap();
        if *blind_pulls > 0 {
            *blind_pulls -= 1;
            return Ok(vec![]);
        }
        Ok(self.entries.lock().unwrap().clone())
    }

    fn schedule_request_in_group_if_available(
        &self,
        request: &BuildRequest,
        slave_name: Option<&str>,
    ) -> Option<ScheduleFuture> {
        if !self.matches_configuration(request) {
            return None;
        }
        self.attempts
            .lock()
            .unwrap()
            .push((request.id.clone(), slave_name.map(str::to_string)));
        let mut free_slots = self.free_slots.lock().unwrap();
        if *free_slots == 0 {
            return None;
        }
        *free_slots -= 1;
        if *self.fail_schedule.lock().unwrap() {
            return Some(async { Err(SyncerError::Malformed("force failed".to_string())) }.boxed());
        }
        self.set_state(&request.id, BuildEntryState::Pending, slave_name);
        Some(async { Ok(()) }.boxed())
    }
}

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::request::model::{string_or_number, BuildRequest, BuildRequestStatus};

/// A (test, platform) pair a syncer knows how to build.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TestConfiguration {
    #[serde(deserialize_with = "string_or_number")]
    pub test: String,
    #[serde(deserialize_with = "string_or_number")]
    pub platform: String,
}

impl TestConfiguration {
    pub fn new(test: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            test: test.into(),
            platform: platform.into(),
        }
    }

    pub fn matches(&self, request: &BuildRequest) -> bool {
        self.test == request.test && self.platform == request.platform
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BuildEntryState {
    /// Queued on the backend, no worker has picked it up yet.
    Pending,
    InProgress,
    Finished,
}

/// One build observed on the CI backend.
#[derive(Clone, Debug, PartialEq, Builder)]
pub struct BuildEntry {
    #[builder(into)]
    pub build_request_id: Option<String>,
    #[builder(into)]
    pub slave_name: Option<String>,
    #[builder(into)]
    pub url: Option<String>,
    pub state: BuildEntryState,
}

impl BuildEntry {
    pub fn is_pending(&self) -> bool {
        self.state == BuildEntryState::Pending
    }

    /// Status this entry implies for its build request.
    pub fn reported_status(&self) -> BuildRequestStatus {
        match self.state {
            BuildEntryState::Pending => BuildRequestStatus::Scheduled,
            BuildEntryState::InProgress => BuildRequestStatus::Running,
            // The store settles completed vs failed from the uploaded results.
            BuildEntryState::Finished => BuildRequestStatus::FailedIfNotCompleted,
        }
    }

    /// The status `request` should move to, or `None` when the recorded one
    /// is already as advanced as what the backend reports.
    pub fn build_request_status_if_update_is_needed(
        &self,
        request: &BuildRequest,
    ) -> Option<BuildRequestStatus> {
        let reported = self.reported_status();
        (reported.rank() > request.status.rank()).then_some(reported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: BuildRequestStatus) -> BuildRequest {
        BuildRequest::builder()
            .id("1")
            .test("t")
            .platform("p")
            .test_group("g")
            .status(status)
            .build()
    }

    fn entry(state: BuildEntryState) -> BuildEntry {
        BuildEntry::builder().build_request_id("1").state(state).build()
    }

    #[test]
    fn pending_entry_schedules_pending_request() {
        let pending = entry(BuildEntryState::Pending);
        assert_eq!(
            pending.build_request_status_if_update_is_needed(&request(BuildRequestStatus::Pending)),
            Some(BuildRequestStatus::Scheduled)
        );
        assert_eq!(
            pending.build_request_status_if_update_is_needed(&request(BuildRequestStatus::Scheduled)),
            None
        );
    }

    #[test]
    fn in_progress_entry_moves_request_to_running() {
        let running = entry(BuildEntryState::InProgress);
        assert_eq!(
            running.build_request_status_if_update_is_needed(&request(BuildRequestStatus::Scheduled)),
            Some(BuildRequestStatus::Running)
        );
        assert_eq!(
            running.build_request_status_if_update_is_needed(&request(BuildRequestStatus::Running)),
            None
        );
    }

    #[test]
    fn finished_entry_never_regresses_a_terminal_request() {
        let finished = entry(BuildEntryState::Finished);
        assert_eq!(
            finished.build_request_status_if_update_is_needed(&request(BuildRequestStatus::Running)),
            Some(BuildRequestStatus::FailedIfNotCompleted)
        );
        assert_eq!(
            finished.build_request_status_if_update_is_needed(&request(BuildRequestStatus::Completed)),
            None
        );
    }

    #[test]
    fn configuration_matches_test_and_platform() {
        let config = TestConfiguration::new("t", "p");
        assert!(config.matches(&request(BuildRequestStatus::Pending)));
        assert!(!TestConfiguration::new("t", "other").matches(&request(BuildRequestStatus::Pending)));
    }
}

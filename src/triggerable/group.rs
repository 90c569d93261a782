use std::collections::HashMap;

use crate::request::model::{BuildRequest, BuildRequestStatus, StatusUpdates};

/// Requests of one test group, rebuilt from the fetched snapshot every pass.
#[derive(Clone, Debug, PartialEq)]
pub struct TestGroup {
    pub id: String,
    /// Rank of the group's first request in the fetched sequence.
    pub group_order: usize,
    pub requests: Vec<BuildRequest>,
}

/// Partitions `requests` into groups, returned in discovery order.
pub fn test_groups_for_build_requests(requests: &[BuildRequest]) -> Vec<TestGroup> {
    let mut groups: Vec<TestGroup> = Vec::new();
    let mut index_by_id: HashMap<&str, usize> = HashMap::new();
    for request in requests {
        match index_by_id.get(request.test_group.as_str()) {
            Some(&index) => groups[index].requests.push(request.clone()),
            None => {
                index_by_id.insert(&request.test_group, groups.len());
                groups.push(TestGroup {
                    id: request.test_group.clone(),
                    group_order: groups.len(),
                    requests: vec![request.clone()],
                });
            }
        }
    }
    groups.sort_by_key(|group| group.group_order);
    groups
}

impl TestGroup {
    /// The request to schedule next, if the group has nothing queued yet.
    pub fn next_request(&self, pending_updates: &StatusUpdates) -> Option<&BuildRequest> {
        for request in &self.requests {
            let staged = pending_updates.get(&request.id);
            if request.is_scheduled()
                || staged.is_some_and(|update| update.status == BuildRequestStatus::Scheduled)
            {
                return None;
            }
            if request.is_pending() && staged.is_none() {
                return Some(request);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::model::StatusUpdate;

    fn request(id: &str, group: &str, status: BuildRequestStatus) -> BuildRequest {
        BuildRequest::builder()
            .id(id)
            .test("t")
            .platform("p")
            .test_group(group)
            .status(status)
            .build()
    }

    #[test]
    fn groups_follow_first_appearance() {
        let requests = vec![
            request("5", "g2", BuildRequestStatus::Pending),
            request("1", "g1", BuildRequestStatus::Pending),
            request("6", "g2", BuildRequestStatus::Pending),
            request("2", "g3", BuildRequestStatus::Pending),
        ];
        let groups = test_groups_for_build_requests(&requests);
        let ids: Vec<&str> = groups.iter().map(|group| group.id.as_str()).collect();
        assert_eq!(ids, vec!["g2", "g1", "g3"]);
        assert_eq!(groups[0].group_order, 0);
        assert_eq!(groups[2].group_order, 2);
        let members: Vec<&str> = groups[0].requests.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(members, vec!["5", "6"]);
    }

    #[test]
    fn next_request_is_first_pending() {
        let group = TestGroup {
            id: "g".to_string(),
            group_order: 0,
            requests: vec![
                request("1", "g", BuildRequestStatus::Completed),
                request("2", "g", BuildRequestStatus::Pending),
                request("3", "g", BuildRequestStatus::Pending),
            ],
        };
        assert_eq!(group.next_request(&StatusUpdates::new()).map(|r| r.id.as_str()), Some("2"));
    }

    #[test]
    fn scheduled_request_blocks_the_group() {
        let group = TestGroup {
            id: "g".to_string(),
            group_order: 0,
            requests: vec![
                request("1", "g", BuildRequestStatus::Scheduled),
                request("2", "g", BuildRequestStatus::Pending),
            ],
        };
        assert!(group.next_request(&StatusUpdates::new()).is_none());
    }

    #[test]
    fn staged_schedule_blocks_the_group() {
        let group = TestGroup {
            id: "g".to_string(),
            group_order: 0,
            requests: vec![
                request("1", "g", BuildRequestStatus::Pending),
                request("2", "g", BuildRequestStatus::Pending),
            ],
        };
        let mut updates = StatusUpdates::new();
        updates.insert("1".to_string(), StatusUpdate::new(BuildRequestStatus::Scheduled, None));
        assert!(group.next_request(&updates).is_none());
    }

    #[test]
    fn request_with_other_staged_update_is_skipped() {
        let group = TestGroup {
            id: "g".to_string(),
            group_order: 0,
            requests: vec![
                request("1", "g", BuildRequestStatus::Pending),
                request("2", "g", BuildRequestStatus::Pending),
            ],
        };
        let mut updates = StatusUpdates::new();
        updates.insert("1".to_string(), StatusUpdate::new(BuildRequestStatus::Running, None));
        assert_eq!(group.next_request(&updates).map(|r| r.id.as_str()), Some("2"));
    }

    #[test]
    fn finished_group_has_no_candidate() {
        let group = TestGroup {
            id: "g".to_string(),
            group_order: 0,
            requests: vec![request("1", "g", BuildRequestStatus::Completed)],
        };
        assert!(group.next_request(&StatusUpdates::new()).is_none());
    }
}

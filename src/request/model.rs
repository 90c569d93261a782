use std::collections::BTreeMap;
use std::fmt;

use bon::Builder;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Corrections staged during one pass, keyed by build request id.
pub type StatusUpdates = BTreeMap<String, StatusUpdate>;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum BuildRequestStatus {
    #[default]
    Pending,
    Scheduled,
    Running,
    Failed,
    Completed,
    Canceled,
    FailedIfNotCompleted,
}

impl BuildRequestStatus {
    /// Position in the status lattice. Every terminal status shares the top rank.
    pub fn rank(self) -> u8 {
        match self {
            BuildRequestStatus::Pending => 0,
            BuildRequestStatus::Scheduled => 1,
            BuildRequestStatus::Running => 2,
            BuildRequestStatus::Failed
            | BuildRequestStatus::Completed
            | BuildRequestStatus::Canceled
            | BuildRequestStatus::FailedIfNotCompleted => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuildRequestStatus::Pending => "pending",
            BuildRequestStatus::Scheduled => "scheduled",
            BuildRequestStatus::Running => "running",
            BuildRequestStatus::Failed => "failed",
            BuildRequestStatus::Completed => "completed",
            BuildRequestStatus::Canceled => "canceled",
            BuildRequestStatus::FailedIfNotCompleted => "failedIfNotCompleted",
        }
    }
}

impl fmt::Display for BuildRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read snapshot of one build request as returned by the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Builder)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub test: String,
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub platform: String,
    #[serde(deserialize_with = "string_or_number")]
    #[builder(into)]
    pub test_group: String,
    /// Zero means the request may go to any free worker.
    #[serde(default, deserialize_with = "order_from_value")]
    #[builder(default)]
    pub order: i64,
    #[builder(default)]
    pub status: BuildRequestStatus,
    #[serde(default)]
    #[builder(into)]
    pub url: Option<String>,
}

impl BuildRequest {
    pub fn is_pending(&self) -> bool {
        self.status == BuildRequestStatus::Pending
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == BuildRequestStatus::Scheduled
    }

    pub fn has_started(&self) -> bool {
        self.status != BuildRequestStatus::Pending
    }

    pub fn has_finished(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_explicit_order(&self) -> bool {
        self.order > 0
    }
}

/// A correction proposed for one build request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusUpdate {
    pub status: BuildRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: BuildRequestStatus, url: Option<String>) -> Self {
        Self { status, url }
    }

    /// Combines two corrections staged from the same observation. The newer
    /// one wins unless it would lower the status, and a known url is never
    /// dropped.
    pub fn merge(self, newer: StatusUpdate) -> StatusUpdate {
        let status = if newer.status.rank() >= self.status.rank() {
            newer.status
        } else {
            self.status
        };
        StatusUpdate {
            status,
            url: newer.url.or(self.url),
        }
    }

    /// Replaces this correction with a later observation of the same
    /// request. The later status is taken as is, only the url falls back.
    pub fn supersede(self, newer: StatusUpdate) -> StatusUpdate {
        StatusUpdate {
            status: newer.status,
            url: newer.url.or(self.url),
        }
    }
}

/// Folds the corrections of a later observation into `older`, entry by entry.
pub fn merge_updates(mut older: StatusUpdates, newer: StatusUpdates) -> StatusUpdates {
    for (id, update) in newer {
        let merged = match older.remove(&id) {
            Some(previous) => previous.supersede(update),
            None => update,
        };
        older.insert(id, merged);
    }
    older
}

pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(value) => Ok(value),
        Value::Number(value) => Ok(value.to_string()),
        other => Err(D::Error::custom(format!("expected an id, found {}", other))),
    }
}

fn order_from_value<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(value) => value
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("order out of range: {}", value))),
        Value::String(value) if value.is_empty() => Ok(0),
        Value::String(value) => value
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid order: {}", value))),
        other => Err(D::Error::custom(format!("invalid order: {}", other))),
    }
}

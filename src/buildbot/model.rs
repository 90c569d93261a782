use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::SyncerError;
use crate::syncer::model::{BuildEntry, BuildEntryState, TestConfiguration};

/// One buildbot builder and the configurations it runs.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuilderConfig {
    pub builder: String,
    /// Scheduler named in force requests, defaults to the builder name.
    #[serde(default)]
    pub scheduler: Option<String>,
    #[serde(default)]
    pub slave_list: Vec<String>,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
    #[serde(default)]
    pub configurations: Vec<TestConfiguration>,
}

/// Reads `(name, value, source)` triples from a buildbot build.
fn property<'a>(raw: &'a Value, name: &str) -> Option<&'a Value> {
    raw.get("properties")?
        .as_array()?
        .iter()
        .filter_map(Value::as_array)
        .find(|triple| triple.first().and_then(Value::as_str) == Some(name))
        .and_then(|triple| triple.get(1))
}

fn property_as_string(raw: &Value, name: &str) -> Option<String> {
    match property(raw, name)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

/// Turns one item of `pendingBuilds` or `builds/?select=` into an entry.
/// `builder_url` is the builder's page, used while the build has no number.
pub fn build_entry_from_raw(raw: &Value, build_request_argument: &str, builder_url: &str) -> BuildEntry {
    let number = raw.get("number").and_then(Value::as_u64);
    let state = match number {
        None => BuildEntryState::Pending,
        Some(_) => {
            let finished_at = raw
                .get("times")
                .and_then(Value::as_array)
                .and_then(|times| times.get(1))
                .filter(|time| !time.is_null());
            let has_current_step = raw.get("currentStep").is_some_and(|step| !step.is_null());
            if finished_at.is_none() || has_current_step {
                BuildEntryState::InProgress
            } else {
                BuildEntryState::Finished
            }
        }
    };
    let url = match number {
        Some(number) => format!("{}builds/{}", builder_url, number),
        None => builder_url.to_string(),
    };
    BuildEntry::builder()
        .maybe_build_request_id(property_as_string(raw, build_request_argument))
        .maybe_slave_name(property_as_string(raw, "slavename"))
        .url(url)
        .state(state)
        .build()
}

pub fn parse_pending_builds(
    raw: &Value,
    build_request_argument: &str,
    builder_url: &str,
) -> Result<Vec<BuildEntry>, SyncerError> {
    let items = raw
        .as_array()
        .ok_or_else(|| SyncerError::Malformed(format!("pendingBuilds is not a list: {}", raw)))?;
    Ok(items
        .iter()
        .map(|item| build_entry_from_raw(item, build_request_argument, builder_url))
        .collect())
}

/// `builds/?select=-1&select=-2…` answers with an object keyed by the
/// selector; slots past the builder's history carry an `error` instead.
pub fn parse_recent_builds(
    raw: &Value,
    build_request_argument: &str,
    builder_url: &str,
) -> Result<Vec<BuildEntry>, SyncerError> {
    let items = raw
        .as_object()
        .ok_or_else(|| SyncerError::Malformed(format!("builds is not an object: {}", raw)))?;
    Ok(items
        .values()
        .filter(|item| item.get("error").is_none())
        .map(|item| build_entry_from_raw(item, build_request_argument, builder_url))
        .collect())
}

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::request::model::StatusUpdates;

/// Worker credentials presented to the build request store.
#[derive(Deserialize, Clone, PartialEq)]
pub struct SlaveInfo {
    pub name: String,
    pub password: String,
}

impl fmt::Debug for SlaveInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlaveInfo")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// What one pass learned about a test group from the backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupAssociation {
    /// Index of the syncer that owns the group's builds.
    pub syncer: Option<usize>,
    pub slave_name: Option<String>,
}

/// Result of observing every syncer once.
#[derive(Debug, Default)]
pub struct Observation {
    pub updates: StatusUpdates,
    pub associations: HashMap<String, GroupAssociation>,
}

/// Non-fatal problems met during a pass.
#[derive(Clone, Debug, PartialEq)]
pub enum PassWarning {
    UnmatchedConfiguration { test: String, platform: String },
    MissingSyncer { request: String },
    ConflictingSyncer { group: String, kept: String, discarded: String },
    PullFailed { builder: String },
    ScheduleFailed { request: String, builder: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PassOutcome {
    Success,
    Partial,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub updates_submitted: usize,
    /// Requests whose schedule attempt the backend accepted.
    pub scheduled: Vec<String>,
    pub warnings: Vec<PassWarning>,
}

impl SyncReport {
    /// Records `warning` once, however many phases run into it.
    pub fn warn(&mut self, warning: PassWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn outcome(&self) -> PassOutcome {
        if self.warnings.is_empty() {
            PassOutcome::Success
        } else {
            PassOutcome::Partial
        }
    }
}

use thiserror::Error;

use crate::http::HttpError;

/// Failures talking to the build request store. Any of these aborts a pass.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] HttpError),

    #[error("store rejected the request: {0}")]
    Rejected(String),

    #[error("malformed store response: {0}")]
    Malformed(String),
}

/// Failures of one syncer. They only degrade that syncer's contribution.
#[derive(Debug, Error)]
pub enum SyncerError {
    #[error("buildbot request failed: {0}")]
    Http(#[from] HttpError),

    #[error("malformed buildbot response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read configuration {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal failure of a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not fetch build requests for {triggerable}: {source}")]
    Fetch {
        triggerable: String,
        #[source]
        source: StoreError,
    },

    #[error("could not submit build request updates for {triggerable}: {source}")]
    Persist {
        triggerable: String,
        #[source]
        source: StoreError,
    },
}

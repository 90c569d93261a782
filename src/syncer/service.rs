use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::SyncerError;
use crate::request::model::BuildRequest;
use crate::syncer::model::{BuildEntry, TestConfiguration};

/// Outcome of a claimed build slot, resolved once the backend answers.
pub type ScheduleFuture = BoxFuture<'static, Result<(), SyncerError>>;

/// Bridge to one CI backend configuration.
#[async_trait]
pub trait Syncer: Send + Sync {
    /// Diagnostic name of the backend builder.
    fn builder_name(&self) -> &str;

    fn test_configurations(&self) -> &[TestConfiguration];

    fn matches_configuration(&self, request: &BuildRequest) -> bool {
        self.test_configurations()
            .iter()
            .any(|config| config.matches(request))
    }

    /// Up to `lookback_count` recent builds plus everything still queued.
    async fn pull_buildbot(&self, lookback_count: usize) -> Result<Vec<BuildEntry>, SyncerError>;

    /// Claims a worker slot for `request` if one is free. The slot is taken
    /// before this returns, so calling it in sequence never double-books a
    /// worker. `None` means no slot, which is not an error.
    fn schedule_request_in_group_if_available(
        &self,
        request: &BuildRequest,
        slave_name: Option<&str>,
    ) -> Option<ScheduleFuture>;
}

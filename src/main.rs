use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use tracing::{error, info, warn};

use buildbot_triggerable::buildbot::service::BuildbotSyncer;
use buildbot_triggerable::config::{Cli, Config};
use buildbot_triggerable::http::ApiClient;
use buildbot_triggerable::request::service::{BuildRequestStore, RemoteBuildRequestStore};
use buildbot_triggerable::syncer::service::Syncer;
use buildbot_triggerable::triggerable::model::PassOutcome;
use buildbot_triggerable::triggerable::service::Triggerable;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let store: Arc<dyn BuildRequestStore> =
        Arc::new(RemoteBuildRequestStore::new(ApiClient::new(config.remote.url.clone())));
    let buildbot = ApiClient::new(config.buildbot.url.clone());
    let syncers: Vec<Arc<dyn Syncer>> = config
        .builders
        .iter()
        .cloned()
        .map(|builder| {
            Arc::new(BuildbotSyncer::new(
                buildbot.clone(),
                builder,
                config.build_request_argument.clone(),
            )) as Arc<dyn Syncer>
        })
        .collect();

    let triggerable = Triggerable::builder()
        .name(config.triggerable_name.clone())
        .lookback_count(config.lookback_count)
        .slave(config.remote.slave.clone())
        .store(store)
        .syncers(syncers)
        .build()?;

    triggerable
        .update_triggerable()
        .await
        .with_context(|| format!("could not register {}", triggerable.name()))?;

    let mut interval = tokio::time::interval(Duration::from_secs(cli.seconds_to_sleep.max(1)));
    loop {
        interval.tick().await;
        match triggerable.sync_once().await {
            Ok(report) => match report.outcome() {
                PassOutcome::Success => info!("Pass for {} finished", triggerable.name()),
                PassOutcome::Partial => warn!(
                    "Pass for {} finished with {} warnings",
                    triggerable.name(),
                    report.warnings.len()
                ),
            },
            Err(err) => {
                if cli.once {
                    return Err(err.into());
                }
                error!("{}", err);
            }
        }
        if cli.once {
            return Ok(());
        }
    }
}

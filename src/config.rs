use clap::Parser;
use serde::Deserialize;

use crate::buildbot::model::BuilderConfig;
use crate::error::ConfigError;
use crate::triggerable::model::SlaveInfo;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration
    #[clap(short, long)]
    pub config: String,

    /// Seconds to wait between two passes
    #[clap(long, default_value_t = 120)]
    pub seconds_to_sleep: u64,

    /// Run a single pass and exit
    #[clap(long)]
    pub once: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct RemoteConfig {
    pub url: String,
    pub slave: SlaveInfo,
}

#[derive(Deserialize, Clone, Debug)]
pub struct BuildbotServerConfig {
    pub url: String,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub remote: RemoteConfig,
    pub buildbot: BuildbotServerConfig,
    pub triggerable_name: String,
    pub lookback_count: usize,
    #[serde(default = "default_build_request_argument")]
    pub build_request_argument: String,
    pub builders: Vec<BuilderConfig>,
}

fn default_build_request_argument() -> String {
    "build_request_id".to_string()
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Unreadable {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        Self::parse(&content).map_err(|err| match err {
            ConfigError::Unreadable { message, .. } => ConfigError::Unreadable {
                path: path.to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content).map_err(|err| ConfigError::Unreadable {
            path: String::new(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.builders.is_empty() {
            return Err(ConfigError::Invalid("at least one builder must be configured".to_string()));
        }
        if let Some(index) = self.builders.iter().position(|builder| builder.builder.is_empty()) {
            return Err(ConfigError::Invalid(format!("builder #{} has no name", index)));
        }
        if self.build_request_argument.is_empty() {
            return Err(ConfigError::Invalid("buildRequestArgument must not be empty".to_string()));
        }
        Ok(())
    }
}

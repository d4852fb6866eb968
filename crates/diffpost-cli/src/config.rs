//! Config layering: defaults < TOML file < flags / environment.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use diffpost_core::app::BridgeConfig;

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// TOML config file.
    #[arg(long, global = true, env = "DIFFPOST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Owner of the repository pull requests are opened against.
    #[arg(long, global = true, env = "BASE_REPO")]
    pub base_repo: Option<String>,

    /// Owner of the fork that receives proposal branches.
    #[arg(long, global = true, env = "HEAD_REPO")]
    pub head_repo: Option<String>,

    #[arg(long, global = true, env = "DIFFPOST_REPO_NAME")]
    pub repo_name: Option<String>,

    #[arg(long, global = true, env = "DIFFPOST_BASE_BRANCH")]
    pub base_branch: Option<String>,

    /// Minimum seconds between the starts of two hosting writes.
    #[arg(long, global = true, env = "DIFFPOST_TASK_DELAY_SECS")]
    pub task_delay_secs: Option<f64>,

    #[arg(long, global = true, env = "DIFFPOST_MIN_ACCOUNT_AGE_SECS")]
    pub min_account_age_secs: Option<u64>,

    #[arg(long, global = true, env = "GITHUB_API_BASE")]
    pub api_base: Option<String>,

    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

impl ConfigArgs {
    pub fn resolve(&self) -> anyhow::Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(v) = &self.base_repo {
            config.base_owner = v.clone();
        }
        if let Some(v) = &self.head_repo {
            config.head_owner = v.clone();
        }
        if let Some(v) = &self.repo_name {
            config.repo_name = v.clone();
        }
        if let Some(v) = &self.base_branch {
            config.base_branch = v.clone();
        }
        if let Some(v) = self.task_delay_secs {
            config.task_delay_secs = v;
        }
        if let Some(v) = self.min_account_age_secs {
            config.min_account_age_secs = v;
        }
        if let Some(v) = &self.api_base {
            config.api_base = v.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

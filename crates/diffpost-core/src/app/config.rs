//! BridgeConfig - 起動時設定
//!
//! TOML から読み込み、CLI フラグ・環境変数で上書きする前提。
//! `validate()` で起動時に検証する（Fail-fast）。

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::impls::github::DEFAULT_API_BASE;
use crate::ports::RepoRef;
use crate::queue::QueueConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Repository name, shared by the base and head repositories.
    pub repo_name: String,
    /// Owner of the repository pull requests are opened against.
    pub base_owner: String,
    /// Owner of the fork that receives the proposal branches.
    pub head_owner: String,
    pub base_branch: String,
    /// Directory that holds one `.diff` file per proposal.
    pub changes_dir: String,
    /// Minimum seconds between the starts of two hosting write tasks.
    pub task_delay_secs: f64,
    pub min_account_age_secs: u64,
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub search_limit: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            repo_name: "vivi".to_string(),
            base_owner: String::new(),
            head_owner: String::new(),
            base_branch: "master".to_string(),
            changes_dir: "changes".to_string(),
            task_delay_secs: 90.0,
            min_account_age_secs: 259_200, // 3 days
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_secs: 30,
            search_limit: 25,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("repo_name", &self.repo_name),
            ("base_owner", &self.base_owner),
            ("head_owner", &self.head_owner),
            ("base_branch", &self.base_branch),
            ("changes_dir", &self.changes_dir),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        self.queue_config()?;
        if self.search_limit == 0 {
            return Err(ConfigError::Invalid("search_limit must be at least 1".into()));
        }
        Ok(())
    }

    pub fn base_repo(&self) -> RepoRef {
        RepoRef::new(&self.base_owner, &self.repo_name)
    }

    pub fn head_repo(&self) -> RepoRef {
        RepoRef::new(&self.head_owner, &self.repo_name)
    }

    pub fn queue_config(&self) -> Result<QueueConfig, ConfigError> {
        QueueConfig::from_secs_f64(self.task_delay_secs)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn min_account_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.min_account_age_secs).unwrap_or(i64::MAX))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Path of the diff file for a proposal branch.
    pub fn diff_path(&self, branch: &str) -> String {
        format!("{}/{branch}.diff", self.changes_dir.trim_end_matches('/'))
    }
}

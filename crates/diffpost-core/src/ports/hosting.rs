//! HostingApi port - version-control hosting (GitHub) の抽象化
//!
//! Only the operations the proposal tasks perform are modelled here:
//! - create: branch head → create ref → create file → open pull request
//! - edit: get file (for its sha) → update file with that sha
//!
//! 実装:
//! - `impls::GithubClient`（本番用, REST API）
//! - `impls::InMemoryHosting`（テスト・dry-run 用）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// `owner/name` of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Contents of a file write (create or update).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub message: String,
    pub content: String,
    pub branch: String,
}

/// A file as stored upstream. `sha` is the handle required to update it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPull {
    pub title: String,
    /// `owner:branch` for cross-repository pull requests.
    pub head: String,
    pub base: String,
    pub maintainer_can_modify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    /// Branch name on the head repository (without owner).
    pub head_ref: String,
    pub html_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum HostingError {
    #[error("hosting api {operation} request failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("hosting api {operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to decode hosting api {operation} response: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("hosting api {operation}: {what} not found")]
    NotFound {
        operation: &'static str,
        what: String,
    },

    #[error("invalid hosting client setup: {0}")]
    Setup(String),
}

impl HostingError {
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            HostingError::Transport { operation, .. }
            | HostingError::Status { operation, .. }
            | HostingError::Decode { operation, .. }
            | HostingError::NotFound { operation, .. } => Some(operation),
            HostingError::Setup(_) => None,
        }
    }
}

/// Write and read operations against the hosting service.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Commit sha at the tip of `branch`.
    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> Result<String, HostingError>;

    async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), HostingError>;

    async fn create_file(&self, repo: &RepoRef, file: FileWrite) -> Result<(), HostingError>;

    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<RemoteFile, HostingError>;

    /// Replace a file's content. `sha` must be the current blob sha, so a
    /// concurrent edit fails instead of being overwritten.
    async fn update_file(
        &self,
        repo: &RepoRef,
        file: FileWrite,
        sha: &str,
    ) -> Result<(), HostingError>;

    async fn create_pull(&self, repo: &RepoRef, pull: NewPull)
    -> Result<PullRequest, HostingError>;

    async fn list_open_pulls(&self, repo: &RepoRef) -> Result<Vec<PullRequest>, HostingError>;
}

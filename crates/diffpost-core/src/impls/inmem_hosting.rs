//! InMemoryHosting - 開発・テスト用の HostingApi 実装
//!
//! # 実装詳細
//! - branch / file / pull request を HashMap で保持
//! - 呼び出し履歴を記録（テストで順序を検証するため）
//! - `fail_on()` で任意の操作を失敗させられる

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::ports::{FileWrite, HostingApi, HostingError, NewPull, PullRequest, RemoteFile, RepoRef};

#[derive(Debug, Clone)]
struct StoredFile {
    content: String,
    sha: String,
}

#[derive(Debug, Default)]
struct HostingState {
    /// (repo, branch) -> head sha
    branches: HashMap<(RepoRef, String), String>,
    /// (repo, branch, path) -> file
    files: HashMap<(RepoRef, String, String), StoredFile>,
    pulls: HashMap<RepoRef, Vec<PullRequest>>,
    calls: Vec<String>,
    failing: HashSet<String>,
    next_sha: u64,
    next_pull: u64,
}

impl HostingState {
    fn fresh_sha(&mut self) -> String {
        self.next_sha += 1;
        format!("sha-{}", self.next_sha)
    }

    /// Record the call and fail it if injected.
    fn enter(&mut self, operation: &'static str, detail: String) -> Result<(), HostingError> {
        self.calls.push(format!("{operation} {detail}"));
        if self.failing.contains(operation) {
            return Err(HostingError::Status {
                operation,
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryHosting {
    state: Mutex<HostingState>,
}

impl InMemoryHosting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a branch (e.g. the base branch new proposals start from).
    pub fn with_branch(self, repo: &RepoRef, branch: &str, sha: &str) -> Self {
        self.lock()
            .branches
            .insert((repo.clone(), branch.to_string()), sha.to_string());
        self
    }

    /// Seed an open pull request.
    pub fn with_pull(self, repo: &RepoRef, pull: PullRequest) -> Self {
        self.lock().pulls.entry(repo.clone()).or_default().push(pull);
        self
    }

    /// Make every later call of `operation` fail with a 500.
    pub fn fail_on(&self, operation: &str) {
        self.lock().failing.insert(operation.to_string());
    }

    /// Calls made so far, as `"<operation> <detail>"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn file_content(&self, repo: &RepoRef, branch: &str, path: &str) -> Option<String> {
        self.lock()
            .files
            .get(&(repo.clone(), branch.to_string(), path.to_string()))
            .map(|f| f.content.clone())
    }

    pub fn has_branch(&self, repo: &RepoRef, branch: &str) -> bool {
        self.lock()
            .branches
            .contains_key(&(repo.clone(), branch.to_string()))
    }

    pub fn open_pulls(&self, repo: &RepoRef) -> Vec<PullRequest> {
        self.lock().pulls.get(repo).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HostingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl HostingApi for InMemoryHosting {
    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> Result<String, HostingError> {
        let mut state = self.lock();
        state.enter("branch_head", format!("{repo} {branch}"))?;
        state
            .branches
            .get(&(repo.clone(), branch.to_string()))
            .cloned()
            .ok_or_else(|| HostingError::NotFound {
                operation: "branch_head",
                what: branch.to_string(),
            })
    }

    async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), HostingError> {
        let mut state = self.lock();
        state.enter("create_branch", format!("{repo} {branch}"))?;
        let key = (repo.clone(), branch.to_string());
        if state.branches.contains_key(&key) {
            return Err(HostingError::Status {
                operation: "create_branch",
                status: 422,
                body: "Reference already exists".to_string(),
            });
        }
        state.branches.insert(key, sha.to_string());
        Ok(())
    }

    async fn create_file(&self, repo: &RepoRef, file: FileWrite) -> Result<(), HostingError> {
        let mut state = self.lock();
        state.enter("create_file", format!("{repo} {} {}", file.branch, file.path))?;
        if !state.branches.contains_key(&(repo.clone(), file.branch.clone())) {
            return Err(HostingError::NotFound {
                operation: "create_file",
                what: file.branch,
            });
        }
        let key = (repo.clone(), file.branch, file.path);
        if state.files.contains_key(&key) {
            return Err(HostingError::Status {
                operation: "create_file",
                status: 422,
                body: "file already exists".to_string(),
            });
        }
        let sha = state.fresh_sha();
        state.files.insert(
            key,
            StoredFile {
                content: file.content,
                sha,
            },
        );
        Ok(())
    }

    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<RemoteFile, HostingError> {
        let mut state = self.lock();
        state.enter("get_file", format!("{repo} {git_ref} {path}"))?;
        state
            .files
            .get(&(repo.clone(), git_ref.to_string(), path.to_string()))
            .map(|f| RemoteFile {
                path: path.to_string(),
                sha: f.sha.clone(),
            })
            .ok_or_else(|| HostingError::NotFound {
                operation: "get_file",
                what: path.to_string(),
            })
    }

    async fn update_file(
        &self,
        repo: &RepoRef,
        file: FileWrite,
        sha: &str,
    ) -> Result<(), HostingError> {
        let mut state = self.lock();
        state.enter("update_file", format!("{repo} {} {}", file.branch, file.path))?;
        let new_sha = state.fresh_sha();
        let key = (repo.clone(), file.branch, file.path);
        let Some(stored) = state.files.get_mut(&key) else {
            return Err(HostingError::NotFound {
                operation: "update_file",
                what: key.2,
            });
        };
        if stored.sha != sha {
            return Err(HostingError::Status {
                operation: "update_file",
                status: 409,
                body: format!("{} does not match {sha}", stored.sha),
            });
        }
        stored.content = file.content;
        stored.sha = new_sha;
        Ok(())
    }

    async fn create_pull(
        &self,
        repo: &RepoRef,
        pull: NewPull,
    ) -> Result<PullRequest, HostingError> {
        let mut state = self.lock();
        state.enter("create_pull", format!("{repo} {} -> {}", pull.head, pull.base))?;
        state.next_pull += 1;
        let head_ref = pull
            .head
            .split_once(':')
            .map_or(pull.head.as_str(), |(_, branch)| branch)
            .to_string();
        let created = PullRequest {
            number: state.next_pull,
            title: pull.title,
            head_ref,
            html_url: None,
        };
        state
            .pulls
            .entry(repo.clone())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn list_open_pulls(&self, repo: &RepoRef) -> Result<Vec<PullRequest>, HostingError> {
        let mut state = self.lock();
        state.enter("list_open_pulls", repo.to_string())?;
        Ok(state.pulls.get(repo).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoRef {
        RepoRef::new("head", "vivi")
    }

    fn write(branch: &str, content: &str) -> FileWrite {
        FileWrite {
            path: "changes/x.diff".to_string(),
            message: "msg".to_string(),
            content: content.to_string(),
            branch: branch.to_string(),
        }
    }

    #[tokio::test]
    async fn update_requires_current_sha() {
        let hosting = InMemoryHosting::new().with_branch(&repo(), "b", "base");
        hosting.create_file(&repo(), write("b", "+ A")).await.unwrap();

        let file = hosting.get_file(&repo(), "changes/x.diff", "b").await.unwrap();
        hosting
            .update_file(&repo(), write("b", "+ B"), &file.sha)
            .await
            .unwrap();
        assert_eq!(
            hosting.file_content(&repo(), "b", "changes/x.diff").as_deref(),
            Some("+ B")
        );

        // stale handle
        let err = hosting
            .update_file(&repo(), write("b", "+ C"), &file.sha)
            .await
            .unwrap_err();
        assert!(matches!(err, HostingError::Status { status: 409, .. }));
    }

    #[tokio::test]
    async fn injected_failures_are_recorded() {
        let hosting = InMemoryHosting::new();
        hosting.fail_on("list_open_pulls");
        let err = hosting.list_open_pulls(&repo()).await.unwrap_err();
        assert_eq!(err.operation(), Some("list_open_pulls"));
        assert_eq!(hosting.calls(), vec!["list_open_pulls head/vivi".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_branch_is_rejected() {
        let hosting = InMemoryHosting::new().with_branch(&repo(), "b", "base");
        let err = hosting.create_branch(&repo(), "b", "base").await.unwrap_err();
        assert!(matches!(err, HostingError::Status { status: 422, .. }));
    }

    #[tokio::test]
    async fn created_pull_is_listed_with_branch_ref() {
        let hosting = InMemoryHosting::new();
        let base = RepoRef::new("base", "vivi");
        let pull = hosting
            .create_pull(
                &base,
                NewPull {
                    title: "t".to_string(),
                    head: "head:feature".to_string(),
                    base: "master".to_string(),
                    maintainer_can_modify: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(pull.head_ref, "feature");
        assert_eq!(hosting.list_open_pulls(&base).await.unwrap(), vec![pull]);
    }
}

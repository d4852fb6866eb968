//! ProposalCatalog - open proposals cache
//!
//! Refreshed after every successful create and on demand. Lookups never hit
//! the hosting API.

use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::domain::ProposalId;
use crate::ports::{HostingApi, HostingError, PullRequest, RepoRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalSummary {
    pub branch: String,
    pub id: ProposalId,
    pub pull_number: u64,
    pub pull_title: String,
    pub html_url: Option<String>,
}

impl ProposalSummary {
    /// Open pull requests whose head branch is not a proposal branch are
    /// skipped.
    pub fn from_pull(pull: PullRequest) -> Option<Self> {
        let id = ProposalId::parse_branch(&pull.head_ref)?;
        Some(Self {
            branch: pull.head_ref,
            id,
            pull_number: pull.number,
            pull_title: pull.title,
            html_url: pull.html_url,
        })
    }
}

#[derive(Debug, Default)]
pub struct ProposalCatalog {
    entries: RwLock<Vec<ProposalSummary>>,
}

impl ProposalCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reload open proposals from `repo`. Returns how many were cached.
    pub async fn refresh(
        &self,
        hosting: &dyn HostingApi,
        repo: &RepoRef,
    ) -> Result<usize, HostingError> {
        let pulls = hosting.list_open_pulls(repo).await?;
        let count = self.replace(pulls);
        tracing::debug!(repo = %repo, proposals = count, "proposal catalog refreshed");
        Ok(count)
    }

    pub fn replace(&self, pulls: Vec<PullRequest>) -> usize {
        let entries: Vec<_> = pulls.into_iter().filter_map(ProposalSummary::from_pull).collect();
        let count = entries.len();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
        count
    }

    /// Proposals whose branch contains `query` (case-insensitive), in listing
    /// order, at most `limit`.
    pub fn search(&self, query: &str, limit: usize) -> Vec<ProposalSummary> {
        let needle = query.to_lowercase();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.branch.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn get(&self, branch: &str) -> Option<ProposalSummary> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| entry.branch == branch)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryHosting;

    fn pull(number: u64, head_ref: &str) -> PullRequest {
        PullRequest {
            number,
            title: format!("pull {number}"),
            head_ref: head_ref.to_string(),
            html_url: None,
        }
    }

    #[test]
    fn non_proposal_branches_are_skipped() {
        let catalog = ProposalCatalog::new();
        let count = catalog.replace(vec![
            pull(1, "1--05-01-24-13-45-09--fire"),
            pull(2, "dependabot/cargo/serde"),
            pull(3, "2--06-01-24-08-00-00--Ice_Wall"),
        ]);
        assert_eq!(count, 2);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("dependabot/cargo/serde").is_none());
    }

    #[test]
    fn search_is_case_insensitive_and_limited() {
        let catalog = ProposalCatalog::new();
        catalog.replace(vec![
            pull(1, "1--05-01-24-13-45-09--fire"),
            pull(2, "2--06-01-24-08-00-00--Ice_Wall"),
            pull(3, "3--07-01-24-08-00-00--FireBall"),
        ]);

        let hits = catalog.search("FIRE", 25);
        let numbers: Vec<_> = hits.iter().map(|s| s.pull_number).collect();
        assert_eq!(numbers, [1, 3]);

        assert_eq!(catalog.search("", 2).len(), 2);
        assert!(catalog.search("lightning", 25).is_empty());
    }

    #[tokio::test]
    async fn refresh_reads_open_pulls() {
        let repo = RepoRef::new("upstream", "vivi");
        let hosting =
            InMemoryHosting::new().with_pull(&repo, pull(7, "9--05-01-24-13-45-09--x"));
        let catalog = ProposalCatalog::new();

        assert_eq!(catalog.refresh(&hosting, &repo).await.unwrap(), 1);
        let entry = catalog.get("9--05-01-24-13-45-09--x").unwrap();
        assert_eq!(entry.id.submitter_id(), 9);
        assert_eq!(entry.pull_number, 7);
    }
}

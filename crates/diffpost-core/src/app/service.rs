//! ProposalService - チャットコマンドから queue への入口
//!
//! # フロー
//! 1. eligibility（アカウント年齢）を確認
//! 2. diff を正規化（失敗したら即座にエラーを返す, queue には入れない）
//! 3. hosting への書き込みをタスクとして組み立てて `DelayQueue` に投入
//! 4. 呼び出し元には投入結果（TaskId と branch）だけを返す
//!
//! 実行結果は `DelayQueue::subscribe()` の report で受け取る。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::catalog::{ProposalCatalog, ProposalSummary};
use super::config::BridgeConfig;
use crate::domain::{NormalizeError, ProposalId, Submitter, TaskId, normalize};
use crate::ports::{Clock, FileWrite, HostingApi, HostingError, NewPull, RepoRef};
use crate::queue::{DelayQueue, QueueError, QueuedTask, TaskError};

const CREATE_MESSAGE: &str = "Create .diff";
const UPDATE_MESSAGE: &str = "Update .diff";

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("account is too young: {age_secs}s old, {required_secs}s required")]
    AccountTooYoung { age_secs: i64, required_secs: i64 },

    #[error(transparent)]
    InvalidDiff(#[from] NormalizeError),

    #[error("not a proposal branch: {0}")]
    UnknownBranch(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Hosting(#[from] HostingError),
}

#[derive(Debug, Clone)]
pub struct CreateProposal {
    pub submitter: Submitter,
    pub title: Option<String>,
    pub diff: String,
}

#[derive(Debug, Clone)]
pub struct EditProposal {
    pub submitter: Submitter,
    pub branch: String,
    pub diff: String,
}

/// Returned as soon as the task is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub task_id: TaskId,
    pub branch: String,
}

pub struct ProposalService {
    hosting: Arc<dyn HostingApi>,
    queue: DelayQueue,
    config: Arc<BridgeConfig>,
    clock: Arc<dyn Clock>,
    catalog: Arc<ProposalCatalog>,
}

impl ProposalService {
    pub fn new(
        hosting: Arc<dyn HostingApi>,
        queue: DelayQueue,
        config: BridgeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hosting,
            queue,
            config: Arc::new(config),
            clock,
            catalog: Arc::new(ProposalCatalog::new()),
        }
    }

    pub fn queue(&self) -> &DelayQueue {
        &self.queue
    }

    pub fn catalog(&self) -> &ProposalCatalog {
        &self.catalog
    }

    /// Queue creation of a new proposal: branch, diff file, pull request.
    pub fn create(&self, request: CreateProposal) -> Result<Submission, ProposalError> {
        let now = self.clock.now();
        self.check_eligibility(&request.submitter, now)?;
        let content = normalize(&request.diff)?;

        let id = ProposalId::new(request.submitter.id, now, request.title.as_deref());
        let branch = id.branch_name();
        let plan = CreatePlan {
            hosting: Arc::clone(&self.hosting),
            catalog: Arc::clone(&self.catalog),
            base_repo: self.config.base_repo(),
            head_repo: self.config.head_repo(),
            base_branch: self.config.base_branch.clone(),
            branch: branch.clone(),
            path: self.config.diff_path(&branch),
            pull_title: format!("'{}' created by {}", id.title(), request.submitter.name),
            content,
        };

        let task = QueuedTask::new(format!("proposal.create {branch}"), move || plan.run());
        let task_id = self.queue.submit(task)?;
        tracing::info!(
            task_id = %task_id,
            branch = %branch,
            submitter = request.submitter.id,
            "proposal creation queued"
        );
        Ok(Submission { task_id, branch })
    }

    /// Queue an update of an existing proposal's diff file.
    pub fn edit(&self, request: EditProposal) -> Result<Submission, ProposalError> {
        let now = self.clock.now();
        self.check_eligibility(&request.submitter, now)?;
        if ProposalId::parse_branch(&request.branch).is_none() {
            return Err(ProposalError::UnknownBranch(request.branch));
        }
        let content = normalize(&request.diff)?;

        let branch = request.branch;
        let plan = EditPlan {
            hosting: Arc::clone(&self.hosting),
            head_repo: self.config.head_repo(),
            branch: branch.clone(),
            path: self.config.diff_path(&branch),
            content,
        };

        let task = QueuedTask::new(format!("proposal.edit {branch}"), move || plan.run());
        let task_id = self.queue.submit(task)?;
        tracing::info!(
            task_id = %task_id,
            branch = %branch,
            submitter = request.submitter.id,
            "proposal edit queued"
        );
        Ok(Submission { task_id, branch })
    }

    pub async fn refresh_catalog(&self) -> Result<usize, ProposalError> {
        Ok(self
            .catalog
            .refresh(self.hosting.as_ref(), &self.config.base_repo())
            .await?)
    }

    /// Open proposals matching `query`, capped at the configured limit.
    pub fn search(&self, query: &str) -> Vec<ProposalSummary> {
        self.catalog.search(query, self.config.search_limit)
    }

    fn check_eligibility(
        &self,
        submitter: &Submitter,
        now: DateTime<Utc>,
    ) -> Result<(), ProposalError> {
        let age = submitter.account_age(now);
        let required = self.config.min_account_age();
        if age <= required {
            tracing::info!(
                submitter = submitter.id,
                age_secs = age.num_seconds(),
                "submission rejected, account too young"
            );
            return Err(ProposalError::AccountTooYoung {
                age_secs: age.num_seconds(),
                required_secs: required.num_seconds(),
            });
        }
        Ok(())
    }
}

/// Everything a create task needs, captured at submission time.
struct CreatePlan {
    hosting: Arc<dyn HostingApi>,
    catalog: Arc<ProposalCatalog>,
    base_repo: RepoRef,
    head_repo: RepoRef,
    base_branch: String,
    branch: String,
    path: String,
    pull_title: String,
    content: String,
}

impl CreatePlan {
    async fn run(self) -> Result<(), TaskError> {
        let sha = self
            .hosting
            .branch_head(&self.head_repo, &self.base_branch)
            .await?;
        self.hosting
            .create_branch(&self.head_repo, &self.branch, &sha)
            .await?;
        self.hosting
            .create_file(
                &self.head_repo,
                FileWrite {
                    path: self.path,
                    message: CREATE_MESSAGE.to_string(),
                    content: self.content,
                    branch: self.branch.clone(),
                },
            )
            .await?;
        let pull = self
            .hosting
            .create_pull(
                &self.base_repo,
                NewPull {
                    title: self.pull_title,
                    head: format!("{}:{}", self.head_repo.owner, self.branch),
                    base: self.base_branch,
                    maintainer_can_modify: true,
                },
            )
            .await?;
        tracing::info!(branch = %self.branch, pull = pull.number, "proposal opened");

        // the proposal exists upstream at this point; a stale cache is not a task failure
        if let Err(err) = self
            .catalog
            .refresh(self.hosting.as_ref(), &self.base_repo)
            .await
        {
            tracing::warn!(error = %err, "failed to refresh proposal catalog");
        }
        Ok(())
    }
}

struct EditPlan {
    hosting: Arc<dyn HostingApi>,
    head_repo: RepoRef,
    branch: String,
    path: String,
    content: String,
}

impl EditPlan {
    async fn run(self) -> Result<(), TaskError> {
        let file = self
            .hosting
            .get_file(&self.head_repo, &self.path, &self.branch)
            .await?;
        self.hosting
            .update_file(
                &self.head_repo,
                FileWrite {
                    path: file.path,
                    message: UPDATE_MESSAGE.to_string(),
                    content: self.content,
                    branch: self.branch.clone(),
                },
                &file.sha,
            )
            .await?;
        tracing::info!(branch = %self.branch, "proposal updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryHosting;
    use crate::ports::FixedClock;
    use crate::queue::{QueueConfig, TaskOutcome, TaskReport, WorkerHandle};
    use chrono::TimeZone;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, 13, 45, 9).unwrap()
    }

    fn config() -> BridgeConfig {
        BridgeConfig {
            base_owner: "upstream".to_string(),
            head_owner: "bot".to_string(),
            ..BridgeConfig::default()
        }
    }

    fn veteran() -> Submitter {
        Submitter::new(730660371844825149, "ana", now() - chrono::Duration::days(30))
    }

    struct Fixture {
        service: ProposalService,
        hosting: Arc<InMemoryHosting>,
        worker: WorkerHandle,
        reports: broadcast::Receiver<TaskReport>,
    }

    fn fixture(min_delay: Duration) -> Fixture {
        let config = config();
        let hosting =
            Arc::new(InMemoryHosting::new().with_branch(&config.head_repo(), "master", "base-sha"));
        let (queue, worker) = DelayQueue::start(QueueConfig::new(min_delay));
        let reports = queue.subscribe();
        let service = ProposalService::new(
            hosting.clone(),
            queue,
            config,
            Arc::new(FixedClock::new(now())),
        );
        Fixture {
            service,
            hosting,
            worker,
            reports,
        }
    }

    fn create(diff: &str) -> CreateProposal {
        CreateProposal {
            submitter: veteran(),
            title: Some("fire_trails".to_string()),
            diff: diff.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_opens_branch_file_and_pull() {
        let mut f = fixture(Duration::from_secs(90));

        let submission = f.service.create(create("#  fire\n+flame")).unwrap();
        assert_eq!(
            submission.branch,
            "730660371844825149--05-01-24-13-45-09--fire_trails"
        );

        let report = f.reports.recv().await.unwrap();
        assert_eq!(report.task_id, submission.task_id);
        assert_eq!(report.outcome, TaskOutcome::Succeeded);

        let head = RepoRef::new("bot", "vivi");
        let base = RepoRef::new("upstream", "vivi");
        assert!(f.hosting.has_branch(&head, &submission.branch));
        let path = format!("changes/{}.diff", submission.branch);
        assert_eq!(
            f.hosting.file_content(&head, &submission.branch, &path).as_deref(),
            Some("# fire\n+ FLAME")
        );

        let calls = f.hosting.calls();
        let ops: Vec<_> = calls
            .iter()
            .map(|c| c.split(' ').next().unwrap())
            .collect();
        assert_eq!(
            ops,
            ["branch_head", "create_branch", "create_file", "create_pull", "list_open_pulls"]
        );
        assert!(calls[3].contains(&format!("bot:{} -> master", submission.branch)));

        let pulls = f.hosting.open_pulls(&base);
        assert_eq!(pulls[0].title, "'fire_trails' created by ana");

        // catalog refreshed by the task
        assert_eq!(f.service.search("fire").len(), 1);

        f.worker.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_diff_is_rejected_before_queueing() {
        let f = fixture(Duration::ZERO);

        let err = f.service.create(create("+ ok\nnope")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid line at 2. Must start with +, -, or #.");
        assert_eq!(f.service.queue().pending_len(), 0);
        assert!(f.hosting.calls().is_empty());

        f.worker.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn young_accounts_are_turned_away() {
        let f = fixture(Duration::ZERO);
        let request = CreateProposal {
            submitter: Submitter::new(1, "newbie", now() - chrono::Duration::days(2)),
            title: None,
            diff: "+ a".to_string(),
        };

        let err = f.service.create(request).unwrap_err();
        assert!(matches!(
            err,
            ProposalError::AccountTooYoung {
                required_secs: 259_200,
                ..
            }
        ));

        f.worker.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn edit_updates_existing_file_using_its_sha() {
        let mut f = fixture(Duration::from_secs(90));
        let created = f.service.create(create("+ a")).unwrap();
        let edited = f
            .service
            .edit(EditProposal {
                submitter: veteran(),
                branch: created.branch.clone(),
                diff: "-   b  ".to_string(),
            })
            .unwrap();

        let first = f.reports.recv().await.unwrap();
        let second = f.reports.recv().await.unwrap();
        assert_eq!(first.task_id, created.task_id);
        assert_eq!(second.task_id, edited.task_id);
        assert_eq!(second.outcome, TaskOutcome::Succeeded);
        assert!(second.started_at.duration_since(first.started_at) >= Duration::from_secs(90));

        let head = RepoRef::new("bot", "vivi");
        let path = format!("changes/{}.diff", created.branch);
        assert_eq!(
            f.hosting.file_content(&head, &created.branch, &path).as_deref(),
            Some("- B")
        );
        let calls = f.hosting.calls();
        assert!(calls.iter().any(|c| c.starts_with("get_file")));
        assert!(calls.last().unwrap().starts_with("update_file"));

        f.worker.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn edit_rejects_foreign_branches() {
        let f = fixture(Duration::ZERO);
        let err = f
            .service
            .edit(EditProposal {
                submitter: veteran(),
                branch: "master".to_string(),
                diff: "+ a".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, ProposalError::UnknownBranch(b) if b == "master"));

        f.worker.shutdown_and_join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hosting_failure_is_reported_and_queue_keeps_going() {
        let mut f = fixture(Duration::from_secs(1));
        f.hosting.fail_on("create_pull");

        let failed = f.service.create(create("+ a")).unwrap();
        let missing = f
            .service
            .edit(EditProposal {
                submitter: veteran(),
                branch: "1--01-01-24-00-00-00--ghost".to_string(),
                diff: "+ b".to_string(),
            })
            .unwrap();

        let first = f.reports.recv().await.unwrap();
        assert_eq!(first.task_id, failed.task_id);
        assert!(matches!(&first.outcome, TaskOutcome::Failed(msg) if msg.contains("create_pull")));

        let second = f.reports.recv().await.unwrap();
        assert_eq!(second.task_id, missing.task_id);
        assert!(matches!(&second.outcome, TaskOutcome::Failed(msg) if msg.contains("not found")));

        assert_eq!(f.service.queue().counts().failed, 2);
        f.worker.shutdown_and_join().await;
    }
}

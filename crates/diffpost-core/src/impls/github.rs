//! GithubClient - GitHub REST API に対する HostingApi 実装
//!
//! - default headers (user agent, accept, api version, bearer token)
//! - contents API は base64 でファイル本文を送る
//! - open pull requests はページングして全件取得

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::json;

use crate::ports::{FileWrite, HostingApi, HostingError, NewPull, PullRequest, RemoteFile, RepoRef};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

const PAGE_SIZE: usize = 100;
const ERROR_BODY_LIMIT: usize = 800;

#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
}

#[derive(Deserialize)]
struct BranchResponse {
    commit: CommitRef,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    head: PullHead,
    html_url: Option<String>,
}

#[derive(Deserialize)]
struct PullHead {
    #[serde(rename = "ref")]
    git_ref: String,
}

impl From<PullResponse> for PullRequest {
    fn from(pull: PullResponse) -> Self {
        Self {
            number: pull.number,
            title: pull.title,
            head_ref: pull.head.git_ref,
            html_url: pull.html_url,
        }
    }
}

impl GithubClient {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, HostingError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("diffpost"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .map_err(|_| HostingError::Setup("invalid github authorization header".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout.max(Duration::from_millis(1)))
            .build()
            .map_err(|e| HostingError::Setup(format!("failed to create http client: {e}")))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn repo_url(&self, repo: &RepoRef, rest: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_base, repo.owner, repo.name, rest)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        what: &str,
        request: RequestBuilder,
    ) -> Result<T, HostingError> {
        let response = request.send().await.map_err(|e| HostingError::Transport {
            operation,
            message: e.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HostingError::NotFound {
                operation,
                what: what.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HostingError::Status {
                operation,
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        response.json::<T>().await.map_err(|e| HostingError::Decode {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl HostingApi for GithubClient {
    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> Result<String, HostingError> {
        let url = self.repo_url(repo, &format!("branches/{branch}"));
        let response: BranchResponse = self
            .request_json("branch_head", branch, self.http.get(url))
            .await?;
        Ok(response.commit.sha)
    }

    async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        sha: &str,
    ) -> Result<(), HostingError> {
        let url = self.repo_url(repo, "git/refs");
        let payload = json!({ "ref": format!("refs/heads/{branch}"), "sha": sha });
        let _: IgnoredAny = self
            .request_json("create_branch", sha, self.http.post(url).json(&payload))
            .await?;
        tracing::debug!(repo = %repo, branch, sha, "branch created");
        Ok(())
    }

    async fn create_file(&self, repo: &RepoRef, file: FileWrite) -> Result<(), HostingError> {
        let url = self.repo_url(repo, &format!("contents/{}", file.path));
        let payload = json!({
            "message": file.message,
            "content": BASE64.encode(file.content.as_bytes()),
            "branch": file.branch,
        });
        let _: IgnoredAny = self
            .request_json("create_file", &file.branch, self.http.put(url).json(&payload))
            .await?;
        tracing::debug!(repo = %repo, path = %file.path, branch = %file.branch, "file created");
        Ok(())
    }

    async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<RemoteFile, HostingError> {
        let url = self.repo_url(repo, &format!("contents/{path}"));
        self.request_json("get_file", path, self.http.get(url).query(&[("ref", git_ref)]))
            .await
    }

    async fn update_file(
        &self,
        repo: &RepoRef,
        file: FileWrite,
        sha: &str,
    ) -> Result<(), HostingError> {
        let url = self.repo_url(repo, &format!("contents/{}", file.path));
        let payload = json!({
            "message": file.message,
            "content": BASE64.encode(file.content.as_bytes()),
            "branch": file.branch,
            "sha": sha,
        });
        let _: IgnoredAny = self
            .request_json("update_file", &file.path, self.http.put(url).json(&payload))
            .await?;
        tracing::debug!(repo = %repo, path = %file.path, branch = %file.branch, "file updated");
        Ok(())
    }

    async fn create_pull(
        &self,
        repo: &RepoRef,
        pull: NewPull,
    ) -> Result<PullRequest, HostingError> {
        let url = self.repo_url(repo, "pulls");
        let payload = json!({
            "title": pull.title,
            "head": pull.head,
            "base": pull.base,
            "maintainer_can_modify": pull.maintainer_can_modify,
        });
        let response: PullResponse = self
            .request_json("create_pull", &pull.base, self.http.post(url).json(&payload))
            .await?;
        Ok(response.into())
    }

    async fn list_open_pulls(&self, repo: &RepoRef) -> Result<Vec<PullRequest>, HostingError> {
        let url = self.repo_url(repo, "pulls");
        let per_page = PAGE_SIZE.to_string();
        let mut page = 1_u32;
        let mut pulls = Vec::new();
        loop {
            let request = self.http.get(&url).query(&[
                ("state", "open"),
                ("per_page", per_page.as_str()),
                ("page", page.to_string().as_str()),
            ]);
            let chunk: Vec<PullResponse> = self
                .request_json("list_open_pulls", &repo.to_string(), request)
                .await?;
            let chunk_len = chunk.len();
            pulls.extend(chunk.into_iter().map(PullRequest::from));
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(pulls)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

//! GitHub pull request client.
//!
//! Wraps the one REST call the proposal flow needs: opening a pull request
//! for an already-pushed branch.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::domain::models::GitHubConfig;
use crate::domain::ports::{ChangeRequestRef, VcsError};

#[derive(Debug, Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    html_url: String,
}

/// HTTP client for the GitHub pulls API.
#[derive(Debug, Clone)]
pub struct GitHubPullRequestClient {
    http: Client,
    api_base: String,
    owner: String,
    repo: String,
    token: String,
}

impl GitHubPullRequestClient {
    pub fn new(
        api_base: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, VcsError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VcsError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repo: repo.into(),
            token: token.into(),
        })
    }

    /// Build a client from config, reading the token from the configured
    /// environment variable.
    pub fn from_config(config: &GitHubConfig, timeout: Duration) -> Result<Self, VcsError> {
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(VcsError::Misconfigured(
                "vcs.github.owner and vcs.github.repo must be set".to_string(),
            ));
        }
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VcsError::Misconfigured(format!("{} is not set", config.token_env)))?;
        Self::new(&config.api_base, &config.owner, &config.repo, token, timeout)
    }

    pub async fn create_pull_request(
        &self,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<ChangeRequestRef, VcsError> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_base, self.owner, self.repo);
        let request = CreatePullRequest { title, head, base, body };

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "changeward")
            .json(&request)
            .send()
            .await
            .map_err(|e| VcsError::Http(format!("create pull request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(VcsError::Http(format!("create pull request returned {status}: {body}")));
        }

        let created: PullRequestResponse = resp
            .json()
            .await
            .map_err(|e| VcsError::InvalidResponse(e.to_string()))?;

        Ok(ChangeRequestRef {
            id: created.number.to_string(),
            url: created.html_url,
        })
    }
}

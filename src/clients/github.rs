use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use tracing::debug;
use tracing::instrument;

use super::http_curl::CurlAuth;
use super::http_curl::CurlClient;
use crate::issue::Issue;
use crate::issue::IssueSource;

const PER_PAGE: usize = 100;

// -----------------------------------------------------------------------------
// Types

/// Client for the GitHub issues API of one repository.
pub struct GithubClient {
    api_url: String,
    /// `owner/name`
    repo: String,
    user: String,
    token: String,
    http_client: CurlClient,
}

#[derive(Debug, Deserialize)]
struct GithubIssue {
    number: u64,
    title: String,
    body: Option<String>,
    /// Pull requests come through the issues endpoint too.
    pull_request: Option<serde_json::Value>,
}

// -----------------------------------------------------------------------------
// GithubClient impl

impl GithubClient {
    pub fn new(api_url: String, repo: String, user: String, token: String, timeout: Duration) -> Self {
        let http_client = CurlClient::new(CurlAuth::Bearer(token.clone()), timeout);
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            repo,
            user,
            token,
            http_client,
        }
    }

    /// Clone URL with embedded credentials, on the host behind `api_url`.
    pub fn clone_url(&self) -> String {
        let (scheme, host) = self.clone_host();
        format!(
            "{scheme}://{}:{}@{host}/{}.git",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.token),
            self.repo
        )
    }

    /// Scheme and host serving git. github.com keeps its API on a separate
    /// host; Enterprise serves both from one.
    fn clone_host(&self) -> (&str, &str) {
        let (scheme, rest) = self
            .api_url
            .split_once("://")
            .unwrap_or(("https", self.api_url.as_str()));
        let host = rest.split('/').next().unwrap_or(rest);
        match host {
            "api.github.com" => (scheme, "github.com"),
            _ => (scheme, host),
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    /// All open issues, oldest first, without pull requests.
    #[instrument(skip_all, fields(repo = %self.repo))]
    pub async fn list_open_issues(&self) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!(
                "{}/repos/{}/issues?state=open&sort=created&direction=asc&per_page={PER_PAGE}&page={page}",
                self.api_url, self.repo
            );
            let response = self
                .http_client
                .get(&url, "application/vnd.github+json")
                .await?;
            let (batch, count) = parse_issues(&response)?;
            issues.extend(batch);

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!("Found {} open issues", issues.len());
        Ok(issues)
    }
}

impl IssueSource for GithubClient {
    async fn list_open_issues(&self) -> Result<Vec<Issue>> {
        GithubClient::list_open_issues(self).await
    }
}

/// Issues of one page plus the raw entry count, which decides pagination.
fn parse_issues(response: &str) -> Result<(Vec<Issue>, usize)> {
    let entries: Vec<GithubIssue> =
        serde_json::from_str(response).context("Failed to parse GitHub issues response")?;
    let count = entries.len();
    let issues = entries
        .into_iter()
        .filter(|entry| entry.pull_request.is_none())
        .map(|entry| Issue {
            id: entry.number.to_string(),
            title: entry.title,
            body: entry.body.unwrap_or_default(),
        })
        .collect();
    Ok((issues, count))
}

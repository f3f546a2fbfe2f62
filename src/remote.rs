use std::time::Duration;

use anyhow::Result;

use crate::clients::devops::DevopsClient;
use crate::clients::github::GithubClient;
use crate::config::RemoteConfig;
use crate::issue::Issue;
use crate::issue::IssueSource;

/// The hosting service a working copy belongs to.
///
/// Both variants provide the same capabilities: a credentialed clone URL and
/// the list of open issues. Branch and commit handling is plain git and lives
/// in the gateway.
pub enum Remote {
    Github(GithubClient),
    AzureDevops(DevopsClient),
}

impl Remote {
    pub fn from_config(config: &RemoteConfig, timeout: Duration) -> Self {
        match config {
            RemoteConfig::Github {
                api_url,
                repo,
                user,
                token,
            } => Self::Github(GithubClient::new(
                api_url.clone(),
                repo.clone(),
                user.clone(),
                token.clone(),
                timeout,
            )),
            RemoteConfig::AzureDevops {
                org,
                project,
                repo,
                pat,
            } => Self::AzureDevops(DevopsClient::new(
                org.clone(),
                project.clone(),
                repo.clone(),
                pat.clone(),
                timeout,
            )),
        }
    }

    pub fn clone_url(&self) -> String {
        match self {
            Self::Github(client) => client.clone_url(),
            Self::AzureDevops(client) => client.clone_url(),
        }
    }

    /// The credential embedded in [`Remote::clone_url`], for redaction.
    pub fn secret(&self) -> &str {
        match self {
            Self::Github(client) => client.secret(),
            Self::AzureDevops(client) => client.secret(),
        }
    }
}

impl IssueSource for Remote {
    async fn list_open_issues(&self) -> Result<Vec<Issue>> {
        match self {
            Self::Github(client) => client.list_open_issues().await,
            Self::AzureDevops(client) => client.list_open_issues().await,
        }
    }
}

/// Replace every occurrence of `secret` in `message`.
pub fn redact(message: &str, secret: &str) -> String {
    if secret.is_empty() {
        return message.to_string();
    }
    // Clone URLs carry the credential percent-encoded
    let encoded = urlencoding::encode(secret);
    message.replace(secret, "***").replace(&*encoded, "***")
}

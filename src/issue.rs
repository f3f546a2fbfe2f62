#![allow(async_fn_in_trait)]

use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

/// An issue to be turned into a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub body: String,
}

impl Issue {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Where issues come from.
pub trait IssueSource {
    /// Open issues in source order, pull requests excluded.
    async fn list_open_issues(&self) -> Result<Vec<Issue>>;
}

/// Branch name derived from an issue title.
///
/// Everything that is not an ASCII letter or digit is dropped and the rest is
/// lowercased, so `"Fix bug!"` becomes `"fixbug"`. Titles with nothing left
/// fall back to `issue_<id>`.
pub fn branch_name_for(issue: &Issue, prefix: &str) -> String {
    let cleaned: String = issue
        .title
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
        .replace(' ', "_");

    if cleaned.is_empty() {
        let id: String = issue
            .id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        format!("{prefix}issue_{id}")
    } else {
        format!("{prefix}{cleaned}")
    }
}

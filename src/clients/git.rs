#![allow(async_fn_in_trait)]

use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::instrument;

// -----------------------------------------------------------------------------
// GitOps trait

/// Primitive version-control operations on one working copy.
#[cfg_attr(test, automock)]
pub trait GitOps {
    /// Name of the checked out branch, `None` when HEAD is detached.
    async fn current_branch(&self) -> Result<Option<String>>;
    async fn list_local_branches(&self) -> Result<Vec<String>>;
    /// Create a branch at HEAD without checking it out.
    async fn create_branch(&self, branch: &str) -> Result<()>;
    async fn checkout(&self, branch: &str) -> Result<()>;
    /// `git status --porcelain` output; empty when the working copy is clean.
    async fn status_porcelain(&self) -> Result<String>;
    async fn add_all(&self) -> Result<()>;
    async fn has_staged_changes(&self) -> Result<bool>;
    async fn commit(&self, message: &str) -> Result<CommitId>;
    /// Push a branch to `origin` and set it as upstream.
    async fn push_upstream(&self, branch: &str) -> Result<()>;
    /// Paths changed on `branch` since it forked from `base`.
    async fn changed_files(&self, base: &str, branch: &str) -> Result<Vec<String>>;
    async fn delete_branch(&self, branch: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitId(pub String);

impl Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Author and committer used for generated commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: "autobranch".to_string(),
            email: "autobranch@localhost".to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// RealGit

/// Implementation that calls the git CLI inside a working copy.
pub struct RealGit {
    path: PathBuf,
    timeout: Duration,
    identity: CommitIdentity,
}

impl RealGit {
    pub fn new(path: PathBuf, timeout: Duration, identity: CommitIdentity) -> Self {
        Self {
            path,
            timeout,
            identity,
        }
    }

    /// Clone `url` into `dest`.
    #[instrument(skip_all, fields(dest = %dest.display()))]
    pub async fn clone_into(url: &str, dest: &Path, timeout: Duration) -> Result<()> {
        let mut command = Command::new("git");
        command.arg("clone").arg(url).arg(dest);
        let output = run_bounded(command, timeout).await?;
        if !output.status.success() {
            bail!(
                "git clone failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn git(&self, args: &[&str]) -> Result<Output> {
        let mut command = Command::new("git");
        command.current_dir(&self.path).args(args);
        run_bounded(command, self.timeout).await
    }

    /// Run git and fail on a non-zero exit status.
    async fn git_ok(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args).await?;
        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                subcommand(args),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8(output.stdout)?)
    }
}

/// First argument that names the git subcommand, skipping `-c key=value`.
fn subcommand<'a>(args: &[&'a str]) -> &'a str {
    args.iter()
        .find(|arg| !arg.starts_with('-') && !arg.contains('='))
        .copied()
        .unwrap_or("command")
}

/// Run a command, killing it if it outlives `timeout`.
async fn run_bounded(mut command: Command, timeout: Duration) -> Result<Output> {
    command.kill_on_drop(true).env("GIT_TERMINAL_PROMPT", "0");
    match tokio::time::timeout(timeout, command.output()).await {
        Ok(output) => output.context("Failed to execute git command"),
        Err(_) => bail!("git command timed out after {}s", timeout.as_secs()),
    }
}

impl GitOps for RealGit {
    async fn current_branch(&self) -> Result<Option<String>> {
        let output = self.git(&["symbolic-ref", "--quiet", "--short", "HEAD"]).await?;
        // Exit code 1 with no output means HEAD is detached
        if !output.status.success() {
            if output.status.code() == Some(1) && output.stderr.is_empty() {
                return Ok(None);
            }
            bail!(
                "git symbolic-ref failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(Some(String::from_utf8(output.stdout)?.trim().to_string()))
    }

    async fn list_local_branches(&self) -> Result<Vec<String>> {
        let stdout = self
            .git_ok(&["for-each-ref", "--format=%(refname:short)", "refs/heads/"])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    async fn create_branch(&self, branch: &str) -> Result<()> {
        self.git_ok(&["branch", branch]).await?;
        Ok(())
    }

    async fn checkout(&self, branch: &str) -> Result<()> {
        self.git_ok(&["checkout", branch, "--"]).await?;
        Ok(())
    }

    async fn status_porcelain(&self) -> Result<String> {
        self.git_ok(&["status", "--porcelain"]).await
    }

    async fn add_all(&self) -> Result<()> {
        self.git_ok(&["add", "--all"]).await?;
        Ok(())
    }

    async fn has_staged_changes(&self) -> Result<bool> {
        let output = self.git(&["diff", "--cached", "--quiet"]).await?;
        // Exit code 0 means no staged changes, 1 means there are some
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => bail!(
                "git diff failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }

    #[instrument(skip_all)]
    async fn commit(&self, message: &str) -> Result<CommitId> {
        let name = format!("user.name={}", self.identity.name);
        let email = format!("user.email={}", self.identity.email);
        self.git_ok(&["-c", &name, "-c", &email, "commit", "--quiet", "-m", message])
            .await?;
        let head = self.git_ok(&["rev-parse", "HEAD"]).await?;
        Ok(CommitId(head.trim().to_string()))
    }

    #[instrument(skip_all, fields(branch = %branch))]
    async fn push_upstream(&self, branch: &str) -> Result<()> {
        self.git_ok(&["push", "--set-upstream", "origin", branch])
            .await?;
        Ok(())
    }

    async fn changed_files(&self, base: &str, branch: &str) -> Result<Vec<String>> {
        let range = format!("{base}...{branch}");
        let stdout = self.git_ok(&["diff", "--name-only", &range, "--"]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    #[instrument(skip_all, fields(branch = %branch))]
    async fn delete_branch(&self, branch: &str) -> Result<()> {
        self.git_ok(&["branch", "-D", branch]).await?;
        Ok(())
    }
}

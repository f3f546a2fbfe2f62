use std::path::PathBuf;

use tracing::info;
use tracing::instrument;

use crate::branch::BranchController;
use crate::clients::git::CommitId;
use crate::clients::git::GitOps;
use crate::errors::PipelineError;
use crate::issue::Issue;

/// Maximum length of a commit subject line.
const SUBJECT_MAX_CHARS: usize = 72;

/// Stages, commits and pushes a branch.
pub struct CommitPublisher<'a, G: GitOps> {
    git: &'a G,
}

impl<'a, G: GitOps> CommitPublisher<'a, G> {
    pub fn new(git: &'a G) -> Self {
        Self { git }
    }

    /// Stage everything in the working copy. Returns whether anything is
    /// staged for `branch`.
    pub async fn stage(&self, branch: &str) -> Result<bool, PipelineError> {
        self.git
            .add_all()
            .await
            .map_err(|e| PipelineError::branch_failed(branch, e))?;
        self.git
            .has_staged_changes()
            .await
            .map_err(|e| PipelineError::branch_failed(branch, e))
    }

    /// Commit everything in the working copy to `branch` and push it.
    ///
    /// When nothing is staged the commit is skipped and the branch is pushed
    /// as is. Returns the new commit, if one was made.
    #[instrument(skip_all, fields(branch = %branch))]
    pub async fn commit_and_push(
        &self,
        branch: &str,
        message: &str,
    ) -> Result<Option<CommitId>, PipelineError> {
        BranchController::new(self.git).ensure_branch(branch).await?;

        let commit = if self.stage(branch).await? {
            let commit = self
                .git
                .commit(message)
                .await
                .map_err(|e| PipelineError::branch_failed(branch, e))?;
            info!("Committed {commit}");
            Some(commit)
        } else {
            info!("Nothing to commit, pushing existing branch tip");
            None
        };

        self.push(branch).await?;
        Ok(commit)
    }

    /// Push the commits already on `branch`, finishing a run whose push
    /// failed.
    #[instrument(skip_all, fields(branch = %branch))]
    pub async fn push_existing(&self, branch: &str) -> Result<(), PipelineError> {
        BranchController::new(self.git).ensure_branch(branch).await?;
        self.push(branch).await
    }

    async fn push(&self, branch: &str) -> Result<(), PipelineError> {
        self.git
            .push_upstream(branch)
            .await
            .map_err(|e| PipelineError::PublishFailed {
                branch: branch.to_string(),
                message: format!("{e:#}"),
            })?;
        info!("Pushed {branch}");
        Ok(())
    }
}

/// Commit message for the files written while resolving `issue`.
///
/// Paths are listed once each, in the order they were first written.
pub fn commit_message(issue: &Issue, written: &[PathBuf]) -> String {
    let subject = format!("Resolve issue #{}: {}", issue.id, issue.title.trim());
    let subject: String = subject
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(SUBJECT_MAX_CHARS)
        .collect();

    let mut paths: Vec<String> = Vec::with_capacity(written.len());
    for path in written {
        let path = path.to_string_lossy().replace('\\', "/");
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    let mut message = format!("{}\n\nUpdated {} file(s):\n", subject.trim_end(), paths.len());
    for path in &paths {
        message.push_str(&format!("- {path}\n"));
    }
    message
}

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing::instrument;

use crate::apply::ChangeApplier;
use crate::branch::BranchController;
use crate::clients::git::CommitIdentity;
use crate::clients::git::GitOps;
use crate::clients::git::RealGit;
use crate::errors::PipelineError;
use crate::ignore::IgnoreFilter;
use crate::publish::CommitPublisher;
use crate::remote::redact;
use crate::snapshot::DEFAULT_MAX_FILE_BYTES;
use crate::snapshot::RepoSnapshot;
use crate::snapshot::RepoSnapshotBuilder;

/// One working copy and the components that operate on it.
///
/// The gateway owns the working copy: everything that reads or changes it
/// goes through here, and the pipeline only ever holds one gateway at a time.
pub struct RepoGateway<G: GitOps> {
    root: PathBuf,
    base_branch: String,
    git: G,
    filter: IgnoreFilter,
    max_file_bytes: u64,
    secret: String,
}

impl RepoGateway<RealGit> {
    /// Open the working copy at `root`, cloning `url` into it first if the
    /// directory does not exist yet. An existing clone is reused as is.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub async fn clone_or_reuse(
        url: &str,
        secret: &str,
        root: &Path,
        base_branch: &str,
        git_timeout: Duration,
        identity: CommitIdentity,
    ) -> Result<Self, PipelineError> {
        let clone_failed = |e: anyhow::Error| PipelineError::CloneFailed {
            path: root.to_path_buf(),
            message: redact(&format!("{e:#}"), secret),
        };

        if root.exists() {
            if !root.join(".git").exists() {
                return Err(PipelineError::WorkingCopyNotReady {
                    path: root.to_path_buf(),
                    reason: "directory exists but is not a git working copy".to_string(),
                });
            }
            info!("Reusing working copy");
        } else {
            if let Some(parent) = root.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))
                    .map_err(clone_failed)?;
            }
            info!("Cloning repository");
            RealGit::clone_into(url, root, git_timeout)
                .await
                .map_err(clone_failed)?;
        }

        let git = RealGit::new(root.to_path_buf(), git_timeout, identity);
        Ok(Self::new(root.to_path_buf(), base_branch.to_string(), git).with_secret(secret))
    }
}

impl<G: GitOps> RepoGateway<G> {
    pub fn new(root: PathBuf, base_branch: String, git: G) -> Self {
        Self {
            root,
            base_branch,
            git,
            filter: IgnoreFilter::default(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            secret: String::new(),
        }
    }

    pub fn with_filter(mut self, filter: IgnoreFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    /// Credential that must never appear in reported errors.
    pub fn with_secret(mut self, secret: &str) -> Self {
        self.secret = secret.to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_branch(&self) -> &str {
        &self.base_branch
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub fn redact(&self, message: &str) -> String {
        redact(message, &self.secret)
    }

    /// Make sure a run starts from a clean checkout of the base branch.
    #[instrument(skip_all)]
    pub async fn prepare_base(&self) -> Result<(), PipelineError> {
        let not_ready = |reason: String| PipelineError::WorkingCopyNotReady {
            path: self.root.clone(),
            reason,
        };

        let status = self
            .git
            .status_porcelain()
            .await
            .map_err(|e| not_ready(format!("{e:#}")))?;
        if !status.trim().is_empty() {
            let count = status.lines().filter(|l| !l.trim().is_empty()).count();
            return Err(not_ready(format!("{count} uncommitted change(s)")));
        }

        self.branches()
            .checkout_existing(&self.base_branch)
            .await
            .map_err(|e| not_ready(format!("cannot check out base branch: {e}")))
    }

    /// Files that differ between the base branch and `branch`.
    pub async fn pending_files(&self, branch: &str) -> Result<Vec<String>, PipelineError> {
        self.git
            .changed_files(&self.base_branch, branch)
            .await
            .map_err(|e| PipelineError::branch_failed(branch, e))
    }

    /// Go back to the base branch after a run that produced nothing. `branch`
    /// is deleted when `delete` is set, which the pipeline does for branches
    /// it created itself.
    #[instrument(skip_all, fields(branch = %branch))]
    pub async fn abandon_branch(&self, branch: &str, delete: bool) -> Result<(), PipelineError> {
        self.branches().checkout_existing(&self.base_branch).await?;
        if delete {
            self.git
                .delete_branch(branch)
                .await
                .map_err(|e| PipelineError::branch_failed(branch, e))?;
            info!("Deleted empty branch {branch}");
        }
        Ok(())
    }

    /// Snapshot of the working copy as it is on disk now.
    pub async fn snapshot(&self) -> Result<RepoSnapshot, PipelineError> {
        let root = self.root.clone();
        let filter = self.filter.clone();
        let max_file_bytes = self.max_file_bytes;
        let snapshot = tokio::task::spawn_blocking(move || {
            RepoSnapshotBuilder::new(&filter)
                .with_max_file_bytes(max_file_bytes)
                .build(&root)
        })
        .await
        .context("Snapshot task failed")?;
        Ok(snapshot)
    }

    pub fn applier(&self) -> ChangeApplier<'_> {
        ChangeApplier::new(&self.root, &self.filter)
    }

    pub fn branches(&self) -> BranchController<'_, G> {
        BranchController::new(&self.git)
    }

    pub fn publisher(&self) -> CommitPublisher<'_, G> {
        CommitPublisher::new(&self.git)
    }
}

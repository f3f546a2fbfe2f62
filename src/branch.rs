use tracing::debug;
use tracing::info;
use tracing::instrument;

use crate::clients::git::GitOps;
use crate::errors::PipelineError;

/// Moves the working copy between branches.
///
/// Every call ends either on the requested branch or with an error; a failed
/// checkout is never retried, the caller must treat the working copy as
/// untrusted.
pub struct BranchController<'a, G: GitOps> {
    git: &'a G,
}

impl<'a, G: GitOps> BranchController<'a, G> {
    pub fn new(git: &'a G) -> Self {
        Self { git }
    }

    /// Check out `branch`, creating it from HEAD when it does not exist.
    /// A no-op when `branch` is already checked out.
    #[instrument(skip_all, fields(branch = %branch))]
    pub async fn ensure_branch(&self, branch: &str) -> Result<(), PipelineError> {
        if self.is_current(branch).await? {
            debug!("Already on {branch}");
            return Ok(());
        }

        if !self.exists(branch).await? {
            info!("Creating branch {branch}");
            self.git
                .create_branch(branch)
                .await
                .map_err(|e| PipelineError::branch_failed(branch, e))?;
        }
        self.switch(branch).await
    }

    /// Check out an existing branch; fails if there is no such local branch.
    #[instrument(skip_all, fields(branch = %branch))]
    pub async fn checkout_existing(&self, branch: &str) -> Result<(), PipelineError> {
        if self.is_current(branch).await? {
            return Ok(());
        }
        if !self.exists(branch).await? {
            return Err(PipelineError::branch_failed(branch, "no such local branch"));
        }
        self.switch(branch).await
    }

    async fn is_current(&self, branch: &str) -> Result<bool, PipelineError> {
        let current = self
            .git
            .current_branch()
            .await
            .map_err(|e| PipelineError::branch_failed(branch, e))?;
        Ok(current.as_deref() == Some(branch))
    }

    /// Whether a local branch named `branch` exists.
    pub async fn exists(&self, branch: &str) -> Result<bool, PipelineError> {
        let branches = self
            .git
            .list_local_branches()
            .await
            .map_err(|e| PipelineError::branch_failed(branch, e))?;
        Ok(branches.iter().any(|b| b == branch))
    }

    async fn switch(&self, branch: &str) -> Result<(), PipelineError> {
        self.git
            .checkout(branch)
            .await
            .map_err(|e| PipelineError::branch_failed(branch, e))?;

        // Confirm before anything gets written on top of it
        if !self.is_current(branch).await? {
            return Err(PipelineError::branch_failed(
                branch,
                "checkout did not switch branches",
            ));
        }
        Ok(())
    }
}

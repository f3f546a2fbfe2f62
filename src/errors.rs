//! Typed errors for a single pipeline run.
//!
//! Snapshot read failures never show up here: they are recovered per file as
//! sentinel content. Everything else aborts the run and is reported to the
//! caller through [`crate::pipeline::IssueOutcome::Failed`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort the processing of one issue.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Working copy at {} is not ready: {reason}", path.display())]
    WorkingCopyNotReady { path: PathBuf, reason: String },

    #[error("Invalid issue: {0}")]
    InvalidIssue(String),

    #[error("Generator failed: {0}")]
    GeneratorFailed(String),

    #[error("Generator did not answer within {secs}s")]
    GeneratorTimedOut { secs: u64 },

    #[error(transparent)]
    ChangeSetParse(#[from] ChangeSetParseError),

    #[error("Branch operation on '{branch}' failed: {message}")]
    BranchOperationFailed { branch: String, message: String },

    #[error("Refusing to write '{path}': it resolves outside the working copy")]
    PathTraversalRejected { path: String },

    #[error("Refusing to write '{path}': it is excluded by the ignore set")]
    IgnoredPathRejected { path: String },

    #[error("Failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Push of '{branch}' failed: {message}")]
    PublishFailed { branch: String, message: String },

    #[error("Clone into {} failed: {message}", path.display())]
    CloneFailed { path: PathBuf, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Stable machine-readable category, used in run outcomes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::WorkingCopyNotReady { .. } => "working_copy_not_ready",
            Self::InvalidIssue(_) => "invalid_issue",
            Self::GeneratorFailed(_) => "generator_failed",
            Self::GeneratorTimedOut { .. } => "generator_timed_out",
            Self::ChangeSetParse(_) => "change_set_parse_error",
            Self::BranchOperationFailed { .. } => "branch_operation_failed",
            Self::PathTraversalRejected { .. } => "path_traversal_rejected",
            Self::IgnoredPathRejected { .. } => "ignored_path_rejected",
            Self::WriteFailed { .. } => "write_failed",
            Self::PublishFailed { .. } => "publish_failed",
            Self::CloneFailed { .. } => "clone_failed",
            Self::Other(_) => "internal",
        }
    }

    pub(crate) fn branch_failed(branch: &str, err: impl std::fmt::Display) -> Self {
        Self::BranchOperationFailed {
            branch: branch.to_string(),
            message: format!("{err:#}"),
        }
    }
}

/// Generator output that could not be turned into a change set.
///
/// The full raw text is retained so a failed run can be diagnosed; the
/// display form only carries a short snippet of it.
#[derive(Debug, Error)]
#[error("Could not parse generator output: {message} (near: {snippet:?})")]
pub struct ChangeSetParseError {
    pub message: String,
    pub snippet: String,
    pub raw: String,
}

/// Length of the excerpt attached to parse errors.
const SNIPPET_CHARS: usize = 160;

impl ChangeSetParseError {
    pub fn new(message: impl Into<String>, raw: &str) -> Self {
        Self {
            message: message.into(),
            snippet: raw.chars().take(SNIPPET_CHARS).collect(),
            raw: raw.to_string(),
        }
    }
}

/// Missing or malformed configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {message}")]
    Invalid { var: &'static str, message: String },
}

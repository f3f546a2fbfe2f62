use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::error;
use tracing::info;
use tracing::instrument;

use crate::changeset::ChangeSetParser;
use crate::changeset::ParseMode;
use crate::clients::git::GitOps;
use crate::config::Config;
use crate::errors::PipelineError;
use crate::gateway::RepoGateway;
use crate::generator::ChangeGenerator;
use crate::generator::DEFAULT_SYSTEM_CONTEXT;
use crate::generator::GenerationRequest;
use crate::issue::Issue;
use crate::issue::branch_name_for;
use crate::publish::commit_message;
use crate::snapshot::RepoSnapshot;

/// Result of processing one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IssueOutcome {
    Pushed {
        branch_name: String,
        files: Vec<String>,
    },
    /// Nothing was left to commit or push for the issue.
    NoChanges,
    Failed {
        category: String,
        error: String,
    },
}

impl IssueOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub parse_mode: ParseMode,
    pub generator_timeout: Duration,
    pub system_context: String,
    pub branch_prefix: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            parse_mode: ParseMode::Strict,
            generator_timeout: Duration::from_secs(300),
            system_context: DEFAULT_SYSTEM_CONTEXT.to_string(),
            branch_prefix: String::new(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            parse_mode: config.parse_mode,
            generator_timeout: config.generator_timeout,
            system_context: config.system_context.clone(),
            branch_prefix: config.branch_prefix.clone(),
        }
    }
}

/// Turns issues into pushed branches.
///
/// Runs are strictly sequential: snapshot, generate, parse, branch, apply,
/// commit. The working copy sits behind a mutex so concurrent callers queue
/// up instead of racing on the checked out branch.
pub struct Pipeline<G: GitOps, P: ChangeGenerator> {
    gateway: Mutex<RepoGateway<G>>,
    generator: P,
    settings: PipelineSettings,
}

impl<G: GitOps, P: ChangeGenerator> Pipeline<G, P> {
    pub fn new(gateway: RepoGateway<G>, generator: P, settings: PipelineSettings) -> Self {
        Self {
            gateway: Mutex::new(gateway),
            generator,
            settings,
        }
    }

    /// Process one issue. Every failure is reported in the outcome.
    #[instrument(skip_all, fields(issue = %issue.id))]
    pub async fn handle_issue(&self, issue: &Issue) -> IssueOutcome {
        if issue.title.trim().is_empty() {
            return failed(
                PipelineError::InvalidIssue("title is empty".to_string()),
                |m| m.to_string(),
            );
        }

        let gateway = self.gateway.lock().await;
        info!("Handling issue #{}: {}", issue.id, issue.title);
        match self.run(&gateway, issue).await {
            Ok(outcome) => outcome,
            Err(err) => failed(err, |m| gateway.redact(m)),
        }
    }

    /// Snapshot of the working copy, taken under the run lock.
    pub async fn snapshot(&self) -> Result<RepoSnapshot, PipelineError> {
        self.gateway.lock().await.snapshot().await
    }

    async fn run(&self, gateway: &RepoGateway<G>, issue: &Issue) -> Result<IssueOutcome, PipelineError> {
        gateway.prepare_base().await?;

        let snapshot = gateway.snapshot().await?;
        let raw = self.generate(issue, &snapshot).await?;

        let change_set = ChangeSetParser::new(self.settings.parse_mode).parse(&raw)?;
        let branch = branch_name_for(issue, &self.settings.branch_prefix);
        if change_set.is_empty() {
            info!("Generator proposed no changes");
            return self.finish_pending(gateway, &branch).await;
        }
        // Reject bad paths while still on the base branch
        gateway.applier().validate(&change_set)?;

        if branch == gateway.base_branch() {
            return Err(PipelineError::branch_failed(
                &branch,
                "branch name derived from the issue equals the base branch",
            ));
        }
        let existed = gateway.branches().exists(&branch).await?;
        gateway.branches().ensure_branch(&branch).await?;

        let written = gateway.applier().apply(&change_set)?;
        let publisher = gateway.publisher();
        if !publisher.stage(&branch).await? && gateway.pending_files(&branch).await?.is_empty() {
            info!("Edits leave {branch} identical to the base branch");
            gateway.abandon_branch(&branch, !existed).await?;
            return Ok(IssueOutcome::NoChanges);
        }

        let message = commit_message(issue, &written);
        publisher.commit_and_push(&branch, &message).await?;

        Ok(IssueOutcome::Pushed {
            branch_name: branch,
            files: written
                .iter()
                .map(|path| path.to_string_lossy().replace('\\', "/"))
                .collect(),
        })
    }

    /// Outcome of a run with no new edits. A branch left with unpushed
    /// commits by an earlier run is pushed now instead of being forgotten.
    async fn finish_pending(&self, gateway: &RepoGateway<G>, branch: &str) -> Result<IssueOutcome, PipelineError> {
        if branch == gateway.base_branch() || !gateway.branches().exists(branch).await? {
            return Ok(IssueOutcome::NoChanges);
        }
        let pending = gateway.pending_files(branch).await?;
        if pending.is_empty() {
            return Ok(IssueOutcome::NoChanges);
        }

        info!("Pushing {} file(s) already committed on {branch}", pending.len());
        gateway.publisher().push_existing(branch).await?;
        Ok(IssueOutcome::Pushed {
            branch_name: branch.to_string(),
            files: pending,
        })
    }

    #[instrument(skip_all)]
    async fn generate(&self, issue: &Issue, snapshot: &RepoSnapshot) -> Result<String, PipelineError> {
        let request = GenerationRequest {
            system_context: &self.settings.system_context,
            issue,
            snapshot,
        };
        let timeout = self.settings.generator_timeout;
        match tokio::time::timeout(timeout, self.generator.propose_changes(&request)).await {
            Ok(Ok(raw)) => {
                info!("Generator answered with {} bytes", raw.len());
                Ok(raw)
            }
            Ok(Err(e)) => Err(PipelineError::GeneratorFailed(format!("{e:#}"))),
            Err(_) => Err(PipelineError::GeneratorTimedOut {
                secs: timeout.as_secs(),
            }),
        }
    }
}

fn failed(err: PipelineError, redact: impl Fn(&str) -> String) -> IssueOutcome {
    if let PipelineError::ChangeSetParse(parse) = &err {
        error!("Unparsable generator output:\n{}", redact(&parse.raw));
    }
    let message = redact(&format!("{err:#}"));
    error!("Run failed ({}): {message}", err.category());
    IssueOutcome::Failed {
        category: err.category().to_string(),
        error: message,
    }
}

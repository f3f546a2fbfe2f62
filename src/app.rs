use std::time::Duration;

use colored::Colorize;
use tokio::sync::Mutex;

use crate::clients::git::GitOps;
use crate::generator::ChangeGenerator;
use crate::issue::Issue;
use crate::issue::IssueSource;
use crate::ledger::IssueLedger;
use crate::pipeline::IssueOutcome;
use crate::pipeline::Pipeline;

pub struct App<S: IssueSource, G: GitOps, P: ChangeGenerator> {
    pub source: S,
    pub pipeline: Pipeline<G, P>,
    pub ledger: Mutex<IssueLedger>,
    pub poll_interval: Duration,
    /// Print machine-readable JSON instead of colored text.
    pub json: bool,
}

impl<S: IssueSource, G: GitOps, P: ChangeGenerator> App<S, G, P> {
    pub fn new(source: S, pipeline: Pipeline<G, P>, ledger: IssueLedger, poll_interval: Duration) -> Self {
        Self {
            source,
            pipeline,
            ledger: Mutex::new(ledger),
            poll_interval,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Print the outcome of one issue.
    pub(crate) fn write_outcome(
        &self,
        issue: &Issue,
        outcome: &IssueOutcome,
        stdout: &mut impl std::io::Write,
    ) -> anyhow::Result<()> {
        if self.json {
            let line = serde_json::json!({ "issue": issue.id, "outcome": outcome });
            writeln!(stdout, "{line}")?;
            return Ok(());
        }

        let id = format!("#{}", issue.id).cyan();
        match outcome {
            IssueOutcome::Pushed { branch_name, files } => {
                writeln!(stdout, "{} {} {}", "✓".green(), id, issue.title)?;
                writeln!(stdout, "  pushed {} ({} file(s))", branch_name.bold(), files.len())?;
            }
            IssueOutcome::NoChanges => {
                writeln!(stdout, "{} {} {}", "-".yellow(), id, issue.title)?;
                writeln!(stdout, "  {}", "nothing to publish".dimmed())?;
            }
            IssueOutcome::Failed { category, error } => {
                writeln!(stdout, "{} {} {}", "✗".red(), id, issue.title)?;
                writeln!(stdout, "  {}: {}", category.red(), error)?;
            }
        }
        Ok(())
    }
}

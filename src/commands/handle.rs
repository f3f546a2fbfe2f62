use anyhow::Result;
use anyhow::bail;

use crate::App;
use crate::clients::git::GitOps;
use crate::generator::ChangeGenerator;
use crate::issue::Issue;
use crate::issue::IssueSource;
use crate::pipeline::IssueOutcome;

impl<S: IssueSource, G: GitOps, P: ChangeGenerator> App<S, G, P> {
    /// Process one issue, bypassing the issue source and the ledger.
    pub async fn cmd_handle(&self, issue: &Issue, stdout: &mut impl std::io::Write) -> Result<IssueOutcome> {
        let outcome = self.pipeline.handle_issue(issue).await;
        self.write_outcome(issue, &outcome, stdout)?;
        if let IssueOutcome::Failed { category, .. } = &outcome {
            bail!("Issue #{} failed: {category}", issue.id);
        }
        Ok(outcome)
    }
}

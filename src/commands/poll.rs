use anyhow::Result;
use log::debug;
use log::info;
use log::warn;
use tokio::sync::watch;

use crate::App;
use crate::clients::git::GitOps;
use crate::generator::ChangeGenerator;
use crate::issue::IssueSource;

/// Counts from one pass over the open issues.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub handled: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl<S: IssueSource, G: GitOps, P: ChangeGenerator> App<S, G, P> {
    /// Process open issues until Ctrl-C, or a single pass with `once`.
    ///
    /// A run in progress is always finished; Ctrl-C takes effect between
    /// issues.
    pub async fn cmd_poll(&self, once: bool, stdout: &mut impl std::io::Write) -> Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = stop_tx.send(true);
            }
        });
        let result = self.poll_until_stopped(once, stop_rx, stdout).await;
        signal.abort();
        result
    }

    async fn poll_until_stopped(
        &self,
        once: bool,
        mut stop: watch::Receiver<bool>,
        stdout: &mut impl std::io::Write,
    ) -> Result<()> {
        loop {
            match self.poll_once(&stop, stdout).await {
                Ok(summary) => {
                    info!(
                        "Poll finished: {} handled, {} already done, {} failed",
                        summary.handled, summary.skipped, summary.failed
                    );
                }
                // A single pass reports errors; the loop keeps going
                Err(e) if once => return Err(e),
                Err(e) => warn!("Poll failed: {e:#}"),
            }

            if once || *stop.borrow() {
                return Ok(());
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = stop.changed() => {
                    info!("Stopping");
                    return Ok(());
                }
            }
        }
    }

    /// One pass over the open issues, in source order.
    pub async fn poll_once(
        &self,
        stop: &watch::Receiver<bool>,
        stdout: &mut impl std::io::Write,
    ) -> Result<PollSummary> {
        let issues = self.source.list_open_issues().await?;
        let mut summary = PollSummary::default();

        for issue in &issues {
            if *stop.borrow() {
                info!("Interrupted, leaving remaining issues for the next run");
                break;
            }
            if self.ledger.lock().await.contains(&issue.id) {
                debug!("Skipping issue #{}: already handled", issue.id);
                summary.skipped += 1;
                continue;
            }

            let outcome = self.pipeline.handle_issue(issue).await;
            self.write_outcome(issue, &outcome, stdout)?;
            if outcome.is_failed() {
                summary.failed += 1;
            } else {
                summary.handled += 1;
            }
            self.ledger.lock().await.record(&issue.id, &outcome).await?;
        }

        Ok(summary)
    }
}

use anyhow::Result;
use colored::Colorize;

use crate::App;
use crate::clients::git::GitOps;
use crate::generator::ChangeGenerator;
use crate::issue::IssueSource;

impl<S: IssueSource, G: GitOps, P: ChangeGenerator> App<S, G, P> {
    pub async fn cmd_issues(&self, stdout: &mut impl std::io::Write) -> Result<()> {
        let issues = self.source.list_open_issues().await?;
        if self.json {
            writeln!(stdout, "{}", serde_json::to_string_pretty(&issues)?)?;
            return Ok(());
        }

        let ledger = self.ledger.lock().await;
        for issue in &issues {
            let marker = if ledger.contains(&issue.id) { "✓".green() } else { " ".normal() };
            writeln!(stdout, "{} {} {}", marker, format!("#{}", issue.id).cyan(), issue.title)?;
        }
        if issues.is_empty() {
            writeln!(stdout, "No open issues")?;
        }
        Ok(())
    }
}

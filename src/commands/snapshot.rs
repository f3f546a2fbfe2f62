use anyhow::Result;

use crate::App;
use crate::clients::git::GitOps;
use crate::generator::ChangeGenerator;
use crate::issue::IssueSource;

impl<S: IssueSource, G: GitOps, P: ChangeGenerator> App<S, G, P> {
    /// Print the tree listing and, with `content`, the content map.
    pub async fn cmd_snapshot(&self, content: bool, stdout: &mut impl std::io::Write) -> Result<()> {
        let snapshot = self.pipeline.snapshot().await?;
        if self.json {
            writeln!(stdout, "{}", serde_json::to_string_pretty(&snapshot)?)?;
            return Ok(());
        }

        write!(stdout, "{}", snapshot.tree_text)?;
        if content {
            writeln!(stdout)?;
            writeln!(stdout, "{}", snapshot.content_json()?)?;
        }
        Ok(())
    }
}

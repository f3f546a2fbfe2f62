use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use log::debug;
use serde::Deserialize;
use serde::Serialize;

use crate::pipeline::IssueOutcome;

/// What happened to an issue that does not need to be processed again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerEntry {
    Pushed { branch: String },
    NoChanges,
}

/// Persistent record of handled issues, keyed by issue id.
///
/// Failed runs are never recorded so the next poll retries them.
#[derive(Debug)]
pub struct IssueLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl IssueLedger {
    /// Load the ledger at `path`; a missing file is an empty ledger.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse ledger {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read ledger {}", path.display()));
            }
        };
        Ok(Self { path, entries })
    }

    pub fn get(&self, issue_id: &str) -> Option<&LedgerEntry> {
        self.entries.get(issue_id)
    }

    pub fn contains(&self, issue_id: &str) -> bool {
        self.entries.contains_key(issue_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a finished run and persist the ledger. Returns whether the
    /// outcome was recorded.
    pub async fn record(&mut self, issue_id: &str, outcome: &IssueOutcome) -> Result<bool> {
        let entry = match outcome {
            IssueOutcome::Pushed { branch_name, .. } => LedgerEntry::Pushed {
                branch: branch_name.clone(),
            },
            IssueOutcome::NoChanges => LedgerEntry::NoChanges,
            IssueOutcome::Failed { .. } => return Ok(false),
        };
        self.entries.insert(issue_id.to_string(), entry);
        self.save().await?;
        Ok(true)
    }

    /// Write to a sibling temp file, then rename over the ledger.
    async fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!("Saved ledger with {} entries", self.entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pushed(branch: &str) -> IssueOutcome {
        IssueOutcome::Pushed {
            branch_name: branch.to_string(),
            files: vec!["a.py".to_string()],
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = IssueLedger::load(dir.path().join("ledger.json")).await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_record_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/ledger.json");

        let mut ledger = IssueLedger::load(&path).await.unwrap();
        assert!(ledger.record("1", &pushed("fixbug")).await.unwrap());
        assert!(ledger.record("2", &IssueOutcome::NoChanges).await.unwrap());

        let reloaded = IssueLedger::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get("1"),
            Some(&LedgerEntry::Pushed {
                branch: "fixbug".to_string()
            })
        );
        assert_eq!(reloaded.get("2"), Some(&LedgerEntry::NoChanges));
        assert!(!dir.path().join("state/ledger.json.tmp").exists());

        let text = std::fs::read_to_string(&path).unwrap();
        insta::assert_snapshot!(text, @r#"
        {
          "1": {
            "status": "pushed",
            "branch": "fixbug"
          },
          "2": {
            "status": "no_changes"
          }
        }
        "#);
    }

    #[tokio::test]
    async fn test_failed_runs_are_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = IssueLedger::load(&path).await.unwrap();
        let failed = IssueOutcome::Failed {
            category: "publish_failed".to_string(),
            error: "rejected".to_string(),
        };
        assert!(!ledger.record("1", &failed).await.unwrap());
        assert!(!ledger.contains("1"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, "not json").unwrap();
        let err = IssueLedger::load(&path).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to parse ledger"));
    }
}

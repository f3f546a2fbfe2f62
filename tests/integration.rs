//! cargo test --test integration -- --nocapture
//!
//! Drives the pipeline against real git: a bare repository plays the remote
//! and a scripted generator stands in for the model.

mod utils;

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use autobranch::App;
use autobranch::Issue;
use autobranch::IssueOutcome;
use autobranch::Pipeline;
use autobranch::clients::git::CommitIdentity;
use autobranch::clients::git::GitOps as _;
use autobranch::clients::git::RealGit;
use autobranch::gateway::RepoGateway;
use autobranch::generator::ChangeGenerator;
use autobranch::generator::GenerationRequest;
use autobranch::ignore::IgnoreFilter;
use autobranch::issue::IssueSource;
use autobranch::ledger::IssueLedger;
use autobranch::pipeline::PipelineSettings;
use utils::TestDir;
use utils::git_output;
use utils::git_succeeds;

const FILES: &[(&str, &str)] = &[
    ("README.md", "# Widgets\n"),
    ("src/app.py", "def answer():\n    return 41\n"),
    ("package-lock.json", "{}\n"),
];

const FIX_BUG_ANSWER: &str = r#"```json
[
  {"filename": "app.py", "path": "src", "content": "def answer():\n    return 42\n"},
  {"filename": "CHANGES.md", "path": "", "content": "Fixed the answer\n"}
]
```"#;

#[ctor::ctor]
fn init() {
    // Disable colors for all integration tests to get clean output
    colored::control::set_override(false);
    let _ = autobranch::logging::setup_logging();
}

/// Generator answering from a script keyed by issue id; unknown issues get `[]`.
///
/// Answers for one issue are given in turn, the last one repeats.
#[derive(Default)]
struct ScriptedGenerator {
    answers: Mutex<HashMap<String, VecDeque<String>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    fn answer(mut self, issue_id: &str, answer: &str) -> Self {
        self.answers
            .get_mut()
            .unwrap()
            .entry(issue_id.to_string())
            .or_default()
            .push_back(answer.to_string());
        self
    }
}

impl ChangeGenerator for ScriptedGenerator {
    async fn propose_changes(&self, request: &GenerationRequest<'_>) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(
            !request.snapshot.tree_text.contains(".git/"),
            "snapshot leaked the git directory"
        );
        let mut answers = self.answers.lock().unwrap();
        let answer = match answers.get_mut(&request.issue.id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(answer.unwrap_or_else(|| "[]".to_string()))
    }
}

struct FakeSource(Vec<Issue>);

impl IssueSource for FakeSource {
    async fn list_open_issues(&self) -> anyhow::Result<Vec<Issue>> {
        Ok(self.0.clone())
    }
}

struct Fixture {
    dir: TestDir,
    remote: PathBuf,
    work: PathBuf,
}

async fn setup() -> anyhow::Result<Fixture> {
    let dir = TestDir::new()?;
    let remote = utils::create_remote(dir.path(), FILES).await?;
    let work = dir.path().join("work");
    Ok(Fixture { dir, remote, work })
}

async fn gateway(fx: &Fixture) -> anyhow::Result<RepoGateway<RealGit>> {
    let gateway = RepoGateway::clone_or_reuse(
        &fx.remote.to_string_lossy(),
        "",
        &fx.work,
        "main",
        Duration::from_secs(30),
        CommitIdentity::default(),
    )
    .await?
    .with_filter(IgnoreFilter::new([".git", "package-lock.json"], [".png"]));
    Ok(gateway)
}

async fn pipeline(
    fx: &Fixture,
    generator: ScriptedGenerator,
) -> anyhow::Result<Pipeline<RealGit, ScriptedGenerator>> {
    Ok(Pipeline::new(gateway(fx).await?, generator, PipelineSettings::default()))
}

fn fix_bug() -> Issue {
    Issue::new("7", "Fix bug!", "answer() should return 42")
}

#[tokio::test]
async fn test_issue_becomes_pushed_branch() -> anyhow::Result<()> {
    let fx = setup().await?;
    let pipeline = pipeline(&fx, ScriptedGenerator::default().answer("7", FIX_BUG_ANSWER)).await?;

    let outcome = pipeline.handle_issue(&fix_bug()).await;
    assert_eq!(
        outcome,
        IssueOutcome::Pushed {
            branch_name: "fixbug".to_string(),
            files: vec!["src/app.py".to_string(), "CHANGES.md".to_string()],
        }
    );

    let message = git_output(&fx.remote, &["log", "-1", "--format=%B", "fixbug"]).await?;
    insta::assert_snapshot!(message, @r"
    Resolve issue #7: Fix bug!

    Updated 2 file(s):
    - src/app.py
    - CHANGES.md
    ");
    assert_eq!(
        git_output(&fx.remote, &["log", "-1", "--format=%an <%ae>", "fixbug"]).await?,
        "autobranch <autobranch@localhost>"
    );
    assert_eq!(
        git_output(&fx.remote, &["show", "fixbug:src/app.py"]).await?,
        "def answer():\n    return 42"
    );
    // Base is untouched
    assert_eq!(
        git_output(&fx.remote, &["show", "main:src/app.py"]).await?,
        "def answer():\n    return 41"
    );
    Ok(())
}

#[tokio::test]
async fn test_each_issue_branches_from_base() -> anyhow::Result<()> {
    let fx = setup().await?;
    let docs = r#"[{"filename": "usage.md", "path": "docs", "content": "Run it\n"}]"#;
    let pipeline = pipeline(
        &fx,
        ScriptedGenerator::default()
            .answer("7", FIX_BUG_ANSWER)
            .answer("8", docs),
    )
    .await?;

    pipeline.handle_issue(&fix_bug()).await;
    let outcome = pipeline
        .handle_issue(&Issue::new("8", "Add docs", "Document usage"))
        .await;
    assert!(matches!(outcome, IssueOutcome::Pushed { ref branch_name, .. } if branch_name == "adddocs"));

    assert_eq!(
        git_output(&fx.remote, &["rev-parse", "adddocs~1"]).await?,
        git_output(&fx.remote, &["rev-parse", "main"]).await?
    );
    assert!(!git_succeeds(&fx.remote, &["merge-base", "--is-ancestor", "fixbug", "adddocs"]).await?);
    Ok(())
}

#[tokio::test]
async fn test_rehandling_issue_pushes_without_new_commit() -> anyhow::Result<()> {
    let fx = setup().await?;
    let pipeline = pipeline(&fx, ScriptedGenerator::default().answer("7", FIX_BUG_ANSWER)).await?;

    let first = pipeline.handle_issue(&fix_bug()).await;
    let second = pipeline.handle_issue(&fix_bug()).await;
    assert_eq!(first, second);
    assert_eq!(
        git_output(&fx.remote, &["rev-list", "--count", "fixbug"]).await?,
        "2"
    );
    Ok(())
}

#[tokio::test]
async fn test_identical_edits_leave_no_branch() -> anyhow::Result<()> {
    let fx = setup().await?;
    let answer = r##"[{"filename": "README.md", "path": "", "content": "# Widgets\n"}]"##;
    let pipeline = pipeline(&fx, ScriptedGenerator::default().answer("7", answer)).await?;

    let outcome = pipeline.handle_issue(&fix_bug()).await;
    assert_eq!(outcome, IssueOutcome::NoChanges);
    assert!(!git_succeeds(&fx.remote, &["rev-parse", "--verify", "--quiet", "refs/heads/fixbug"]).await?);
    assert_eq!(git_output(&fx.work, &["branch", "--format=%(refname:short)"]).await?, "main");
    assert_eq!(git_output(&fx.work, &["symbolic-ref", "--short", "HEAD"]).await?, "main");
    Ok(())
}

#[tokio::test]
async fn test_rejected_push_is_finished_by_next_poll() -> anyhow::Result<()> {
    let fx = setup().await?;
    // The second run proposes nothing new
    let generator = ScriptedGenerator::default()
        .answer("7", FIX_BUG_ANSWER)
        .answer("7", "[]");
    let ledger_path = fx.dir.path().join("ledger.json");
    let app = App::new(
        FakeSource(vec![fix_bug()]),
        pipeline(&fx, generator).await?,
        IssueLedger::load(&ledger_path).await?,
        Duration::from_secs(1),
    );

    utils::reject_pushes(&fx.remote, true).await?;
    let out = capture_stdout!(out => app.cmd_poll(true, out));
    assert!(out.contains("publish_failed"), "{out}");
    assert!(!IssueLedger::load(&ledger_path).await?.contains("7"));
    assert!(!git_succeeds(&fx.remote, &["rev-parse", "--verify", "--quiet", "refs/heads/fixbug"]).await?);

    utils::reject_pushes(&fx.remote, false).await?;
    let out = capture_stdout!(out => app.cmd_poll(true, out));
    insta::assert_snapshot!(out, @r"
    ✓ #7 Fix bug!
      pushed fixbug (2 file(s))
    ");
    assert_eq!(
        git_output(&fx.remote, &["show", "fixbug:src/app.py"]).await?,
        "def answer():\n    return 42"
    );
    assert!(IssueLedger::load(&ledger_path).await?.contains("7"));
    Ok(())
}

#[tokio::test]
async fn test_ensure_branch_is_idempotent() -> anyhow::Result<()> {
    let fx = setup().await?;
    let gateway = gateway(&fx).await?;

    gateway.branches().ensure_branch("feature").await?;
    gateway.branches().ensure_branch("feature").await?;
    assert_eq!(gateway.git().current_branch().await?.as_deref(), Some("feature"));
    assert_eq!(gateway.git().list_local_branches().await?, ["feature", "main"]);

    // Reopening the existing clone keeps its state
    let reopened = crate::gateway(&fx).await?;
    assert_eq!(reopened.git().current_branch().await?.as_deref(), Some("feature"));
    Ok(())
}

#[tokio::test]
async fn test_path_traversal_rejects_whole_batch() -> anyhow::Result<()> {
    let fx = setup().await?;
    let answer = r#"[
        {"filename": "ok.py", "path": "src", "content": "x = 1"},
        {"filename": "passwd", "path": "../../etc", "content": "root::0:0::/:/bin/sh"}
    ]"#;
    let pipeline = pipeline(&fx, ScriptedGenerator::default().answer("7", answer)).await?;

    let outcome = pipeline.handle_issue(&fix_bug()).await;
    assert!(matches!(
        outcome,
        IssueOutcome::Failed { ref category, .. } if category == "path_traversal_rejected"
    ));
    assert!(!fx.work.join("src/ok.py").exists());
    assert_eq!(git_output(&fx.work, &["status", "--porcelain"]).await?, "");
    assert_eq!(git_output(&fx.work, &["branch", "--format=%(refname:short)"]).await?, "main");
    Ok(())
}

#[tokio::test]
async fn test_malformed_answer_fails_whole_batch() -> anyhow::Result<()> {
    let fx = setup().await?;
    let answer = r#"[
        {"filename": "a.py", "path": "src", "content": "x = 1"},
        {"filename": "b.py", "path": "src"}
    ]"#;
    let pipeline = pipeline(&fx, ScriptedGenerator::default().answer("7", answer)).await?;

    let IssueOutcome::Failed { category, error } = pipeline.handle_issue(&fix_bug()).await else {
        panic!("expected a failure");
    };
    assert_eq!(category, "change_set_parse_error");
    assert!(error.contains("content"), "{error}");
    assert!(!fx.work.join("src/a.py").exists());
    assert_eq!(git_output(&fx.work, &["branch", "--format=%(refname:short)"]).await?, "main");
    Ok(())
}

#[tokio::test]
async fn test_dirty_working_copy_is_not_ready() -> anyhow::Result<()> {
    let fx = setup().await?;
    let generator = ScriptedGenerator::default().answer("7", FIX_BUG_ANSWER);
    let calls = generator.calls.clone();
    let pipeline = pipeline(&fx, generator).await?;
    tokio::fs::write(fx.work.join("notes.txt"), "scratch").await?;

    let IssueOutcome::Failed { category, error } = pipeline.handle_issue(&fix_bug()).await else {
        panic!("expected a failure");
    };
    assert_eq!(category, "working_copy_not_ready");
    let work = regex::escape(&fx.work.to_string_lossy());
    let filters = vec![(work.as_str(), "[WORK]")];
    assert_snapshot_filtered!(error, filters, @"Working copy at [WORK] is not ready: 1 uncommitted change(s)");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_poll_records_outcomes_in_ledger() -> anyhow::Result<()> {
    let fx = setup().await?;
    let generator = ScriptedGenerator::default().answer("7", FIX_BUG_ANSWER);
    let calls = generator.calls.clone();
    let source = FakeSource(vec![fix_bug(), Issue::new("8", "Nothing to do", "")]);
    let ledger_path = fx.dir.path().join("ledger.json");
    let app = App::new(
        source,
        pipeline(&fx, generator).await?,
        IssueLedger::load(&ledger_path).await?,
        Duration::from_secs(1),
    );

    let out = capture_stdout!(out => app.cmd_poll(true, out));
    insta::assert_snapshot!(out, @r"
    ✓ #7 Fix bug!
      pushed fixbug (2 file(s))
    - #8 Nothing to do
      nothing to publish
    ");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Everything is in the ledger now
    let out = capture_stdout!(out => app.cmd_poll(true, out));
    assert_eq!(out, "");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let ledger = IssueLedger::load(&ledger_path).await?;
    assert!(ledger.contains("7") && ledger.contains("8"));
    Ok(())
}

#[tokio::test]
async fn test_handle_prints_json_outcome() -> anyhow::Result<()> {
    let fx = setup().await?;
    let app = App::new(
        FakeSource(vec![]),
        pipeline(&fx, ScriptedGenerator::default().answer("7", FIX_BUG_ANSWER)).await?,
        IssueLedger::load(fx.dir.path().join("ledger.json")).await?,
        Duration::from_secs(1),
    )
    .with_json(true);

    let out = capture_stdout!(out => app.cmd_handle(&fix_bug(), out));
    let line: serde_json::Value = serde_json::from_str(out.trim())?;
    assert_eq!(
        line,
        serde_json::json!({
            "issue": "7",
            "outcome": {
                "status": "pushed",
                "branch_name": "fixbug",
                "files": ["src/app.py", "CHANGES.md"],
            }
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_snapshot_command_prunes_ignored_entries() -> anyhow::Result<()> {
    let fx = setup().await?;
    let app = App::new(
        FakeSource(vec![]),
        pipeline(&fx, ScriptedGenerator::default()).await?,
        IssueLedger::load(fx.dir.path().join("ledger.json")).await?,
        Duration::from_secs(1),
    );

    let out = capture_stdout!(out => app.cmd_snapshot(false, out));
    insta::assert_snapshot!(out, @r"
    work/
        README.md
        src/
            app.py
    ");
    Ok(())
}

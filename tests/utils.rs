use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

/// Run git in `dir`, discarding output.
pub async fn git(dir: &Path, args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    anyhow::ensure!(status.success(), "git {} failed", args.join(" "));
    Ok(())
}

/// Run git in `dir` and return its trimmed stdout.
pub async fn git_output(dir: &Path, args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await?;
    anyhow::ensure!(output.status.success(), "git {} failed", args.join(" "));
    Ok(String::from_utf8(output.stdout)?.trim().to_string())
}

/// Whether git succeeds in `dir`.
pub async fn git_succeeds(dir: &Path, args: &[&str]) -> anyhow::Result<bool> {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    Ok(status.success())
}

/// Creates a git repository on branch `main` in the given directory.
///
/// This initializes the repo and sets basic git config needed for commits.
/// The directory should already exist.
pub async fn create_git_repo(dir: &Path) -> anyhow::Result<()> {
    git(dir, &["init", "-b", "main"]).await?;
    git(dir, &["config", "user.name", "Test User"]).await?;
    git(dir, &["config", "user.email", "test@example.com"]).await?;
    Ok(())
}

/// Writes files and commits them.
pub async fn commit_files(dir: &Path, message: &str, files: &[(&str, &str)]) -> anyhow::Result<()> {
    for (path, contents) in files {
        let full = dir.join(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, contents).await?;
    }
    git(dir, &["add", "--all"]).await?;
    git(dir, &["commit", "-m", message]).await?;
    Ok(())
}

/// Creates a bare repository at `<root>/remote.git` whose `main` holds
/// `files`, and returns its path.
pub async fn create_remote(root: &Path, files: &[(&str, &str)]) -> anyhow::Result<PathBuf> {
    let remote = root.join("remote.git");
    tokio::fs::create_dir_all(&remote).await?;
    git(&remote, &["init", "--bare", "-b", "main"]).await?;

    let seed = root.join("seed");
    tokio::fs::create_dir_all(&seed).await?;
    create_git_repo(&seed).await?;
    commit_files(&seed, "Initial commit", files).await?;
    git(&seed, &["remote", "add", "origin", &remote.to_string_lossy()]).await?;
    git(&seed, &["push", "origin", "main"]).await?;

    Ok(remote)
}

/// Make the bare repository at `remote` refuse every push, or accept
/// pushes again.
pub async fn reject_pushes(remote: &Path, reject: bool) -> anyhow::Result<()> {
    let hooks = remote.join("hooks");
    let hook = hooks.join("pre-receive");
    if reject {
        tokio::fs::create_dir_all(&hooks).await?;
        tokio::fs::write(&hook, "#!/bin/sh\necho 'pushes are disabled' >&2\nexit 1\n").await?;
        tokio::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).await?;
    } else {
        tokio::fs::remove_file(&hook).await?;
    }
    Ok(())
}

pub enum TestDir {
    Temp(tempfile::TempDir),
    Kept(std::path::PathBuf),
}

impl TestDir {
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;

        if std::env::var("DEBUG_TESTS").is_ok() {
            let path = temp_dir.keep();
            eprintln!("Test directory kept at: {}", path.display());
            Ok(TestDir::Kept(path))
        } else {
            Ok(TestDir::Temp(temp_dir))
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            TestDir::Temp(t) => t.path(),
            TestDir::Kept(p) => p.as_path(),
        }
    }
}

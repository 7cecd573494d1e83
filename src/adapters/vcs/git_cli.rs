//! `git` command-line VCS adapter.
//!
//! Every git invocation is bounded by the configured timeout and killed if
//! it overruns, so a hung remote fails the proposal instead of stalling it.
//! Commits are assembled in a private index on the proposal branch; the
//! user's checkout, HEAD and index are never modified.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::github::GitHubPullRequestClient;
use crate::domain::models::VcsConfig;
use crate::domain::ports::{ChangeRequestRef, VcsAdapter, VcsError};

pub struct GitCliAdapter {
    repo_root: PathBuf,
    remote: String,
    base_branch: String,
    timeout: Duration,
    pull_requests: GitHubPullRequestClient,
}

impl GitCliAdapter {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        remote: impl Into<String>,
        base_branch: impl Into<String>,
        timeout: Duration,
        pull_requests: GitHubPullRequestClient,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            remote: remote.into(),
            base_branch: base_branch.into(),
            timeout,
            pull_requests,
        }
    }

    pub fn from_config(config: &VcsConfig) -> Result<Self, VcsError> {
        let timeout = Duration::from_secs(config.command_timeout_seconds);
        let pull_requests = GitHubPullRequestClient::from_config(&config.github, timeout)?;
        Ok(Self::new(
            &config.repo_root,
            &config.remote,
            &config.base_branch,
            timeout,
            pull_requests,
        ))
    }

    /// Run `git <args>` in the repository and return trimmed stdout.
    async fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        self.git_with_index(args, None).await
    }

    /// Like [`Self::git`], optionally against a private index file so the
    /// shared index and working tree stay untouched.
    async fn git_with_index(&self, args: &[&str], index: Option<&Path>) -> Result<String, VcsError> {
        let command = format!("git {}", args.join(" "));
        debug!(%command, "running git");

        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(index) = index {
            cmd.env("GIT_INDEX_FILE", index);
        }
        let child = cmd
            .spawn()
            .map_err(|source| VcsError::Spawn { command: command.clone(), source })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VcsError::Timeout { command: command.clone(), seconds: self.timeout.as_secs() })?
            .map_err(|source| VcsError::Spawn { command: command.clone(), source })?;

        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Build the commit in `index`, seeded from the branch tip.
    async fn commit_in_index(
        &self,
        index: &Path,
        branch: &str,
        files: &[String],
        message: &str,
    ) -> Result<(), VcsError> {
        let index = Some(index);
        self.git_with_index(&["read-tree", branch], index).await?;

        let mut present = Vec::new();
        let mut removed = Vec::new();
        for file in files {
            if tokio::fs::try_exists(self.repo_root.join(file)).await.unwrap_or(false) {
                present.push(file.as_str());
            } else {
                removed.push(file.as_str());
            }
        }
        if !present.is_empty() {
            let mut add = vec!["add", "-A", "--"];
            add.extend(present);
            self.git_with_index(&add, index).await?;
        }
        if !removed.is_empty() {
            let mut rm = vec!["rm", "--cached", "--ignore-unmatch", "-q", "--"];
            rm.extend(removed);
            self.git_with_index(&rm, index).await?;
        }

        let tree = self.git_with_index(&["write-tree"], index).await?;
        let parent_tree = self.git(&["rev-parse", &format!("{branch}^{{tree}}")]).await?;
        if tree == parent_tree {
            debug!(branch, "no changes relative to branch tip; nothing to commit");
            return Ok(());
        }

        let commit = self.git(&["commit-tree", &tree, "-p", branch, "-m", message]).await?;
        self.git(&["update-ref", &format!("refs/heads/{branch}"), &commit]).await?;
        debug!(branch, %commit, "committed");
        Ok(())
    }
}

#[async_trait]
impl VcsAdapter for GitCliAdapter {
    /// Point `name` at the base branch, discarding whatever an earlier
    /// attempt committed there. HEAD is not moved.
    #[instrument(skip(self))]
    async fn create_branch(&self, name: &str) -> Result<(), VcsError> {
        self.git(&["branch", "-f", name, &self.base_branch]).await.map(|_| ())
    }

    #[instrument(skip(self, files, message), fields(file_count = files.len()))]
    async fn commit(&self, branch: &str, files: &[String], message: &str) -> Result<(), VcsError> {
        let git_dir = self.git(&["rev-parse", "--absolute-git-dir"]).await?;
        let index = PathBuf::from(git_dir).join(format!("changeward-index-{}", branch.replace('/', "-")));

        let result = self.commit_in_index(&index, branch, files, message).await;
        if let Err(e) = tokio::fs::remove_file(&index).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(index = %index.display(), error = %e, "could not remove temporary index");
            }
        }
        result
    }

    /// Proposal branches belong to this adapter, so a retry overwrites
    /// whatever an earlier attempt pushed.
    #[instrument(skip(self))]
    async fn push(&self, branch: &str) -> Result<(), VcsError> {
        self.git(&["push", "--force", &self.remote, branch]).await.map(|_| ())
    }

    #[instrument(skip(self, title, description))]
    async fn open_change_request(
        &self,
        branch: &str,
        title: &str,
        description: &str,
    ) -> Result<ChangeRequestRef, VcsError> {
        self.pull_requests
            .create_pull_request(branch, &self.base_branch, title, description)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_in(dir: &Path, timeout: Duration) -> GitCliAdapter {
        let client = GitHubPullRequestClient::new("http://127.0.0.1:9", "o", "r", "t", timeout).unwrap();
        GitCliAdapter::new(dir, "origin", "main", timeout, client)
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn git_ok(dir: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// A repository on `main` with one commit, plus a bare remote.
    fn init_repo() -> (tempfile::TempDir, tempfile::TempDir) {
        let repo = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        git_ok(remote.path(), &["init", "--bare", "-q"]);

        let dir = repo.path();
        git_ok(dir, &["init", "-q"]);
        git_ok(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git_ok(dir, &["config", "user.name", "Changeward Test"]);
        git_ok(dir, &["config", "user.email", "test@example.com"]);
        git_ok(dir, &["config", "commit.gpgsign", "false"]);
        std::fs::write(dir.join("README.md"), "readme\n").unwrap();
        git_ok(dir, &["add", "README.md"]);
        git_ok(dir, &["commit", "-q", "-m", "initial"]);
        (repo, remote)
    }

    fn write(dir: &Path, path: &str, content: &str) {
        let full = dir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    #[tokio::test]
    async fn test_git_failure_reports_command_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter_in(dir.path(), Duration::from_secs(30));

        // Not a repository, so any branch operation fails.
        match adapter.create_branch("changeward/session-x").await {
            Err(VcsError::CommandFailed { command, stderr, .. }) => {
                assert!(command.starts_with("git branch"));
                assert!(!stderr.is_empty());
            }
            // git may be absent on minimal build hosts.
            Err(VcsError::Spawn { .. }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_after_failed_push_succeeds() {
        if !git_available() {
            return;
        }
        let (repo, remote) = init_repo();
        let dir = repo.path();
        let missing_remote = dir.join("no-such-remote.git");
        git_ok(dir, &["remote", "add", "origin", missing_remote.to_str().unwrap()]);
        write(dir, "src/a.rs", "pub fn a() {}\n");

        let adapter = adapter_in(dir, Duration::from_secs(30));
        let branch = "changeward/session-1";
        let files = vec!["src/a.rs".to_string()];

        adapter.create_branch(branch).await.unwrap();
        adapter.commit(branch, &files, "first attempt").await.unwrap();
        assert!(adapter.push(branch).await.is_err());

        git_ok(dir, &["remote", "set-url", "origin", remote.path().to_str().unwrap()]);
        adapter.create_branch(branch).await.unwrap();
        adapter.commit(branch, &files, "second attempt").await.unwrap();
        adapter.push(branch).await.unwrap();

        assert_eq!(git_ok(dir, &["rev-list", "--count", &format!("main..{branch}")]), "1");
        let pushed = git_ok(remote.path(), &["ls-tree", "-r", "--name-only", branch]);
        assert!(pushed.lines().any(|l| l == "src/a.rs"));
        assert_eq!(git_ok(dir, &["log", "-1", "--format=%s", branch]), "second attempt");
    }

    #[tokio::test]
    async fn test_each_session_branches_from_base() {
        if !git_available() {
            return;
        }
        let (repo, _remote) = init_repo();
        let dir = repo.path();
        let adapter = adapter_in(dir, Duration::from_secs(30));

        write(dir, "src/a.rs", "pub fn a() {}\n");
        adapter.create_branch("changeward/session-1").await.unwrap();
        adapter
            .commit("changeward/session-1", &["src/a.rs".to_string()], "session 1")
            .await
            .unwrap();

        write(dir, "src/b.rs", "pub fn b() {}\n");
        adapter.create_branch("changeward/session-2").await.unwrap();
        adapter
            .commit("changeward/session-2", &["src/b.rs".to_string()], "session 2")
            .await
            .unwrap();

        assert_eq!(git_ok(dir, &["diff", "--name-only", "main", "changeward/session-1"]), "src/a.rs");
        assert_eq!(git_ok(dir, &["diff", "--name-only", "main", "changeward/session-2"]), "src/b.rs");

        // The checkout and shared index are left as they were.
        assert_eq!(git_ok(dir, &["symbolic-ref", "--short", "HEAD"]), "main");
        assert_eq!(git_ok(dir, &["diff", "--cached", "--name-only"]), "");
        assert!(git_ok(dir, &["status", "--porcelain"]).contains("?? src/"));
    }

    #[tokio::test]
    async fn test_missing_file_is_committed_as_deletion() {
        if !git_available() {
            return;
        }
        let (repo, _remote) = init_repo();
        let dir = repo.path();
        let adapter = adapter_in(dir, Duration::from_secs(30));

        std::fs::remove_file(dir.join("README.md")).unwrap();
        adapter.create_branch("changeward/session-3").await.unwrap();
        adapter
            .commit("changeward/session-3", &["README.md".to_string()], "drop readme")
            .await
            .unwrap();

        assert_eq!(git_ok(dir, &["ls-tree", "--name-only", "changeward/session-3"]), "");
        assert_eq!(git_ok(dir, &["ls-tree", "--name-only", "main"]), "README.md");
    }

    #[tokio::test]
    async fn test_commit_without_changes_keeps_branch_at_base() {
        if !git_available() {
            return;
        }
        let (repo, _remote) = init_repo();
        let dir = repo.path();
        let adapter = adapter_in(dir, Duration::from_secs(30));

        adapter.create_branch("changeward/session-4").await.unwrap();
        adapter
            .commit("changeward/session-4", &["README.md".to_string()], "no-op")
            .await
            .unwrap();

        assert_eq!(
            git_ok(dir, &["rev-parse", "changeward/session-4"]),
            git_ok(dir, &["rev-parse", "main"])
        );
    }
}

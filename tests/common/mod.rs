pub mod mock_commands;

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A `git` command isolated from the user's and system git configuration.
pub fn git_command(dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(dir)
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_CONFIG_SYSTEM", "/dev/null")
        .env("GIT_AUTHOR_NAME", "Test User")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test User")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .env("GIT_AUTHOR_DATE", "2025-01-01T00:00:00Z")
        .env("GIT_COMMITTER_DATE", "2025-01-01T00:00:00Z")
        .env("LC_ALL", "C")
        .env("LANG", "C");
    cmd
}

pub struct TestRepo {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl TestRepo {
    /// Create a new repository with an initial commit on `main`
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("repo");
        std::fs::create_dir(&root).expect("Failed to create repo directory");
        // Canonicalize to resolve symlinks (important on macOS where /var is symlink to /private/var)
        let root = root
            .canonicalize()
            .expect("Failed to canonicalize temp path");

        let repo = Self {
            _temp_dir: temp_dir,
            root,
        };
        repo.git(&["init", "-b", "main"]);
        repo.commit("initial");
        repo
    }

    /// Clone `upstream` into a fresh temp directory
    pub fn clone_of(upstream: &TestRepo) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("clone");
        let output = git_command(temp_dir.path())
            .arg("clone")
            .arg(upstream.root_path())
            .arg(&root)
            .output()
            .expect("Failed to execute git clone");
        assert!(
            output.status.success(),
            "git clone failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        let root = root
            .canonicalize()
            .expect("Failed to canonicalize clone path");
        Self {
            _temp_dir: temp_dir,
            root,
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Run git in the repository, panicking on failure, and return trimmed stdout
    pub fn git(&self, args: &[&str]) -> String {
        let output = git_command(&self.root)
            .args(args)
            .output()
            .unwrap_or_else(|e| panic!("Failed to execute git {args:?}: {e}"));
        if !output.status.success() {
            panic!(
                "git {:?} failed:\nstdout: {}\nstderr: {}",
                args,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Create a commit on the current branch and return its hash
    pub fn commit(&self, message: &str) -> String {
        self.git(&["commit", "--allow-empty", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }

    /// Create a commit on `branch`, creating the branch from HEAD if needed
    pub fn commit_on(&self, branch: &str, message: &str) -> String {
        let exists = git_command(&self.root)
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .output()
            .expect("Failed to execute git rev-parse")
            .status
            .success();
        if exists {
            self.git(&["checkout", "-q", branch]);
        } else {
            self.git(&["checkout", "-q", "-b", branch]);
        }
        let hash = self.commit(message);
        self.git(&["checkout", "-q", "main"]);
        hash
    }

    /// Whether `hash` names a commit in this repository
    pub fn has_commit(&self, hash: &str) -> bool {
        git_command(&self.root)
            .args(["cat-file", "-e", &format!("{hash}^{{commit}}")])
            .output()
            .expect("Failed to execute git cat-file")
            .status
            .success()
    }
}

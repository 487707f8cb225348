use std::path::{Path, PathBuf};
use std::process::Output;

use super::error::FetchError;
use super::url::CloneUrl;
use crate::shell_exec::Cmd;
use crate::sync::Cancellation;

/// A local clone that checkout steps operate on.
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
}

impl Repository {
    /// Create a repository context at the specified path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `hash` names a commit present in the local object store.
    pub fn commit_exists(&self, hash: &str, cancel: &Cancellation) -> Result<bool, FetchError> {
        let spec = format!("{hash}^{{commit}}");
        let output = self.git(&["rev-parse", "--verify", "--quiet", &spec], cancel)?;
        if output.status.success() {
            return Ok(true);
        }
        // --quiet keeps stderr empty for a missing object; anything else is a real failure
        if output.stderr.iter().all(u8::is_ascii_whitespace) {
            return Ok(false);
        }
        Err(git_failure(&format!("git rev-parse --verify {spec}"), &output))
    }

    /// Fetch `ref_specs` from `url` in a single `git fetch`.
    pub fn fetch(
        &self,
        url: &str,
        ref_specs: &[String],
        cancel: &Cancellation,
    ) -> Result<(), FetchError> {
        let mut cmd = self.cmd().arg("fetch");
        cmd = if CloneUrl::parse(url).is_some_and(|u| u.userinfo().is_some() && u.is_http()) {
            cmd.secret_arg(url)
        } else {
            cmd.arg(url)
        };
        let output = cmd.args(ref_specs.iter().cloned()).run_cancellable(cancel)?;
        if !output.status.success() {
            return Err(git_failure("git fetch", &output));
        }
        Ok(())
    }

    fn cmd(&self) -> Cmd {
        Cmd::new("git")
            .current_dir(&self.path)
            .context(self.path.display().to_string())
            // Never block on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
    }

    fn git(&self, args: &[&str], cancel: &Cancellation) -> Result<Output, FetchError> {
        Ok(self
            .cmd()
            .args(args.iter().copied())
            .run_cancellable(cancel)?)
    }
}

fn git_failure(command: &str, output: &Output) -> FetchError {
    FetchError::Git {
        command: command.to_string(),
        exit_code: output.status.code(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

//! Error types for remote resolution and fallback fetching.
//!
//! Both enums are matched on by callers (the CLI maps `Interrupted` to a
//! distinct exit code), so they stay small and exhaustive.

use super::links::RepositoryProtocol;

/// Which set of clone links was searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LinkSet {
    Primary,
    Mirror,
}

/// Failure to turn a head into a checkout plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No advertised clone link matches the configured protocol.
    NoMatchingLink {
        protocol: RepositoryProtocol,
        link_set: LinkSet,
        available: Vec<String>,
    },
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NoMatchingLink {
                protocol,
                link_set,
                available,
            } => {
                let available = if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                };
                write!(
                    f,
                    "no {protocol} clone link in {link_set} clone links (available: {available})"
                )
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Failure while fetching missing commits.
#[derive(Debug)]
pub enum FetchError {
    /// The operation was cancelled; any running git process was killed.
    Interrupted,
    /// git ran but exited unsuccessfully.
    Git {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// git could not be started.
    Io(std::io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Interrupted => write!(f, "fetch interrupted"),
            FetchError::Git {
                command,
                exit_code,
                stderr,
            } => {
                match exit_code {
                    Some(code) => write!(f, "`{command}` failed with exit code {code}")?,
                    None => write!(f, "`{command}` was terminated by a signal")?,
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            FetchError::Io(e) => write!(f, "failed to run git: {e}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::Interrupted {
            FetchError::Interrupted
        } else {
            FetchError::Io(e)
        }
    }
}

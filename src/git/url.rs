//! Clone URL parsing.
//!
//! Provider clone links are absolute URLs (`https://host/scm/proj/repo.git`,
//! `ssh://git@host:7999/proj/repo.git`). This module splits them into parts
//! so credentials can be spliced into the userinfo, and synthesizes the
//! repository URLs used for cloud-hosted forks.

use super::links::RepositoryProtocol;

/// Parsed clone URL.
///
/// # Supported URL formats
///
/// - `https://[user[:pass]@]<host>[:port]/<path>`
/// - `http://[user[:pass]@]<host>[:port]/<path>`
/// - `ssh://[user@]<host>[:port]/<path>`
/// - `git@<host>:<path>` (scp-like, reported with scheme `ssh`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneUrl {
    scheme: String,
    userinfo: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    scp_like: bool,
}

impl CloneUrl {
    /// Parse a clone URL into structured components.
    ///
    /// Returns `None` for malformed URLs or unsupported schemes.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();

        if let Some((scheme, rest)) = url.split_once("://") {
            let scheme = scheme.to_ascii_lowercase();
            if !matches!(scheme.as_str(), "http" | "https" | "ssh" | "git") {
                return None;
            }
            let (authority, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            };
            let (userinfo, hostport) = match authority.rsplit_once('@') {
                Some((user, hostport)) => (Some(user.to_string()), hostport),
                None => (None, authority),
            };
            let (host, port) = match hostport.rsplit_once(':') {
                Some((host, port)) => (host, Some(port.parse().ok()?)),
                None => (hostport, None),
            };
            if host.is_empty() {
                return None;
            }
            return Some(Self {
                scheme,
                userinfo,
                host: host.to_string(),
                port,
                path: path.to_string(),
                scp_like: false,
            });
        }

        // git@host:owner/repo.git
        let (user, rest) = url.split_once('@')?;
        let (host, path) = rest.split_once(':')?;
        if user.is_empty() || host.is_empty() || path.is_empty() || host.contains('/') {
            return None;
        }
        Some(Self {
            scheme: "ssh".to_string(),
            userinfo: Some(user.to_string()),
            host: host.to_string(),
            port: None,
            path: format!("/{}", path.trim_start_matches('/')),
            scp_like: true,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn userinfo(&self) -> Option<&str> {
        self.userinfo.as_deref()
    }

    /// The host without port (e.g., "bitbucket.example.com").
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path including the leading slash (e.g., "/scm/proj/repo.git").
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_http(&self) -> bool {
        matches!(self.scheme.as_str(), "http" | "https")
    }

    /// Return a copy with the userinfo replaced.
    pub fn with_userinfo(&self, userinfo: impl Into<String>) -> Self {
        Self {
            userinfo: Some(userinfo.into()),
            ..self.clone()
        }
    }

    /// Origin in `scheme://host[:port]` form, lowercased, for endpoint comparison.
    pub fn origin(&self) -> String {
        match self.port {
            Some(port) => format!(
                "{}://{}:{}",
                self.scheme,
                self.host.to_ascii_lowercase(),
                port
            ),
            None => format!("{}://{}", self.scheme, self.host.to_ascii_lowercase()),
        }
    }
}

impl std::fmt::Display for CloneUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.scp_like {
            let user = self.userinfo.as_deref().unwrap_or("git");
            return write!(
                f,
                "{}@{}:{}",
                user,
                self.host,
                self.path.trim_start_matches('/')
            );
        }
        write!(f, "{}://", self.scheme)?;
        if let Some(userinfo) = &self.userinfo {
            write!(f, "{}@", userinfo)?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "{}", self.path)
    }
}

/// Construct the clone URL of a cloud-hosted repository for a transport.
///
/// Cloud repositories live at a fixed path scheme, so fork URLs are built
/// directly instead of being looked up through clone links.
pub fn cloud_repository_url(
    host: &str,
    owner: &str,
    repository: &str,
    protocol: RepositoryProtocol,
) -> String {
    match protocol {
        RepositoryProtocol::Http => format!("https://{}/{}/{}.git", host, owner, repository),
        RepositoryProtocol::Ssh => format!("ssh://git@{}/{}/{}.git", host, owner, repository),
    }
}

/// Normalize a server URL for comparison: trims whitespace and trailing
/// slashes and lowercases scheme and host. Unparseable input is only trimmed.
pub fn normalize_server_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    match CloneUrl::parse(trimmed) {
        Some(parsed) => {
            let path = parsed.path().trim_end_matches('/');
            format!("{}{}", parsed.origin(), path)
        }
        None => trimmed.to_string(),
    }
}

//! Credentials applied to clone links and API requests.

use crate::git::{CloneLink, CloneUrl};
use crate::shell_exec::Cmd;

/// Applies one resolved credential to git transports and API calls.
pub trait Authenticator: Send + Sync {
    /// Embed credentials into a clone link for the git transport. Links the
    /// credential cannot be used with are returned unchanged.
    fn rewrite_link(&self, link: CloneLink) -> CloneLink {
        link
    }

    /// Add credentials to an API request.
    fn configure_request(&self, cmd: Cmd) -> Cmd;
}

/// curl reads the header from stdin (`-H @-`) so the token stays out of argv.
fn bearer_header(cmd: Cmd, token: &str) -> Cmd {
    cmd.args(["-H", "@-"])
        .stdin(format!("Authorization: Bearer {token}\n"))
}

/// OAuth-style access token: usable both as an HTTP clone credential and as
/// an API bearer token.
pub struct TokenAuthenticator {
    token: String,
}

impl TokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("token", &"***")
            .finish()
    }
}

impl Authenticator for TokenAuthenticator {
    fn rewrite_link(&self, link: CloneLink) -> CloneLink {
        // ssh links authenticate with keys
        if !link.name.starts_with("http") {
            return link;
        }
        match CloneUrl::parse(&link.href) {
            Some(url) if url.is_http() => {
                // Tokens may contain `/`, `+` and `=`
                let password = urlencoding::encode(&format!("{{{}}}", self.token)).into_owned();
                CloneLink {
                    href: url
                        .with_userinfo(format!("x-token-auth:{password}"))
                        .to_string(),
                    ..link
                }
            }
            _ => link,
        }
    }

    fn configure_request(&self, cmd: Cmd) -> Cmd {
        bearer_header(cmd, &self.token)
    }
}

/// API-only bearer token; clone links are left to the git credential setup.
pub struct BearerAuthenticator {
    token: String,
}

impl BearerAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for BearerAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthenticator")
            .field("token", &"***")
            .finish()
    }
}

impl Authenticator for BearerAuthenticator {
    fn configure_request(&self, cmd: Cmd) -> Cmd {
        bearer_header(cmd, &self.token)
    }
}

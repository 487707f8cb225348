//! Self-hosted provider REST client.
//!
//! Requests go through `curl` (via [`Cmd`]) so they share the command
//! semaphore, the trace log and cancellation with git invocations. The HTTP
//! status is appended to the body with `-w` and split off again here.

use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{
    Authenticator, ClientFactory, GitRef, MirrorServer, MirroredRepository, ProviderClient,
    ProviderError, PullRequest, RepositoryInfo,
};
use crate::shell_exec::Cmd;
use crate::sync::Cancellation;

/// Page size requested from paged endpoints.
const PAGE_LIMIT: u32 = 100;

/// Marker line separating the body from the status code written by `-w`.
const STATUS_WRITE_OUT: &str = "\n%{http_code}";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    values: Vec<T>,
    #[serde(default = "default_last_page")]
    is_last_page: bool,
    #[serde(default)]
    next_page_start: Option<u64>,
}

fn default_last_page() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Href {
    href: String,
}

#[derive(Debug, Default, Deserialize)]
struct DescriptorLinks {
    #[serde(rename = "self", default)]
    self_links: Vec<Href>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MirrorDescriptor {
    mirror_server: MirrorServer,
    #[serde(default)]
    links: DescriptorLinks,
}

/// Split curl output into body and the trailing status code.
fn split_status(stdout: &str) -> (&str, Option<u16>) {
    match stdout.trim_end().rsplit_once('\n') {
        Some((body, status)) => (body, status.trim().parse().ok()),
        None => ("", stdout.trim().parse().ok()),
    }
}

/// Append paging parameters to `path`, which may already carry a query.
fn page_url(path: &str, start: u64) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{path}{sep}start={start}&limit={PAGE_LIMIT}")
}

/// REST client for one repository on a self-hosted server.
pub struct ServerApiClient {
    server_url: String,
    owner: String,
    repository: String,
    authenticator: Option<Arc<dyn Authenticator>>,
    curl: String,
}

impl ServerApiClient {
    pub fn new(
        server_url: impl Into<String>,
        owner: impl Into<String>,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            owner: owner.into(),
            repository: repository.into(),
            authenticator: None,
            curl: "curl".to_string(),
        }
    }

    pub fn authenticator(mut self, authenticator: Option<Arc<dyn Authenticator>>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Program used for HTTP requests (default `curl`).
    pub fn curl_program(mut self, program: impl Into<String>) -> Self {
        self.curl = program.into();
        self
    }

    fn repo_path(&self) -> String {
        format!(
            "/rest/api/1.0/projects/{}/repos/{}",
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.repository)
        )
    }

    /// GET an absolute URL, returning the body of a 2xx response.
    fn get(&self, url: &str, cancel: &Cancellation) -> Result<String, ProviderError> {
        let mut cmd = Cmd::new(&self.curl)
            .args(["-sS", "-L", "-H", "Accept: application/json", "-w", STATUS_WRITE_OUT])
            .context(format!("{}/{}", self.owner, self.repository));
        if let Some(auth) = &self.authenticator {
            cmd = auth.configure_request(cmd);
        }
        let output = cmd.arg(url).run_cancellable(cancel)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Io(format!(
                "request to {url} failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match split_status(&stdout) {
            (body, Some(200..=299)) => Ok(body.to_string()),
            (_, Some(404)) => Err(ProviderError::NotFound(url.to_string())),
            (_, Some(status)) => Err(ProviderError::Io(format!("HTTP {status} from {url}"))),
            (_, None) => Err(ProviderError::Io(format!("no HTTP status from {url}"))),
        }
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        cancel: &Cancellation,
    ) -> Result<T, ProviderError> {
        let body = self.get(url, cancel)?;
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Other(format!("unexpected response from {url}: {e}")))
    }

    /// Follow a paged endpoint to the end and concatenate its values.
    fn get_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<T>, ProviderError> {
        let mut values = Vec::new();
        let mut start = 0;
        loop {
            let url = format!("{}{}", self.server_url, page_url(path, start));
            let page: Page<T> = self.get_json(&url, cancel)?;
            values.extend(page.values);
            match page.next_page_start {
                Some(next) if !page.is_last_page && next > start => start = next,
                _ => break,
            }
        }
        Ok(values)
    }

    fn open_pull_requests(
        &self,
        ref_id: &str,
        direction: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<PullRequest>, ProviderError> {
        let path = format!(
            "{}/pull-requests?state=OPEN&direction={direction}&at={}",
            self.repo_path(),
            urlencoding::encode(ref_id)
        );
        self.get_paged(&path, cancel)
    }
}

impl ProviderClient for ServerApiClient {
    fn branches(&self, cancel: &Cancellation) -> Result<Vec<GitRef>, ProviderError> {
        self.get_paged(&format!("{}/branches", self.repo_path()), cancel)
    }

    fn tags(&self, cancel: &Cancellation) -> Result<Vec<GitRef>, ProviderError> {
        self.get_paged(&format!("{}/tags", self.repo_path()), cancel)
    }

    fn repository(&self, cancel: &Cancellation) -> Result<RepositoryInfo, ProviderError> {
        self.get_json(&format!("{}{}", self.server_url, self.repo_path()), cancel)
    }

    fn outgoing_open_pull_requests(
        &self,
        ref_id: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<PullRequest>, ProviderError> {
        self.open_pull_requests(ref_id, "OUTGOING", cancel)
    }

    fn incoming_open_pull_requests(
        &self,
        ref_id: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<PullRequest>, ProviderError> {
        self.open_pull_requests(ref_id, "INCOMING", cancel)
    }

    fn pull_request(&self, id: &str, cancel: &Cancellation) -> Result<PullRequest, ProviderError> {
        let url = format!(
            "{}{}/pull-requests/{}",
            self.server_url,
            self.repo_path(),
            urlencoding::encode(id)
        );
        self.get_json(&url, cancel)
    }

    fn mirrors(&self, cancel: &Cancellation) -> Result<Vec<MirrorServer>, ProviderError> {
        self.get_paged("/rest/mirroring/1.0/mirrorServers", cancel)
    }

    fn mirrored_repository(
        &self,
        mirror_id: &str,
        cancel: &Cancellation,
    ) -> Result<MirroredRepository, ProviderError> {
        let repo_id = self.repository(cancel)?.id.ok_or_else(|| {
            ProviderError::Other(format!(
                "repository {}/{} has no id",
                self.owner, self.repository
            ))
        })?;
        let descriptors: Vec<MirrorDescriptor> =
            self.get_paged(&format!("/rest/mirroring/1.0/repos/{repo_id}/mirrors"), cancel)?;
        let descriptor = descriptors
            .into_iter()
            .find(|d| d.mirror_server.id == mirror_id)
            .ok_or_else(|| {
                ProviderError::NotFound(format!(
                    "mirror {mirror_id} of {}/{}",
                    self.owner, self.repository
                ))
            })?;
        let self_url = descriptor
            .links
            .self_links
            .into_iter()
            .next()
            .map(|h| h.href)
            .ok_or_else(|| {
                ProviderError::Other(format!("mirror {mirror_id} advertises no repository link"))
            })?;

        let mirrored: MirroredRepository = self.get_json(&self_url, cancel)?;
        if !mirrored.available {
            return Err(ProviderError::Other(format!(
                "repository {}/{} is not available on mirror {} ({})",
                self.owner, self.repository, descriptor.mirror_server.name, mirror_id
            )));
        }
        Ok(mirrored)
    }
}

/// Builds [`ServerApiClient`]s for any repository on one server.
pub struct ServerClientFactory {
    server_url: String,
    authenticator: Option<Arc<dyn Authenticator>>,
    curl: String,
}

impl ServerClientFactory {
    pub fn new(server_url: impl Into<String>, authenticator: Option<Arc<dyn Authenticator>>) -> Self {
        Self {
            server_url: server_url.into(),
            authenticator,
            curl: "curl".to_string(),
        }
    }

    pub fn curl_program(mut self, program: impl Into<String>) -> Self {
        self.curl = program.into();
        self
    }
}

impl ClientFactory for ServerClientFactory {
    fn client(&self, owner: &str, repository: &str) -> Arc<dyn ProviderClient> {
        Arc::new(
            ServerApiClient::new(&self.server_url, owner, repository)
                .authenticator(self.authenticator.clone())
                .curl_program(&self.curl),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::ok("{\"a\":1}\n200", "{\"a\":1}", Some(200))]
    #[case::multiline_body("{\n\"a\":1\n}\n201\n", "{\n\"a\":1\n}", Some(201))]
    #[case::empty_body("\n404", "", Some(404))]
    #[case::status_only("500", "", Some(500))]
    #[case::garbage("<html>\nnope", "<html>", None)]
    fn test_split_status(
        #[case] stdout: &str,
        #[case] body: &str,
        #[case] status: Option<u16>,
    ) {
        assert_eq!(split_status(stdout), (body, status));
    }

    #[test]
    fn test_page_url() {
        assert_eq!(
            page_url("/rest/api/1.0/projects/P/repos/r/branches", 0),
            "/rest/api/1.0/projects/P/repos/r/branches?start=0&limit=100"
        );
        assert_eq!(
            page_url("/x/pull-requests?state=OPEN", 25),
            "/x/pull-requests?state=OPEN&start=25&limit=100"
        );
    }

    #[test]
    fn test_repo_path_is_encoded() {
        let client = ServerApiClient::new("https://host/", "~jdoe", "my repo");
        assert_eq!(
            client.repo_path(),
            "/rest/api/1.0/projects/~jdoe/repos/my%20repo"
        );
        assert_eq!(client.server_url, "https://host");
    }

    #[test]
    fn test_page_of_non_default_values() {
        let page: Page<MirrorServer> = serde_json::from_str(
            r#"{"values": [{"id": "m-1", "name": "EU"}], "isLastPage": false, "nextPageStart": 1}"#,
        )
        .unwrap();
        assert_eq!(page.values.len(), 1);
        assert_eq!(page.values[0].id, "m-1");
        assert_eq!(page.next_page_start, Some(1));
    }

    #[test]
    fn test_page_defaults_to_last_page() {
        let page: Page<u32> = serde_json::from_str(r#"{"values": [1, 2]}"#).unwrap();
        assert_eq!(page.values, vec![1, 2]);
        assert!(page.is_last_page);
        assert_eq!(page.next_page_start, None);
    }
}

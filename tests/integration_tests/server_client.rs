use std::sync::Arc;

use crate::common::mock_commands::{Route, logged, mock_curl, requests};
use headsync::provider::server::ServerApiClient;
use headsync::provider::{ProviderClient, ProviderError, TokenAuthenticator};
use headsync::sync::Cancellation;
use tempfile::TempDir;

const SERVER: &str = "https://bitbucket.example.com/";

const REPOSITORY: &str = r#"{
    "id": 42,
    "slug": "repo",
    "name": "Repo",
    "project": {"key": "PROJ"},
    "links": {"clone": [
        {"name": "http", "href": "https://bitbucket.example.com/scm/proj/repo.git"},
        {"name": "ssh", "href": "ssh://git@bitbucket.example.com:7999/proj/repo.git"}
    ]}
}"#;

fn client(bin: &TempDir, routes: &[Route<'_>]) -> ServerApiClient {
    let curl = mock_curl(bin.path(), routes);
    ServerApiClient::new(SERVER, "PROJ", "repo").curl_program(curl.to_str().unwrap())
}

#[test]
fn test_paged_branches_concatenated() {
    let bin = TempDir::new().unwrap();
    let client = client(
        &bin,
        &[
            Route::ok(
                "*/repos/repo/branches?start=0*",
                r#"{"values": [{"id": "refs/heads/main", "displayId": "main", "latestCommit": "a1"}],
                    "isLastPage": false, "nextPageStart": 1}"#,
            ),
            Route::ok(
                "*/repos/repo/branches?start=1*",
                r#"{"values": [{"id": "refs/heads/dev", "displayId": "dev", "latestCommit": "b2"}],
                    "isLastPage": true}"#,
            ),
        ],
    );

    let branches = client.branches(&Cancellation::new()).unwrap();
    let names: Vec<_> = branches.iter().map(|b| b.display_id.as_str()).collect();
    assert_eq!(names, vec!["main", "dev"]);
    assert_eq!(
        requests(bin.path()),
        vec![
            "https://bitbucket.example.com/rest/api/1.0/projects/PROJ/repos/repo/branches?start=0&limit=100",
            "https://bitbucket.example.com/rest/api/1.0/projects/PROJ/repos/repo/branches?start=1&limit=100",
        ]
    );
}

#[test]
fn test_repository_links() {
    let bin = TempDir::new().unwrap();
    let client = client(&bin, &[Route::ok("*/repos/repo", REPOSITORY)]);
    let repository = client.repository(&Cancellation::new()).unwrap();
    assert_eq!(repository.id, Some(42));
    assert_eq!(repository.owner(), "PROJ");
    let names: Vec<_> = repository.links.clone.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["http", "ssh"]);
}

#[test]
fn test_token_sent_on_stdin_not_argv() {
    let bin = TempDir::new().unwrap();
    let client = client(&bin, &[Route::ok("*/repos/repo", REPOSITORY)])
        .authenticator(Some(Arc::new(TokenAuthenticator::new("ab/cd+ef="))));
    client.repository(&Cancellation::new()).unwrap();

    let args = logged(bin.path(), "args.log");
    assert!(args.contains("-H @-"), "{args}");
    assert!(!args.contains("ab/cd+ef="), "{args}");
    assert_eq!(
        logged(bin.path(), "stdin.log"),
        "Authorization: Bearer ab/cd+ef=\n"
    );
}

#[test]
fn test_missing_repository_is_not_found() {
    let bin = TempDir::new().unwrap();
    let client = client(&bin, &[]);
    let err = client
        .outgoing_open_pull_requests("refs/heads/main", &Cancellation::new())
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)), "{err:?}");
    assert_eq!(
        requests(bin.path()),
        vec![
            "https://bitbucket.example.com/rest/api/1.0/projects/PROJ/repos/repo/pull-requests?state=OPEN&direction=OUTGOING&at=refs%2Fheads%2Fmain&start=0&limit=100"
        ]
    );
}

#[test]
fn test_server_error_is_io() {
    let bin = TempDir::new().unwrap();
    let client = client(
        &bin,
        &[Route {
            pattern: "*/pull-requests/7",
            status: 500,
            body: "{}",
        }],
    );
    let err = client.pull_request("7", &Cancellation::new()).unwrap_err();
    assert!(matches!(err, ProviderError::Io(_)), "{err:?}");
}

#[test]
fn test_mirrored_repository_follows_self_link() {
    let bin = TempDir::new().unwrap();
    let client = client(
        &bin,
        &[
            Route::ok("*/repos/repo", REPOSITORY),
            Route::ok(
                "*/rest/mirroring/1.0/repos/42/mirrors*",
                r#"{"values": [
                    {"mirrorServer": {"id": "other", "name": "US"},
                     "links": {"self": [{"href": "https://mirror-us.example.com/rest/mirroring/latest/upstreamServers/1/repos/42"}]}},
                    {"mirrorServer": {"id": "m-eu", "name": "EU"},
                     "links": {"self": [{"href": "https://mirror-eu.example.com/rest/mirroring/latest/upstreamServers/1/repos/42"}]}}
                ], "isLastPage": true}"#,
            ),
            Route::ok(
                "https://mirror-eu.example.com/*",
                r#"{"available": true, "links": {"clone": [
                    {"name": "http", "href": "https://mirror-eu.example.com/scm/proj/repo.git"}
                ]}}"#,
            ),
        ],
    );
    let mirrored = client
        .mirrored_repository("m-eu", &Cancellation::new())
        .unwrap();
    assert_eq!(
        mirrored.links.clone[0].href,
        "https://mirror-eu.example.com/scm/proj/repo.git"
    );

    let err = client
        .mirrored_repository("missing", &Cancellation::new())
        .unwrap_err();
    assert!(matches!(err, ProviderError::NotFound(_)), "{err:?}");
}

#[test]
fn test_unavailable_mirror_is_error() {
    let bin = TempDir::new().unwrap();
    let client = client(
        &bin,
        &[
            Route::ok("*/repos/repo", REPOSITORY),
            Route::ok(
                "*/rest/mirroring/1.0/repos/42/mirrors*",
                r#"{"values": [{"mirrorServer": {"id": "m-eu", "name": "EU"},
                    "links": {"self": [{"href": "https://mirror-eu.example.com/repos/42"}]}}],
                    "isLastPage": true}"#,
            ),
            Route::ok("https://mirror-eu.example.com/*", r#"{"available": false}"#),
        ],
    );
    let err = client
        .mirrored_repository("m-eu", &Cancellation::new())
        .unwrap_err();
    insta::assert_snapshot!(err, @"repository PROJ/repo is not available on mirror EU (m-eu)");
}

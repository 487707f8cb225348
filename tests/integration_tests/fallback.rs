use crate::common::TestRepo;
use headsync::git::{BranchWithHash, FallbackFetcher, FetchError, Repository};
use headsync::sync::Cancellation;

#[test]
fn test_no_fetch_when_commits_present() {
    let upstream = TestRepo::new();
    let feature = upstream.commit_on("feature", "feature work");
    let clone = TestRepo::clone_of(&upstream);
    let main = clone.git(&["rev-parse", "HEAD"]);

    // An unreachable URL proves no fetch is attempted
    let fetcher = FallbackFetcher::new(
        "/nonexistent/upstream.git",
        "primary",
        vec![
            BranchWithHash::new("main", &main),
            BranchWithHash::new("feature", &feature),
        ],
    );
    let fetched = fetcher
        .decorate(&Repository::at(clone.root_path()), &Cancellation::new())
        .unwrap();
    assert!(fetched.is_empty());
}

#[test]
fn test_missing_commits_fetched_in_one_batch() {
    let upstream = TestRepo::new();
    upstream.commit_on("feature", "feature one");
    upstream.commit_on("other", "other one");
    let clone = TestRepo::clone_of(&upstream);

    // Replication lag: the clone has not seen these yet
    let feature = upstream.commit_on("feature", "feature two");
    let other = upstream.commit_on("other", "other two");
    let main = upstream.git(&["rev-parse", "main"]);
    assert!(!clone.has_commit(&feature));

    let url = upstream.root_path().to_str().unwrap();
    let fetcher = FallbackFetcher::new(
        url,
        "primary",
        vec![
            BranchWithHash::new("main", &main),
            BranchWithHash::new("feature", &feature),
            BranchWithHash::new("other", &other),
        ],
    );
    let fetched = fetcher
        .decorate(&Repository::at(clone.root_path()), &Cancellation::new())
        .unwrap();

    assert_eq!(
        fetched,
        vec![
            "+refs/heads/feature:refs/remotes/primary/feature",
            "+refs/heads/other:refs/remotes/primary/other",
        ]
    );
    assert!(clone.has_commit(&feature));
    assert!(clone.has_commit(&other));
    assert_eq!(clone.git(&["rev-parse", "refs/remotes/primary/feature"]), feature);
}

#[test]
fn test_fetch_failure_reports_git_error() {
    let upstream = TestRepo::new();
    let clone = TestRepo::clone_of(&upstream);
    let fetcher = FallbackFetcher::new(
        "/nonexistent/upstream.git",
        "primary",
        vec![BranchWithHash::new(
            "main",
            "1111111111111111111111111111111111111111",
        )],
    );
    let err = fetcher
        .decorate(&Repository::at(clone.root_path()), &Cancellation::new())
        .unwrap_err();
    assert!(matches!(err, FetchError::Git { .. }), "{err:?}");
}

#[test]
fn test_cancelled_before_start() {
    let upstream = TestRepo::new();
    let clone = TestRepo::clone_of(&upstream);
    let cancel = Cancellation::new();
    cancel.cancel();

    let fetcher = FallbackFetcher::new(
        upstream.root_path().to_str().unwrap(),
        "primary",
        vec![BranchWithHash::new("main", "abc")],
    );
    let err = fetcher
        .decorate(&Repository::at(clone.root_path()), &cancel)
        .unwrap_err();
    assert!(matches!(err, FetchError::Interrupted));
}

// Git Data API commit sequence against a mocked GitHub.

use serde_json::json;
use sitesmith_backend::github::{
    commit_files, BlobEncoding, CommitMode, FileChange, GitHubClient, GitHubError, RepoRef,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PARENT: &str = "parent-sha";
const BASE_TREE: &str = "base-tree-sha";
const NEW_TREE: &str = "new-tree-sha";
const NEW_COMMIT: &str = "new-commit-sha";

fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::new(reqwest::Client::new(), Some("ghp_test".into()), server.uri())
}

fn repo() -> RepoRef {
    RepoRef::new("acme", "plumbing-site").on_branch("main")
}

async fn mount_head(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/repos/acme/plumbing-site/git/ref/heads/main"))
        .and(header("authorization", "Bearer ghp_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": { "sha": PARENT } })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/acme/plumbing-site/git/commits/{PARENT}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "sha": PARENT, "tree": { "sha": BASE_TREE } })),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_commit_and_ref(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/repos/acme/plumbing-site/git/commits"))
        .and(body_partial_json(json!({ "tree": NEW_TREE, "parents": [PARENT] })))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "sha": NEW_COMMIT, "tree": { "sha": NEW_TREE } })),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/repos/acme/plumbing-site/git/refs/heads/main"))
        .and(body_partial_json(json!({ "sha": NEW_COMMIT, "force": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "object": { "sha": NEW_COMMIT } })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn inline_commit_builds_on_head_tree() {
    let server = MockServer::start().await;
    mount_head(&server).await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/plumbing-site/git/trees"))
        .and(body_partial_json(json!({
            "base_tree": BASE_TREE,
            "tree": [{ "path": "src/pages/index.astro", "mode": "100644", "type": "blob", "content": "<h1>Acme</h1>" }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": NEW_TREE })))
        .expect(1)
        .mount(&server)
        .await;
    mount_commit_and_ref(&server).await;

    let files = [FileChange::text("src/pages/index.astro", "<h1>Acme</h1>")];
    let outcome = commit_files(&client(&server), &repo(), &files, "Initial site", CommitMode::Inline)
        .await
        .unwrap();

    assert_eq!(outcome.commit_sha, NEW_COMMIT);
    assert_eq!(outcome.tree_sha, NEW_TREE);
    assert_eq!(outcome.parent_sha, PARENT);
    assert_eq!(outcome.branch, "main");
    assert_eq!(outcome.files, 1);
}

#[tokio::test]
async fn blob_mode_uploads_each_file_first() {
    let server = MockServer::start().await;
    mount_head(&server).await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/plumbing-site/git/blobs"))
        .and(body_partial_json(json!({ "encoding": "base64" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "blob-sha" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/plumbing-site/git/trees"))
        .and(body_partial_json(json!({
            "base_tree": BASE_TREE,
            "tree": [{ "path": "public/logo.png", "sha": "blob-sha" }]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": NEW_TREE })))
        .expect(1)
        .mount(&server)
        .await;
    mount_commit_and_ref(&server).await;

    let mut logo = FileChange::text("public/logo.png", "iVBORw0KGgo=");
    logo.encoding = Some(BlobEncoding::Base64);
    let files = [logo];
    let outcome = commit_files(&client(&server), &repo(), &files, "Add logo", CommitMode::for_files(&files))
        .await
        .unwrap();
    assert_eq!(outcome.commit_sha, NEW_COMMIT);
}

#[tokio::test]
async fn tree_failure_never_moves_the_branch() {
    let server = MockServer::start().await;
    mount_head(&server).await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/plumbing-site/git/trees"))
        .respond_with(ResponseTemplate::new(422).set_body_string("tree.path contains a malformed path component"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/plumbing-site/git/commits"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let files = [FileChange::text("index.html", "<p>hi</p>")];
    let err = commit_files(&client(&server), &repo(), &files, "x", CommitMode::Inline)
        .await
        .unwrap_err();
    match err {
        GitHubError::Api { step, status, body } => {
            assert_eq!(step, "create tree");
            assert_eq!(status, 422);
            assert!(body.contains("malformed path"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn rejected_fast_forward_is_reported() {
    let server = MockServer::start().await;
    mount_head(&server).await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/plumbing-site/git/trees"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": NEW_TREE })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/plumbing-site/git/commits"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "sha": NEW_COMMIT, "tree": { "sha": NEW_TREE } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/repos/acme/plumbing-site/git/refs/heads/main"))
        .respond_with(ResponseTemplate::new(422).set_body_string("Update is not a fast forward"))
        .expect(1)
        .mount(&server)
        .await;

    let files = [FileChange::text("index.html", "<p>hi</p>")];
    let err = commit_files(&client(&server), &repo(), &files, "x", CommitMode::Inline)
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::Api { step: "update branch ref", status: 422, .. }));
}

#[tokio::test]
async fn missing_branch_uses_repository_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/plumbing-site"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "default_branch": "main" })))
        .expect(1)
        .mount(&server)
        .await;
    mount_head(&server).await;
    Mock::given(method("POST"))
        .and(path("/repos/acme/plumbing-site/git/trees"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": NEW_TREE })))
        .mount(&server)
        .await;
    mount_commit_and_ref(&server).await;

    let files = [FileChange::text("README.md", "# Acme")];
    let outcome = commit_files(
        &client(&server),
        &RepoRef::new("acme", "plumbing-site"),
        &files,
        "Readme",
        CommitMode::Inline,
    )
    .await
    .unwrap();
    assert_eq!(outcome.branch, "main");
}

#[tokio::test]
async fn invalid_paths_make_no_requests() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let files = [FileChange::text("../outside.txt", "x")];
    let err = commit_files(&client(&server), &repo(), &files, "x", CommitMode::Inline)
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::InvalidInput(_)));
}

#[tokio::test]
async fn missing_token_fails_before_network() {
    let server = MockServer::start().await;
    let gh = GitHubClient::new(reqwest::Client::new(), None, server.uri());
    let err = gh.get_file(&repo(), "src/pages/index.astro").await.unwrap_err();
    assert!(matches!(err, GitHubError::MissingToken));
}

#[tokio::test]
async fn get_file_reads_raw_content_on_branch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/plumbing-site/contents/src/pages/index.astro"))
        .and(query_param("ref", "main"))
        .and(header("accept", "application/vnd.github.raw+json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("---\n---\n<h1>Acme</h1>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/plumbing-site/contents/missing.astro"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .mount(&server)
        .await;

    let gh = client(&server);
    let content = gh.get_file(&repo(), "src/pages/index.astro").await.unwrap();
    assert_eq!(content, "---\n---\n<h1>Acme</h1>");

    let err = gh.get_file(&repo(), "missing.astro").await.unwrap_err();
    assert!(matches!(err, GitHubError::NotFound(_)));
}

#[tokio::test]
async fn get_file_cannot_leave_the_repository() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200).set_body_string("API_KEY=stolen"))
        .expect(0)
        .mount(&server)
        .await;

    let gh = client(&server);
    let site = RepoRef::new("acme", "site");
    for bad in [
        "../../../victim/private/contents/secrets.env",
        "/etc/passwd",
        "src/../../other/contents/x",
        "index.astro?ref=other-branch",
        "index.astro#frag",
    ] {
        let err = gh.get_file(&site, bad).await.unwrap_err();
        assert!(matches!(err, GitHubError::InvalidInput(_)), "{bad} should be rejected");
    }
}

#[tokio::test]
async fn branch_names_are_encoded_in_the_ref_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/site/contents/index.astro"))
        .and(query_param("ref", "hotfix/#2?x"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let repo = RepoRef::new("acme", "site").on_branch("hotfix/#2?x");
    assert_eq!(client(&server).get_file(&repo, "index.astro").await.unwrap(), "ok");
}

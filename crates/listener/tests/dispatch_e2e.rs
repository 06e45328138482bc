//! End-to-end dispatch tests against recorded-shape fixtures.
//!
//! Every test goes through the public entry point ([`Dispatcher`]) with raw
//! fixture bytes, exactly as an HTTP handler would.
//!
//! Run with:
//!   cargo test -p listener --test dispatch_e2e

use std::path::PathBuf;

use bytes::Bytes;
use hmac::{Hmac, Mac};
use http::{HeaderMap, HeaderName, HeaderValue, Request};
use sha2::Sha256;

use events::{Provider, WebhookError, WebhookEvent};
use listener::{parse_incoming_webhook, Dispatcher, WebhookRequest, WebhookSecret};

type HmacSha256 = Hmac<Sha256>;

const BITBUCKET_SECRET: &str = "bb-server-webhook-secret";

// ── Helpers ───────────────────────────────────────────────────────────────────

fn fixture(provider: Provider, name: &str) -> Bytes {
    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "tests", "fixtures", provider.as_str(), name]
        .iter()
        .collect();
    let data = std::fs::read(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
    Bytes::from(data)
}

/// Compute a `sha256=<hex>` HMAC-SHA256 signature over the raw body.
fn compute_sig(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for &(name, value) in pairs {
        map.insert(HeaderName::from_static(name), HeaderValue::from_str(value).unwrap());
    }
    map
}

fn bitbucket_server_request(event_key: &str, body: Bytes, signature: &str) -> WebhookRequest {
    WebhookRequest::new(
        headers(&[("x-event-key", event_key), ("x-hub-signature", signature)]),
        body,
    )
}

fn signed_bitbucket_server(event_key: &str, fixture_name: &str) -> WebhookRequest {
    let body = fixture(Provider::BitbucketServer, fixture_name);
    let signature = compute_sig(BITBUCKET_SECRET, &body);
    bitbucket_server_request(event_key, body, &signature)
}

// ── Bitbucket Server scenarios ────────────────────────────────────────────────

#[test]
fn personal_repository_push_is_normalized() {
    let request = signed_bitbucket_server("repo:refs_changed", "refs_changed_personal.json");

    let event = Dispatcher::new()
        .dispatch(Provider::BitbucketServer, &WebhookSecret::new(BITBUCKET_SECRET), &request)
        .unwrap();

    assert_eq!(event.event, WebhookEvent::Push);
    assert_eq!(event.repository.unwrap().as_str(), "~yahavi/hello-world");
    assert_eq!(event.branch.unwrap().as_str(), "main");
    assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_392);
    assert_eq!(
        event.commit_sha.unwrap().as_str(),
        "5b6b8c2d1e0f9a3b4c7d6e5f8a9b0c1d2e3f4a5b"
    );
    assert!(event.source_repository.is_none());
    assert!(event.source_branch.is_none());
}

#[test]
fn pull_request_opened_within_one_branch() {
    let request = signed_bitbucket_server("pr:opened", "pr_opened.json");

    let event = Dispatcher::new()
        .dispatch(Provider::BitbucketServer, &WebhookSecret::new(BITBUCKET_SECRET), &request)
        .unwrap();

    assert_eq!(event.event, WebhookEvent::PrCreated);
    assert_eq!(event.repository, event.source_repository);
    assert_eq!(event.branch, event.source_branch);
    assert_eq!(event.repository.unwrap().as_str(), "~yahavi/hello-world");
    assert_eq!(event.branch.unwrap().as_str(), "main");
    assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_661);
}

#[test]
fn pull_request_source_update_is_an_edit() {
    let request = signed_bitbucket_server("pr:from_ref_updated", "pr_from_ref_updated.json");

    let event = Dispatcher::new()
        .dispatch(Provider::BitbucketServer, &WebhookSecret::new(BITBUCKET_SECRET), &request)
        .unwrap();

    assert_eq!(event.event, WebhookEvent::PrEdited);
    assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_180_185);
    assert_eq!(
        event.commit_sha.unwrap().as_str(),
        "7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d"
    );
}

#[test]
fn wrong_signature_is_rejected() {
    let body = fixture(Provider::BitbucketServer, "refs_changed_personal.json");
    let signature = compute_sig("some-other-secret", &body);
    let request = bitbucket_server_request("repo:refs_changed", body, &signature);

    let err = Dispatcher::new()
        .dispatch(Provider::BitbucketServer, &WebhookSecret::new(BITBUCKET_SECRET), &request)
        .unwrap_err();

    assert_eq!(err, WebhookError::SignatureMismatch);
    assert_eq!(err.to_string(), "Payload signature mismatch");
}

#[test]
fn tampered_body_is_rejected() {
    let body = fixture(Provider::BitbucketServer, "refs_changed_personal.json");
    let signature = compute_sig(BITBUCKET_SECRET, &body);
    let tampered = Bytes::from(
        String::from_utf8(body.to_vec())
            .unwrap()
            .replace("refs/heads/main", "refs/heads/prod"),
    );
    let request = bitbucket_server_request("repo:refs_changed", tampered, &signature);

    let err = Dispatcher::new()
        .dispatch(Provider::BitbucketServer, &WebhookSecret::new(BITBUCKET_SECRET), &request)
        .unwrap_err();
    assert_eq!(err, WebhookError::SignatureMismatch);
}

#[test]
fn missing_signature_is_reported() {
    let body = fixture(Provider::BitbucketServer, "refs_changed_personal.json");
    let request = WebhookRequest::new(headers(&[("x-event-key", "repo:refs_changed")]), body);

    let err = Dispatcher::new()
        .dispatch(Provider::BitbucketServer, &WebhookSecret::new(BITBUCKET_SECRET), &request)
        .unwrap_err();
    assert!(matches!(err, WebhookError::MissingSignature { .. }));
    assert!(err.is_authentication_failure());
}

#[test]
fn same_bytes_give_same_event() {
    let dispatcher = Dispatcher::new();
    let secret = WebhookSecret::new(BITBUCKET_SECRET);

    let first = dispatcher
        .dispatch(
            Provider::BitbucketServer,
            &secret,
            &signed_bitbucket_server("pr:opened", "pr_opened.json"),
        )
        .unwrap();
    let second = dispatcher
        .dispatch(
            Provider::BitbucketServer,
            &secret,
            &signed_bitbucket_server("pr:opened", "pr_opened.json"),
        )
        .unwrap();

    assert_eq!(first, second);
}

// ── Other platforms ───────────────────────────────────────────────────────────

#[test]
fn github_push_through_http_request() {
    let body = fixture(Provider::GitHub, "push.json");
    let signature = compute_sig("gh-secret", &body);
    let request = Request::post("/hooks/github")
        .header("X-GitHub-Event", "push")
        .header("X-Hub-Signature-256", signature)
        .body(body)
        .unwrap();

    let event = parse_incoming_webhook(
        "github",
        &WebhookSecret::new("gh-secret"),
        &WebhookRequest::from_http(request),
    )
    .unwrap();

    assert_eq!(event.event, WebhookEvent::Push);
    assert_eq!(event.repository.unwrap().as_str(), "octo-org/hello-world");
    assert_eq!(event.branch.unwrap().as_str(), "main");
    assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_392);
}

#[test]
fn gitlab_merge_request_with_token() {
    let body = fixture(Provider::GitLab, "merge_request_open.json");
    let request = WebhookRequest::new(
        headers(&[("x-gitlab-event", "Merge Request Hook"), ("x-gitlab-token", "gl-token")]),
        body,
    );

    let event = Dispatcher::new()
        .dispatch(Provider::GitLab, &WebhookSecret::new("gl-token"), &request)
        .unwrap();

    assert_eq!(event.event, WebhookEvent::PrCreated);
    assert_eq!(event.repository.unwrap().as_str(), "gitlabhq/gitlab-test");
    assert_eq!(event.branch.unwrap().as_str(), "master");
    assert_eq!(
        event.source_repository.unwrap().as_str(),
        "awesome_space/awesome_project"
    );
    assert_eq!(event.source_branch.unwrap().as_str(), "ms-viewport");
    assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_661);
}

#[test]
fn bitbucket_cloud_pull_request_with_query_token() {
    let body = fixture(Provider::BitbucketCloud, "pullrequest_created.json");
    let request = Request::post("/hooks/bitbucket?token=bbc-token")
        .header("X-Event-Key", "pullrequest:created")
        .body(body)
        .unwrap();

    let event = Dispatcher::new()
        .dispatch_named(
            "bitbucket-cloud",
            &WebhookSecret::new("bbc-token"),
            &WebhookRequest::from_http(request),
        )
        .unwrap();

    assert_eq!(event.event, WebhookEvent::PrCreated);
    assert_eq!(event.repository.unwrap().as_str(), "team_name/website");
    assert_eq!(event.source_branch.unwrap().as_str(), "landing-page");
    assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_661);
}

#[test]
fn azure_push_ignores_secret() {
    let body = fixture(Provider::AzureRepos, "git_push.json");
    let request = WebhookRequest::new(HeaderMap::new(), body);

    let event = Dispatcher::new()
        .dispatch(Provider::AzureRepos, &WebhookSecret::new("unused"), &request)
        .unwrap();

    assert_eq!(event.event, WebhookEvent::Push);
    assert_eq!(event.repository.unwrap().as_str(), "Fabrikam-Fiber/Fabrikam-Fiber-Git");
    assert_eq!(event.branch.unwrap().as_str(), "master");
    assert_eq!(event.timestamp.unwrap().as_secs(), 1_631_178_392);
}

// ── Dispatch failures ─────────────────────────────────────────────────────────

#[test]
fn unknown_platform_is_unsupported() {
    let request = WebhookRequest::new(HeaderMap::new(), "{}");
    let err = parse_incoming_webhook("sourcehut", &WebhookSecret::none(), &request).unwrap_err();
    assert!(matches!(err, WebhookError::UnsupportedProvider { .. }));
}

#[test]
fn malformed_body_is_reported_with_platform() {
    let request = WebhookRequest::new(headers(&[("x-event-key", "pr:opened")]), "{\"pullRequest\": ");
    let err = Dispatcher::new()
        .dispatch(Provider::BitbucketServer, &WebhookSecret::none(), &request)
        .unwrap_err();
    assert!(matches!(
        err,
        WebhookError::MalformedPayload {
            provider: Provider::BitbucketServer,
            ..
        }
    ));
}

#[tokio::test]
async fn body_stream_is_read_once() {
    let body = fixture(Provider::BitbucketServer, "refs_changed_personal.json");
    let signature = compute_sig(BITBUCKET_SECRET, &body);
    let request = WebhookRequest::read_from(
        headers(&[("x-event-key", "repo:refs_changed"), ("x-hub-signature", signature.as_str())]),
        None,
        &body[..],
    )
    .await
    .unwrap();

    let event = Dispatcher::new()
        .dispatch(Provider::BitbucketServer, &WebhookSecret::new(BITBUCKET_SECRET), &request)
        .unwrap();
    assert_eq!(event.event, WebhookEvent::Push);
}

//! End-to-end API tests: the real router over an in-memory catalog and a
//! temp-dir blob store, driven with `tower::ServiceExt::oneshot`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use zg_auth::federated::LoginStateStore;
use zg_auth::tokens::TokenSigner;
use zg_blobs::BlobStore;
use zg_catalog::Catalog;
use zg_domain::config::Config;
use zg_gateway::runtime::downloads::DownloadCoalescer;
use zg_gateway::runtime::publish_lock::PublishLockMap;
use zg_gateway::state::AppState;

const SECRET: &str = "0123456789abcdef0123456789abcdef";

struct TestRegistry {
    app: Router,
    state: AppState,
    _blob_dir: tempfile::TempDir,
}

fn registry() -> TestRegistry {
    registry_with(|_| {})
}

fn registry_with(tweak: impl FnOnce(&mut Config)) -> TestRegistry {
    let blob_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.auth.secret_key = SECRET.into();
    config.storage.storage_path = blob_dir.path().to_path_buf();
    config.storage.max_package_size = 4096;
    tweak(&mut config);

    let state = AppState {
        blobs: Arc::new(
            BlobStore::new(blob_dir.path(), config.storage.max_package_size).unwrap(),
        ),
        config: Arc::new(config),
        catalog: Arc::new(Catalog::open_in_memory().unwrap()),
        signer: Arc::new(TokenSigner::new(SECRET.as_bytes().to_vec())),
        logins: Arc::new(LoginStateStore::new()),
        oidc: Arc::new(HashMap::new()),
        oauth: Arc::new(HashMap::new()),
        discovery: None,
        publish_locks: Arc::new(PublishLockMap::new()),
        downloads: Arc::new(DownloadCoalescer::new()),
    };
    let app = zg_gateway::api::router(&state).with_state(state.clone());
    TestRegistry {
        app,
        state,
        _blob_dir: blob_dir,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024 * 1024)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let (status, bytes) = send(app, req).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

fn json_request(method: &str, path: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

const BOUNDARY: &str = "zigguratTestBoundary";

/// Minimal multipart/form-data encoder for publish requests.
fn multipart_body(fields: &[(&str, &[u8], bool)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value, is_file) in fields {
        out.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        if *is_file {
            out.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"archive.zpkg\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
        } else {
            out.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
        }
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    out
}

fn publish_request(owner: &str, repo: &str, token: &str, tag: &str, archive: &[u8]) -> Request<Body> {
    let body = multipart_body(&[
        ("tag_name", tag.as_bytes(), false),
        ("body", b"first", false),
        ("file", archive, true),
    ]);
    Request::builder()
        .method("POST")
        .uri(format!("/api/v1/packages/{owner}/{repo}/releases"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send_json(
        app,
        json_request(
            "POST",
            "/api/v1/auth/register",
            serde_json::json!({
                "username": username,
                "email": format!("{username}@x.io"),
                "password": "hunter2hunter2",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().unwrap().to_owned()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Accounts
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn register_login_me_round_trip() {
    let r = registry();

    let (status, body) = send_json(
        &r.app,
        json_request(
            "POST",
            "/api/v1/auth/register",
            serde_json::json!({
                "username": "alice",
                "email": "a@x.io",
                "password": "hunter2hunter2",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["email"], "a@x.io");

    let (status, body) = send_json(
        &r.app,
        json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({ "username": "alice", "password": "hunter2hunter2" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_owned();

    let (status, body) = send_json(
        &r.app,
        Request::builder()
            .uri("/api/v1/auth/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 1);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["authenticated"], true);
}

#[tokio::test]
async fn wrong_password_and_duplicate_username() {
    let r = registry();
    register(&r.app, "alice").await;

    let (status, _) = send_json(
        &r.app,
        json_request(
            "POST",
            "/api/v1/auth/login",
            serde_json::json!({ "username": "alice", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send_json(
        &r.app,
        json_request(
            "POST",
            "/api/v1/auth/register",
            serde_json::json!({
                "username": "alice",
                "email": "other@x.io",
                "password": "hunter2hunter2",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("username"));
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let r = registry();
    let token = register(&r.app, "alice").await;
    let auth = |path: &str, method: &str| {
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send_json(&r.app, auth("/api/v1/auth/logout", "POST")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send_json(&r.app, auth("/api/v1/auth/me", "GET")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Publish / download
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn publish_then_download_round_trips() {
    let r = registry();
    let token = register(&r.app, "alice").await;
    let archive = b"fake-zpkg-archive-bytes".to_vec();

    let (status, body) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.0.0", &archive),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["tag_name"], "1.0.0");
    assert_eq!(body["file_size"], archive.len() as i64);
    assert_eq!(
        body["download_url"],
        "/api/v1/packages/alice/widget/download/1.0.0"
    );
    let sha = body["sha256"].as_str().unwrap().to_owned();
    assert_eq!(sha.len(), 64);

    let response = r
        .app
        .clone()
        .oneshot(get("/api/v1/packages/alice/widget/download/1.0.0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"widget-1.0.0.zpkg\""
    );
    assert_eq!(response.headers()["X-Content-SHA256"], sha.as_str());
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH],
        archive.len().to_string().as_str()
    );
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    assert_eq!(bytes.to_vec(), archive);

    // The counter lands in the catalog on the next coalescer flush.
    r.state.downloads.flush(&r.state.catalog);
    let (status, stats) = send_json(&r.app, get("/api/v1/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_packages"], 1);
    assert_eq!(stats["total_downloads"], 1);
    assert_eq!(stats["downloads_today"], 1);
}

#[tokio::test]
async fn abandoned_download_is_not_counted() {
    let r = registry();
    let token = register(&r.app, "alice").await;
    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.0.0", b"archive-bytes"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Headers arrive, but the body is dropped before being read — the
    // client went away mid-transfer.
    let response = r
        .app
        .clone()
        .oneshot(get("/api/v1/packages/alice/widget/download/1.0.0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    drop(response);

    r.state.downloads.flush(&r.state.catalog);
    assert_eq!(r.state.catalog.get_stats().unwrap().total_downloads, 0);

    // A fully drained body does count.
    let (status, bytes) = send(&r.app, get("/api/v1/packages/alice/widget/download/1.0.0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"archive-bytes");
    r.state.downloads.flush(&r.state.catalog);
    assert_eq!(r.state.catalog.get_stats().unwrap().total_downloads, 1);
}

#[tokio::test]
async fn duplicate_publish_conflicts_and_keeps_the_first_blob() {
    let r = registry();
    let token = register(&r.app, "alice").await;

    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.0.0", b"original-bytes"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.0.0", b"replacement-bytes"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Release already exists");

    let (_, bytes) = send(&r.app, get("/api/v1/packages/alice/widget/download/1.0.0")).await;
    assert_eq!(bytes, b"original-bytes");
}

#[tokio::test]
async fn publish_authorization_is_enforced() {
    let r = registry();
    let token = register(&r.app, "mallory").await;

    // No token at all.
    let mut req = publish_request("alice", "widget", "not-a-token", "1.0.0", b"x");
    req.headers_mut().remove(header::AUTHORIZATION);
    let (status, _) = send_json(&r.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Valid token, wrong owner.
    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.0.0", b"x"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_token_may_publish_anywhere() {
    let r = registry_with(|config| {
        config.auth.admin_users = vec!["root".into()];
    });
    let token = register(&r.app, "root").await;
    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.0.0", b"x"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn upload_cap_is_exact() {
    let r = registry();
    let token = register(&r.app, "alice").await;

    let exact = vec![7u8; 4096];
    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.0.0", &exact),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let over = vec![7u8; 4097];
    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.1.0", &over),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn publish_validates_inputs() {
    let r = registry();
    let token = register(&r.app, "alice").await;

    // Tag must be semver.
    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "latest", b"x"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Identifier charset is enforced.
    let (status, _) = send_json(&r.app, get("/api/v1/packages/ali.ce/widget")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Publish without multipart is 415.
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/packages/alice/widget/releases")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send_json(&r.app, req).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn draft_release_is_not_downloadable() {
    let r = registry();
    let token = register(&r.app, "alice").await;

    let body = multipart_body(&[
        ("tag_name", b"0.1.0", false),
        ("draft", b"true", false),
        ("file", b"draft-bytes", true),
    ]);
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/packages/alice/widget/releases")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, release) = send_json(&r.app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(release["draft"], true);
    assert_eq!(release["published_at"], serde_json::Value::Null);

    // Metadata shows the draft; download refuses it.
    let (status, _) = send_json(&r.app, get("/api/v1/packages/alice/widget/releases/0.1.0")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&r.app, get("/api/v1/packages/alice/widget/download/0.1.0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_release_removes_row_and_blob() {
    let r = registry();
    let token = register(&r.app, "alice").await;
    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.0.0", b"bytes"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let req = Request::builder()
        .method("DELETE")
        .uri("/api/v1/packages/alice/widget/releases/1.0.0")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send_json(&r.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = send_json(&r.app, get("/api/v1/packages/alice/widget/releases/1.0.0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&r.app, get("/api/v1/packages/alice/widget/download/1.0.0")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!r.state.blobs.exists("alice", "widget", "1.0.0"));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Listings, search, aliases
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn releases_list_newest_first() {
    let r = registry();
    let token = register(&r.app, "alice").await;
    for tag in ["1.2.3", "2.0.0", "1.10.0"] {
        let (status, _) = send_json(
            &r.app,
            publish_request("alice", "widget", &token, tag, b"x"),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send_json(&r.app, get("/api/v1/packages/alice/widget/releases")).await;
    assert_eq!(status, StatusCode::OK);
    let tags: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["tag_name"].as_str().unwrap())
        .collect();
    assert_eq!(tags, vec!["2.0.0", "1.10.0", "1.2.3"]);

    let (status, tags_body) = send_json(&r.app, get("/api/v1/packages/alice/widget/tags")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tags_body.as_array().unwrap().len(), 3);
    assert_eq!(tags_body[0]["name"], "2.0.0");
}

#[tokio::test]
async fn search_ranks_title_match_over_description() {
    let r = registry();
    let alice = register(&r.app, "alice").await;
    let bob = register(&r.app, "bob").await;

    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &alice, "1.0.0", b"x"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let body = multipart_body(&[
        ("tag_name", b"1.0.0", false),
        ("body", b"a widget framework", false),
        ("file", b"y", true),
    ]);
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/packages/bob/gadget/releases")
        .header(header::AUTHORIZATION, format!("Bearer {bob}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send_json(&r.app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    // Give gadget a widget-matching description through the catalog.
    r.state
        .catalog
        .upsert_package_from_release(
            "bob",
            "gadget",
            &zg_catalog::PackageHints {
                description: Some("a widget framework".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let (status, body) = send_json(&r.app, get("/api/v1/search?q=widget")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["full_name"], "alice/widget");
    assert_eq!(body["total_count"], 2);

    // limit=0 is a valid empty result.
    let (status, body) = send_json(&r.app, get("/api/v1/search?q=widget&limit=0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 0);
}

#[tokio::test]
async fn alias_lifecycle() {
    let r = registry();
    let token = register(&r.app, "alice").await;
    let (status, _) = send_json(
        &r.app,
        publish_request("alice", "widget", &token, "1.0.0", b"x"),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let req = Request::builder()
        .method("PUT")
        .uri("/api/v1/aliases/widget")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "owner": "alice", "repo": "widget" }).to_string(),
        ))
        .unwrap();
    let (status, _) = send_json(&r.app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(&r.app, get("/api/v1/resolve/widget")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["short_name"], "widget");
    assert_eq!(body["full_name"], "alice/widget");
    assert_eq!(body["created_by"], "alice");

    // A stranger may not repoint someone else's package alias.
    let mallory = register(&r.app, "mallory").await;
    let req = Request::builder()
        .method("PUT")
        .uri("/api/v1/aliases/widget")
        .header(header::AUTHORIZATION, format!("Bearer {mallory}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "owner": "alice", "repo": "widget" }).to_string(),
        ))
        .unwrap();
    let (status, _) = send_json(&r.app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Meta + discovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn health_and_registry_config_report_features() {
    let r = registry();

    let (status, body) = send_json(&r.app, get("/api/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["features"]["publish"], true);
    assert_eq!(body["features"]["discovery"], false);

    let (status, body) = send_json(&r.app, get("/api/v1/registry/config")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api_version"], "v1");
    assert_eq!(body["max_package_size"], 4096);

    // Legacy aliases answer too.
    let (status, _) = send_json(&r.app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&r.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn discovery_surface_is_empty_without_upstream() {
    let r = registry();
    let (status, body) = send_json(&r.app, get("/api/discover?q=json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_count"], 0);

    let (status, body) = send_json(&r.app, get("/api/trending")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_package_is_404_with_error_body() {
    let r = registry();
    let (status, body) = send_json(&r.app, get("/api/v1/packages/ghost/pkg")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].is_string());
    assert!(body["documentation_url"].is_string());
}

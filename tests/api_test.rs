use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use persona_notes::{
    config::Config,
    repositories::{MemoryBlobStore, MemoryStore},
    server::{AppState, build_router},
    services::{Backends, ExternalClients},
};
use serde_json::{Value, json};
use tower::ServiceExt;

const BOUNDARY: &str = "persona-notes-test-boundary";

fn test_config() -> Config {
    let mut config = Config::default();
    config.security.bcrypt_cost = 4;
    config
}

fn app_with(config: Config) -> Router {
    let clients = ExternalClients::new(reqwest::Client::new(), &config);
    let backends = Backends::memory(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryBlobStore::new()),
        clients,
    );
    let state = AppState::new(config, "integration-test-secret".to_string(), backends);
    build_router(state).unwrap()
}

fn app() -> Router {
    app_with(test_config())
}

async fn send_raw(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>, header::HeaderMap) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec(), headers)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes, _) = send_raw(app, req).await;
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a str, &'a [u8]),
}

fn multipart(uri: &str, token: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File(name, file_name, content_type, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, file_name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

struct Account {
    token: String,
    personality_id: String,
}

async fn register(app: &Router, username: &str) -> Account {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "secret123"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    Account {
        token: body["token"].as_str().unwrap().to_string(),
        personality_id: body["user"]["currentPersonality"]
            .as_str()
            .unwrap()
            .to_string(),
    }
}

async fn create_folder(app: &Router, account: &Account, name: &str) -> String {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/folders",
            Some(&account.token),
            Some(json!({ "name": name, "personalityId": account.personality_id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

async fn create_note(app: &Router, account: &Account, content: &str, folder_id: Option<&str>) -> Value {
    let mut parts = vec![
        Part::Text("title", "Lecture"),
        Part::Text("content", content),
        Part::Text("personalityId", &account.personality_id),
    ];
    if let Some(folder_id) = folder_id {
        parts.push(Part::Text("folderId", folder_id));
    }
    let (status, body) = send(app, multipart("/api/notes", &account.token, &parts)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body
}

async fn folder(app: &Router, account: &Account, id: &str) -> Value {
    let (status, body) = send(
        app,
        request("GET", &format!("/api/folders/{}", id), Some(&account.token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

fn approx(value: &Value, expected: f64) -> bool {
    (value.as_f64().unwrap() - expected).abs() < 1e-9
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app();
    let (status, body) = send(&app, request("GET", "/api/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn login_failures_look_the_same() {
    let app = app();
    register(&app, "ada").await;

    let wrong_password = send(
        &app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "not-it" })),
        ),
    )
    .await;
    let unknown_email = send(
        &app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ghost@example.com", "password": "secret123" })),
        ),
    )
    .await;

    assert_eq!(wrong_password.0, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password.1["error"], "Invalid credentials");

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let app = app();

    let (status, body) = send(&app, request("GET", "/api/notes", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "No token, authorization denied");

    let (status, body) = send(&app, request("GET", "/api/notes", Some("garbage"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token is not valid");
}

#[tokio::test]
async fn deleted_account_token_is_rejected() {
    let app = app();
    let account = register(&app, "ada").await;

    let (status, _) = send(
        &app,
        request(
            "DELETE",
            "/api/auth/account",
            Some(&account.token),
            Some(json!({ "password": "secret123" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, request("GET", "/api/auth/me", Some(&account.token), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token is not valid");
}

#[tokio::test]
async fn personality_defaults_color() {
    let app = app();
    let account = register(&app, "ada").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/personalities",
            Some(&account.token),
            Some(json!({
                "name": "Work",
                "icon": "💼",
                "description": "Professional voice"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["color"], "#8B5CF6");
    assert_eq!(body["icon"], "💼");
    assert_eq!(body["isDefault"], false);

    let work_id = body["id"].as_str().unwrap().to_string();
    let (status, _) = send(
        &app,
        request(
            "POST",
            &format!("/api/personalities/{}/switch", work_id),
            Some(&account.token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, current) = send(
        &app,
        request("GET", "/api/personalities/current", Some(&account.token), None),
    )
    .await;
    assert_eq!(current["id"], work_id.as_str());
}

#[tokio::test]
async fn note_in_folder_updates_counters() {
    let app = app();
    let account = register(&app, "ada").await;
    let folder_id = create_folder(&app, &account, "Lectures").await;

    let note = create_note(&app, &account, "Hello", Some(&folder_id)).await;
    assert!(approx(&note["size"], 0.005));

    let counters = folder(&app, &account, &folder_id).await;
    assert_eq!(counters["noteCount"], 1);
    assert!(approx(&counters["size"], 0.005));

    let note_id = note["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        request("DELETE", &format!("/api/notes/{}", note_id), Some(&account.token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let counters = folder(&app, &account, &folder_id).await;
    assert_eq!(counters["noteCount"], 0);
    assert!(approx(&counters["size"], 0.0));
}

#[tokio::test]
async fn growing_content_grows_folder_size() {
    let app = app();
    let account = register(&app, "ada").await;
    let folder_id = create_folder(&app, &account, "Scratch").await;
    let note = create_note(&app, &account, "X", Some(&folder_id)).await;
    let before = folder(&app, &account, &folder_id).await["size"].as_f64().unwrap();

    let (status, updated) = send(
        &app,
        request(
            "PUT",
            &format!("/api/notes/{}", note["id"].as_str().unwrap()),
            Some(&account.token),
            Some(json!({ "content": "XY" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(approx(&updated["size"], 0.002));

    let after = folder(&app, &account, &folder_id).await["size"].as_f64().unwrap();
    assert!((after - before - 0.001).abs() < 1e-9);
}

#[tokio::test]
async fn deleting_a_folder_removes_only_its_notes() {
    let app = app();
    let account = register(&app, "ada").await;
    let doomed = create_folder(&app, &account, "Doomed").await;
    let kept = create_folder(&app, &account, "Kept").await;

    create_note(&app, &account, "one", Some(&doomed)).await;
    create_note(&app, &account, "two", Some(&doomed)).await;
    let survivor = create_note(&app, &account, "three", Some(&kept)).await;
    let loose = create_note(&app, &account, "four", None).await;

    let (status, body) = send(
        &app,
        request("DELETE", &format!("/api/folders/{}", doomed), Some(&account.token), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedNotes"], 2);

    let (_, notes) = send(&app, request("GET", "/api/notes", Some(&account.token), None)).await;
    let mut ids: Vec<&str> = notes
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect();
    ids.sort();
    let mut expected = vec![
        survivor["id"].as_str().unwrap(),
        loose["id"].as_str().unwrap(),
    ];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn attachments_download_with_disposition() {
    let app = app();
    let account = register(&app, "ada").await;

    let parts = [
        Part::Text("title", "With file"),
        Part::Text("content", "see attached"),
        Part::Text("personalityId", &account.personality_id),
        Part::File("files", "hello.txt", "text/plain", b"hello world"),
    ];
    let (status, note) = send(&app, multipart("/api/notes", &account.token, &parts)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", note);
    let url = note["attachments"][0]["url"].as_str().unwrap().to_string();
    assert_eq!(note["attachments"][0]["size"], 11);

    let (status, bytes, headers) = send_raw(&app, request("GET", &url, Some(&account.token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"hello world");
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert!(headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment"));

    let (status, _) = send(&app, request("DELETE", &url, Some(&account.token), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, request("GET", &url, Some(&account.token), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn note_creation_requires_fields() {
    let app = app();
    let account = register(&app, "ada").await;

    let parts = [Part::Text("title", "Only a title")];
    let (status, body) = send(&app, multipart("/api/notes", &account.token, &parts)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Title, content and personality are required");
}

#[tokio::test]
async fn drafts_publish() {
    let app = app();
    let account = register(&app, "ada").await;

    let (status, draft) = send(
        &app,
        request(
            "POST",
            "/api/drafts",
            Some(&account.token),
            Some(json!({
                "title": "Launch post",
                "content": "We shipped",
                "type": "social",
                "platform": "linkedin",
                "personalityId": account.personality_id
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", draft);
    assert_eq!(draft["isPublished"], false);

    let (status, published) = send(
        &app,
        request(
            "POST",
            &format!("/api/drafts/{}/publish", draft["id"].as_str().unwrap()),
            Some(&account.token),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["isPublished"], true);
    assert!(published["publishedAt"].is_string());
}

#[tokio::test]
async fn twitter_posts_return_intent_url() {
    let app = app();
    let account = register(&app, "ada").await;

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/auth/social/post",
            Some(&account.token),
            Some(json!({ "platform": "twitter", "content": "hello world" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["posted"], false);
    assert!(body["shareUrl"]
        .as_str()
        .unwrap()
        .starts_with("https://twitter.com/intent/tweet?text=hello"));
}

#[tokio::test]
async fn rate_limit_applies_per_peer() {
    let mut config = test_config();
    config.rate_limit.max_requests = 2;
    let app = app_with(config);

    let from = |ip: &str| {
        let mut req = request("GET", "/api/health", None, None);
        let peer: SocketAddr = format!("{}:40000", ip).parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        req
    };

    assert_eq!(send(&app, from("10.1.1.1")).await.0, StatusCode::OK);
    assert_eq!(send(&app, from("10.1.1.1")).await.0, StatusCode::OK);
    let (status, body) = send(&app, from("10.1.1.1")).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("try again in"));

    assert_eq!(send(&app, from("10.1.1.2")).await.0, StatusCode::OK);
}

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{body_json, TestApp, ADMIN_PASSWORD, TOKEN_A, TOKEN_B};
use github_token_proxy::core::models::ProxyConfig;
use github_token_proxy::core::storage::EncryptedFileVault;
use github_token_proxy::core::TokenPersistence;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UNREACHABLE: &str = "http://127.0.0.1:1";

#[tokio::test]
async fn test_admin_requires_password() {
    let app = TestApp::new(UNREACHABLE);

    let missing = Request::post("/admin/tokens")
        .header("content-type", "application/json")
        .body(Body::from(json!({"tokens": [TOKEN_A]}).to_string()))
        .unwrap();
    let response = app.send(missing).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthorized");

    let wrong = Request::post("/admin/tokens")
        .header("content-type", "application/json")
        .header("X-Admin-Password", "not-the-password")
        .body(Body::from(json!({"tokens": [TOKEN_A]}).to_string()))
        .unwrap();
    assert_eq!(app.send(wrong).await.status(), StatusCode::UNAUTHORIZED);

    assert!(app.state.token_manager.is_empty());
    assert!(!app.vault_path.exists());
}

#[tokio::test]
async fn test_admin_disabled_without_configured_password() {
    let app = TestApp::with_config(ProxyConfig {
        admin_password: None,
        upstream_base_url: UNREACHABLE.to_string(),
        ..ProxyConfig::default()
    });

    let response = app.admin("GET", "/admin/test", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let empty = Request::get("/admin/test")
        .header("X-Admin-Password", "")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(empty).await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_test_endpoint() {
    let app = TestApp::new(UNREACHABLE);
    let response = app.admin("GET", "/admin/test", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"authenticated": true}));
}

#[tokio::test]
async fn test_add_list_clear_flow() {
    let app = TestApp::new(UNREACHABLE);

    let response = app
        .admin(
            "POST",
            "/admin/tokens",
            Some(json!({"tokens": [TOKEN_A, "short", TOKEN_A, format!("  {}  ", TOKEN_B)]})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["new_tokens_added"], 2);
    assert_eq!(body["total_tokens"], 2);

    let body = body_json(app.admin("GET", "/admin/tokens", None).await).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["effective_limit"], 10000);
    assert_eq!(body["tokens"][0]["masked"], "ghp_aaaa...aaaa");
    assert!(!body.to_string().contains(TOKEN_A));

    // 磁盘上只有密文，同一密钥可读回
    let raw = std::fs::read_to_string(&app.vault_path).unwrap();
    assert!(!raw.contains(TOKEN_A));
    let reopened = EncryptedFileVault::new(app.vault_path.clone(), app.key);
    assert_eq!(
        reopened.load().unwrap(),
        vec![TOKEN_A.to_string(), TOKEN_B.to_string()]
    );

    let response = app.admin("DELETE", "/admin/tokens", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["message"], "All tokens cleared");

    assert!(app.state.token_manager.is_empty());
    assert!(!app.vault_path.exists());
    let health = body_json(app.get("/health").await).await;
    assert_eq!(health["token_count"], 0);
}

#[tokio::test]
async fn test_add_rejects_empty_and_invalid_lists() {
    let app = TestApp::new(UNREACHABLE);

    let response = app
        .admin("POST", "/admin/tokens", Some(json!({"tokens": []})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "No tokens provided");

    let response = app
        .admin("POST", "/admin/tokens", Some(json!({"tokens": ["tooshort"]})))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "No valid tokens provided");

    assert!(app.state.token_manager.is_empty());
}

#[tokio::test]
async fn test_remove_single_token() {
    let app = TestApp::new(UNREACHABLE);
    app.state
        .token_manager
        .add(vec![TOKEN_A.to_string(), TOKEN_B.to_string()])
        .await
        .unwrap();
    let id = app.state.token_manager.list()[0].id.clone();

    let response = app
        .admin("DELETE", &format!("/admin/tokens/{}", id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["total_tokens"], 1);

    let response = app
        .admin("DELETE", &format!("/admin/tokens/{}", id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_and_token_details_after_traffic() {
    let server = MockServer::start().await;
    let app = TestApp::new(&server.uri());
    app.state
        .token_manager
        .add(vec![TOKEN_A.to_string()])
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/users/octocat"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-remaining", "4990")
                .insert_header("x-ratelimit-limit", "5000")
                .insert_header("x-ratelimit-reset", "1700000000")
                .set_body_string("{}"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/rust-lang"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(&server)
        .await;

    for uri in ["/api/users/octocat", "/api/users/octocat", "/api/orgs/rust-lang"] {
        assert_eq!(app.get(uri).await.status(), StatusCode::OK);
    }

    let stats = body_json(app.admin("GET", "/admin/stats", None).await).await;
    assert_eq!(stats["tokens"]["count"], 1);
    assert_eq!(stats["tokens"]["per_token_limit"], 5000);
    assert_eq!(stats["usage"]["total_requests"], 3);
    assert_eq!(stats["usage"]["total_success"], 3);
    assert_eq!(stats["current_rate_limit"]["remaining"], 4990);
    assert_eq!(stats["recent_requests"].as_array().unwrap().len(), 3);
    assert!(stats["reset_time"].is_string());

    let details = body_json(app.admin("GET", "/admin/token-details", None).await).await;
    assert_eq!(details["count"], 1);
    let token = &details["tokens"][0];
    assert_eq!(token["usage_count"], 3);
    assert_eq!(token["health"], "active");
    assert_eq!(token["rate_limit"]["remaining"], 4990);
    assert_eq!(token["top_endpoints"][0]["endpoint"], "/users/octocat");
    assert_eq!(token["top_endpoints"][0]["count"], 2);

    let logs = body_json(app.admin("GET", "/admin/logs?limit=2", None).await).await;
    assert_eq!(logs["total"], 3);
    assert_eq!(logs["logs"].as_array().unwrap().len(), 2);
    assert_eq!(logs["logs"][0]["endpoint"], "/orgs/rust-lang");

    // 清空后统计归零
    app.admin("DELETE", "/admin/tokens", None).await;
    let stats = body_json(app.admin("GET", "/admin/stats", None).await).await;
    assert_eq!(stats["usage"]["total_requests"], 0);
}

#[tokio::test]
async fn test_admin_header_is_case_insensitive() {
    let app = TestApp::new(UNREACHABLE);
    let request = Request::get("/admin/test")
        .header("x-admin-password", ADMIN_PASSWORD)
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(request).await.status(), StatusCode::OK);
}

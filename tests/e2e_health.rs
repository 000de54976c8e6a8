//! E2E tests for health check, metrics and static assets

mod common;

use common::TestServer;

#[tokio::test]
async fn test_health_check() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = TestServer::new().await;

    // Generate at least one auth action sample
    server
        .client
        .get(&server.url("/api/auth/providers"))
        .send()
        .await
        .unwrap();

    let response = server
        .client
        .get(&server.url("/metrics"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("signin_starter_auth_actions_total"));
    assert!(body.contains("signin_starter_build_version"));
}

#[tokio::test]
async fn test_404_for_unknown_routes() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/unknown/route"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("no-store")
    );
    let body = response.text().await.unwrap();
    assert!(body.contains("Page not found"));
}

#[tokio::test]
async fn test_public_assets_are_served_with_short_cache() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/styles.css"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("public, max-age=3600")
    );
    assert_eq!(response.text().await.unwrap(), "body { margin: 0; }");
}

#[tokio::test]
async fn test_build_assets_are_immutable() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/build/entry.abc123.js"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("cache-control")
            .and_then(|v| v.to_str().ok()),
        Some("public, max-age=31536000, immutable")
    );
}

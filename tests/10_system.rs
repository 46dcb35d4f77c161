mod common;

use anyhow::Result;
use axum::{body::Body, http::Request, http::StatusCode};

#[tokio::test]
async fn service_info_lists_endpoints() -> Result<()> {
    let (status, body) = common::send(common::test_app()?, common::get("/")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["name"], "Tenant CMS API");
    assert!(body["data"]["endpoints"]["root"].is_string());
    Ok(())
}

#[tokio::test]
async fn health_reports_degraded_without_database() -> Result<()> {
    let (status, body) = common::send(common::test_app()?, common::get("/health")).await?;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["status"], "degraded");
    Ok(())
}

#[tokio::test]
async fn unknown_route_is_404() -> Result<()> {
    let (status, _) = common::send(common::test_app()?, common::get("/api/nothing-here")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn missing_media_file_is_404() -> Result<()> {
    let (status, _) = common::send(common::test_app()?, common::get("/media/none/missing.png")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn media_files_cannot_run_as_documents() -> Result<()> {
    let config = common::test_config();
    let tenant_dir = config.media.storage_root.join("tenant");
    tokio::fs::create_dir_all(&tenant_dir).await?;
    tokio::fs::write(tenant_dir.join("logo.png"), b"\x89PNG\r\n").await?;
    let app = tenant_cms_api::router(common::state_for(config)?);

    let response = tower::ServiceExt::oneshot(app, common::get("/media/tenant/logo.png")).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let header = |name: &str| response.headers().get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    assert_eq!(header("content-type").as_deref(), Some("image/png"));
    assert_eq!(header("x-content-type-options").as_deref(), Some("nosniff"));
    assert!(header("content-security-policy").unwrap_or_default().contains("sandbox"));
    Ok(())
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() -> Result<()> {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/pages")
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "GET")
        .body(Body::empty())?;
    let response = tower::ServiceExt::oneshot(common::test_app()?, request).await?;

    assert_eq!(
        response.headers().get("access-control-allow-origin").and_then(|v| v.to_str().ok()),
        Some("http://localhost:5173")
    );
    Ok(())
}

mod common;

use anyhow::Result;
use axum::{body::Body, http::Request, http::StatusCode};
use uuid::Uuid;

use tenant_cms_api::auth::{Claims, JwtKeys, Role};

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let (status, body) = common::send(common::test_app()?, common::get("/api/pages")).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "UNAUTHORIZED");
    Ok(())
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() -> Result<()> {
    let request = Request::builder()
        .uri("/api/auth/whoami")
        .header("authorization", "Basic YWRtaW46YWRtaW4=")
        .body(Body::empty())?;
    let (status, _) = common::send(common::test_app()?, request).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn token_signed_with_another_secret_is_rejected() -> Result<()> {
    let forged = JwtKeys::new("not-the-server-secret", 1).issue(Uuid::new_v4(), None, None, Role::SuperAdmin)?;
    let (status, _) = common::send(common::test_app()?, common::get_as("/api/root/tenants", &forged)).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_rejected() -> Result<()> {
    let keys = JwtKeys::new(common::TEST_SECRET, 1);
    let mut claims = Claims::new(Uuid::new_v4(), Some(Uuid::new_v4()), Some("acme".into()), Role::Admin, 1);
    claims.exp = chrono::Utc::now().timestamp() - 3600;
    let token = keys.encode(&claims)?;

    let (status, _) = common::send(common::test_app()?, common::get_as("/api/pages", &token)).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn super_admin_must_pick_a_tenant() -> Result<()> {
    let token = common::token(Role::SuperAdmin, None)?;
    let (status, body) = common::send(common::test_app()?, common::get_as("/api/pages", &token)).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("X-Tenant-Id"));
    Ok(())
}

#[tokio::test]
async fn tenant_header_must_be_a_uuid() -> Result<()> {
    let token = common::token(Role::SuperAdmin, None)?;
    let request = Request::builder()
        .uri("/api/pages")
        .header("authorization", format!("Bearer {}", token))
        .header("x-tenant-id", "acme")
        .body(Body::empty())?;
    let (status, _) = common::send(common::test_app()?, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn tenant_roles_without_tenant_are_forbidden() -> Result<()> {
    let token = common::token(Role::Editor, None)?;
    let (status, _) = common::send(common::test_app()?, common::get_as("/api/pages", &token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn login_requires_email_and_password() -> Result<()> {
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"tenant":"acme"}"#))?;
    let (status, _) = common::send(common::test_app()?, request).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

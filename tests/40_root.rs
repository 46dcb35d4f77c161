mod common;

use anyhow::Result;
use axum::{body::Body, http::Request, http::StatusCode};
use uuid::Uuid;

use tenant_cms_api::auth::Role;

#[tokio::test]
async fn tenant_admins_cannot_reach_root_api() -> Result<()> {
    let token = common::token(Role::Admin, Some(Uuid::new_v4()))?;

    for uri in ["/api/root/tenants", "/api/root/backups", "/api/root/system", "/api/root/updates/check"] {
        let (status, body) = common::send(common::test_app()?, common::get_as(uri, &token)).await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
        assert_eq!(body["code"], "FORBIDDEN");
    }
    Ok(())
}

#[tokio::test]
async fn backup_restore_requires_super_admin() -> Result<()> {
    let token = common::token(Role::Editor, Some(Uuid::new_v4()))?;
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/root/backups/{}/restore", Uuid::new_v4()))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())?;

    let (status, _) = common::send(common::test_app()?, request).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn update_check_without_manifest_is_unavailable() -> Result<()> {
    // Development config has no manifest URL
    let token = common::token(Role::SuperAdmin, None)?;
    let (status, body) = common::send(common::test_app()?, common::get_as("/api/root/updates/check", &token)).await?;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    Ok(())
}

#[tokio::test]
async fn operation_id_must_be_a_uuid() -> Result<()> {
    let token = common::token(Role::SuperAdmin, None)?;
    let (status, _) = common::send(common::test_app()?, common::get_as("/api/root/operations/latest", &token)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

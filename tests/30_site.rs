mod common;

use anyhow::Result;
use axum::http::StatusCode;

#[tokio::test]
async fn base_domain_itself_is_not_a_site() -> Result<()> {
    // Development base domain is "localhost"
    let (status, body) = common::send(common::test_app()?, common::get_on_host("/site", "localhost:3000")).await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn sitemap_needs_a_known_host() -> Result<()> {
    let (status, _) = common::send(common::test_app()?, common::get_on_host("/sitemap.xml", "LOCALHOST.")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn malformed_host_is_rejected() -> Result<()> {
    let (status, _) = common::send(common::test_app()?, common::get_on_host("/site/team", "bad:host")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

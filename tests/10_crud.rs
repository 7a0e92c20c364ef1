mod common;

use anyhow::Result;
use reqwest::{Method, StatusCode};
use serde_json::json;

use common::TestServer;

#[tokio::test]
async fn create_returns_created_document() -> Result<()> {
    let server = TestServer::spawn().await?;

    let (status, body) = server
        .post("/widgets", json!({ "data": { "type": "widgets", "attributes": { "name": "Foo" } } }))
        .await?;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({
            "data": {
                "id": "1",
                "type": "widgets",
                "attributes": { "name": "Foo" },
                "links": { "self": server.url("/widgets/1") }
            }
        })
    );
    Ok(())
}

#[tokio::test]
async fn responses_use_jsonapi_media_type() -> Result<()> {
    let server = TestServer::spawn().await?;
    server.create("widgets", json!({ "name": "Foo" })).await?;

    let response = reqwest::get(server.url("/widgets/1")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/vnd.api+json");

    let response = reqwest::get(server.url("/widgets/99")).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["content-type"], "application/vnd.api+json");
    Ok(())
}

#[tokio::test]
async fn get_unknown_id_is_not_found() -> Result<()> {
    let server = TestServer::spawn().await?;

    let (status, body) = server.get("/widgets/42").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "errors": [{ "status": 404, "code": 1024 | 1, "title": "Unknown ID" }] }));
    Ok(())
}

#[tokio::test]
async fn attribute_keys_are_dasherized_both_ways() -> Result<()> {
    let server = TestServer::spawn().await?;
    let id = server.create("widgets", json!({ "name": "Foo", "shelf-label": "A1" })).await?;

    let (_, body) = server.get(&format!("/widgets/{}", id)).await?;
    assert_eq!(body["data"]["attributes"], json!({ "name": "Foo", "shelf-label": "A1" }));

    let stored = server.store_row("widgets", &id).await;
    assert_eq!(stored["shelf_label"], "A1");
    Ok(())
}

#[tokio::test]
async fn patch_touching_only_requested_attributes_is_no_content() -> Result<()> {
    let server = TestServer::spawn().await?;
    let id = server.create("widgets", json!({ "name": "Foo" })).await?;
    server.get(&format!("/widgets/{}", id)).await?;

    let (status, body) = server
        .patch(
            &format!("/widgets/{}", id),
            json!({ "data": { "type": "widgets", "id": id, "attributes": { "name": "Bar" } } }),
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (_, body) = server.get(&format!("/widgets/{}", id)).await?;
    assert_eq!(body["data"]["attributes"]["name"], "Bar");
    Ok(())
}

#[tokio::test]
async fn patch_with_store_side_changes_returns_full_document() -> Result<()> {
    let server = TestServer::spawn_with(jsonapi_handler::database::MemoryStore::new().with_timestamps()).await?;
    let id = server.create("widgets", json!({ "name": "Foo" })).await?;

    let (status, body) = server
        .patch(
            &format!("/widgets/{}", id),
            json!({ "data": { "type": "widgets", "id": id, "attributes": { "name": "Bar" } } }),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["attributes"]["name"], "Bar");
    assert!(body["data"]["attributes"]["updated-at"].is_string());
    assert!(body["data"]["attributes"].get("updated_at").is_none());
    Ok(())
}

#[tokio::test]
async fn put_is_served_by_the_patch_operation() -> Result<()> {
    let server = TestServer::spawn().await?;
    let id = server.create("widgets", json!({ "name": "Foo" })).await?;

    let (status, _) = server
        .send(
            Method::PUT,
            &format!("/widgets/{}", id),
            Some(json!({ "data": { "type": "widgets", "id": id, "attributes": { "size": 3 } } })),
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = server.get(&format!("/widgets/{}", id)).await?;
    assert_eq!(body["data"]["attributes"], json!({ "name": "Foo", "size": 3 }));
    Ok(())
}

#[tokio::test]
async fn patch_requires_matching_id() -> Result<()> {
    let server = TestServer::spawn().await?;
    let id = server.create("widgets", json!({ "name": "Foo" })).await?;

    let (status, body) = server
        .patch(&format!("/widgets/{}", id), json!({ "data": { "type": "widgets", "attributes": { "name": "Bar" } } }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["title"], "\"id\" parameter not set in request.");

    let (status, _) = server
        .patch(&format!("/widgets/{}", id), json!({ "data": { "type": "widgets", "id": "2", "attributes": {} } }))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn delete_removes_the_record() -> Result<()> {
    let server = TestServer::spawn().await?;
    let id = server.create("widgets", json!({ "name": "Foo" })).await?;
    server.get(&format!("/widgets/{}", id)).await?;

    let (status, body) = server.delete(&format!("/widgets/{}", id)).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, _) = server.get(&format!("/widgets/{}", id)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = server.delete(&format!("/widgets/{}", id)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn validation_failures_render_one_entry_per_message() -> Result<()> {
    let server = TestServer::spawn().await?;

    let (status, body) = server
        .post("/widgets", json!({ "data": { "type": "widgets", "attributes": { "size": 0 } } }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "errors": [
                {
                    "status": "400",
                    "code": "1040",
                    "title": "Validation Fail",
                    "detail": "The name field is required.",
                    "meta": { "field": "name" }
                },
                {
                    "status": "400",
                    "code": "1040",
                    "title": "Validation Fail",
                    "detail": "The size must be at least 1.",
                    "meta": { "field": "size" }
                }
            ]
        })
    );

    let (_, body) = server.get("/widgets").await?;
    assert_eq!(body["data"], json!([]));
    Ok(())
}

#[tokio::test]
async fn update_rules_do_not_require_fields() -> Result<()> {
    let server = TestServer::spawn().await?;
    let id = server.create("widgets", json!({ "name": "Foo" })).await?;

    let (status, _) = server
        .patch(
            &format!("/widgets/{}", id),
            json!({ "data": { "type": "widgets", "id": id, "attributes": { "size": 2 } } }),
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = server
        .patch(
            &format!("/widgets/{}", id),
            json!({ "data": { "type": "widgets", "id": id, "attributes": { "size": "big" } } }),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["detail"], "The size must be an integer.");
    Ok(())
}

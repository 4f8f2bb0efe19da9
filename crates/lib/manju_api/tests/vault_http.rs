//! API key vault routes over the in-memory store.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

async fn add_key(app: &axum::Router, cookie: &str, id: &str, body: serde_json::Value) -> serde_json::Value {
    let resp = send(
        app,
        request("POST", &format!("/users/{id}/api-keys"), Some(cookie), Some(body)),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    json_body(resp).await
}

async fn list_keys(app: &axum::Router, cookie: &str, id: &str) -> Vec<serde_json::Value> {
    let resp = send(app, get(&format!("/users/{id}/api-keys"), Some(cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    json_body(resp).await.as_array().unwrap().clone()
}

#[tokio::test]
async fn first_key_is_default_and_masked() {
    let (app, _) = app();
    let cookie = login(&app, "ada").await;
    let id = user_id(&app, &cookie).await;

    let added = add_key(&app, &cookie, &id, json!({ "api_key": "sk-abcdefgh" })).await;
    assert_eq!(added["masked_key"], "sk-...efgh");
    assert_eq!(added["is_default"], true);
    assert_eq!(added["label"], "Default Key");
    assert_eq!(added["provider"], "openai");
    assert_eq!(added["user_id"], id.as_str());
    assert!(added.get("encrypted_key").is_none());

    let resp = send(&app, get(&format!("/users/{id}/api-keys/default"), Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["id"], added["id"]);
}

#[tokio::test]
async fn short_key_masks_to_sentinel_and_listing_hides_plaintext() {
    let (app, _) = app();
    let cookie = login(&app, "ada").await;
    let id = user_id(&app, &cookie).await;

    add_key(
        &app,
        &cookie,
        &id,
        json!({ "api_key": "sk-ab", "label": "tiny", "provider": "elevenlabs" }),
    )
    .await;
    let keys = list_keys(&app, &cookie, &id).await;
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["masked_key"], "****");
    assert_eq!(keys[0]["label"], "tiny");
    assert_eq!(keys[0]["provider"], "elevenlabs");
    assert!(!serde_json::to_string(&keys).unwrap().contains("sk-ab"));
}

#[tokio::test]
async fn exactly_one_default_after_each_add() {
    let (app, _) = app();
    let cookie = login(&app, "ada").await;
    let id = user_id(&app, &cookie).await;

    for i in 0..4 {
        add_key(&app, &cookie, &id, json!({ "api_key": format!("sk-key-number-{i}") })).await;
        let keys = list_keys(&app, &cookie, &id).await;
        assert_eq!(keys.iter().filter(|k| k["is_default"] == true).count(), 1);
    }
}

#[tokio::test]
async fn empty_or_malformed_body_is_bad_request() {
    let (app, _) = app();
    let cookie = login(&app, "ada").await;
    let id = user_id(&app, &cookie).await;

    let resp = send(
        &app,
        request("POST", &format!("/users/{id}/api-keys"), Some(&cookie), Some(json!({ "api_key": "" }))),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp).await["error"].is_string());

    let req = axum::http::Request::builder()
        .method("POST")
        .uri(format!("/users/{id}/api-keys"))
        .header(axum::http::header::COOKIE, &cookie)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let resp = send(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(json_body(resp).await["error"].is_string());
}

#[tokio::test]
async fn vault_requires_authentication() {
    let (app, _) = app();
    let resp = send(&app, get(&format!("/users/{}/api-keys", uuid::Uuid::new_v4()), None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn other_users_keys_are_forbidden() {
    let (app, _) = app();
    let ada = login(&app, "ada").await;
    let bob = login(&app, "bob").await;
    let ada_id = user_id(&app, &ada).await;

    let resp = send(&app, get(&format!("/users/{ada_id}/api-keys"), Some(&bob))).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(
        &app,
        request(
            "POST",
            &format!("/users/{ada_id}/api-keys"),
            Some(&bob),
            Some(json!({ "api_key": "sk-planted-key" })),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn non_uuid_ids_are_bad_request() {
    let (app, _) = app();
    let cookie = login(&app, "ada").await;
    let id = user_id(&app, &cookie).await;

    let resp = send(&app, get("/users/not-a-uuid/api-keys", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
        &app,
        request("DELETE", &format!("/users/{id}/api-keys/42"), Some(&cookie), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cross_tenant_delete_is_a_noop() {
    let (app, _) = app();
    let ada = login(&app, "ada").await;
    let bob = login(&app, "bob").await;
    let ada_id = user_id(&app, &ada).await;
    let bob_id = user_id(&app, &bob).await;

    let key = add_key(&app, &ada, &ada_id, json!({ "api_key": "sk-ada-secret-key" })).await;
    let key_id = key["id"].as_str().unwrap();

    let resp = send(
        &app,
        request("DELETE", &format!("/users/{bob_id}/api-keys/{key_id}"), Some(&bob), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(list_keys(&app, &ada, &ada_id).await.len(), 1);

    let resp = send(
        &app,
        request("DELETE", &format!("/users/{ada_id}/api-keys/{key_id}"), Some(&ada), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(list_keys(&app, &ada, &ada_id).await.is_empty());

    let resp = send(&app, get(&format!("/users/{ada_id}/api-keys/default"), Some(&ada))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn set_default_moves_flag() {
    let (app, _) = app();
    let cookie = login(&app, "ada").await;
    let id = user_id(&app, &cookie).await;
    add_key(&app, &cookie, &id, json!({ "api_key": "sk-first-key-0001" })).await;
    let second = add_key(&app, &cookie, &id, json!({ "api_key": "sk-second-key-0002" })).await;
    let second_id = second["id"].as_str().unwrap();

    let resp = send(
        &app,
        request("PUT", &format!("/users/{id}/api-keys/{second_id}/default"), Some(&cookie), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["message"], "default key updated");

    let keys = list_keys(&app, &cookie, &id).await;
    let defaults: Vec<_> = keys.iter().filter(|k| k["is_default"] == true).collect();
    assert_eq!(defaults.len(), 1);
    assert_eq!(defaults[0]["id"], second_id);
}

#[tokio::test]
async fn set_default_on_foreign_key_is_not_found() {
    let (app, _) = app();
    let ada = login(&app, "ada").await;
    let bob = login(&app, "bob").await;
    let ada_id = user_id(&app, &ada).await;
    let bob_id = user_id(&app, &bob).await;

    let ada_key = add_key(&app, &ada, &ada_id, json!({ "api_key": "sk-ada-secret-key" })).await;
    let bob_key = add_key(&app, &bob, &bob_id, json!({ "api_key": "sk-bob-secret-key" })).await;
    let bob_key_id = bob_key["id"].as_str().unwrap();

    let resp = send(
        &app,
        request("PUT", &format!("/users/{ada_id}/api-keys/{bob_key_id}/default"), Some(&ada), None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&app, get(&format!("/users/{ada_id}/api-keys/default"), Some(&ada))).await;
    assert_eq!(json_body(resp).await["id"], ada_key["id"]);
    let resp = send(&app, get(&format!("/users/{bob_id}/api-keys/default"), Some(&bob))).await;
    assert_eq!(json_body(resp).await["id"], bob_key["id"]);
}

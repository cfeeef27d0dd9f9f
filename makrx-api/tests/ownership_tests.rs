/// Visibility and ownership checks through the router
///
/// These tests require a running PostgreSQL database.
/// Run with: cargo test -p makrx-api --test ownership_tests -- --ignored

mod common;

use axum::http::StatusCode;
use common::{body_json, get, send_json, token, unique, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_private_project_is_hidden() {
    let app = TestApp::connected().await;
    let owner = token(&unique("maker"), &[]);
    let stranger = token(&unique("stranger"), &[]);

    let response = app
        .send(send_json("POST", "/api/v1/projects", &owner, json!({"name": "Desk lamp"})))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let project = body_json(response).await;
    assert_eq!(project["visibility"], "private");
    let uri = format!("/api/v1/projects/{}", project["id"].as_str().unwrap());

    let response = app.send(get(&uri, Some(&owner))).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Same answer as a project that does not exist
    let response = app.send(get(&uri, Some(&stranger))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app
        .send(get(&format!("/api/v1/projects/{}", Uuid::new_v4()), Some(&stranger)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(send_json("PUT", &uri, &stranger, json!({"name": "Mine now"})))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .send(send_json("PUT", &uri, &owner, json!({"visibility": "public"})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.send(get(&uri, Some(&stranger))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_notifications_are_private_to_their_recipient() {
    let app = TestApp::connected().await;
    let admin = token(&unique("admin"), &["admin"]);
    let recipient_id = unique("maker");
    let recipient = token(&recipient_id, &[]);
    let other = token(&unique("other"), &[]);

    let response = app
        .send(send_json(
            "POST",
            "/api/v1/notifications",
            &admin,
            json!({
                "user_ids": [recipient_id],
                "kind": "system_announcement",
                "vars": {"title": "Maintenance", "message": "Laser bay closed Friday"}
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.send(get("/api/v1/notifications", Some(&recipient))).await;
    let body = body_json(response).await;
    assert_eq!(body["items"][0]["title"], "Maintenance");
    let uri = format!("/api/v1/notifications/{}", body["items"][0]["id"].as_str().unwrap());

    let response = app.send(send_json("DELETE", &uri, &other, json!({}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = app
        .send(send_json("POST", &format!("{}/read", uri), &other, json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(send_json("DELETE", &uri, &recipient, json!({}))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = app.send(send_json("DELETE", &uri, &recipient, json!({}))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_service_status_for_unknown_store_order() {
    let app = TestApp::connected().await;
    let service = token("services-backend", &["service"]);

    let response = app
        .send(send_json(
            "POST",
            "/api/v1/integrations/service-orders/status",
            &service,
            json!({
                "store_order_id": Uuid::new_v4(),
                "service_order_id": Uuid::new_v4(),
                "status": "in_progress"
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_cart_cannot_exceed_stock() {
    let app = TestApp::connected().await;
    let admin = token(&unique("admin"), &["admin"]);
    let shopper = token(&unique("shopper"), &[]);
    let sku = unique("SKU");

    let response = app
        .send(send_json(
            "POST",
            "/api/v1/admin/products",
            &admin,
            json!({"sku": sku, "slug": sku.to_lowercase(), "name": "PETG spool",
                   "category": "filament", "price_cents": 1800, "stock_quantity": 3}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let product_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .send(send_json(
            "POST",
            "/api/v1/cart/items",
            &shopper,
            json!({"product_id": product_id, "quantity": 2}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(send_json(
            "POST",
            "/api/v1/cart/items",
            &shopper,
            json!({"product_id": product_id, "quantity": 2}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.send(get("/api/v1/cart", Some(&shopper))).await;
    assert_eq!(body_json(response).await["items"][0]["quantity"], 2);
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL database"]
async fn test_last_owner_cannot_leave_through_the_api() {
    let app = TestApp::connected().await;
    let owner_id = unique("owner");
    let owner = token(&owner_id, &["admin"]);

    let response = app
        .send(send_json(
            "POST",
            "/api/v1/makerspaces",
            &owner,
            json!({"slug": unique("cave"), "name": "Owner Test"}),
        ))
        .await;
    let makerspace_id = body_json(response).await["id"].as_str().unwrap().to_string();
    let member_uri = format!("/api/v1/makerspaces/{}/members/{}", makerspace_id, owner_id);

    let response = app.send(send_json("DELETE", &member_uri, &owner, json!({}))).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .send(send_json("PUT", &member_uri, &owner, json!({"role": "admin"})))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .send(get(&format!("/api/v1/makerspaces/{}/members", makerspace_id), Some(&owner)))
        .await;
    assert_eq!(body_json(response).await[0]["role"], "owner");
}

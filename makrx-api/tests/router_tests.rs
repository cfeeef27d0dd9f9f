/// Router contract tests
///
/// Every request here is answered before the handler touches the
/// database (auth, feature gates, validation, pure handlers), so the tests
/// run against a lazy pool without PostgreSQL.

mod common;

use axum::http::{header, StatusCode};
use common::{body_json, get, send_json, token, TestApp};
use serde_json::json;

#[tokio::test]
async fn test_liveness_is_public() {
    let app = TestApp::lazy();

    let response = app.send(get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_request_id_is_generated_and_echoed() {
    let app = TestApp::lazy();

    let response = app.send(get("/health", None)).await;
    let generated = response.headers().get("x-request-id");
    assert!(generated.is_some_and(|v| !v.is_empty()));

    let request = axum::http::Request::builder()
        .uri("/health")
        .header("x-request-id", "req-12345")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.headers()["x-request-id"], "req-12345");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = TestApp::lazy();

    let response = app.send(get("/api/v1/features", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_non_bearer_scheme_is_bad_request() {
    let app = TestApp::lazy();

    let request = axum::http::Request::builder()
        .uri("/api/v1/features")
        .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let app = TestApp::lazy();

    let claims = makrx_shared::auth::jwt::Claims::new("user-1", common::ISSUER, vec![]);
    let forged =
        makrx_shared::auth::jwt::create_token(&claims, "a-completely-different-secret-32-bytes").unwrap();

    let response = app.send(get("/api/v1/features", Some(&forged))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_features_are_evaluated_for_caller() {
    let app = TestApp::lazy()
        .with_flags(&[("service_marketplace", true), ("services.cnc_machining", false)])
        .await;

    let response = app.send(get("/api/v1/features", Some(&token("user-1", &[])))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service_marketplace"], true);
    assert_eq!(body["services.cnc_machining"], false);
}

#[tokio::test]
async fn test_marketplace_gate_blocks_services() {
    let app = TestApp::lazy().with_flags(&[("service_marketplace", false)]).await;

    let request = send_json(
        "POST",
        "/api/v1/services/quote",
        &token("user-1", &[]),
        json!({"service_type": "printing_3d", "material": "PLA", "quantity": 1, "volume_cm3": 10.0}),
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "feature_disabled");
}

#[tokio::test]
async fn test_service_type_flag_gates_quote() {
    let app = TestApp::lazy()
        .with_flags(&[("service_marketplace", true), ("services.laser_cutting", false)])
        .await;

    let request = send_json(
        "POST",
        "/api/v1/services/quote",
        &token("user-1", &[]),
        json!({"service_type": "laser_cutting", "material": "acrylic", "quantity": 1,
               "area_cm2": 50.0, "cut_length_cm": 60.0}),
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_quote_is_priced() {
    let app = TestApp::lazy()
        .with_flags(&[("service_marketplace", true), ("services.printing_3d", true)])
        .await;

    let request = send_json(
        "POST",
        "/api/v1/services/quote",
        &token("user-1", &[]),
        json!({"service_type": "printing_3d", "material": "PLA", "quantity": 2, "volume_cm3": 20.0}),
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_cents"], 1600);
    assert_eq!(body["setup_fee_cents"], 200);
    assert_eq!(body["rush_surcharge_cents"], 0);
}

#[tokio::test]
async fn test_quote_validation_errors() {
    let app = TestApp::lazy()
        .with_flags(&[("service_marketplace", true), ("services.printing_3d", true)])
        .await;
    let user = token("user-1", &[]);

    let zero_quantity = send_json(
        "POST",
        "/api/v1/services/quote",
        &user,
        json!({"service_type": "printing_3d", "material": "PLA", "quantity": 0, "volume_cm3": 20.0}),
    );
    let response = app.send(zero_quantity).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["field"], "quantity");

    let missing_volume = send_json(
        "POST",
        "/api/v1/services/quote",
        &user,
        json!({"service_type": "printing_3d", "material": "PLA", "quantity": 1}),
    );
    let response = app.send(missing_volume).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_oversized_quote_is_unprocessable() {
    let app = TestApp::lazy()
        .with_flags(&[("service_marketplace", true), ("services.printing_3d", true)])
        .await;

    let request = send_json(
        "POST",
        "/api/v1/services/quote",
        &token("user-1", &[]),
        json!({"service_type": "printing_3d", "material": "PLA", "quantity": 2,
               "volume_cm3": 1e17, "priority": "rush"}),
    );
    let response = app.send(request).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["details"][0]["field"], "volume_cm3");
}

#[tokio::test]
async fn test_admin_routes_require_admin_role() {
    let app = TestApp::lazy();
    let member = token("user-1", &["service_provider"]);

    let response = app.send(get("/api/v1/admin/features", Some(&member))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(send_json(
            "PUT",
            "/api/v1/admin/features/service_marketplace",
            &member,
            json!({"enabled": true}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(get(
            "/api/v1/dispatch/orders/00000000-0000-0000-0000-000000000001/candidates",
            Some(&member),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_makerspace_creation_requires_realm_admin() {
    let app = TestApp::lazy();

    let response = app
        .send(send_json(
            "POST",
            "/api/v1/makerspaces",
            &token("user-1", &[]),
            json!({"slug": "bengaluru", "name": "MakrCave Bengaluru"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_integration_endpoint_requires_service_role() {
    let app = TestApp::lazy();

    let response = app
        .send(send_json(
            "POST",
            "/api/v1/integrations/service-orders/status",
            &token("user-1", &[]),
            json!({
                "store_order_id": "00000000-0000-0000-0000-000000000001",
                "service_order_id": "00000000-0000-0000-0000-000000000002",
                "status": "accepted"
            }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bad_pagination_is_rejected() {
    let app = TestApp::lazy();

    let response = app
        .send(get("/api/v1/products?page=0", Some(&token("user-1", &[]))))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::lazy();
    let response = app.send(get("/nope", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

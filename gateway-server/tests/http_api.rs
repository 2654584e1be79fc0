//! End-to-end HTTP surface scenarios: health check, policy-gated order
//! simulation, subscription cap enforcement, and empty-symbol validation.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use gateway_core::{AppConfig, Mode};
use gateway_server::dispatch::http;
use gateway_server::lifecycle::Lifecycle;
use gateway_server::streaming;
use http_body_util::BodyExt;
use tower::ServiceExt;

fn app(mode: Mode, config: AppConfig) -> Router<()> {
    let lifecycle = Lifecycle::bootstrap(config, mode);
    Router::new()
        .nest("/api/v1", http::router())
        .route("/ws/quote/:subscription_id", get(streaming::upgrade))
        .with_state(lifecycle.state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn s1_mock_health_check_reports_ok() {
    let app = app(Mode::Mock, AppConfig::default());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = body_json(response).await;
    assert_eq!(value["status"], "healthy");
}

#[tokio::test]
async fn s3_policy_gate_simulates_order_in_dev_mode() {
    let app = app(Mode::Dev, AppConfig::default());

    let connect_response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/trading/connect")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"account_id":"test_account_001","password":"pw"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(connect_response.status(), StatusCode::OK);
    let connected = body_json(connect_response).await;
    let session_id = connected["session_id"].as_str().unwrap().to_string();

    let order_response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/trading/order/{session_id}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"stock_code":"000001.SZ","side":"BUY","order_type":"LIMIT","volume":100,"price":13.50}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(order_response.status(), StatusCode::OK);
    let order = body_json(order_response).await;
    assert_eq!(order["simulated"], true);
    assert!(order["order_id"].is_string());
}

#[tokio::test]
async fn s4_subscription_cap_rejects_the_fourth_of_four() {
    let mut config = AppConfig::default();
    config.upstream.caps.max_subs = 3;
    let app = app(Mode::Mock, config);

    let mut last_id = None;
    for (i, symbol) in ["A", "B", "C"].iter().enumerate() {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/data/subscription")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(r#"{{"symbols":["{symbol}"]}}"#)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "subscribe #{i} should succeed");
        let value = body_json(response).await;
        last_id = Some(value["subscription_id"].as_str().unwrap().to_string());
    }

    let fourth = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/data/subscription")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"symbols":["D"]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(fourth.status(), StatusCode::CONFLICT);

    let unsub = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/data/subscription/{}", last_id.unwrap()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unsub.status(), StatusCode::OK);

    let fifth = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/data/subscription")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"symbols":["E"]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(fifth.status(), StatusCode::OK);
}

#[tokio::test]
async fn s5_empty_symbols_returns_422_with_taxonomy_code() {
    let app = app(Mode::Mock, AppConfig::default());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/data/subscription")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"symbols":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let value = body_json(response).await;
    assert_eq!(value["code"], "EMPTY_SYMBOLS");
}

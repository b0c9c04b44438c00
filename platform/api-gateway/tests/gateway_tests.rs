use api_gateway::config::ServiceRoute;
use api_gateway::{router, AppState};
use axum::body::{Body, Bytes};
use axum::extract::{Path, RawQuery};
use axum::http::{Method, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tower::ServiceExt;

/// A stand-in order service on a random local port
async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route(
            "/api/orders",
            post(|body: Bytes| async move {
                let order: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                (StatusCode::CREATED, Json(json!({ "data": order })))
            }),
        )
        .route(
            "/api/orders/{id}",
            get(|Path(id): Path<String>, RawQuery(query): RawQuery| async move {
                if id == "404" {
                    return (StatusCode::NOT_FOUND, Json(json!({"error": "Order not found"})));
                }
                (StatusCode::OK, Json(json!({ "data": {"id": id, "query": query} })))
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An address nothing listens on
async fn dead_address() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn gateway(orders: SocketAddr) -> Router {
    let routes = vec![
        ServiceRoute {
            name: "orders",
            prefix: "/api/orders",
            base_url: format!("http://{orders}"),
        },
        ServiceRoute {
            name: "menus",
            prefix: "/api/menus",
            base_url: "http://127.0.0.1:9".to_string(),
        },
    ];
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    router(AppState::new(client, routes))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_forwards_body_and_relays_status() {
    let app = gateway(spawn_upstream().await);

    let (status, body) = send(
        app,
        Method::POST,
        "/api/orders",
        Some(json!({"user_id": "u1", "items": []})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, json!({"data": {"user_id": "u1", "items": []}}));
}

#[tokio::test]
async fn test_forwards_path_and_query() {
    let app = gateway(spawn_upstream().await);

    let (status, body) = send(app, Method::GET, "/api/orders/12?expand=items", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], "12");
    assert_eq!(body["data"]["query"], "expand=items");
}

#[tokio::test]
async fn test_upstream_errors_pass_through() {
    let app = gateway(spawn_upstream().await);

    let (status, body) = send(app, Method::GET, "/api/orders/404", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Order not found"}));
}

#[tokio::test]
async fn test_unreachable_upstream_is_503() {
    let app = gateway(dead_address().await);

    let (status, body) = send(app, Method::GET, "/api/orders/12", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Service Unavailable");
    assert_eq!(body["message"], "The requested service is not available");
}

#[tokio::test]
async fn test_index_and_health() {
    let app = gateway(dead_address().await);

    let (status, body) = send(app.clone(), Method::GET, "/api", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["orders"], "/api/orders");
    assert_eq!(body["endpoints"]["menus"], "/api/menus");

    let (status, body) = send(app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "api-gateway");
}

#[tokio::test]
async fn test_unrouted_prefix_is_404() {
    let app = gateway(dead_address().await);

    let (status, _) = send(app, Method::GET, "/api/payments/1", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

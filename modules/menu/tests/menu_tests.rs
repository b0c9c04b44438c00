use axum::body::Body;
use axum::http::{Request, StatusCode};
use event_bus::{
    Connector, Delivery, Domain, EventBus, EventEnvelope, EventPublisher, InMemoryBroker,
    MessagingClient,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use http_body_util::BodyExt;
use menu_rs::repo::InMemoryMenuRepo;
use menu_rs::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    broker: InMemoryBroker,
    app: axum::Router,
    events: BoxStream<'static, Delivery>,
    _observer: Arc<dyn EventBus>,
}

impl Harness {
    async fn new() -> Self {
        let broker = InMemoryBroker::new();
        let client = MessagingClient::new(
            Domain::Menu,
            Arc::new(broker.clone()),
            Duration::from_millis(20),
        );
        client.connect().await.unwrap();

        let observer = broker.connect().await.unwrap();
        observer.declare_queue("test_menu_events").await.unwrap();
        observer
            .bind_queue("test_menu_events", "menu_events", "menu.item.*")
            .await
            .unwrap();
        let events = observer.consume("test_menu_events", "test").await.unwrap();

        let app = router(AppState {
            repo: Arc::new(InMemoryMenuRepo::new()),
            publisher: EventPublisher::new(client),
        });

        Self {
            broker,
            app,
            events,
            _observer: observer,
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn next_event(&mut self) -> EventEnvelope {
        let delivery = tokio::time::timeout(Duration::from_secs(1), self.events.next())
            .await
            .expect("no event published")
            .expect("stream ended");
        delivery.ack().await.unwrap();
        EventEnvelope::from_bytes(&delivery.payload).unwrap()
    }

    async fn create(&mut self, name: &str, category: &str, available: bool) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/api/menus",
                Some(json!({
                    "restaurantId": "r1",
                    "name": name,
                    "category": category,
                    "price": 8.0,
                    "is_available": available
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        self.next_event().await;
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_create_publishes_menu_item_created() {
    let mut h = Harness::new().await;

    let (status, body) = h
        .send(
            "POST",
            "/api/menus",
            Some(json!({"restaurantId": "r1", "name": "Bruschetta", "category": "appetizer", "price": 5.5})),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["preparation_time"], 15);
    assert_eq!(body["data"]["is_available"], true);

    let event = h.next_event().await;
    assert_eq!(event.event_type, "menu.item.created");
    assert_eq!(event.service, "menu-service");
    assert_eq!(event.data["id"], body["data"]["id"]);
}

#[tokio::test]
async fn test_create_rejects_invalid_category() {
    let h = Harness::new().await;

    let (status, body) = h
        .send(
            "POST",
            "/api/menus",
            Some(json!({"restaurantId": "r1", "name": "Soup", "category": "soup", "price": 3.0})),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("category 'soup'"));
    assert_eq!(h.broker.queue_depth("test_menu_events"), 0);
}

#[tokio::test]
async fn test_list_sorted_and_filtered() {
    let mut h = Harness::new().await;
    h.create("Tiramisu", "dessert", true).await;
    h.create("Calamari", "appetizer", true).await;
    h.create("Bruschetta", "appetizer", false).await;

    let (_, body) = h.send("GET", "/api/menus/restaurant/r1", None).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Bruschetta", "Calamari", "Tiramisu"]);

    let (_, body) = h
        .send("GET", "/api/menus/restaurant/r1?category=appetizer&available=true", None)
        .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["name"], "Calamari");

    let (status, _) = h
        .send("GET", "/api/menus/restaurant/r1?category=brunch", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = h.send("GET", "/api/menus/restaurant/other", None).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_update_and_delete_publish() {
    let mut h = Harness::new().await;
    let id = h.create("Lasagna", "main_course", true).await;

    let (status, body) = h
        .send("PUT", &format!("/api/menus/{id}"), Some(json!({"price": 12.0})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["price"], 12.0);
    assert_eq!(body["data"]["name"], "Lasagna");
    assert_eq!(h.next_event().await.event_type, "menu.item.updated");

    let (status, body) = h.send("DELETE", &format!("/api/menus/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Menu item deleted successfully");

    let event = h.next_event().await;
    assert_eq!(event.event_type, "menu.item.deleted");
    assert_eq!(event.data, json!({ "id": id }));

    let (status, body) = h.send("GET", &format!("/api/menus/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Menu item not found"}));
}

#[tokio::test]
async fn test_update_rejects_negative_price() {
    let mut h = Harness::new().await;
    let id = h.create("Lasagna", "main_course", true).await;

    let (status, _) = h
        .send("PUT", &format!("/api/menus/{id}"), Some(json!({"price": -2.0})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.broker.queue_depth("test_menu_events"), 0);
}

#[tokio::test]
async fn test_mutations_succeed_while_broker_is_down() {
    let broker = InMemoryBroker::new();
    broker.set_available(false);
    let client = MessagingClient::new(
        Domain::Menu,
        Arc::new(broker.clone()),
        Duration::from_millis(20),
    );
    let app = router(AppState {
        repo: Arc::new(InMemoryMenuRepo::new()),
        publisher: EventPublisher::new(client),
    });

    let request = Request::builder()
        .method("POST")
        .uri("/api/menus")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"restaurantId": "r1", "name": "Cola", "category": "beverage", "price": 2.0})
                .to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

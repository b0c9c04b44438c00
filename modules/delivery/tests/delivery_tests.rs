use axum::body::Body;
use axum::http::{Request, StatusCode};
use delivery_rs::events::{ReadyOrderHandler, DEFAULT_RESTAURANT_ADDRESS};
use delivery_rs::repo::{DeliveryRepo, InMemoryDeliveryRepo};
use delivery_rs::{router, AppState};
use event_bus::topology::{delivery_order_events, rating_delivery_events};
use event_bus::{
    Connector, Delivery, Domain, EventBus, EventEnvelope, EventPublisher, InMemoryBroker,
    MessagingClient, Reaction, ReactionHandler,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    broker: InMemoryBroker,
    client: Arc<MessagingClient>,
    repo: Arc<InMemoryDeliveryRepo>,
    publisher: EventPublisher,
    events: BoxStream<'static, Delivery>,
    _observer: Arc<dyn EventBus>,
}

impl Harness {
    async fn new() -> Self {
        let broker = InMemoryBroker::new();
        let client = MessagingClient::new(
            Domain::Delivery,
            Arc::new(broker.clone()),
            Duration::from_millis(20),
        );
        client.connect().await.unwrap();

        let observer = broker.connect().await.unwrap();
        observer.declare_queue("test_delivery_events").await.unwrap();
        observer
            .bind_queue("test_delivery_events", "delivery_events", "delivery.#")
            .await
            .unwrap();
        let events = observer.consume("test_delivery_events", "test").await.unwrap();

        Self {
            broker,
            repo: Arc::new(InMemoryDeliveryRepo::new()),
            publisher: EventPublisher::new(client.clone()),
            client,
            events,
            _observer: observer,
        }
    }

    fn app(&self) -> axum::Router {
        router(AppState {
            repo: self.repo.clone(),
            publisher: self.publisher.clone(),
        })
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

        let response = self.app().oneshot(request).await.unwrap();
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

    async fn create(&mut self, order_id: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/api/deliveries",
                Some(json!({
                    "orderId": order_id,
                    "restaurantAddress": "1 Main St",
                    "deliveryAddress": "9 Elm St"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(self.next_event().await.event_type, "delivery.created");
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

fn order_ready(id: i64) -> EventEnvelope {
    EventEnvelope::new(
        "order.ready",
        json!({
            "id": id,
            "user_id": "user-1",
            "restaurant_id": 3,
            "delivery_address": "9 Elm St",
            "status": "ready"
        }),
        "order-service",
    )
}

#[tokio::test]
async fn test_ready_order_creates_pending_delivery() {
    let mut h = Harness::new().await;
    let handler = ReadyOrderHandler::new(h.repo.clone(), h.publisher.clone());

    let reaction = handler.handle(&order_ready(12)).await.unwrap();
    assert_eq!(reaction, Reaction::Applied);

    let delivery = h.repo.find_by_order("12").await.unwrap().unwrap();
    assert_eq!(delivery.restaurant_address, DEFAULT_RESTAURANT_ADDRESS);
    assert_eq!(delivery.delivery_address, "9 Elm St");

    let event = h.next_event().await;
    assert_eq!(event.event_type, "delivery.created");
    assert_eq!(event.service, "delivery-service");
    assert_eq!(event.data["orderId"], "12");
    assert_eq!(event.data["status"], "pending");
    assert_eq!(event.data["id"], delivery.id.to_string());
}

#[tokio::test]
async fn test_ready_order_with_text_id() {
    let mut h = Harness::new().await;
    let handler = ReadyOrderHandler::new(h.repo.clone(), h.publisher.clone());
    let envelope = EventEnvelope::new(
        "order.ready",
        json!({"id": "o1", "delivery_address": "123 Main St"}),
        "order-service",
    );

    assert_eq!(handler.handle(&envelope).await.unwrap(), Reaction::Applied);

    let delivery = h.repo.find_by_order("o1").await.unwrap().unwrap();
    assert_eq!(delivery.order_id, "o1");
    assert_eq!(delivery.delivery_address, "123 Main St");

    let event = h.next_event().await;
    assert_eq!(event.event_type, "delivery.created");
    assert_eq!(event.data["orderId"], "o1");
    assert_eq!(event.data["status"], "pending");
    assert_eq!(event.data, serde_json::to_value(&delivery).unwrap());
}

#[tokio::test]
async fn test_redelivered_ready_order_is_duplicate() {
    let mut h = Harness::new().await;
    let handler = ReadyOrderHandler::new(h.repo.clone(), h.publisher.clone());

    assert_eq!(handler.handle(&order_ready(12)).await.unwrap(), Reaction::Applied);
    h.next_event().await;

    assert_eq!(handler.handle(&order_ready(12)).await.unwrap(), Reaction::Duplicate);
    assert_eq!(h.repo.len(), 1);
    assert_eq!(h.broker.queue_depth("test_delivery_events"), 0);
}

#[tokio::test]
async fn test_order_ready_twice_through_broker_yields_one_delivery() {
    let mut h = Harness::new().await;
    h.client
        .subscribe(
            delivery_order_events(),
            Arc::new(ReadyOrderHandler::new(h.repo.clone(), h.publisher.clone())),
        )
        .await
        .unwrap();

    let order_service = MessagingClient::new(
        Domain::Order,
        Arc::new(h.broker.clone()),
        Duration::from_millis(20),
    );
    order_service.connect().await.unwrap();
    let orders = EventPublisher::new(order_service);

    let ready = json!({"id": 5, "delivery_address": "9 Elm St", "status": "ready"});
    orders.try_publish("order.ready", &ready).await.unwrap();
    orders.try_publish("order.ready", &ready).await.unwrap();
    // Not bound: never reaches the delivery queue
    orders.try_publish("order.created", &ready).await.unwrap();

    let event = h.next_event().await;
    assert_eq!(event.event_type, "delivery.created");
    assert_eq!(event.data["orderId"], "5");

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if h.broker.queue_depth("delivery_order_events") == 0 && h.broker.unacked_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("order events were not consumed");

    assert_eq!(h.repo.len(), 1);
    assert_eq!(h.broker.queue_depth("test_delivery_events"), 0);
}

#[tokio::test]
async fn test_post_duplicate_order_is_409() {
    let mut h = Harness::new().await;
    h.create("7").await;

    let (status, body) = h
        .send(
            "POST",
            "/api/deliveries",
            Some(json!({"orderId": "7", "restaurantAddress": "a", "deliveryAddress": "b"})),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({"error": "Delivery already exists for this order"}));
    assert_eq!(h.broker.queue_depth("test_delivery_events"), 0);
}

#[tokio::test]
async fn test_status_change_publishes_once() {
    let mut h = Harness::new().await;
    let id = h.create("7").await;

    let (status, body) = h
        .send(
            "PUT",
            &format!("/api/deliveries/{id}"),
            Some(json!({"status": "assigned", "driverName": "Sam"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["driverName"], "Sam");
    let event = h.next_event().await;
    assert_eq!(event.event_type, "delivery.assigned");
    assert_eq!(event.data["driverName"], "Sam");

    // Same status again, or no status at all: no event
    h.send("PUT", &format!("/api/deliveries/{id}"), Some(json!({"status": "assigned"})))
        .await;
    h.send("PUT", &format!("/api/deliveries/{id}"), Some(json!({"notes": "gate code 42"})))
        .await;
    assert_eq!(h.broker.queue_depth("test_delivery_events"), 0);
}

#[tokio::test]
async fn test_delivered_stamps_time_and_reaches_rating_queue() {
    let mut h = Harness::new().await;
    let rating_side = h.broker.connect().await.unwrap();
    let mut delivered = rating_delivery_events()
        .bind(rating_side.as_ref())
        .await
        .unwrap();
    let id = h.create("7").await;

    let (_, body) = h
        .send("PUT", &format!("/api/deliveries/{id}"), Some(json!({"status": "delivered"})))
        .await;
    assert!(body["data"]["actualDeliveryTime"].is_string());
    assert_eq!(h.next_event().await.event_type, "delivery.delivered");

    let message = tokio::time::timeout(Duration::from_secs(1), delivered.next())
        .await
        .unwrap()
        .unwrap();
    let envelope = EventEnvelope::from_bytes(&message.payload).unwrap();
    assert_eq!(envelope.event_type, "delivery.delivered");
    message.ack().await.unwrap();

    // delivery.created was not bound for the rating service
    assert_eq!(h.broker.queue_depth("rating_delivery_events"), 0);
}

#[tokio::test]
async fn test_invalid_status_is_400() {
    let mut h = Harness::new().await;
    let id = h.create("7").await;

    let (status, _) = h
        .send("PUT", &format!("/api/deliveries/{id}"), Some(json!({"status": "lost"})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_location_update_event_shape() {
    let mut h = Harness::new().await;
    let id = h.create("7").await;

    let (status, body) = h
        .send(
            "PUT",
            &format!("/api/deliveries/{id}/location"),
            Some(json!({"latitude": 40.7, "longitude": -74.0})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currentLocation"]["latitude"], 40.7);

    let event = h.next_event().await;
    assert_eq!(event.event_type, "delivery.location.updated");
    assert_eq!(
        event.data,
        json!({
            "deliveryId": id,
            "orderId": "7",
            "location": {"latitude": 40.7, "longitude": -74.0}
        })
    );
}

#[tokio::test]
async fn test_lookup_by_order_and_missing() {
    let mut h = Harness::new().await;
    let id = h.create("7").await;

    let (status, body) = h.send("GET", "/api/deliveries/order/7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);

    let (status, body) = h.send("GET", "/api/deliveries/order/8", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Delivery not found"}));
}

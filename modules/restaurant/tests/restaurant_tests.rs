use axum::body::Body;
use axum::http::{Request, StatusCode};
use event_bus::topology::restaurant_rating_events;
use event_bus::{
    Connector, Delivery, Domain, EventBus, EventEnvelope, EventPublisher, InMemoryBroker,
    MessagingClient, Reaction, ReactionHandler,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use http_body_util::BodyExt;
use restaurant_rs::events::RatingAverageHandler;
use restaurant_rs::models::NewRestaurant;
use restaurant_rs::repo::{InMemoryRestaurantRepo, RestaurantRepo};
use restaurant_rs::{router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    broker: InMemoryBroker,
    repo: Arc<InMemoryRestaurantRepo>,
    publisher: EventPublisher,
    client: Arc<MessagingClient>,
    events: BoxStream<'static, Delivery>,
    _observer: Arc<dyn EventBus>,
}

impl Harness {
    async fn new() -> Self {
        let broker = InMemoryBroker::new();
        let client = MessagingClient::new(
            Domain::Restaurant,
            Arc::new(broker.clone()),
            Duration::from_millis(20),
        );
        client.connect().await.unwrap();

        // Sees everything the restaurant service publishes
        let observer = broker.connect().await.unwrap();
        observer.declare_queue("test_restaurant_events").await.unwrap();
        observer
            .bind_queue("test_restaurant_events", "restaurant_events", "#")
            .await
            .unwrap();
        let events = observer.consume("test_restaurant_events", "test").await.unwrap();

        Self {
            broker,
            repo: Arc::new(InMemoryRestaurantRepo::new()),
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

    async fn next_event(&mut self) -> EventEnvelope {
        let delivery = tokio::time::timeout(Duration::from_secs(1), self.events.next())
            .await
            .expect("no event published")
            .expect("stream ended");
        delivery.ack().await.unwrap();
        EventEnvelope::from_bytes(&delivery.payload).unwrap()
    }

    async fn seed(&self, name: &str, cuisine_type: &str) -> i32 {
        self.repo
            .create(&NewRestaurant {
                name: name.to_string(),
                address: "1 Main St".to_string(),
                cuisine_type: Some(cuisine_type.to_string()),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }
}

async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
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
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn rating_average(restaurant_id: Value, average: f64) -> EventEnvelope {
    EventEnvelope::new(
        "rating.average.updated",
        json!({ "restaurantId": restaurant_id, "averageRating": average }),
        "rating-service",
    )
}

#[tokio::test]
async fn test_create_restaurant_publishes_created() {
    let mut h = Harness::new().await;

    let (status, body) = send(
        h.app(),
        "POST",
        "/api/restaurants",
        Some(json!({"name": "Luigi's", "address": "1 Main St", "cuisine_type": "italian"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "Luigi's");
    assert_eq!(body["data"]["rating"], 0.0);
    assert_eq!(body["data"]["is_active"], true);

    let event = h.next_event().await;
    assert_eq!(event.event_type, "restaurant.created");
    assert_eq!(event.service, "restaurant-service");
    assert_eq!(event.data["name"], "Luigi's");
}

#[tokio::test]
async fn test_create_restaurant_requires_address() {
    let h = Harness::new().await;

    let (status, body) = send(h.app(), "POST", "/api/restaurants", Some(json!({"name": "Luigi's"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "address is required"}));
    assert_eq!(h.broker.queue_depth("test_restaurant_events"), 0);
}

#[tokio::test]
async fn test_unknown_restaurant_is_404() {
    let h = Harness::new().await;

    let (status, body) = send(h.app(), "GET", "/api/restaurants/999", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Restaurant not found"}));
}

#[tokio::test]
async fn test_delete_is_soft() {
    let mut h = Harness::new().await;
    let id = h.seed("Luigi's", "italian").await;

    let (status, body) = send(h.app(), "DELETE", &format!("/api/restaurants/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Restaurant deleted successfully");

    let event = h.next_event().await;
    assert_eq!(event.event_type, "restaurant.deleted");
    assert_eq!(event.data, json!({"id": id}));

    let (_, list) = send(h.app(), "GET", "/api/restaurants", None).await;
    assert_eq!(list["count"], 0);

    let (status, body) = send(h.app(), "GET", &format!("/api/restaurants/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);
}

#[tokio::test]
async fn test_update_is_partial() {
    let mut h = Harness::new().await;
    let id = h.seed("Luigi's", "italian").await;

    let (status, body) = send(
        h.app(),
        "PUT",
        &format!("/api/restaurants/{id}"),
        Some(json!({"phone": "555-0100"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phone"], "555-0100");
    assert_eq!(body["data"]["name"], "Luigi's");
    assert_eq!(h.next_event().await.event_type, "restaurant.updated");
}

#[tokio::test]
async fn test_search_orders_by_rating_then_name() {
    let h = Harness::new().await;
    let pasta = h.seed("Pasta Place", "italian").await;
    let bella = h.seed("Bella", "italian").await;
    h.seed("Taqueria", "mexican").await;
    h.repo.set_rating(pasta, 4.8).await.unwrap();
    h.repo.set_rating(bella, 3.9).await.unwrap();

    let (_, body) = send(h.app(), "GET", "/api/restaurants/search?cuisine_type=italian", None).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Pasta Place", "Bella"]);

    let (_, body) = send(h.app(), "GET", "/api/restaurants/search?q=TAQ", None).await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_rating_average_updates_restaurant() {
    let mut h = Harness::new().await;
    let id = h.seed("Luigi's", "italian").await;
    let handler = RatingAverageHandler::new(h.repo.clone(), h.publisher.clone());

    let reaction = handler
        .handle(&rating_average(json!(id.to_string()), 4.33))
        .await
        .unwrap();
    assert_eq!(reaction, Reaction::Applied);
    assert_eq!(h.repo.find(id).await.unwrap().unwrap().rating, 4.33);

    let event = h.next_event().await;
    assert_eq!(event.event_type, "restaurant.updated");
    assert_eq!(event.data["rating"], 4.33);

    // Redelivery of the same average
    let reaction = handler
        .handle(&rating_average(json!(id), 4.33))
        .await
        .unwrap();
    assert_eq!(reaction, Reaction::Duplicate);
}

#[tokio::test]
async fn test_later_average_overwrites_earlier() {
    let h = Harness::new().await;
    let id = h.seed("Luigi's", "italian").await;
    let handler = RatingAverageHandler::new(h.repo.clone(), h.publisher.clone());

    // Averages handled out of publish order: the one handled last is kept
    handler.handle(&rating_average(json!(id), 4.5)).await.unwrap();
    handler.handle(&rating_average(json!(id), 4.0)).await.unwrap();

    assert_eq!(h.repo.find(id).await.unwrap().unwrap().rating, 4.0);
}

#[tokio::test]
async fn test_rating_average_for_unknown_restaurant_is_ignored() {
    let h = Harness::new().await;
    let handler = RatingAverageHandler::new(h.repo.clone(), h.publisher.clone());

    let reaction = handler.handle(&rating_average(json!("42"), 3.0)).await.unwrap();

    assert_eq!(reaction, Reaction::Ignored);
    assert_eq!(h.broker.queue_depth("test_restaurant_events"), 0);
}

#[tokio::test]
async fn test_rating_event_flows_through_subscription() {
    let h = Harness::new().await;
    let id = h.seed("Luigi's", "italian").await;

    h.client
        .subscribe(
            restaurant_rating_events(),
            Arc::new(RatingAverageHandler::new(h.repo.clone(), h.publisher.clone())),
        )
        .await
        .unwrap();

    let rating_service = MessagingClient::new(
        Domain::Rating,
        Arc::new(h.broker.clone()),
        Duration::from_millis(20),
    );
    rating_service.connect().await.unwrap();
    EventPublisher::new(rating_service)
        .try_publish(
            "rating.average.updated",
            &json!({"restaurantId": id.to_string(), "averageRating": 4.0}),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if h.repo.find(id).await.unwrap().unwrap().rating == 4.0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("rating never applied");
}

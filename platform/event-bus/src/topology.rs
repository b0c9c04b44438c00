//! Broker topology shared by every service
//!
//! Each owning domain publishes to exactly one durable topic exchange named
//! `{domain}_events`. Consumers declare one durable queue per concern, named
//! `{consumer}_{concern}_events`, and bind it to the producer's exchange.
//! Routing keys are event types verbatim.

use std::fmt;

use crate::{BusError, BusResult, Subscription};

/// An owning domain, i.e. one deployable service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Restaurant,
    Menu,
    Order,
    Delivery,
    Rating,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Restaurant,
        Domain::Menu,
        Domain::Order,
        Domain::Delivery,
        Domain::Rating,
    ];

    /// Event type prefix (`order` in `order.ready`)
    pub fn prefix(self) -> &'static str {
        match self {
            Domain::Restaurant => "restaurant",
            Domain::Menu => "menu",
            Domain::Order => "order",
            Domain::Delivery => "delivery",
            Domain::Rating => "rating",
        }
    }

    /// The exchange this domain publishes to
    pub fn exchange(self) -> &'static str {
        match self {
            Domain::Restaurant => "restaurant_events",
            Domain::Menu => "menu_events",
            Domain::Order => "order_events",
            Domain::Delivery => "delivery_events",
            Domain::Rating => "rating_events",
        }
    }

    /// Value of the envelope's `service` field
    pub fn service_name(self) -> &'static str {
        match self {
            Domain::Restaurant => "restaurant-service",
            Domain::Menu => "menu-service",
            Domain::Order => "order-service",
            Domain::Delivery => "delivery-service",
            Domain::Rating => "rating-service",
        }
    }

    /// Name of the queue `self` consumes `source`'s events through
    pub fn queue_for(self, source: Domain) -> String {
        queue_name(self.prefix(), source.prefix())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// `{consumer}_{concern}_events`
pub fn queue_name(consumer: &str, concern: &str) -> String {
    format!("{consumer}_{concern}_events")
}

// ============================================================================
// CANONICAL BINDINGS
// ============================================================================

/// Delivery service: create a delivery once an order is ready
pub fn delivery_order_events() -> Subscription {
    Subscription::new(
        Domain::Delivery.queue_for(Domain::Order),
        Domain::Order.exchange(),
        "order.ready",
    )
}

/// Order service: every delivery event
pub fn order_delivery_events() -> Subscription {
    Subscription::new(
        Domain::Order.queue_for(Domain::Delivery),
        Domain::Delivery.exchange(),
        "delivery.#",
    )
}

/// Rating service: completed deliveries
pub fn rating_delivery_events() -> Subscription {
    Subscription::new(
        Domain::Rating.queue_for(Domain::Delivery),
        Domain::Delivery.exchange(),
        "delivery.delivered",
    )
}

/// Restaurant service: average rating changes
pub fn restaurant_rating_events() -> Subscription {
    Subscription::new(
        Domain::Restaurant.queue_for(Domain::Rating),
        Domain::Rating.exchange(),
        "rating.average.updated",
    )
}

// ============================================================================
// TOPIC MATCHING
// ============================================================================

/// Check if a routing key matches a binding pattern
///
/// AMQP topic rules, `.` separated:
/// - `*` matches exactly one segment
/// - `#` matches zero or more segments
///
/// # Examples
/// - `delivery.#` matches `delivery`, `delivery.created` and `delivery.location.updated`
/// - `order.*` matches `order.ready` but not `order.item.added`
/// - `*.ready` does NOT match `ready`
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_segments(&pattern, &key)
}

fn match_segments(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            // Either `#` swallows nothing, or it swallows one key segment and stays
            match_segments(rest, key) || (!key.is_empty() && match_segments(pattern, &key[1..]))
        }
        (Some((&"*", rest)), Some((_, key_rest))) => match_segments(rest, key_rest),
        (Some((word, rest)), Some((segment, key_rest))) if word == segment => {
            match_segments(rest, key_rest)
        }
        _ => false,
    }
}

/// A routing key is a non-empty, dot-separated list of non-empty literal segments
pub fn validate_routing_key(routing_key: &str) -> BusResult<()> {
    if routing_key.is_empty() {
        return Err(BusError::InvalidTopic("routing key cannot be empty".to_string()));
    }
    for segment in routing_key.split('.') {
        if segment.is_empty() {
            return Err(BusError::InvalidTopic(format!(
                "routing key '{routing_key}' has an empty segment"
            )));
        }
        if segment.contains(['*', '#']) {
            return Err(BusError::InvalidTopic(format!(
                "routing key '{routing_key}' cannot contain wildcards"
            )));
        }
    }
    Ok(())
}

/// A pattern is like a routing key, but whole segments may be `*` or `#`
pub fn validate_pattern(pattern: &str) -> BusResult<()> {
    if pattern.is_empty() {
        return Err(BusError::InvalidTopic("pattern cannot be empty".to_string()));
    }
    for segment in pattern.split('.') {
        let wildcard = segment == "*" || segment == "#";
        if segment.is_empty() || (!wildcard && segment.contains(['*', '#'])) {
            return Err(BusError::InvalidTopic(format!(
                "pattern '{pattern}' has an invalid segment '{segment}'"
            )));
        }
    }
    Ok(())
}

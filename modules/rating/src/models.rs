use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

const MAX_COMMENT_CHARS: usize = 1000;

/// A rating; also the `data` of `rating.created`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: Uuid,
    pub user_id: String,
    pub order_id: String,
    pub restaurant_id: String,
    pub delivery_id: Option<String>,
    pub restaurant_rating: i32,
    pub delivery_rating: Option<i32>,
    pub food_quality: Option<i32>,
    pub delivery_speed: Option<i32>,
    pub comment: Option<String>,
    pub images: Vec<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/ratings`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRating {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub restaurant_id: String,
    pub delivery_id: Option<String>,
    pub restaurant_rating: Option<i32>,
    pub delivery_rating: Option<i32>,
    pub food_quality: Option<i32>,
    pub delivery_speed: Option<i32>,
    pub comment: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl NewRating {
    pub fn into_rating(self, id: Uuid, now: DateTime<Utc>) -> Result<Rating, String> {
        for (field, value) in [
            ("userId", &self.user_id),
            ("orderId", &self.order_id),
            ("restaurantId", &self.restaurant_id),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{field} is required"));
            }
        }

        let restaurant_rating = self
            .restaurant_rating
            .ok_or_else(|| "restaurantRating is required".to_string())?;
        check_score("restaurantRating", Some(restaurant_rating))?;
        check_score("deliveryRating", self.delivery_rating)?;
        check_score("foodQuality", self.food_quality)?;
        check_score("deliverySpeed", self.delivery_speed)?;

        if let Some(comment) = &self.comment {
            if comment.chars().count() > MAX_COMMENT_CHARS {
                return Err(format!("comment must be at most {MAX_COMMENT_CHARS} characters"));
            }
        }

        Ok(Rating {
            id,
            user_id: self.user_id,
            order_id: self.order_id,
            restaurant_id: self.restaurant_id,
            delivery_id: self.delivery_id,
            restaurant_rating,
            delivery_rating: self.delivery_rating,
            food_quality: self.food_quality,
            delivery_speed: self.delivery_speed,
            comment: self.comment,
            images: self.images,
            is_verified: false,
            created_at: now,
            updated_at: now,
        })
    }
}

fn check_score(field: &str, score: Option<i32>) -> Result<(), String> {
    match score {
        Some(s) if !(1..=5).contains(&s) => Err(format!("{field} must be between 1 and 5")),
        _ => Ok(()),
    }
}

// ============================================================================
// AVERAGES
// ============================================================================

/// Per-restaurant averages, two decimals
///
/// With no ratings only `average` (0) and `totalRatings` (0) are present.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_rating: Option<f64>,
    pub total_ratings: i64,
}

impl RatingSummary {
    pub fn empty() -> Self {
        Self {
            average: 0.0,
            food_quality: None,
            delivery_rating: None,
            total_ratings: 0,
        }
    }

    /// Build from raw averages; a sub-score nobody gave counts as 0
    pub fn from_averages(
        total_ratings: i64,
        average: Option<f64>,
        food_quality: Option<f64>,
        delivery_rating: Option<f64>,
    ) -> Self {
        if total_ratings == 0 {
            return Self::empty();
        }
        Self {
            average: round2(average.unwrap_or(0.0)),
            food_quality: Some(round2(food_quality.unwrap_or(0.0))),
            delivery_rating: Some(round2(delivery_rating.unwrap_or(0.0))),
            total_ratings,
        }
    }

    /// Averages over an in-memory set of ratings
    pub fn of(ratings: &[Rating]) -> Self {
        fn mean(values: impl Iterator<Item = i32>) -> Option<f64> {
            let (sum, n) = values.fold((0i64, 0i64), |(s, n), v| (s + i64::from(v), n + 1));
            (n > 0).then(|| sum as f64 / n as f64)
        }

        Self::from_averages(
            ratings.len() as i64,
            mean(ratings.iter().map(|r| r.restaurant_rating)),
            mean(ratings.iter().filter_map(|r| r.food_quality)),
            mean(ratings.iter().filter_map(|r| r.delivery_rating)),
        )
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// QUERIES
// ============================================================================

/// Sortable rating fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    RestaurantRating,
    DeliveryRating,
    FoodQuality,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::RestaurantRating => "restaurant_rating",
            SortField::DeliveryRating => "delivery_rating",
            SortField::FoodQuality => "food_quality",
        }
    }
}

/// `sort=createdAt` ascending, `sort=-createdAt` descending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingSort {
    pub field: SortField,
    pub descending: bool,
}

impl Default for RatingSort {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            descending: true,
        }
    }
}

impl RatingSort {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (descending, name) = match raw.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, raw),
        };
        let field = match name {
            "createdAt" => SortField::CreatedAt,
            "restaurantRating" => SortField::RestaurantRating,
            "deliveryRating" => SortField::DeliveryRating,
            "foodQuality" => SortField::FoodQuality,
            other => return Err(format!("cannot sort by '{other}'")),
        };
        Ok(Self { field, descending })
    }

    /// `ORDER BY` clause; built from the fixed field list only
    pub fn order_by(self) -> String {
        format!(
            "{} {} NULLS LAST, id ASC",
            self.field.column(),
            if self.descending { "DESC" } else { "ASC" }
        )
    }

    /// Same ordering for in-memory rows
    pub fn compare(self, a: &Rating, b: &Rating) -> Ordering {
        fn score(r: &Rating, field: SortField) -> Option<i32> {
            match field {
                SortField::RestaurantRating => Some(r.restaurant_rating),
                SortField::DeliveryRating => r.delivery_rating,
                SortField::FoodQuality => r.food_quality,
                SortField::CreatedAt => None,
            }
        }

        let ordering = match self.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            field => match (score(a, field), score(b, field)) {
                (Some(x), Some(y)) => x.cmp(&y),
                // Missing scores go last either way
                (Some(_), None) => return Ordering::Less,
                (None, Some(_)) => return Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        let ordering = if self.descending {
            ordering.reverse()
        } else {
            ordering
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    }
}

/// `GET /api/ratings/restaurant/{restaurantId}` paging and order
#[derive(Debug, Deserialize)]
pub struct RestaurantRatingsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub sort: Option<String>,
}

fn default_limit() -> i64 {
    10
}

/// `{ data, count, total }`: one page plus the size of the whole set
#[derive(Debug, Serialize)]
pub struct RatingPage {
    pub data: Vec<Rating>,
    pub count: usize,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rating(score: i32, food: Option<i32>) -> Rating {
        NewRating {
            user_id: "u1".into(),
            order_id: Uuid::new_v4().to_string(),
            restaurant_id: "r1".into(),
            restaurant_rating: Some(score),
            food_quality: food,
            ..Default::default()
        }
        .into_rating(Uuid::new_v4(), Utc::now())
        .unwrap()
    }

    #[test]
    fn test_average_of_five_four_three() {
        let summary = RatingSummary::of(&[rating(5, None), rating(4, None), rating(3, None)]);
        assert_eq!(summary.average, 4.0);
        assert_eq!(summary.total_ratings, 3);
        assert_eq!(summary.food_quality, Some(0.0));
    }

    #[test]
    fn test_average_rounds_to_two_decimals() {
        let summary = RatingSummary::of(&[rating(5, Some(4)), rating(4, Some(5)), rating(4, None)]);
        assert_eq!(summary.average, 4.33);
        assert_eq!(summary.food_quality, Some(4.5));
    }

    #[test]
    fn test_empty_summary_shape() {
        let value = serde_json::to_value(RatingSummary::of(&[])).unwrap();
        assert_eq!(value, json!({"average": 0.0, "totalRatings": 0}));
    }

    #[test]
    fn test_score_bounds_and_comment_length() {
        let base = || NewRating {
            user_id: "u1".into(),
            order_id: "o1".into(),
            restaurant_id: "r1".into(),
            restaurant_rating: Some(4),
            ..Default::default()
        };

        let err = NewRating {
            restaurant_rating: Some(6),
            ..base()
        }
        .into_rating(Uuid::new_v4(), Utc::now())
        .unwrap_err();
        assert_eq!(err, "restaurantRating must be between 1 and 5");

        let err = NewRating {
            delivery_speed: Some(0),
            ..base()
        }
        .into_rating(Uuid::new_v4(), Utc::now())
        .unwrap_err();
        assert_eq!(err, "deliverySpeed must be between 1 and 5");

        let long = NewRating {
            comment: Some("x".repeat(1001)),
            ..base()
        };
        assert!(long.into_rating(Uuid::new_v4(), Utc::now()).is_err());

        let fits = NewRating {
            comment: Some("é".repeat(1000)),
            ..base()
        };
        assert!(fits.into_rating(Uuid::new_v4(), Utc::now()).is_ok());
    }

    #[test]
    fn test_sort_whitelist() {
        assert_eq!(
            RatingSort::parse("-restaurantRating").unwrap(),
            RatingSort {
                field: SortField::RestaurantRating,
                descending: true
            }
        );
        assert_eq!(
            RatingSort::parse("createdAt").unwrap().order_by(),
            "created_at ASC NULLS LAST, id ASC"
        );
        assert!(RatingSort::parse("comment; DROP TABLE ratings").is_err());
    }
}

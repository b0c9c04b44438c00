use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Menu category enum matching database menu_category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "menu_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MenuCategory {
    Appetizer,
    MainCourse,
    Dessert,
    Beverage,
    SideDish,
    Other,
}

impl MenuCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            MenuCategory::Appetizer => "appetizer",
            MenuCategory::MainCourse => "main_course",
            MenuCategory::Dessert => "dessert",
            MenuCategory::Beverage => "beverage",
            MenuCategory::SideDish => "side_dish",
            MenuCategory::Other => "other",
        }
    }
}

impl fmt::Display for MenuCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MenuCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appetizer" => Ok(MenuCategory::Appetizer),
            "main_course" => Ok(MenuCategory::MainCourse),
            "dessert" => Ok(MenuCategory::Dessert),
            "beverage" => Ok(MenuCategory::Beverage),
            "side_dish" => Ok(MenuCategory::SideDish),
            "other" => Ok(MenuCategory::Other),
            other => Err(format!(
                "category '{other}' must be one of appetizer, main_course, dessert, beverage, side_dish, other"
            )),
        }
    }
}

/// A menu item; also the `data` of `menu.item.created` / `menu.item.updated`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MenuItem {
    pub id: Uuid,
    #[serde(rename = "restaurantId")]
    pub restaurant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: MenuCategory,
    pub price: f64,
    pub image_url: Option<String>,
    pub is_available: bool,
    pub is_vegetarian: bool,
    pub is_vegan: bool,
    pub allergens: Vec<String>,
    /// Minutes
    pub preparation_time: i32,
    pub calories: Option<i32>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/menus`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMenuItem {
    #[serde(rename = "restaurantId", default)]
    pub restaurant_id: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub is_available: Option<bool>,
    pub is_vegetarian: Option<bool>,
    pub is_vegan: Option<bool>,
    pub allergens: Option<Vec<String>>,
    pub preparation_time: Option<i32>,
    pub calories: Option<i32>,
}

impl NewMenuItem {
    /// Check required fields and build a full item with defaults applied
    pub fn into_item(self, id: Uuid, now: DateTime<Utc>) -> Result<MenuItem, String> {
        if self.restaurant_id.trim().is_empty() {
            return Err("restaurantId is required".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        let category: MenuCategory = self
            .category
            .as_deref()
            .ok_or_else(|| "category is required".to_string())?
            .parse()?;
        let price = self.price.ok_or_else(|| "price is required".to_string())?;
        validate_price(price)?;

        Ok(MenuItem {
            id,
            restaurant_id: self.restaurant_id,
            name: self.name,
            description: self.description,
            category,
            price,
            image_url: self.image_url,
            is_available: self.is_available.unwrap_or(true),
            is_vegetarian: self.is_vegetarian.unwrap_or(false),
            is_vegan: self.is_vegan.unwrap_or(false),
            allergens: self.allergens.unwrap_or_default(),
            preparation_time: self.preparation_time.unwrap_or(15),
            calories: self.calories,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Body of `PUT /api/menus/{id}`; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuItemUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub is_available: Option<bool>,
    pub is_vegetarian: Option<bool>,
    pub is_vegan: Option<bool>,
    pub allergens: Option<Vec<String>>,
    pub preparation_time: Option<i32>,
    pub calories: Option<i32>,
}

impl MenuItemUpdate {
    /// Validated category, if one was sent
    pub fn category(&self) -> Result<Option<MenuCategory>, String> {
        self.category.as_deref().map(str::parse).transpose()
    }

    pub fn validate(&self) -> Result<(), String> {
        self.category()?;
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err("name cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn apply(&self, item: &mut MenuItem) -> Result<(), String> {
        self.validate()?;
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(description) = &self.description {
            item.description = Some(description.clone());
        }
        if let Some(category) = self.category()? {
            item.category = category;
        }
        if let Some(price) = self.price {
            item.price = price;
        }
        if let Some(image_url) = &self.image_url {
            item.image_url = Some(image_url.clone());
        }
        if let Some(is_available) = self.is_available {
            item.is_available = is_available;
        }
        if let Some(is_vegetarian) = self.is_vegetarian {
            item.is_vegetarian = is_vegetarian;
        }
        if let Some(is_vegan) = self.is_vegan {
            item.is_vegan = is_vegan;
        }
        if let Some(allergens) = &self.allergens {
            item.allergens = allergens.clone();
        }
        if let Some(preparation_time) = self.preparation_time {
            item.preparation_time = preparation_time;
        }
        if let Some(calories) = self.calories {
            item.calories = Some(calories);
        }
        Ok(())
    }
}

fn validate_price(price: f64) -> Result<(), String> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err("price must be a non-negative number".to_string())
    }
}

/// `GET /api/menus/restaurant/{restaurantId}` filters
#[derive(Debug, Default, Deserialize)]
pub struct MenuQuery {
    pub category: Option<String>,
    pub available: Option<String>,
}

impl MenuQuery {
    /// Only the literal `true` counts as true
    pub fn available(&self) -> Option<bool> {
        self.available.as_deref().map(|a| a == "true")
    }
}

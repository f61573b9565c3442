use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Fixed set of listing categories. Serialized as kebab-case slugs
/// (`home-goods`), which is also how they are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Electronics,
    Apparel,
    HomeGoods,
    Vehicles,
    Property,
    Hobbies,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Electronics,
        Category::Apparel,
        Category::HomeGoods,
        Category::Vehicles,
        Category::Property,
        Category::Hobbies,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electronics => "electronics",
            Self::Apparel => "apparel",
            Self::HomeGoods => "home-goods",
            Self::Vehicles => "vehicles",
            Self::Property => "property",
            Self::Hobbies => "hobbies",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub category: Category,
    pub seller_email: String,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Messages are immutable once stored; there is no update path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub listing_id: String,
    pub buyer_email: String,
    pub seller_email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A validated listing ready to insert. Storage assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewListing {
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub category: Category,
    pub seller_email: String,
    pub image_url: Option<String>,
    pub location: Option<String>,
}

/// A validated set of listing column changes.
///
/// For the nullable columns the outer `Option` means "leave untouched" and
/// the inner `None` means "clear".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub price: Option<f64>,
    pub category: Option<Category>,
    pub image_url: Option<Option<String>>,
    pub location: Option<Option<String>>,
}

impl ListingChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.image_url.is_none()
            && self.location.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub listing_id: String,
    pub buyer_email: String,
    pub seller_email: String,
    pub message: String,
}

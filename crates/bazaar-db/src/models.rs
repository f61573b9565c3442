//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the bazaar-types entities so the schema can evolve
//! independently of the wire format.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;

use bazaar_types::models::{Listing, Message};

pub const LISTING_COLUMNS: &str =
    "id, title, description, price, category, seller_email, image_url, location, created_at, updated_at";

pub const MESSAGE_COLUMNS: &str = "id, listing_id, buyer_email, seller_email, message, created_at";

pub struct ListingRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub price: f64,
    pub category: String,
    pub seller_email: String,
    pub image_url: Option<String>,
    pub location: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ListingRow {
    /// Reads a row selected with [`LISTING_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            price: row.get(3)?,
            category: row.get(4)?,
            seller_email: row.get(5)?,
            image_url: row.get(6)?,
            location: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl TryFrom<ListingRow> for Listing {
    type Error = anyhow::Error;

    fn try_from(row: ListingRow) -> Result<Self> {
        Ok(Listing {
            id: row.id.parse().with_context(|| format!("corrupt listing id '{}'", row.id))?,
            category: row
                .category
                .parse()
                .with_context(|| format!("corrupt category on listing '{}'", row.id))?,
            created_at: parse_timestamp(&row.created_at)
                .with_context(|| format!("corrupt created_at on listing '{}'", row.id))?,
            updated_at: parse_timestamp(&row.updated_at)
                .with_context(|| format!("corrupt updated_at on listing '{}'", row.id))?,
            title: row.title,
            description: row.description,
            price: row.price,
            seller_email: row.seller_email,
            image_url: row.image_url,
            location: row.location,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub listing_id: String,
    pub buyer_email: String,
    pub seller_email: String,
    pub message: String,
    pub created_at: String,
}

impl MessageRow {
    /// Reads a row selected with [`MESSAGE_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            listing_id: row.get(1)?,
            buyer_email: row.get(2)?,
            seller_email: row.get(3)?,
            message: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id.parse().with_context(|| format!("corrupt message id '{}'", row.id))?,
            created_at: parse_timestamp(&row.created_at)
                .with_context(|| format!("corrupt created_at on message '{}'", row.id))?,
            listing_id: row.listing_id,
            buyer_email: row.buyer_email,
            seller_email: row.seller_email,
            message: row.message,
        })
    }
}

/// Accepts RFC 3339 (what the schema defaults write) and the bare
/// `YYYY-MM-DD HH:MM:SS` form SQLite's `datetime()` produces.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_both_timestamp_forms() {
        let a = parse_timestamp("2025-03-04T05:06:07.089Z").unwrap();
        assert_eq!((a.year(), a.month(), a.day()), (2025, 3, 4));
        assert_eq!(a.timestamp_subsec_millis(), 89);

        let b = parse_timestamp("2025-03-04 05:06:07").unwrap();
        assert_eq!((b.hour(), b.minute(), b.second()), (5, 6, 7));
    }

    #[test]
    fn rejects_garbage_timestamp() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}

use anyhow::{Result, anyhow, bail};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use uuid::Uuid;

use bazaar_types::models::{Listing, ListingChanges, Message, NewListing, NewMessage};

use crate::Database;
use crate::migrations::NOW;
use crate::models::{LISTING_COLUMNS, ListingRow, MESSAGE_COLUMNS, MessageRow};

impl Database {
    // -- Listings --

    /// All listings, newest first.
    pub fn list_listings(&self) -> Result<Vec<Listing>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LISTING_COLUMNS} FROM listings ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([], ListingRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(Listing::try_from).collect()
        })
    }

    pub fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
        self.with_conn(|conn| query_listing(conn, id))
    }

    pub fn insert_listing(&self, new: &NewListing) -> Result<Listing> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO listings (id, title, description, price, category, seller_email, image_url, location)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    new.title,
                    new.description,
                    new.price,
                    new.category.as_str(),
                    new.seller_email,
                    new.image_url,
                    new.location,
                ],
            )?;
            query_listing(conn, &id)?.ok_or_else(|| anyhow!("listing {} missing after insert", id))
        })
    }

    /// Applies `changes` to the listing `id` if it is owned by `owner`.
    ///
    /// Returns `None` when no row matched. A missing row, a row owned by
    /// someone else and an anonymous caller (`owner == None`) are
    /// indistinguishable here.
    pub fn update_listing(
        &self,
        id: &str,
        changes: &ListingChanges,
        owner: Option<&str>,
    ) -> Result<Option<Listing>> {
        let Some(owner) = owner else {
            return Ok(None);
        };

        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(title) = &changes.title {
            columns.push("title");
            values.push(Value::Text(title.clone()));
        }
        if let Some(description) = &changes.description {
            columns.push("description");
            values.push(nullable_text(description));
        }
        if let Some(price) = changes.price {
            columns.push("price");
            values.push(Value::Real(price));
        }
        if let Some(category) = changes.category {
            columns.push("category");
            values.push(Value::Text(category.as_str().to_string()));
        }
        if let Some(image_url) = &changes.image_url {
            columns.push("image_url");
            values.push(nullable_text(image_url));
        }
        if let Some(location) = &changes.location {
            columns.push("location");
            values.push(nullable_text(location));
        }

        if columns.is_empty() {
            bail!("listing update for {} has no changes", id);
        }

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{} = ?{}", col, i + 1))
            .collect();
        let n = values.len();
        let sql = format!(
            "UPDATE listings SET {}, updated_at = {NOW} WHERE id = ?{} AND seller_email = ?{}",
            assignments.join(", "),
            n + 1,
            n + 2,
        );
        values.push(Value::Text(id.to_string()));
        values.push(Value::Text(owner.to_string()));

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(&sql, params_from_iter(values.iter()))?;
            let listing = if updated == 0 { None } else { query_listing(&tx, id)? };
            tx.commit()?;
            Ok(listing)
        })
    }

    /// Deletes the listing `id` if it is owned by `owner`. Returns whether a
    /// row was removed; same masking rules as [`Database::update_listing`].
    pub fn delete_listing(&self, id: &str, owner: Option<&str>) -> Result<bool> {
        let Some(owner) = owner else {
            return Ok(false);
        };
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM listings WHERE id = ?1 AND seller_email = ?2",
                params![id, owner],
            )?;
            Ok(removed > 0)
        })
    }

    // -- Messages --

    /// Messages oldest first, optionally scoped to one listing.
    pub fn list_messages(&self, listing_id: Option<&str>) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE ?1 IS NULL OR listing_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map(params![listing_id], MessageRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(Message::try_from).collect()
        })
    }

    pub fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, listing_id, buyer_email, seller_email, message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, new.listing_id, new.buyer_email, new.seller_email, new.message],
            )?;
            let row = conn.query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                [&id],
                MessageRow::from_row,
            )?;
            Message::try_from(row)
        })
    }
}

fn query_listing(conn: &Connection, id: &str) -> Result<Option<Listing>> {
    let row = conn
        .query_row(
            &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = ?1"),
            [id],
            ListingRow::from_row,
        )
        .optional()?;

    row.map(Listing::try_from).transpose()
}

fn nullable_text(value: &Option<String>) -> Value {
    match value {
        Some(text) => Value::Text(text.clone()),
        None => Value::Null,
    }
}

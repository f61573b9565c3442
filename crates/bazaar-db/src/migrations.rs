use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Timestamp expression used for column defaults and `updated_at` refreshes.
/// RFC 3339 with millisecond precision, always UTC.
pub const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (listings, messages)");
        conn.execute_batch(&format!(
            "
            BEGIN;

            CREATE TABLE listings (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL,
                description     TEXT,
                price           REAL NOT NULL CHECK (price >= 0),
                category        TEXT NOT NULL,
                seller_email    TEXT NOT NULL,
                image_url       TEXT,
                location        TEXT,
                created_at      TEXT NOT NULL DEFAULT ({NOW}),
                updated_at      TEXT NOT NULL DEFAULT ({NOW})
            );

            CREATE INDEX idx_listings_created ON listings(created_at);
            CREATE INDEX idx_listings_seller ON listings(seller_email);

            -- listing_id is deliberately not a foreign key
            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                listing_id      TEXT NOT NULL,
                buyer_email     TEXT NOT NULL,
                seller_email    TEXT NOT NULL,
                message         TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT ({NOW})
            );

            CREATE INDEX idx_messages_listing ON messages(listing_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            "
        ))?;
    }

    info!("Database migrations complete");
    Ok(())
}

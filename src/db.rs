use crate::error::{BotError, Result};
use crate::storage::ListingStore;
use crate::types::{prices_differ, Listing, PricePoint, SaveOutcome, StoredListing};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const MIGRATION: &str = include_str!("../migrations/001_create_listings.sql");

const LISTING_COLUMNS: &str = "id, url, title, description, image_url, price, size_m2, \
                               year_built, floor, first_seen, accessed_time";

/// SQLite-backed listing store.
///
/// rusqlite is blocking, so every query runs on the blocking pool behind a
/// mutex around the single connection.
#[derive(Clone)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and applies the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening listing database at {}", path.display());
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates missing tables and indexes.
    pub fn migrate(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(MIGRATION)?;
            Ok(())
        })?;
        debug!("Listing schema is up to date");
        Ok(())
    }

    /// Drops all listing data and recreates the schema.
    pub fn reset(&self) -> Result<()> {
        info!("Dropping listing tables");
        self.with_conn(|conn| {
            conn.execute_batch("DROP TABLE IF EXISTS history; DROP TABLE IF EXISTS listing;")?;
            Ok(())
        })?;
        self.migrate()
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| BotError::Database {
            message: format!("connection lock poisoned: {e}"),
        })?;
        f(&mut conn)
    }

    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|e| BotError::Database {
                message: format!("database task failed: {e}"),
            })?
    }

    fn save_sync(conn: &mut Connection, listing: &Listing, seen_at: DateTime<Utc>) -> Result<SaveOutcome> {
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM listing WHERE id = ?1 OR url = ?2 ORDER BY id = ?1 DESC LIMIT 1",
                params![listing.id, listing.url],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            None => {
                tx.execute(
                    "INSERT INTO listing (id, url, title, description, image_url, price, size_m2,
                                          year_built, floor, first_seen, accessed_time)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                    params![
                        listing.id,
                        listing.url,
                        listing.title,
                        listing.description,
                        listing.image_url,
                        listing.price,
                        listing.size_m2,
                        listing.year_built,
                        listing.floor,
                        seen_at,
                    ],
                )?;
                Self::insert_price(&tx, &listing.id, listing.price, seen_at)?;
                SaveOutcome::New
            }
            Some(id) => {
                let last_price: Option<f64> = tx
                    .query_row(
                        "SELECT price FROM history WHERE listing_id = ?1 ORDER BY id DESC LIMIT 1",
                        params![id],
                        |row| row.get(0),
                    )
                    .optional()?;

                // Keep the stored url if another row already owns the new one
                tx.execute(
                    "UPDATE listing
                        SET url = CASE WHEN EXISTS (SELECT 1 FROM listing WHERE url = ?2 AND id <> ?1)
                                       THEN url ELSE ?2 END,
                            title = ?3, description = ?4, image_url = ?5, price = ?6,
                            size_m2 = ?7, year_built = ?8, floor = ?9, accessed_time = ?10
                      WHERE id = ?1",
                    params![
                        id,
                        listing.url,
                        listing.title,
                        listing.description,
                        listing.image_url,
                        listing.price,
                        listing.size_m2,
                        listing.year_built,
                        listing.floor,
                        seen_at,
                    ],
                )?;

                match last_price {
                    Some(previous) if !prices_differ(previous, listing.price) => SaveOutcome::Unchanged,
                    Some(previous) => {
                        Self::insert_price(&tx, &id, listing.price, seen_at)?;
                        SaveOutcome::PriceChanged { previous }
                    }
                    None => {
                        Self::insert_price(&tx, &id, listing.price, seen_at)?;
                        SaveOutcome::Unchanged
                    }
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn insert_price(conn: &Connection, listing_id: &str, price: f64, at: DateTime<Utc>) -> Result<()> {
        conn.execute(
            "INSERT INTO history (listing_id, price, accessed_time) VALUES (?1, ?2, ?3)",
            params![listing_id, price, at],
        )?;
        Ok(())
    }

    fn stored_from_row(row: &Row<'_>) -> rusqlite::Result<StoredListing> {
        Ok(StoredListing {
            listing: Listing {
                id: row.get(0)?,
                url: row.get(1)?,
                title: row.get(2)?,
                description: row.get(3)?,
                image_url: row.get(4)?,
                price: row.get(5)?,
                size_m2: row.get(6)?,
                year_built: row.get(7)?,
                floor: row.get(8)?,
            },
            first_seen: row.get(9)?,
            accessed_time: row.get(10)?,
        })
    }
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn save_listing(&self, listing: &Listing, seen_at: DateTime<Utc>) -> Result<SaveOutcome> {
        let listing = listing.clone();
        let outcome = self
            .run(move |conn| Self::save_sync(conn, &listing, seen_at))
            .await?;
        debug!(?outcome, "Saved listing");
        Ok(outcome)
    }

    async fn get_listing(&self, id: &str) -> Result<Option<StoredListing>> {
        let id = id.to_string();
        self.run(move |conn| {
            let sql = format!("SELECT {LISTING_COLUMNS} FROM listing WHERE id = ?1");
            Ok(conn
                .query_row(&sql, params![id], Self::stored_from_row)
                .optional()?)
        })
        .await
    }

    async fn price_history(&self, id: &str) -> Result<Vec<PricePoint>> {
        let id = id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT price, accessed_time FROM history WHERE listing_id = ?1 ORDER BY id",
            )?;
            let points = stmt
                .query_map(params![id], |row| {
                    Ok(PricePoint {
                        price: row.get(0)?,
                        accessed_time: row.get(1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(points)
        })
        .await
    }

    async fn recent_listings(&self, limit: usize) -> Result<Vec<StoredListing>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {LISTING_COLUMNS} FROM listing ORDER BY accessed_time DESC, id LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let listings = stmt
                .query_map(params![limit as i64], Self::stored_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(listings)
        })
        .await
    }

    async fn count_listings(&self) -> Result<usize> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM listing", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::{assert_urls_stay_unique, at, listing};

    #[tokio::test]
    async fn save_new_then_unchanged_then_price_change() {
        let store = SqliteStore::open_in_memory().unwrap();

        assert_eq!(
            store.save_listing(&listing("6812345", 850.0), at(8)).await.unwrap(),
            SaveOutcome::New
        );
        assert_eq!(
            store.save_listing(&listing("6812345", 850.0), at(9)).await.unwrap(),
            SaveOutcome::Unchanged
        );
        assert_eq!(
            store.save_listing(&listing("6812345", 790.0), at(10)).await.unwrap(),
            SaveOutcome::PriceChanged { previous: 850.0 }
        );

        let stored = store.get_listing("6812345").await.unwrap().unwrap();
        assert_eq!(stored.listing.price, 790.0);
        assert_eq!(stored.first_seen, at(8));
        assert_eq!(stored.accessed_time, at(10));
        assert_eq!(stored.listing.floor.as_deref(), Some("2/5"));

        let history = store.price_history("6812345").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].price, 850.0);
        assert_eq!(history[1].accessed_time, at(10));
    }

    #[tokio::test]
    async fn url_match_reuses_the_existing_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_listing(&listing("1", 500.0), at(8)).await.unwrap();

        let mut same_url = listing("1", 500.0);
        same_url.id = "renamed".to_string();
        assert_eq!(
            store.save_listing(&same_url, at(9)).await.unwrap(),
            SaveOutcome::Unchanged
        );
        assert_eq!(store.count_listings().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn urls_stay_unique_when_a_listing_moves_onto_a_taken_url() {
        assert_urls_stay_unique(&SqliteStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn optional_fields_round_trip_as_null() {
        let store = SqliteStore::open_in_memory().unwrap();
        let bare = Listing {
            description: None,
            image_url: None,
            size_m2: None,
            year_built: None,
            floor: None,
            ..listing("2", 610.0)
        };
        store.save_listing(&bare, at(8)).await.unwrap();
        let stored = store.get_listing("2").await.unwrap().unwrap();
        assert_eq!(stored.listing, bare);
    }

    #[tokio::test]
    async fn reset_drops_everything() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save_listing(&listing("1", 500.0), at(8)).await.unwrap();
        store.reset().unwrap();
        assert_eq!(store.count_listings().await.unwrap(), 0);
        assert!(store.price_history("1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_database_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("nepremicnine.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_listing(&listing("1", 500.0), at(8)).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.count_listings().await.unwrap(), 1);
        let recent = store.recent_listings(10).await.unwrap();
        assert_eq!(recent[0].listing.id, "1");
    }
}

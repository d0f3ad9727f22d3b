//! Durable batch table backed by SQLite.
//!
//! The database runs in WAL mode so status readers keep making progress
//! while the server or the sorting process writes. Writes that cannot get the
//! lock within the configured busy timeout fail instead of hanging.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info, warn};

use crate::core::types::{Batch, BatchCounts, NewBatch, TIMESTAMP_FORMAT};

/// Transactional row store for batches.
pub trait BatchStore: Send + Sync {
    /// Insert a row and return its store-assigned id.
    fn insert(&self, batch: &NewBatch) -> Result<i64>;
    fn get_by_id(&self, id: i64) -> Result<Option<Batch>>;
    /// Highest stored `batch_number`, 0 when the table is empty.
    fn max_batch_number(&self) -> Result<i64>;
    /// Most recently created batch (highest id).
    fn latest(&self) -> Result<Option<Batch>>;
    /// Number of batches created in the `YYYY-MM` month.
    fn count_in_month(&self, month: &str) -> Result<i64>;
    /// All batches, newest first.
    fn list_all(&self) -> Result<Vec<Batch>>;
    /// Overwrite the counts of an existing row. Returns false if `id` is unknown.
    fn update(&self, batch: &Batch) -> Result<bool>;
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS batches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        batch_number INTEGER NOT NULL,
        total INTEGER DEFAULT 0,
        large INTEGER DEFAULT 0,
        medium INTEGER DEFAULT 0,
        small INTEGER DEFAULT 0,
        quality_good INTEGER DEFAULT 0,
        quality_bad INTEGER DEFAULT 0,
        timestamp TEXT DEFAULT CURRENT_TIMESTAMP
    );
"#;

const SELECT_COLUMNS: &str =
    "SELECT id, batch_number, total, large, medium, small, quality_good, quality_bad, timestamp FROM batches";

/// [`BatchStore`] over a single SQLite connection.
pub struct SqliteBatchStore {
    conn: Mutex<Connection>,
}

impl SqliteBatchStore {
    /// Open or create the database file.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open batch database {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            "#,
        )
        .context("configure batch database")?;
        let store = Self::with_connection(conn, busy_timeout)?;
        info!(path = %path.display(), busy_timeout_ms = busy_timeout.as_millis() as u64, "batch database opened");
        Ok(store)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory batch database")?;
        Self::with_connection(conn, Duration::from_secs(5))
    }

    fn with_connection(conn: Connection, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)
            .context("set busy timeout")?;
        conn.execute_batch(SCHEMA).context("create batches table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("batch database connection poisoned"))
    }
}

impl BatchStore for SqliteBatchStore {
    fn insert(&self, batch: &NewBatch) -> Result<i64> {
        let conn = self.conn()?;
        let c = &batch.counts;
        conn.execute(
            r#"INSERT INTO batches
               (batch_number, total, large, medium, small, quality_good, quality_bad, timestamp)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                batch.batch_number,
                c.total,
                c.large,
                c.medium,
                c.small,
                c.quality_good,
                c.quality_bad,
                batch.created_at.format(TIMESTAMP_FORMAT).to_string(),
            ],
        )
        .context("insert batch")?;
        let id = conn.last_insert_rowid();
        debug!(id, batch_number = batch.batch_number, "batch inserted");
        Ok(id)
    }

    fn get_by_id(&self, id: i64) -> Result<Option<Batch>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?1"),
            params![id],
            batch_from_row,
        )
        .optional()
        .with_context(|| format!("read batch {id}"))
    }

    fn max_batch_number(&self) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COALESCE(MAX(batch_number), 0) FROM batches",
            [],
            |row| row.get(0),
        )
        .context("read max batch number")
    }

    fn latest(&self) -> Result<Option<Batch>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT 1"),
            [],
            batch_from_row,
        )
        .optional()
        .context("read latest batch")
    }

    fn count_in_month(&self, month: &str) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM batches WHERE strftime('%Y-%m', timestamp) = ?1",
            params![month],
            |row| row.get(0),
        )
        .with_context(|| format!("count batches in {month}"))
    }

    fn list_all(&self) -> Result<Vec<Batch>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY id DESC"))
            .context("prepare batch listing")?;
        let rows = stmt
            .query_map([], batch_from_row)
            .context("list batches")?;
        let mut batches = Vec::new();
        for row in rows {
            batches.push(row.context("decode batch row")?);
        }
        Ok(batches)
    }

    fn update(&self, batch: &Batch) -> Result<bool> {
        let conn = self.conn()?;
        let c = &batch.counts;
        let changed = conn
            .execute(
                r#"UPDATE batches
                   SET total = ?2, large = ?3, medium = ?4, small = ?5,
                       quality_good = ?6, quality_bad = ?7
                   WHERE id = ?1"#,
                params![
                    batch.id,
                    c.total,
                    c.large,
                    c.medium,
                    c.small,
                    c.quality_good,
                    c.quality_bad,
                ],
            )
            .with_context(|| format!("update batch {}", batch.id))?;
        debug!(id = batch.id, changed, "batch counts written");
        Ok(changed > 0)
    }
}

/// Accepted stored timestamp layouts, tried in order. Rows written by other
/// tools may use a `T` separator or carry fractional seconds.
const TIMESTAMP_LAYOUTS: [&str; 4] = [
    TIMESTAMP_FORMAT,
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Decode one row. Never fails on legacy data: NULL or negative counts read
/// as 0, and an unparseable timestamp reads as the Unix epoch.
fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<Batch> {
    let id: i64 = row.get(0)?;
    let raw_ts: Option<String> = row.get(8)?;
    let created_at = match raw_ts.as_deref().and_then(parse_timestamp) {
        Some(created_at) => created_at,
        None => {
            warn!(id, timestamp = ?raw_ts, "unreadable batch timestamp, using epoch");
            NaiveDateTime::default()
        }
    };
    Ok(Batch {
        id,
        batch_number: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
        counts: BatchCounts {
            total: count_at(row, 2)?,
            large: count_at(row, 3)?,
            medium: count_at(row, 4)?,
            small: count_at(row, 5)?,
            quality_good: count_at(row, 6)?,
            quality_bad: count_at(row, 7)?,
        },
        created_at,
    })
}

fn count_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: Option<i64> = row.get(idx)?;
    Ok(raw.and_then(|n| u64::try_from(n).ok()).unwrap_or(0))
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).expect("timestamp")
    }

    fn new_batch(batch_number: i64, created_at: &str) -> NewBatch {
        NewBatch {
            batch_number,
            counts: BatchCounts::default(),
            created_at: at(created_at),
        }
    }

    #[test]
    fn insert_assigns_increasing_ids() {
        let store = SqliteBatchStore::open_in_memory().expect("open");
        let first = store.insert(&new_batch(1, "2026-01-02 03:04:05")).expect("insert");
        let second = store.insert(&new_batch(1, "2026-02-02 03:04:05")).expect("insert");
        assert!(second > first);

        let row = store.get_by_id(first).expect("get").expect("row");
        assert_eq!(row.batch_number, 1);
        assert_eq!(row.created_at, at("2026-01-02 03:04:05"));
        assert_eq!(row.counts, BatchCounts::default());
    }

    #[test]
    fn missing_row_is_none() {
        let store = SqliteBatchStore::open_in_memory().expect("open");
        assert_eq!(store.get_by_id(1).expect("get"), None);
        assert_eq!(store.latest().expect("latest"), None);
        assert_eq!(store.max_batch_number().expect("max"), 0);
    }

    #[test]
    fn list_is_newest_first_and_latest_is_highest_id() {
        let store = SqliteBatchStore::open_in_memory().expect("open");
        let a = store.insert(&new_batch(5, "2026-01-01 00:00:00")).expect("a");
        let b = store.insert(&new_batch(2, "2026-01-02 00:00:00")).expect("b");

        let ids: Vec<i64> = store.list_all().expect("list").iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(store.latest().expect("latest").map(|row| row.id), Some(b));
        assert_eq!(store.max_batch_number().expect("max"), 5);
    }

    #[test]
    fn count_in_month_only_counts_that_month() {
        let store = SqliteBatchStore::open_in_memory().expect("open");
        store.insert(&new_batch(1, "2026-01-31 23:59:59")).expect("jan");
        store.insert(&new_batch(1, "2026-02-01 00:00:00")).expect("feb");
        store.insert(&new_batch(2, "2026-02-15 12:00:00")).expect("feb");

        assert_eq!(store.count_in_month("2026-01").expect("count"), 1);
        assert_eq!(store.count_in_month("2026-02").expect("count"), 2);
        assert_eq!(store.count_in_month("2026-03").expect("count"), 0);
    }

    #[test]
    fn update_overwrites_counts_only() {
        let store = SqliteBatchStore::open_in_memory().expect("open");
        let id = store.insert(&new_batch(3, "2026-04-01 08:00:00")).expect("insert");

        let mut row = store.get_by_id(id).expect("get").expect("row");
        row.counts = BatchCounts {
            total: 10,
            large: 5,
            medium: 3,
            small: 2,
            quality_good: 9,
            quality_bad: 1,
        };
        row.batch_number = 99;
        assert!(store.update(&row).expect("update"));

        let stored = store.get_by_id(id).expect("get").expect("row");
        assert_eq!(stored.counts, row.counts);
        assert_eq!(stored.batch_number, 3, "batch_number is immutable");

        row.id = id + 100;
        assert!(!store.update(&row).expect("update missing"));
    }

    /// Rows written by older servers may hold NULL counts or other
    /// timestamp layouts; they must still list and load.
    #[test]
    fn legacy_rows_decode_with_defaults() {
        let store = SqliteBatchStore::open_in_memory().expect("open");
        {
            let conn = store.conn().expect("conn");
            conn.execute_batch(
                r#"
                INSERT INTO batches (batch_number, total) VALUES (2, NULL);
                INSERT INTO batches (batch_number, total, small, timestamp)
                    VALUES (3, -4, 5, '2026-03-01T10:00:00.123');
                INSERT INTO batches (batch_number, timestamp) VALUES (4, 'yesterday');
                "#,
            )
            .expect("raw insert");
        }

        let listed = store.list_all().expect("list");
        assert_eq!(listed.len(), 3);

        let null_total = store.get_by_id(1).expect("get").expect("row");
        assert_eq!(null_total.counts, BatchCounts::default());
        assert_eq!(null_total.batch_number, 2);

        let iso = store.get_by_id(2).expect("get").expect("row");
        assert_eq!(iso.counts.total, 0, "negative counts read as zero");
        assert_eq!(iso.counts.small, 5);
        assert_eq!(iso.created_at, at("2026-03-01 10:00:00") + chrono::Duration::milliseconds(123));

        let garbage = store.get_by_id(3).expect("get").expect("row");
        assert_eq!(garbage.created_at, NaiveDateTime::default());
    }

    #[test]
    fn timestamp_layouts() {
        assert_eq!(parse_timestamp("2026-01-02 03:04:05"), Some(at("2026-01-02 03:04:05")));
        assert_eq!(parse_timestamp("2026-01-02T03:04:05"), Some(at("2026-01-02 03:04:05")));
        assert!(parse_timestamp("2026-01-02 03:04:05.5").is_some());
        assert_eq!(parse_timestamp("02/01/2026"), None);
    }

    #[test]
    fn file_database_reopens_with_rows() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("data").join("cacao_database.db");
        {
            let store = SqliteBatchStore::open(&path, Duration::from_millis(200)).expect("open");
            store.insert(&new_batch(1, "2026-05-05 05:05:05")).expect("insert");
        }
        let store = SqliteBatchStore::open(&path, Duration::from_millis(200)).expect("reopen");
        assert_eq!(store.list_all().expect("list").len(), 1);
    }
}

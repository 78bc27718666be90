//! Durable SQLite-backed sample store.

use crate::error::{Result, SystemError};
use crate::metrics::{Metric, MetricSample};
use crate::store::{SampleStore, StorePolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, ToSql, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// DDL for the metrics table. Timestamps are epoch milliseconds; the metric
/// columns are named by [`Metric::column`].
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS metrics (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   INTEGER NOT NULL,
    cpu         REAL,
    memory      REAL,
    disk        REAL,
    temperature REAL
);
CREATE INDEX IF NOT EXISTS idx_metrics_timestamp ON metrics (timestamp);
";

fn metric_columns() -> String {
    Metric::ALL.map(Metric::column).join(", ")
}

fn select_sql(clauses: &str) -> String {
    format!("SELECT timestamp, {} FROM metrics {}", metric_columns(), clauses)
}

fn insert_sql() -> String {
    let placeholders: Vec<String> = (1..=Metric::ALL.len() + 1).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO metrics (timestamp, {}) VALUES ({})",
        metric_columns(),
        placeholders.join(", ")
    )
}

/// Whether a write abandoned by its caller may still commit.
#[derive(Debug, Default)]
enum WriteState {
    #[default]
    Pending,
    Committing,
    Abandoned,
}

/// Hand-off between a deadline-bound caller and its blocking write.
///
/// Exactly one side wins: either the write starts committing, and the caller
/// waits for its outcome, or the caller gives up first and the write rolls
/// back. A caller never reports failure for a row that gets stored.
#[derive(Debug, Default)]
struct WriteGate(Mutex<WriteState>);

impl WriteGate {
    /// Called by the write just before `COMMIT`. False if the caller gave up.
    fn begin_commit(&self) -> bool {
        let mut state = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match *state {
            WriteState::Abandoned => false,
            _ => {
                *state = WriteState::Committing;
                true
            }
        }
    }

    /// Called by the caller at its deadline. False if the commit already began.
    fn abandon(&self) -> bool {
        let mut state = self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match *state {
            WriteState::Committing => false,
            _ => {
                *state = WriteState::Abandoned;
                true
            }
        }
    }
}

fn deadline_exceeded() -> SystemError {
    SystemError::store_unavailable("storage call exceeded its deadline")
}

/// Smallest whole millisecond at or after `ts`, so that `timestamp >= since`
/// and `timestamp < cutoff` mean the same on stored milliseconds as on the
/// full-precision bound.
fn millis_ceil(ts: DateTime<Utc>) -> i64 {
    let millis = ts.timestamp_millis();
    if ts.timestamp_subsec_nanos() % 1_000_000 == 0 {
        millis
    } else {
        millis.saturating_add(1)
    }
}

/// SQLite-backed time series.
///
/// Writes go through a single connection; callers queue for it without
/// holding a thread. Each read opens its own query-only connection for the
/// duration of the call; WAL mode lets those readers proceed alongside the
/// writer and only see committed rows. Every call is bounded by the
/// configured deadline, and a write that misses it is rolled back.
pub struct SqliteStore {
    path: PathBuf,
    writer: Arc<AsyncMutex<Connection>>,
    timeout: Duration,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            path,
            writer: Arc::new(AsyncMutex::new(conn)),
            timeout,
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` in a write transaction, committed only if the caller is
    /// still waiting for it.
    async fn with_writer<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        let deadline = Instant::now() + self.timeout;
        let mut conn = tokio::time::timeout(self.timeout, Arc::clone(&self.writer).lock_owned())
            .await
            .map_err(|_| deadline_exceeded())?;

        let gate = Arc::new(WriteGate::default());
        let write_gate = Arc::clone(&gate);
        let mut task = tokio::task::spawn_blocking(move || {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(deadline_exceeded());
            }
            conn.busy_timeout(remaining)?;
            let tx = conn.transaction()?;
            let out = op(&tx)?;
            if !write_gate.begin_commit() {
                // Dropping `tx` rolls the write back.
                return Err(deadline_exceeded());
            }
            tx.commit()?;
            Ok(out)
        });

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, &mut task).await {
            Ok(joined) => joined?,
            Err(_) if gate.abandon() => Err(deadline_exceeded()),
            Err(_) => {
                warn!("Write passed its deadline while committing, waiting for the outcome");
                task.await?
            }
        }
    }

    /// Run `op` against a fresh query-only connection, closed when `op` returns.
    async fn with_reader<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let busy_timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA query_only = ON;")?;
            op(&conn)
        });
        tokio::time::timeout(self.timeout, task).await??
    }
}

fn sample_from_row(row: &Row<'_>) -> rusqlite::Result<MetricSample> {
    let millis: i64 = row.get(0)?;
    let mut sample = MetricSample::from_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, millis))?;
    for (i, metric) in Metric::ALL.into_iter().enumerate() {
        sample.set(metric, row.get(i + 1)?);
    }
    Ok(sample)
}

#[async_trait]
impl SampleStore for SqliteStore {
    async fn insert(&self, sample: MetricSample) -> Result<()> {
        let sample = sample.normalized();
        self.with_writer(move |tx| {
            let millis = sample.timestamp_millis();
            let readings = Metric::ALL.map(|metric| sample.get(metric));
            let mut values: Vec<&dyn ToSql> = vec![&millis];
            values.extend(readings.iter().map(|reading| reading as &dyn ToSql));
            tx.execute(&insert_sql(), values.as_slice())?;
            Ok(())
        })
        .await
    }

    async fn latest(&self) -> Result<Option<MetricSample>> {
        self.with_reader(|conn| {
            let sql = select_sql("ORDER BY timestamp DESC, id DESC LIMIT 1");
            Ok(conn.query_row(&sql, [], sample_from_row).optional()?)
        })
        .await
    }

    async fn range(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<MetricSample>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let since = millis_ceil(since);

        self.with_reader(move |conn| {
            // Newest rows first so LIMIT keeps the most recent ones.
            let sql = select_sql("WHERE timestamp >= ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![since, limit], sample_from_row)?;

            let mut samples = Vec::new();
            for row in rows {
                samples.push(row?);
            }
            samples.reverse();
            Ok(samples)
        })
        .await
    }

    async fn prune(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff = millis_ceil(cutoff);
        let deleted = self
            .with_writer(move |tx| {
                let deleted = tx.execute("DELETE FROM metrics WHERE timestamp < ?1", params![cutoff])?;
                Ok(deleted as u64)
            })
            .await?;
        debug!(deleted, "Pruned durable store");
        Ok(deleted)
    }

    async fn count(&self) -> Result<u64> {
        self.with_reader(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    fn policy(&self) -> StorePolicy {
        StorePolicy::DurableBounded
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

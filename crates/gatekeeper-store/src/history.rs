use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use gatekeeper_models::journal_schema::{ClosedTradeRow, TRADE_HISTORY_DDL};
use gatekeeper_models::threshold::PerformanceWindow;
use rusqlite::Connection;
use tracing::debug;

use crate::error::StoreError;
use crate::memory::MemoryCache;

/// Trailing-window aggregates over closed trades. Mockable for testing.
#[async_trait]
pub trait TradeHistory: Send + Sync {
    async fn trailing_performance(
        &self,
        instrument: &str,
        window_days: u32,
    ) -> Result<PerformanceWindow, StoreError>;
}

/// Timestamp format used in `closed_trades.closed_at` so that string
/// comparison orders rows chronologically.
pub fn history_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Read-through reader over the append-only trade store: moka (hot) then SQLite.
///
/// The connection is opened lazily and dropped after a failure, so a store that
/// is missing at startup or goes away later is retried on the next query.
/// Access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct SqliteTradeHistory {
    path: Option<String>,
    conn: Mutex<Option<Connection>>,
    memory: MemoryCache,
}

impl SqliteTradeHistory {
    /// Read-only reader over the trade store at `path`.
    pub fn open(path: &str, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            path: Some(path.to_string()),
            conn: Mutex::new(None),
            memory: MemoryCache::new(max_capacity, memory_ttl),
        }
    }

    /// Writable in-memory store. Creates the schema so tests can seed trades.
    pub fn open_in_memory(memory_ttl: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(TRADE_HISTORY_DDL)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(Some(conn)),
            memory: MemoryCache::new(1_000, memory_ttl),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("history mutex poisoned: {e}")))?;

        if guard.is_none() {
            let path = self
                .path
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("history store closed".to_string()))?;
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            *guard = Some(conn);
        }

        let result = match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Unavailable("history store closed".to_string())),
        };
        if result.is_err() && self.path.is_some() {
            *guard = None;
        }
        result
    }

    /// Aggregate closed trades for `instrument` in `(now - window_days, now]`.
    pub fn query_window(
        &self,
        instrument: &str,
        window_days: u32,
        now: DateTime<Utc>,
    ) -> Result<PerformanceWindow, StoreError> {
        let since = history_timestamp(now - chrono::Duration::days(i64::from(window_days)));
        let until = history_timestamp(now);
        let (trade_count, mean_return) = self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT COUNT(*), AVG(realized_return) FROM closed_trades \
                 WHERE instrument = ?1 AND closed_at > ?2 AND closed_at <= ?3",
            )?;
            let row = stmt.query_row(rusqlite::params![instrument, since, until], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Option<f64>>(1)?))
            })?;
            Ok(row)
        })?;

        Ok(PerformanceWindow {
            instrument: instrument.to_string(),
            window_days,
            trade_count: trade_count.max(0) as u64,
            mean_return,
        })
    }

    /// Append a closed trade. In production the execution side writes the store;
    /// this is available for tests and tooling.
    pub fn record(&self, row: &ClosedTradeRow) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO closed_trades (id, instrument, realized_return, closed_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![row.id, row.instrument, row.realized_return, row.closed_at],
            )?;
            Ok(())
        })
    }

    pub fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count()
    }
}

#[async_trait]
impl TradeHistory for SqliteTradeHistory {
    async fn trailing_performance(
        &self,
        instrument: &str,
        window_days: u32,
    ) -> Result<PerformanceWindow, StoreError> {
        let key = MemoryCache::key(instrument, window_days);
        if let Some(hit) = self.memory.get(&key).await {
            return Ok(hit);
        }

        let window = self.query_window(instrument, window_days, Utc::now())?;
        debug!(
            instrument,
            trades = window.trade_count,
            mean_return = ?window.mean_return,
            "Loaded trailing performance"
        );
        self.memory.insert(key, window.clone()).await;
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn trade(instrument: &str, realized_return: f64, closed_at: DateTime<Utc>) -> ClosedTradeRow {
        ClosedTradeRow {
            id: uuid::Uuid::new_v4().to_string(),
            instrument: instrument.to_string(),
            realized_return,
            closed_at: history_timestamp(closed_at),
        }
    }

    fn seeded() -> SqliteTradeHistory {
        let history = SqliteTradeHistory::open_in_memory(Duration::from_secs(60)).unwrap();
        let now = Utc::now();
        for (ret, days_ago) in [(0.03, 1), (0.01, 2), (0.05, 6), (-0.2, 9)] {
            history
                .record(&trade("BTC", ret, now - ChronoDuration::days(days_ago)))
                .unwrap();
        }
        history
            .record(&trade("ETH", -0.04, now - ChronoDuration::hours(3)))
            .unwrap();
        history
    }

    #[test]
    fn window_excludes_old_trades_and_other_instruments() {
        let history = seeded();
        let window = history.query_window("BTC", 7, Utc::now()).unwrap();
        assert_eq!(window.trade_count, 3);
        let mean = window.mean_return.unwrap();
        assert!((mean - 0.03).abs() < 1e-9);
    }

    #[test]
    fn empty_window_has_no_mean() {
        let history = seeded();
        let window = history.query_window("SOL", 7, Utc::now()).unwrap();
        assert_eq!(window.trade_count, 0);
        assert!(window.mean_return.is_none());
    }

    #[tokio::test]
    async fn trailing_performance_is_cached() {
        let history = seeded();
        let first = history.trailing_performance("ETH", 7).await.unwrap();
        assert_eq!(first.trade_count, 1);
        assert_eq!(history.hot_cache_size(), 1);

        // A new trade is not visible until the cached aggregate expires.
        history
            .record(&trade("ETH", 0.02, Utc::now() - ChronoDuration::hours(1)))
            .unwrap();
        let second = history.trailing_performance("ETH", 7).await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn missing_store_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let history = SqliteTradeHistory::open(path.to_str().unwrap(), 10, Duration::from_secs(5));
        assert!(history.trailing_performance("BTC", 7).await.is_err());
    }

    #[tokio::test]
    async fn store_created_later_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.db");
        let path = path.to_str().unwrap();
        let history = SqliteTradeHistory::open(path, 10, Duration::from_secs(5));
        assert!(history.trailing_performance("BTC", 7).await.is_err());

        let conn = Connection::open(path).unwrap();
        conn.execute_batch(TRADE_HISTORY_DDL).unwrap();
        drop(conn);

        let window = history.trailing_performance("BTC", 7).await.unwrap();
        assert_eq!(window.trade_count, 0);
    }
}

/// Schema of the journal the decision loop writes and the supervisor reads.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS operational_state (
///     id          INTEGER PRIMARY KEY CHECK (id = 1),
///     state_json  TEXT NOT NULL,
///     version     INTEGER NOT NULL,
///     updated_at  TEXT NOT NULL
/// );
///
/// CREATE TABLE IF NOT EXISTS activity (
///     seq          INTEGER PRIMARY KEY AUTOINCREMENT,
///     kind         TEXT NOT NULL,
///     instrument   TEXT,
///     payload_json TEXT NOT NULL,
///     recorded_at  TEXT NOT NULL
/// );
/// ```
///
/// `activity` is append-only: rows are never updated or deleted.
pub const JOURNAL_DDL: &str = "\
CREATE TABLE IF NOT EXISTS operational_state (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    state_json  TEXT NOT NULL,
    version     INTEGER NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS activity (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    kind         TEXT NOT NULL,
    instrument   TEXT,
    payload_json TEXT NOT NULL,
    recorded_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_kind ON activity(kind);
CREATE INDEX IF NOT EXISTS idx_activity_instrument ON activity(instrument);
";

/// Schema of the append-only historical trade store.
///
/// Rows are appended by the execution side when a trade closes; the decision
/// loop only ever reads trailing-window aggregates from it.
pub const TRADE_HISTORY_DDL: &str = "\
CREATE TABLE IF NOT EXISTS closed_trades (
    id              TEXT PRIMARY KEY,
    instrument      TEXT NOT NULL,
    realized_return REAL NOT NULL,
    closed_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_closed_trades_instrument ON closed_trades(instrument, closed_at);
";

/// A closed trade as stored in the history table.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTradeRow {
    pub id: String,
    pub instrument: String,
    pub realized_return: f64,
    pub closed_at: String,
}

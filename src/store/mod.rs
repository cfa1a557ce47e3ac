//! SQLite persistence for positions and balance history.
//!
//! Positions are written on creation and updated in place by the
//! monitor; they are never deleted, so the table doubles as the audit
//! trail. Sport and status are stored as stable short codes and
//! re-validated at load time; unknown codes fail loudly.
//!
//! The database is also read by external reporting tools, so every
//! write tolerates transient lock contention with a bounded
//! exponential backoff.

use crate::position::{BalanceSnapshot, Position, PositionStatus, Side, Sport};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const BUSY_RETRIES: u32 = 5;
const BUSY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Aggregate counts over all persisted positions.
#[derive(Debug, Clone, Default)]
pub struct StoreSummary {
    pub active: u32,
    pub closed_profit: u32,
    pub closed_loss: u32,
    pub closed_timeout: u32,
    /// Sum of stake * profit_pct / 100 over closed positions.
    pub realized_profit: Decimal,
}

/// SQLite-backed position store.
pub struct PositionStore {
    conn: Connection,
}

impl PositionStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {parent:?}"))?;
            }
        }

        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let store = Self { conn };
        store.init_schema()?;

        info!("Position store initialized at {:?}", db_path.as_ref());
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                market_id TEXT NOT NULL,
                selection_id INTEGER NOT NULL,
                event_id TEXT NOT NULL,
                event_name TEXT NOT NULL,
                sport TEXT NOT NULL,
                strategy TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                entry_time TEXT NOT NULL,
                stake TEXT NOT NULL,
                liability TEXT NOT NULL,
                take_profit_pct TEXT NOT NULL,
                stop_loss_pct TEXT NOT NULL,
                status TEXT NOT NULL,
                current_price TEXT,
                profit_pct TEXT,
                close_reason TEXT,
                close_time TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status);
            CREATE INDEX IF NOT EXISTS idx_positions_market ON positions(market_id);

            CREATE TABLE IF NOT EXISTS balance_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                available TEXT NOT NULL,
                total TEXT NOT NULL,
                exposure TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp
                ON balance_snapshots(timestamp);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Run a statement, retrying on lock contention with exponential
    /// backoff. Reporting tools share this database.
    fn with_retry<T>(&self, mut op: impl FnMut(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut delay = BUSY_BASE_DELAY;
        let mut attempt = 0;
        loop {
            match op(&self.conn) {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) && attempt < BUSY_RETRIES => {
                    warn!(attempt, "database busy, backing off");
                    std::thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Persist a freshly created position.
    pub fn insert_position(&self, position: &Position) -> Result<()> {
        self.with_retry(|conn| {
            conn.execute(
                r#"
                INSERT INTO positions (id, market_id, selection_id, event_id, event_name,
                                       sport, strategy, side, entry_price, entry_time,
                                       stake, liability, take_profit_pct, stop_loss_pct, status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
                params![
                    position.id,
                    position.market_id,
                    position.selection_id,
                    position.event_id,
                    position.event_name,
                    position.sport.code(),
                    position.strategy,
                    position.side.code(),
                    position.entry_price.to_string(),
                    position.entry_time.to_rfc3339(),
                    position.stake.to_string(),
                    position.liability.to_string(),
                    position.take_profit_pct.to_string(),
                    position.stop_loss_pct.to_string(),
                    position.status.code(),
                ],
            )
        })?;

        debug!(position_id = %position.id, market_id = %position.market_id, "Position persisted");
        Ok(())
    }

    /// Update the monitor-owned fields of an ACTIVE position.
    pub fn update_monitoring(
        &self,
        position_id: &str,
        current_price: Decimal,
        profit_pct: Decimal,
    ) -> Result<()> {
        self.with_retry(|conn| {
            conn.execute(
                "UPDATE positions SET current_price = ?2, profit_pct = ?3 WHERE id = ?1",
                params![position_id, current_price.to_string(), profit_pct.to_string()],
            )
        })?;
        Ok(())
    }

    /// Transition a position to a terminal state.
    pub fn close_position(
        &self,
        position_id: &str,
        status: PositionStatus,
        profit_pct: Decimal,
        close_reason: &str,
        current_price: Decimal,
        close_time: DateTime<Utc>,
    ) -> Result<()> {
        anyhow::ensure!(
            status.is_terminal(),
            "close_position called with non-terminal status {status}"
        );

        self.with_retry(|conn| {
            conn.execute(
                r#"
                UPDATE positions
                SET status = ?2, profit_pct = ?3, close_reason = ?4,
                    current_price = ?5, close_time = ?6
                WHERE id = ?1 AND status = 'ACT'
                "#,
                params![
                    position_id,
                    status.code(),
                    profit_pct.to_string(),
                    close_reason,
                    current_price.to_string(),
                    close_time.to_rfc3339(),
                ],
            )
        })?;
        Ok(())
    }

    /// Load all ACTIVE positions. Malformed records fail loudly.
    pub fn active_positions(&self) -> Result<Vec<Position>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, market_id, selection_id, event_id, event_name, sport, strategy,
                   side, entry_price, entry_time, stake, liability, take_profit_pct,
                   stop_loss_pct, status, current_price, profit_pct, close_reason, close_time
            FROM positions WHERE status = 'ACT'
            "#,
        )?;

        let raw_rows: Vec<RawPosition> = stmt
            .query_map([], RawPosition::from_row)?
            .collect::<rusqlite::Result<_>>()?;

        raw_rows.into_iter().map(RawPosition::parse).collect()
    }

    /// Whether the market already has an ACTIVE position.
    pub fn has_active_in_market(&self, market_id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM positions WHERE market_id = ?1 AND status = 'ACT'",
            params![market_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Number of ACTIVE positions for one sport.
    pub fn active_count_for_sport(&self, sport: Sport) -> Result<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM positions WHERE sport = ?1 AND status = 'ACT'",
            params![sport.code()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Record a periodic account balance snapshot.
    pub fn record_balance_snapshot(&self, snapshot: &BalanceSnapshot) -> Result<()> {
        self.with_retry(|conn| {
            conn.execute(
                r#"
                INSERT INTO balance_snapshots (timestamp, available, total, exposure)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    Utc::now().to_rfc3339(),
                    snapshot.available.to_string(),
                    snapshot.total.to_string(),
                    snapshot.exposure.to_string(),
                ],
            )
        })?;
        Ok(())
    }

    /// Aggregate counts and realized profit across all positions.
    pub fn summary(&self) -> Result<StoreSummary> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, stake, profit_pct FROM positions")?;

        let rows: Vec<(String, String, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<rusqlite::Result<_>>()?;

        let mut summary = StoreSummary::default();
        for (status_code, stake, profit_pct) in rows {
            let status = PositionStatus::from_code(&status_code)?;
            match status {
                PositionStatus::Active => summary.active += 1,
                PositionStatus::ClosedProfit => summary.closed_profit += 1,
                PositionStatus::ClosedLoss => summary.closed_loss += 1,
                PositionStatus::ClosedTimeout => summary.closed_timeout += 1,
            }
            if status.is_terminal() {
                if let Some(pct) = profit_pct {
                    let stake = parse_decimal(&stake, "stake")?;
                    let pct = parse_decimal(&pct, "profit_pct")?;
                    summary.realized_profit += stake * pct / Decimal::new(100, 0);
                }
            }
        }
        Ok(summary)
    }
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

fn parse_decimal(text: &str, field: &str) -> Result<Decimal> {
    Decimal::from_str(text).with_context(|| format!("malformed {field} in store: {text:?}"))
}

fn parse_datetime(text: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("malformed {field} in store: {text:?}"))
}

/// Row as stored, before validation.
struct RawPosition {
    id: String,
    market_id: String,
    selection_id: i64,
    event_id: String,
    event_name: String,
    sport: String,
    strategy: String,
    side: String,
    entry_price: String,
    entry_time: String,
    stake: String,
    liability: String,
    take_profit_pct: String,
    stop_loss_pct: String,
    status: String,
    current_price: Option<String>,
    profit_pct: Option<String>,
    close_reason: Option<String>,
    close_time: Option<String>,
}

impl RawPosition {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            market_id: row.get(1)?,
            selection_id: row.get(2)?,
            event_id: row.get(3)?,
            event_name: row.get(4)?,
            sport: row.get(5)?,
            strategy: row.get(6)?,
            side: row.get(7)?,
            entry_price: row.get(8)?,
            entry_time: row.get(9)?,
            stake: row.get(10)?,
            liability: row.get(11)?,
            take_profit_pct: row.get(12)?,
            stop_loss_pct: row.get(13)?,
            status: row.get(14)?,
            current_price: row.get(15)?,
            profit_pct: row.get(16)?,
            close_reason: row.get(17)?,
            close_time: row.get(18)?,
        })
    }

    fn parse(self) -> Result<Position> {
        Ok(Position {
            id: self.id,
            market_id: self.market_id,
            selection_id: self.selection_id,
            event_id: self.event_id,
            event_name: self.event_name,
            sport: Sport::from_code(&self.sport)?,
            strategy: self.strategy,
            side: Side::from_code(&self.side)?,
            entry_price: parse_decimal(&self.entry_price, "entry_price")?,
            entry_time: parse_datetime(&self.entry_time, "entry_time")?,
            stake: parse_decimal(&self.stake, "stake")?,
            liability: parse_decimal(&self.liability, "liability")?,
            take_profit_pct: parse_decimal(&self.take_profit_pct, "take_profit_pct")?,
            stop_loss_pct: parse_decimal(&self.stop_loss_pct, "stop_loss_pct")?,
            status: PositionStatus::from_code(&self.status)?,
            current_price: self
                .current_price
                .map(|p| parse_decimal(&p, "current_price"))
                .transpose()?,
            profit_pct: self
                .profit_pct
                .map(|p| parse_decimal(&p, "profit_pct"))
                .transpose()?,
            close_reason: self.close_reason,
            close_time: self
                .close_time
                .map(|t| parse_datetime(&t, "close_time"))
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_position(id: &str, market_id: &str, sport: Sport) -> Position {
        Position {
            id: id.to_string(),
            market_id: market_id.to_string(),
            selection_id: 101,
            event_id: "ev-1".to_string(),
            event_name: "Team A v Team B".to_string(),
            sport,
            strategy: "Back Under 4.5".to_string(),
            side: Side::Back,
            entry_price: dec!(1.25),
            entry_time: Utc::now(),
            stake: dec!(50),
            liability: Decimal::ZERO,
            take_profit_pct: dec!(1.5),
            stop_loss_pct: dec!(10),
            status: PositionStatus::Active,
            current_price: None,
            profit_pct: None,
            close_reason: None,
            close_time: None,
        }
    }

    #[test]
    fn insert_and_load_active_round_trip() {
        let store = PositionStore::in_memory().unwrap();
        store
            .insert_position(&sample_position("bet-1", "1.234", Sport::Soccer))
            .unwrap();

        let active = store.active_positions().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "bet-1");
        assert_eq!(active[0].sport, Sport::Soccer);
        assert_eq!(active[0].entry_price, dec!(1.25));
        assert_eq!(active[0].status, PositionStatus::Active);
    }

    #[test]
    fn closed_positions_leave_the_active_set() {
        let store = PositionStore::in_memory().unwrap();
        store
            .insert_position(&sample_position("bet-1", "1.234", Sport::Soccer))
            .unwrap();

        store
            .close_position(
                "bet-1",
                PositionStatus::ClosedProfit,
                dec!(4.0),
                "Take Profit: 4.00%",
                dec!(1.20),
                Utc::now(),
            )
            .unwrap();

        assert!(store.active_positions().unwrap().is_empty());
        let summary = store.summary().unwrap();
        assert_eq!(summary.closed_profit, 1);
        assert_eq!(summary.realized_profit, dec!(2.0)); // 50 * 4% = 2.00
    }

    #[test]
    fn close_requires_terminal_status() {
        let store = PositionStore::in_memory().unwrap();
        let err = store.close_position(
            "bet-1",
            PositionStatus::Active,
            dec!(0),
            "nope",
            dec!(1.0),
            Utc::now(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn terminal_positions_cannot_be_reclosed() {
        let store = PositionStore::in_memory().unwrap();
        store
            .insert_position(&sample_position("bet-1", "1.234", Sport::Soccer))
            .unwrap();
        store
            .close_position(
                "bet-1",
                PositionStatus::ClosedProfit,
                dec!(2.0),
                "Take Profit: 2.00%",
                dec!(1.22),
                Utc::now(),
            )
            .unwrap();

        // A second close is a no-op: the WHERE clause only matches ACT.
        store
            .close_position(
                "bet-1",
                PositionStatus::ClosedLoss,
                dec!(-12.0),
                "Stop Loss: -12.00%",
                dec!(1.60),
                Utc::now(),
            )
            .unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.closed_profit, 1);
        assert_eq!(summary.closed_loss, 0);
    }

    #[test]
    fn active_counts_by_market_and_sport() {
        let store = PositionStore::in_memory().unwrap();
        store
            .insert_position(&sample_position("bet-1", "1.234", Sport::Soccer))
            .unwrap();
        store
            .insert_position(&sample_position("bet-2", "1.235", Sport::Soccer))
            .unwrap();
        store
            .insert_position(&sample_position("bet-3", "1.236", Sport::Tennis))
            .unwrap();

        assert!(store.has_active_in_market("1.234").unwrap());
        assert!(!store.has_active_in_market("1.999").unwrap());
        assert_eq!(store.active_count_for_sport(Sport::Soccer).unwrap(), 2);
        assert_eq!(store.active_count_for_sport(Sport::IceHockey).unwrap(), 0);
    }

    #[test]
    fn unknown_sport_code_fails_loudly() {
        let store = PositionStore::in_memory().unwrap();
        store
            .insert_position(&sample_position("bet-1", "1.234", Sport::Soccer))
            .unwrap();
        store
            .conn
            .execute("UPDATE positions SET sport = 'XXX'", [])
            .unwrap();

        assert!(store.active_positions().is_err());
    }

    #[test]
    fn balance_snapshots_are_recorded() {
        let store = PositionStore::in_memory().unwrap();
        store
            .record_balance_snapshot(&BalanceSnapshot {
                available: dec!(250),
                total: dec!(300),
                exposure: dec!(50),
            })
            .unwrap();

        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM balance_snapshots", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}

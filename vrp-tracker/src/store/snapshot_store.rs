//! SQLite-backed snapshot store for `VrpRecord`s.
//!
//! The `vrp_data` table is append-only: rows are inserted once per expiry per
//! run and never updated or deleted. There is no uniqueness constraint on
//! (symbol, run_date, expiry), so re-running a day appends duplicates.

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, Row, TransactionBehavior};
use tracing::{debug, info};

use crate::data::VrpRecord;

use super::{RecordSink, StoreError, StoreResult};

const VRP_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS vrp_data (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol      TEXT,
        run_date    DATE,
        expiry      TEXT,
        ltp         REAL,
        atm_strike  INTEGER,
        atm_iv      REAL,
        rv_5d       REAL,
        vrp_5d      REAL,
        rv_10d      REAL,
        vrp_10d     REAL,
        rv_20d      REAL,
        vrp_20d     REAL,
        inserted_at TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_vrp_symbol_run
        ON vrp_data(symbol, run_date);
"#;

const INSERT_SQL: &str = "INSERT INTO vrp_data
    (symbol, run_date, expiry, ltp, atm_strike, atm_iv,
     rv_5d, vrp_5d, rv_10d, vrp_10d, rv_20d, vrp_20d, inserted_at)
    VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)";

const SELECT_ALL_SQL: &str = "SELECT id, symbol, run_date, expiry, ltp, atm_strike, atm_iv,
    rv_5d, vrp_5d, rv_10d, vrp_10d, rv_20d, vrp_20d, inserted_at
    FROM vrp_data
    ORDER BY id";

/// Expiry text formats accepted when reading rows back.
const EXPIRY_FORMATS: &[&str] = &["%Y-%m-%d", "%d-%b-%Y"];

pub enum StoreMode {
    /// Read-only connection for viewers.
    Read,
    /// Read-write connection; creates the file if missing.
    Write,
    /// Private in-memory database.
    Memory,
}

pub struct SnapshotStore {
    connection: Connection,
}

impl SnapshotStore {
    pub fn open(path: impl AsRef<Path>, mode: StoreMode) -> StoreResult<Self> {
        let connection = match mode {
            StoreMode::Read => {
                let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                let conn = Connection::open_with_flags(path.as_ref(), flags)?;
                conn.execute_batch(
                    r#"
                    PRAGMA query_only=ON;
                    PRAGMA temp_store=MEMORY;
                "#,
                )?;
                conn
            }
            StoreMode::Write => {
                let conn = Connection::open(path.as_ref())?;
                conn.execute_batch(
                    r#"
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA temp_store=MEMORY;
                "#,
                )?;
                conn
            }
            StoreMode::Memory => Connection::open_in_memory()?,
        };

        Ok(Self { connection })
    }

    pub fn open_write(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(path, StoreMode::Write)
    }

    pub fn open_read(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open(path, StoreMode::Read)
    }

    pub fn open_memory() -> StoreResult<Self> {
        Self::open(":memory:", StoreMode::Memory)
    }

    /// Create `vrp_data` if it does not exist. Safe to call on every run.
    pub fn ensure_schema(&self) -> StoreResult<()> {
        self.connection.execute_batch(VRP_SCHEMA)?;
        Ok(())
    }

    pub fn has_schema(&self) -> StoreResult<bool> {
        let count: i64 = self.connection.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='vrp_data'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert every record in one immediate transaction.
    ///
    /// Either the whole batch is committed or nothing is. Returns the number
    /// of rows inserted.
    pub fn append(&mut self, records: &[VrpRecord]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let tx = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare_cached(INSERT_SQL)?;
            for r in records {
                stmt.execute(params![
                    r.symbol,
                    r.run_date,
                    r.expiry.format("%Y-%m-%d").to_string(),
                    r.ltp,
                    r.atm_strike,
                    r.atm_iv,
                    r.rv_5d,
                    r.vrp_5d,
                    r.rv_10d,
                    r.vrp_10d,
                    r.rv_20d,
                    r.vrp_20d,
                    r.inserted_at,
                ])?;
            }
        }
        tx.commit()?;

        info!("Appended {} rows to vrp_data", records.len());
        Ok(records.len())
    }

    /// Full table scan in insertion order.
    pub fn load_all(&self) -> StoreResult<Vec<VrpRecord>> {
        let mut stmt = self.connection.prepare_cached(SELECT_ALL_SQL)?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Loaded {} rows from vrp_data", records.len());
        Ok(records)
    }

    pub fn row_count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM vrp_data", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| StoreError::Corrupt(format!("row count {count}")))
    }
}

impl RecordSink for SnapshotStore {
    fn append(&mut self, records: &[VrpRecord]) -> StoreResult<usize> {
        SnapshotStore::append(self, records)
    }
}

fn parse_expiry(value: &str) -> Option<NaiveDate> {
    EXPIRY_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value.trim(), fmt).ok())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<VrpRecord> {
    let expiry_text: String = row.get(3)?;
    let expiry = parse_expiry(&expiry_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unrecognised expiry '{expiry_text}'").into(),
        )
    })?;

    Ok(VrpRecord {
        id: row.get(0)?,
        symbol: row.get(1)?,
        run_date: row.get(2)?,
        expiry,
        ltp: row.get(4)?,
        atm_strike: row.get(5)?,
        atm_iv: row.get(6)?,
        rv_5d: row.get(7)?,
        vrp_5d: row.get(8)?,
        rv_10d: row.get(9)?,
        vrp_10d: row.get(10)?,
        rv_20d: row.get(11)?,
        vrp_20d: row.get(12)?,
        inserted_at: row.get(13)?,
    })
}

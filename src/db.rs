// 🗄️ SQLite Store - Durable ParkingStore backed by rusqlite + WAL
//
// Tables:
// - residents        (identity: name, unit)
// - plates           (plate → resident)
// - spots            (number, category, state, owning resident)
// - visitor_sessions (one row per session, updated in place when settled)
//
// The database only stores records. Fares are computed by TariffCalculator
// before the CLOSED row is written.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::entities::{
    ParkingSpot, Resident, ResidentRecord, SessionStatus, SpotCategory, SpotId, SpotRecord,
    SpotState, VisitorSession,
};
use crate::store::{ParkingStore, StoreWrite};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        setup_database(&conn)?;
        debug!(path = %path.display(), "sqlite store opened");
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery (no-op for in-memory databases)
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS residents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            unit TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS spots (
            number INTEGER PRIMARY KEY,
            category TEXT NOT NULL CHECK (category IN ('RESIDENT', 'VISITOR')),
            state TEXT NOT NULL DEFAULT 'FREE' CHECK (state IN ('FREE', 'OCCUPIED')),
            resident_id INTEGER UNIQUE REFERENCES residents(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS plates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            resident_id INTEGER NOT NULL REFERENCES residents(id) ON DELETE CASCADE,
            plate TEXT UNIQUE NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS visitor_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_uuid TEXT UNIQUE NOT NULL,
            plate TEXT NOT NULL,
            spot_number INTEGER NOT NULL REFERENCES spots(number),
            status TEXT NOT NULL CHECK (status IN ('OPEN', 'CLOSED')),
            entry_time TEXT NOT NULL,
            exit_time TEXT,
            elapsed_hours REAL,
            amount INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_status ON visitor_sessions(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_plate ON visitor_sessions(plate)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn bad_enum(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("unexpected value {:?}", raw).into(),
    )
}

fn spot_from_row(row: &Row) -> rusqlite::Result<ParkingSpot> {
    let category: String = row.get(1)?;
    let state: String = row.get(2)?;

    Ok(ParkingSpot {
        id: SpotId(row.get(0)?),
        category: SpotCategory::parse(&category).ok_or_else(|| bad_enum(1, &category))?,
        state: SpotState::parse(&state).ok_or_else(|| bad_enum(2, &state))?,
        owner: row.get(3)?,
    })
}

const SESSION_COLUMNS: &str =
    "session_uuid, plate, spot_number, status, entry_time, exit_time, elapsed_hours, amount";

fn session_from_row(row: &Row) -> rusqlite::Result<VisitorSession> {
    let status: String = row.get(3)?;
    let entry_time: String = row.get(4)?;
    let exit_time: Option<String> = row.get(5)?;

    Ok(VisitorSession {
        id: row.get(0)?,
        plate: row.get(1)?,
        spot_id: SpotId(row.get(2)?),
        status: SessionStatus::parse(&status).ok_or_else(|| bad_enum(3, &status))?,
        entry_time: parse_time(4, &entry_time)?,
        exit_time: exit_time.map(|s| parse_time(5, &s)).transpose()?,
        elapsed_hours: row.get(6)?,
        amount: row.get(7)?,
    })
}

fn plates_of(conn: &Connection, resident_id: i64) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT plate FROM plates WHERE resident_id = ?1 ORDER BY id")?;
    let plates = stmt
        .query_map([resident_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(plates)
}

fn write_session(conn: &Connection, session: &VisitorSession) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO visitor_sessions (
            session_uuid, plate, spot_number, status, entry_time, exit_time, elapsed_hours, amount
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(session_uuid) DO UPDATE SET
            status = excluded.status,
            exit_time = excluded.exit_time,
            elapsed_hours = excluded.elapsed_hours,
            amount = excluded.amount",
        params![
            session.id,
            session.plate,
            session.spot_id.0,
            session.status.as_str(),
            session.entry_time.to_rfc3339(),
            session.exit_time.map(|t| t.to_rfc3339()),
            session.elapsed_hours,
            session.amount,
        ],
    )
}

// ============================================================================
// STORE IMPLEMENTATION
// ============================================================================

impl ParkingStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn resolve_resident_by_plate(&self, plate: &str) -> Result<Option<ResidentRecord>> {
        let conn = self.lock()?;

        let found = conn
            .query_row(
                "SELECT r.id, r.name, r.unit, s.number, s.state
                 FROM plates pl
                 JOIN residents r ON pl.resident_id = r.id
                 JOIN spots s ON s.resident_id = r.id
                 WHERE pl.plate = ?1",
                [plate],
                |row| {
                    let state: String = row.get(4)?;
                    Ok((
                        Resident::new(
                            row.get(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ),
                        SpotId(row.get(3)?),
                        SpotState::parse(&state).ok_or_else(|| bad_enum(4, &state))?,
                    ))
                },
            )
            .optional()
            .context("Failed to resolve resident by plate")?;

        let Some((mut resident, spot_id, spot_state)) = found else {
            return Ok(None);
        };
        resident.plates = plates_of(&conn, resident.id)?;

        Ok(Some(ResidentRecord {
            resident,
            spot_id,
            spot_state,
        }))
    }

    fn load_all_spots(&self) -> Result<Vec<SpotRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT number, category, state, resident_id FROM spots ORDER BY number",
        )?;

        let spots = stmt
            .query_map([], spot_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load spots")?;

        Ok(spots)
    }

    fn load_open_sessions(&self) -> Result<Vec<VisitorSession>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM visitor_sessions WHERE status = 'OPEN' ORDER BY entry_time",
            SESSION_COLUMNS
        ))?;

        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load open sessions")?;

        Ok(sessions)
    }

    fn load_closed_sessions(&self) -> Result<Vec<VisitorSession>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM visitor_sessions WHERE status = 'CLOSED' ORDER BY exit_time, id",
            SESSION_COLUMNS
        ))?;

        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to load closed sessions")?;

        Ok(sessions)
    }

    fn persist(&self, writes: &[StoreWrite]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        for write in writes {
            match write {
                StoreWrite::SpotState { spot_id, state } => {
                    let updated = tx.execute(
                        "UPDATE spots SET state = ?1 WHERE number = ?2",
                        params![state.as_str(), spot_id.0],
                    )?;
                    if updated == 0 {
                        // Dropping `tx` rolls back everything written so far
                        bail!("unknown spot {}", spot_id);
                    }
                }
                StoreWrite::Session(session) => {
                    write_session(&tx, session)
                        .with_context(|| format!("Failed to write session {}", session.id))?;
                }
            }
        }

        tx.commit().context("Failed to commit parking writes")?;
        Ok(())
    }

    fn provision_resident(
        &self,
        name: &str,
        unit: &str,
        plates: &[String],
        spot_id: SpotId,
    ) -> Result<Resident> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO residents (name, unit) VALUES (?1, ?2)",
            params![name, unit],
        )?;
        let resident_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO spots (number, category, state, resident_id) VALUES (?1, 'RESIDENT', 'FREE', ?2)",
            params![spot_id.0, resident_id],
        )
        .with_context(|| format!("Failed to create resident spot {}", spot_id))?;

        for plate in plates {
            tx.execute(
                "INSERT INTO plates (resident_id, plate) VALUES (?1, ?2)",
                params![resident_id, plate],
            )
            .with_context(|| format!("Failed to register plate {}", plate))?;
        }

        tx.commit()?;

        Ok(plates
            .iter()
            .fold(Resident::new(resident_id, name, unit), |r, p| r.with_plate(p.clone())))
    }

    fn provision_visitor_spot(&self, spot_id: SpotId) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO spots (number, category, state) VALUES (?1, 'VISITOR', 'FREE')",
            [spot_id.0],
        )
        .with_context(|| format!("Failed to create visitor spot {}", spot_id))?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

// 🎫 Visitor Session - OPEN → CLOSED, exactly once
//
// A session binds one plate to one visitor spot from entry until settlement.
// Closed sessions are moved into an append-only history and never touched again.
//
// Invariants:
// - at most one OPEN session per plate
// - at most one OPEN session per visitor spot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::spot::SpotId;
use crate::error::{ParkingError, Result};
use crate::tariff::{elapsed_hours, Amount};

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "OPEN",
            SessionStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(SessionStatus::Open),
            "CLOSED" => Some(SessionStatus::Closed),
            _ => None,
        }
    }
}

// ============================================================================
// VISITOR SESSION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorSession {
    /// Stable identity (UUID)
    pub id: SessionId,
    pub plate: String,
    pub spot_id: SpotId,
    pub status: SessionStatus,
    pub entry_time: DateTime<Utc>,

    // ========================================================================
    // SETTLEMENT (set once, on close)
    // ========================================================================
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_hours: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
}

impl VisitorSession {
    /// New OPEN session with a fresh UUID
    pub fn open(plate: impl Into<String>, spot_id: SpotId, entry_time: DateTime<Utc>) -> Self {
        VisitorSession {
            id: uuid::Uuid::new_v4().to_string(),
            plate: plate.into(),
            spot_id,
            status: SessionStatus::Open,
            entry_time,
            exit_time: None,
            elapsed_hours: None,
            amount: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// The CLOSED value this session becomes when settled at `exit_time`
    pub fn closed_at(&self, exit_time: DateTime<Utc>, amount: Amount) -> VisitorSession {
        VisitorSession {
            status: SessionStatus::Closed,
            exit_time: Some(exit_time),
            elapsed_hours: Some(elapsed_hours(self.entry_time, exit_time)),
            amount: Some(amount),
            ..self.clone()
        }
    }
}

// ============================================================================
// SESSION TRACKER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct VisitorSessionTracker {
    /// OPEN sessions keyed by plate
    open: HashMap<String, VisitorSession>,

    /// CLOSED sessions in settlement order (append-only)
    history: Vec<VisitorSession>,
}

impl VisitorSessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from durable records
    pub fn restore(open: Vec<VisitorSession>, closed: Vec<VisitorSession>) -> Result<Self> {
        let mut tracker = VisitorSessionTracker::new();

        for session in open {
            if !session.is_open() {
                return Err(ParkingError::SessionNotOpen(session.id));
            }
            tracker.insert_open(session)?;
        }

        for session in closed {
            if session.is_open() {
                return Err(ParkingError::PersistenceFailure(format!(
                    "session {} listed as closed is still open",
                    session.id
                )));
            }
            tracker.history.push(session);
        }

        Ok(tracker)
    }

    /// Open a session for `plate` on `spot_id`
    pub fn open(
        &mut self,
        plate: &str,
        spot_id: SpotId,
        entry_time: DateTime<Utc>,
    ) -> Result<SessionId> {
        let session = VisitorSession::open(plate, spot_id, entry_time);
        let id = session.id.clone();
        self.insert_open(session)?;
        Ok(id)
    }

    /// Track an already-built OPEN session (used when the durable record came first)
    pub fn insert_open(&mut self, session: VisitorSession) -> Result<()> {
        if self.open.contains_key(&session.plate) {
            return Err(ParkingError::AlreadyActive(session.plate));
        }
        if self.open_on_spot(session.spot_id).is_some() {
            return Err(ParkingError::SpotInUse(session.spot_id));
        }
        self.open.insert(session.plate.clone(), session);
        Ok(())
    }

    pub fn find_open(&self, plate: &str) -> Option<&VisitorSession> {
        self.open.get(plate)
    }

    pub fn open_on_spot(&self, spot_id: SpotId) -> Option<&VisitorSession> {
        self.open.values().find(|s| s.spot_id == spot_id)
    }

    /// OPEN → CLOSED; the closed record is appended to history and returned
    pub fn close(
        &mut self,
        session_id: &str,
        exit_time: DateTime<Utc>,
        amount: Amount,
    ) -> Result<VisitorSession> {
        let plate = self
            .open
            .values()
            .find(|s| s.id == session_id)
            .map(|s| s.plate.clone())
            .ok_or_else(|| ParkingError::SessionNotOpen(session_id.to_string()))?;

        let session = self
            .open
            .remove(&plate)
            .ok_or_else(|| ParkingError::SessionNotOpen(session_id.to_string()))?;

        let closed = session.closed_at(exit_time, amount);
        self.history.push(closed.clone());
        Ok(closed)
    }

    /// OPEN sessions ordered by entry time
    pub fn open_sessions(&self) -> Vec<VisitorSession> {
        let mut sessions: Vec<VisitorSession> = self.open.values().cloned().collect();
        sessions.sort_by(|a, b| a.entry_time.cmp(&b.entry_time).then(a.plate.cmp(&b.plate)));
        sessions
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Every CLOSED session, oldest settlement first
    pub fn history(&self) -> &[VisitorSession] {
        &self.history
    }

    /// Newest settlements first, at most `limit`
    pub fn recent_history(&self, limit: usize) -> Vec<VisitorSession> {
        self.history.iter().rev().take(limit).cloned().collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

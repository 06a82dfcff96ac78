// 🚧 Access Controller - Entry/exit orchestration
//
// Four state-changing operations, each one atomic unit of work:
//   resident_entry / resident_exit / visitor_entry / visitor_settle
//
// Every operation runs under the single state write lock, in this order:
//   1. check   (typed rejection, nothing changed)
//   2. durable (store write; failure → PersistenceFailure, nothing changed)
//   3. apply   (in-memory registry + tracker)
//
// Readers (StatsAggregator, plate_status, quote) take the read lock and see
// either the state before or after a mutation, never a mix.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::entities::{
    normalize_plate, ParkingSpot, Resident, ResidentRecord, SessionId, SpotCategory, SpotId,
    SpotRegistry, SpotState, VisitorSession, VisitorSessionTracker,
};
use crate::error::{ParkingError, Result};
use crate::stats::StatsAggregator;
use crate::store::{ParkingStore, StoreWrite};
use crate::tariff::{elapsed_hours, Amount, TariffCalculator};

// ============================================================================
// SHARED STATE
// ============================================================================

/// Registry + tracker, always locked together
#[derive(Debug, Default)]
pub struct ParkingState {
    spots: SpotRegistry,
    sessions: VisitorSessionTracker,
}

impl ParkingState {
    pub fn spots(&self) -> &SpotRegistry {
        &self.spots
    }

    pub fn sessions(&self) -> &VisitorSessionTracker {
        &self.sessions
    }
}

pub type SharedState = Arc<RwLock<ParkingState>>;

// ============================================================================
// RESULTS
// ============================================================================

/// Outcome of a resident entry or exit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidentAccess {
    pub resident: Resident,
    pub spot_id: SpotId,
    pub state: SpotState,
}

/// Outcome of an accepted visitor entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitorTicket {
    pub session_id: SessionId,
    pub plate: String,
    pub spot_id: SpotId,
    pub entry_time: DateTime<Utc>,
}

/// Settlement (or quote) for a visitor stay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub session_id: SessionId,
    pub plate: String,
    pub spot_id: SpotId,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub elapsed_hours: f64,
    pub amount: Amount,
}

impl Receipt {
    fn for_stay(session: &VisitorSession, exit_time: DateTime<Utc>, amount: Amount) -> Self {
        Receipt {
            session_id: session.id.clone(),
            plate: session.plate.clone(),
            spot_id: session.spot_id,
            entry_time: session.entry_time,
            exit_time,
            elapsed_hours: elapsed_hours(session.entry_time, exit_time),
            amount,
        }
    }
}

/// What the gate knows about a plate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlateStatus {
    Resident {
        resident: Resident,
        spot_id: SpotId,
        state: SpotState,
    },
    ActiveVisitor {
        session: VisitorSession,
        elapsed_hours: f64,
        /// None while no measurable time has passed
        fare_so_far: Option<Amount>,
    },
    Unregistered {
        plate: String,
    },
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct AccessController {
    state: SharedState,
    store: Arc<dyn ParkingStore>,
    tariff: TariffCalculator,
    clock: Arc<dyn Clock>,
}

impl AccessController {
    /// Load spots and sessions from the store and cross-check them
    pub fn bootstrap(
        store: Arc<dyn ParkingStore>,
        tariff: TariffCalculator,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let spots = SpotRegistry::from_records(
            store.load_all_spots().map_err(ParkingError::persistence)?,
        )?;
        let sessions = VisitorSessionTracker::restore(
            store.load_open_sessions().map_err(ParkingError::persistence)?,
            store.load_closed_sessions().map_err(ParkingError::persistence)?,
        )?;

        check_visitor_bindings(&spots, &sessions)?;

        debug!(
            backend = store.backend(),
            spots = spots.len(),
            open_sessions = sessions.open_count(),
            settled = sessions.history().len(),
            "parking state restored"
        );

        Ok(AccessController {
            state: Arc::new(RwLock::new(ParkingState { spots, sessions })),
            store,
            tariff,
            clock,
        })
    }

    pub fn tariff(&self) -> &TariffCalculator {
        &self.tariff
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Read-only projections over the same state
    pub fn stats(&self) -> StatsAggregator {
        StatsAggregator::new(Arc::clone(&self.state))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Consistent copy of every spot
    pub fn snapshot(&self) -> Result<Vec<ParkingSpot>> {
        Ok(self.read_state()?.spots.snapshot())
    }

    // ========================================================================
    // RESIDENT FLOW
    // ========================================================================

    pub fn resident_entry(&self, plate: &str) -> Result<ResidentAccess> {
        self.move_resident(plate, SpotState::Occupied)
            .map_err(|e| rejected("resident_entry", plate, e))
    }

    pub fn resident_exit(&self, plate: &str) -> Result<ResidentAccess> {
        self.move_resident(plate, SpotState::Free)
            .map_err(|e| rejected("resident_exit", plate, e))
    }

    fn move_resident(&self, raw_plate: &str, target: SpotState) -> Result<ResidentAccess> {
        let plate = normalize_plate(raw_plate)?;
        let mut state = self.write_state()?;

        let record = self
            .resolve(&plate)?
            .ok_or_else(|| ParkingError::NotAResident(plate.clone()))?;
        let resident_id = record.resident.id;

        let spot = state
            .spots
            .spot_of_resident(resident_id)
            .ok_or_else(|| ParkingError::NotAResident(plate.clone()))?;
        if spot.state == target {
            return Err(match target {
                SpotState::Occupied => ParkingError::AlreadyOccupied(spot.id),
                SpotState::Free => ParkingError::AlreadyFree(spot.id),
            });
        }
        let spot_id = spot.id;

        self.durable(&[StoreWrite::SpotState {
            spot_id,
            state: target,
        }])?;
        state.spots.mark_resident_spot(resident_id, target)?;

        info!(
            plate = %plate,
            spot = %spot_id,
            state = target.as_str(),
            resident = %record.resident.name,
            "resident spot updated"
        );

        Ok(ResidentAccess {
            resident: record.resident,
            spot_id,
            state: target,
        })
    }

    // ========================================================================
    // VISITOR FLOW
    // ========================================================================

    pub fn visitor_entry(&self, plate: &str) -> Result<VisitorTicket> {
        self.admit_visitor(plate)
            .map_err(|e| rejected("visitor_entry", plate, e))
    }

    fn admit_visitor(&self, raw_plate: &str) -> Result<VisitorTicket> {
        let plate = normalize_plate(raw_plate)?;
        let mut state = self.write_state()?;

        if self.resolve(&plate)?.is_some() {
            return Err(ParkingError::IsResident(plate));
        }
        if state.sessions.find_open(&plate).is_some() {
            return Err(ParkingError::AlreadyActive(plate));
        }
        let spot_id = state
            .spots
            .first_free_visitor_spot()
            .ok_or(ParkingError::NoSpotAvailable)?;

        let session = VisitorSession::open(plate.as_str(), spot_id, self.clock.now());
        self.durable(&[
            StoreWrite::Session(session.clone()),
            StoreWrite::SpotState {
                spot_id,
                state: SpotState::Occupied,
            },
        ])?;

        let allocated = state.spots.allocate_visitor_spot()?;
        debug_assert_eq!(allocated, spot_id);
        state.sessions.insert_open(session.clone())?;

        info!(plate = %plate, spot = %spot_id, session = %session.id, "visitor admitted");

        Ok(VisitorTicket {
            session_id: session.id,
            plate,
            spot_id,
            entry_time: session.entry_time,
        })
    }

    pub fn visitor_settle(&self, plate: &str) -> Result<Receipt> {
        self.settle_visitor(plate)
            .map_err(|e| rejected("visitor_settle", plate, e))
    }

    fn settle_visitor(&self, raw_plate: &str) -> Result<Receipt> {
        let plate = normalize_plate(raw_plate)?;
        let mut state = self.write_state()?;

        let session = state
            .sessions
            .find_open(&plate)
            .cloned()
            .ok_or_else(|| ParkingError::NotActive(plate.clone()))?;

        let exit_time = self.clock.now();
        let amount = self.tariff.fare(session.entry_time, exit_time)?;
        let closed = session.closed_at(exit_time, amount);

        self.durable(&[
            StoreWrite::Session(closed),
            StoreWrite::SpotState {
                spot_id: session.spot_id,
                state: SpotState::Free,
            },
        ])?;

        state.sessions.close(&session.id, exit_time, amount)?;
        state.spots.release_spot(session.spot_id)?;

        let receipt = Receipt::for_stay(&session, exit_time, amount);
        info!(
            plate = %plate,
            spot = %session.spot_id,
            hours = receipt.elapsed_hours,
            amount,
            "visitor settled"
        );

        Ok(receipt)
    }

    /// What settling right now would charge, without settling
    pub fn quote(&self, raw_plate: &str) -> Result<Receipt> {
        let plate = normalize_plate(raw_plate)?;
        let state = self.read_state()?;

        let session = state
            .sessions
            .find_open(&plate)
            .ok_or_else(|| ParkingError::NotActive(plate.clone()))?;

        let now = self.clock.now();
        let amount = self.tariff.fare(session.entry_time, now)?;
        Ok(Receipt::for_stay(session, now, amount))
    }

    // ========================================================================
    // LOOKUP
    // ========================================================================

    /// Resident, active visitor, or unknown plate
    pub fn plate_status(&self, raw_plate: &str) -> Result<PlateStatus> {
        let plate = normalize_plate(raw_plate)?;
        let state = self.read_state()?;

        if let Some(record) = self.resolve(&plate)? {
            // Registry is authoritative for occupancy; the directory may lag
            let spot_state = state
                .spots
                .get(record.spot_id)
                .map(|s| s.state)
                .unwrap_or(record.spot_state);
            return Ok(PlateStatus::Resident {
                resident: record.resident,
                spot_id: record.spot_id,
                state: spot_state,
            });
        }

        if let Some(session) = state.sessions.find_open(&plate) {
            let now = self.clock.now();
            return Ok(PlateStatus::ActiveVisitor {
                session: session.clone(),
                elapsed_hours: elapsed_hours(session.entry_time, now),
                fare_so_far: self.tariff.fare(session.entry_time, now).ok(),
            });
        }

        Ok(PlateStatus::Unregistered { plate })
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn resolve(&self, plate: &str) -> Result<Option<ResidentRecord>> {
        self.store.resolve_resident_by_plate(plate).map_err(|e| {
            error!(plate = %plate, error = %format!("{:#}", e), "resident lookup failed");
            ParkingError::persistence(e)
        })
    }

    fn durable(&self, writes: &[StoreWrite]) -> Result<()> {
        self.store.persist(writes).map_err(|e| {
            error!(
                backend = self.store.backend(),
                error = %format!("{:#}", e),
                "durable write failed, state unchanged"
            );
            ParkingError::persistence(e)
        })
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, ParkingState>> {
        self.state.read().map_err(|_| ParkingError::StatePoisoned)
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, ParkingState>> {
        self.state.write().map_err(|_| ParkingError::StatePoisoned)
    }
}

fn rejected(operation: &str, plate: &str, err: ParkingError) -> ParkingError {
    if !matches!(err, ParkingError::PersistenceFailure(_)) {
        warn!(operation, plate = %plate, kind = err.kind(), "request rejected: {}", err);
    }
    err
}

/// A visitor spot is OCCUPIED iff exactly one OPEN session holds it
fn check_visitor_bindings(spots: &SpotRegistry, sessions: &VisitorSessionTracker) -> Result<()> {
    for session in sessions.open_sessions() {
        match spots.get(session.spot_id) {
            Some(spot) if spot.category == SpotCategory::Visitor && !spot.is_free() => {}
            _ => {
                return Err(ParkingError::InvalidSpotLayout(format!(
                    "open session {} for {} is not on an occupied visitor spot {}",
                    session.id, session.plate, session.spot_id
                )))
            }
        }
    }

    for spot in spots
        .iter()
        .filter(|s| s.category == SpotCategory::Visitor && !s.is_free())
    {
        if sessions.open_on_spot(spot.id).is_none() {
            return Err(ParkingError::InvalidSpotLayout(format!(
                "visitor spot {} is occupied without an open session",
                spot.id
            )));
        }
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

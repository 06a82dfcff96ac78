// 🗄️ Parking Store - Persistence & resident directory collaborator
//
// The engine treats persistence as a dumb record store:
// - resident directory lookups by plate
// - spot layout + occupancy
// - visitor session records (OPEN, later replaced by the CLOSED value)
//
// No fare rules live here. Two implementations are chosen at startup:
// MemoryStore (ephemeral) and SqliteStore (durable, see db.rs).

use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::entities::{
    ParkingSpot, Resident, ResidentRecord, SpotCategory, SpotId, SpotRecord, SpotState,
    VisitorSession,
};

// ============================================================================
// WRITES
// ============================================================================

/// One durable change. A batch passed to `persist` is applied all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// Record a spot's occupancy
    SpotState { spot_id: SpotId, state: SpotState },

    /// Append a session record; a later record with the same id supersedes it
    Session(VisitorSession),
}

// ============================================================================
// STORE TRAIT
// ============================================================================

pub trait ParkingStore: Send + Sync {
    /// Short name for logs ("memory", "sqlite")
    fn backend(&self) -> &'static str;

    /// Who owns this (normalized) plate, and the state of their spot
    fn resolve_resident_by_plate(&self, plate: &str) -> Result<Option<ResidentRecord>>;

    /// Every spot, used to initialize the SpotRegistry
    fn load_all_spots(&self) -> Result<Vec<SpotRecord>>;

    /// Sessions that were OPEN when the process last stopped
    fn load_open_sessions(&self) -> Result<Vec<VisitorSession>>;

    /// Settled sessions, oldest settlement first
    fn load_closed_sessions(&self) -> Result<Vec<VisitorSession>>;

    /// Apply a batch of writes atomically
    fn persist(&self, writes: &[StoreWrite]) -> Result<()>;

    /// Register a resident with their plates and owned spot
    fn provision_resident(
        &self,
        name: &str,
        unit: &str,
        plates: &[String],
        spot_id: SpotId,
    ) -> Result<Resident>;

    /// Add a shared visitor spot
    fn provision_visitor_spot(&self, spot_id: SpotId) -> Result<()>;

    fn append_session_record(&self, session: &VisitorSession) -> Result<()> {
        self.persist(&[StoreWrite::Session(session.clone())])
    }

    fn set_spot_state(&self, spot_id: SpotId, state: SpotState) -> Result<()> {
        self.persist(&[StoreWrite::SpotState { spot_id, state }])
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct MemoryData {
    residents: Vec<Resident>,
    spots: BTreeMap<SpotId, ParkingSpot>,
    /// Session records in first-append order; superseded in place by id
    sessions: Vec<VisitorSession>,
}

/// Ephemeral store: everything is lost when the process exits
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<MemoryData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryData>> {
        self.data.read().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryData>> {
        self.data.write().map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl ParkingStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn resolve_resident_by_plate(&self, plate: &str) -> Result<Option<ResidentRecord>> {
        let data = self.read()?;

        let Some(resident) = data.residents.iter().find(|r| r.owns_plate(plate)) else {
            return Ok(None);
        };
        let spot = data
            .spots
            .values()
            .find(|s| s.owner == Some(resident.id))
            .ok_or_else(|| anyhow!("resident {} has no spot", resident.id))?;

        Ok(Some(ResidentRecord {
            resident: resident.clone(),
            spot_id: spot.id,
            spot_state: spot.state,
        }))
    }

    fn load_all_spots(&self) -> Result<Vec<SpotRecord>> {
        Ok(self.read()?.spots.values().cloned().collect())
    }

    fn load_open_sessions(&self) -> Result<Vec<VisitorSession>> {
        Ok(self
            .read()?
            .sessions
            .iter()
            .filter(|s| s.is_open())
            .cloned()
            .collect())
    }

    fn load_closed_sessions(&self) -> Result<Vec<VisitorSession>> {
        let mut closed: Vec<VisitorSession> = self
            .read()?
            .sessions
            .iter()
            .filter(|s| !s.is_open())
            .cloned()
            .collect();
        closed.sort_by_key(|s| s.exit_time);
        Ok(closed)
    }

    fn persist(&self, writes: &[StoreWrite]) -> Result<()> {
        let mut data = self.write()?;

        // Validate the whole batch before touching anything
        for write in writes {
            if let StoreWrite::SpotState { spot_id, .. } = write {
                if !data.spots.contains_key(spot_id) {
                    bail!("unknown spot {}", spot_id);
                }
            }
        }

        for write in writes {
            match write {
                StoreWrite::SpotState { spot_id, state } => {
                    if let Some(spot) = data.spots.get_mut(spot_id) {
                        spot.state = *state;
                    }
                }
                StoreWrite::Session(session) => {
                    match data.sessions.iter_mut().find(|s| s.id == session.id) {
                        Some(existing) => *existing = session.clone(),
                        None => data.sessions.push(session.clone()),
                    }
                }
            }
        }
        Ok(())
    }

    fn provision_resident(
        &self,
        name: &str,
        unit: &str,
        plates: &[String],
        spot_id: SpotId,
    ) -> Result<Resident> {
        let mut data = self.write()?;

        if data.spots.contains_key(&spot_id) {
            bail!("spot {} already exists", spot_id);
        }
        if let Some(taken) = plates
            .iter()
            .find(|p| data.residents.iter().any(|r| r.owns_plate(p)))
        {
            bail!("plate {} is already registered", taken);
        }

        let id = data.residents.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let resident = plates
            .iter()
            .fold(Resident::new(id, name, unit), |r, p| r.with_plate(p.clone()));

        data.residents.push(resident.clone());
        data.spots.insert(spot_id, ParkingSpot::resident(spot_id, id));
        Ok(resident)
    }

    fn provision_visitor_spot(&self, spot_id: SpotId) -> Result<()> {
        let mut data = self.write()?;

        if data.spots.contains_key(&spot_id) {
            bail!("spot {} already exists", spot_id);
        }
        data.spots.insert(spot_id, ParkingSpot::visitor(spot_id));
        Ok(())
    }
}

/// Count spots per category in a store (used by startup logging)
pub fn count_spots(store: &dyn ParkingStore) -> Result<(usize, usize)> {
    let spots = store.load_all_spots()?;
    let residents = spots
        .iter()
        .filter(|s| s.category == SpotCategory::Resident)
        .count();
    Ok((residents, spots.len() - residents))
}

// ============================================================================
// TESTS
// ============================================================================

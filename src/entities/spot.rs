// 🅿️ Parking Spot Entity + Registry
//
// "Spot number is IDENTITY (never changes), occupancy is STATE (toggles)"
//
// Invariants:
// - spot numbers are unique and immutable
// - category never changes after creation
// - RESIDENT spots have exactly one owner, VISITOR spots have none
// - occupancy changes only through allocate/release/mark_resident_spot

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use super::resident::ResidentId;
use crate::error::{ParkingError, Result};

// ============================================================================
// SPOT ID
// ============================================================================

/// Spot number as painted on the floor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpotId(pub u32);

impl fmt::Display for SpotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CATEGORY & STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpotCategory {
    /// Permanently bound to one resident, free of charge
    Resident,

    /// Shared pool, time-metered
    Visitor,
}

impl SpotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotCategory::Resident => "RESIDENT",
            SpotCategory::Visitor => "VISITOR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RESIDENT" => Some(SpotCategory::Resident),
            "VISITOR" => Some(SpotCategory::Visitor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpotState {
    Free,
    Occupied,
}

impl SpotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotState::Free => "FREE",
            SpotState::Occupied => "OCCUPIED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FREE" => Some(SpotState::Free),
            "OCCUPIED" => Some(SpotState::Occupied),
            _ => None,
        }
    }
}

// ============================================================================
// PARKING SPOT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParkingSpot {
    pub id: SpotId,
    pub category: SpotCategory,
    pub state: SpotState,

    /// Owning resident (RESIDENT spots only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<ResidentId>,
}

/// Shape the store hands back from `load_all_spots`
pub type SpotRecord = ParkingSpot;

impl ParkingSpot {
    pub fn resident(id: SpotId, owner: ResidentId) -> Self {
        ParkingSpot {
            id,
            category: SpotCategory::Resident,
            state: SpotState::Free,
            owner: Some(owner),
        }
    }

    pub fn visitor(id: SpotId) -> Self {
        ParkingSpot {
            id,
            category: SpotCategory::Visitor,
            state: SpotState::Free,
            owner: None,
        }
    }

    pub fn with_state(mut self, state: SpotState) -> Self {
        self.state = state;
        self
    }

    pub fn is_free(&self) -> bool {
        self.state == SpotState::Free
    }
}

// ============================================================================
// SPOT REGISTRY
// ============================================================================

/// Fixed set of spots, ordered by spot number
///
/// The registry itself is not synchronized: it lives inside the controller's
/// single state lock together with the session tracker.
#[derive(Debug, Clone, Default)]
pub struct SpotRegistry {
    spots: BTreeMap<SpotId, ParkingSpot>,
}

impl SpotRegistry {
    /// Build from store records, validating the ownership invariants
    pub fn from_records(records: Vec<SpotRecord>) -> Result<Self> {
        let mut spots = BTreeMap::new();
        let mut owners = HashSet::new();

        for spot in records {
            match (spot.category, spot.owner) {
                (SpotCategory::Resident, None) => {
                    return Err(ParkingError::InvalidSpotLayout(format!(
                        "resident spot {} has no owner",
                        spot.id
                    )));
                }
                (SpotCategory::Visitor, Some(owner)) => {
                    return Err(ParkingError::InvalidSpotLayout(format!(
                        "visitor spot {} is owned by resident {}",
                        spot.id, owner
                    )));
                }
                (SpotCategory::Resident, Some(owner)) => {
                    if !owners.insert(owner) {
                        return Err(ParkingError::InvalidSpotLayout(format!(
                            "resident {} owns more than one spot",
                            owner
                        )));
                    }
                }
                (SpotCategory::Visitor, None) => {}
            }

            if spots.contains_key(&spot.id) {
                return Err(ParkingError::InvalidSpotLayout(format!(
                    "duplicate spot number {}",
                    spot.id
                )));
            }
            spots.insert(spot.id, spot);
        }

        Ok(SpotRegistry { spots })
    }

    /// Spot that `allocate_visitor_spot` would pick, without taking it
    pub fn first_free_visitor_spot(&self) -> Option<SpotId> {
        self.spots
            .values()
            .find(|s| s.category == SpotCategory::Visitor && s.is_free())
            .map(|s| s.id)
    }

    /// Take the lowest-numbered free visitor spot
    pub fn allocate_visitor_spot(&mut self) -> Result<SpotId> {
        let id = self
            .first_free_visitor_spot()
            .ok_or(ParkingError::NoSpotAvailable)?;

        if let Some(spot) = self.spots.get_mut(&id) {
            spot.state = SpotState::Occupied;
        }
        Ok(id)
    }

    /// Mark a spot FREE
    ///
    /// Releasing a spot that is already free is a caller error: it is
    /// reported as `AlreadyFree` and the registry is left as it was.
    pub fn release_spot(&mut self, id: SpotId) -> Result<()> {
        let spot = self
            .spots
            .get_mut(&id)
            .ok_or(ParkingError::UnknownSpot(id))?;

        if spot.is_free() {
            return Err(ParkingError::AlreadyFree(id));
        }
        spot.state = SpotState::Free;
        Ok(())
    }

    /// Toggle the spot owned by `resident_id`
    pub fn mark_resident_spot(
        &mut self,
        resident_id: ResidentId,
        state: SpotState,
    ) -> Result<SpotId> {
        let spot = self
            .spots
            .values_mut()
            .find(|s| s.owner == Some(resident_id))
            .ok_or_else(|| ParkingError::NotAResident(format!("resident #{}", resident_id)))?;

        if spot.state == state {
            return Err(match state {
                SpotState::Occupied => ParkingError::AlreadyOccupied(spot.id),
                SpotState::Free => ParkingError::AlreadyFree(spot.id),
            });
        }
        spot.state = state;
        Ok(spot.id)
    }

    pub fn get(&self, id: SpotId) -> Option<&ParkingSpot> {
        self.spots.get(&id)
    }

    pub fn spot_of_resident(&self, resident_id: ResidentId) -> Option<&ParkingSpot> {
        self.spots.values().find(|s| s.owner == Some(resident_id))
    }

    /// Point-in-time copy of every spot, ordered by number
    pub fn snapshot(&self) -> Vec<ParkingSpot> {
        self.spots.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParkingSpot> {
        self.spots.values()
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

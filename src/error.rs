// ⚠️ Parking Errors - Typed, recoverable failures
//
// Every rejection the engine can produce is a variant here. None of them are
// fatal to the process; callers render them as rejection messages.

use thiserror::Error;

use crate::entities::SpotId;

/// Result type for parking engine operations
pub type Result<T> = std::result::Result<T, ParkingError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParkingError {
    // ========================================================================
    // RESIDENT FLOW
    // ========================================================================
    /// Plate does not resolve to a registered resident
    #[error("Plate {0} does not belong to a resident")]
    NotAResident(String),

    /// Resident spot is already occupied
    #[error("Spot {0} is already occupied")]
    AlreadyOccupied(SpotId),

    /// Spot is already free
    #[error("Spot {0} is already free")]
    AlreadyFree(SpotId),

    // ========================================================================
    // VISITOR FLOW
    // ========================================================================
    /// Plate belongs to a resident, who must use the resident entry
    #[error("Plate {0} belongs to a resident")]
    IsResident(String),

    /// Plate already has an open visitor session
    #[error("Plate {0} already has an active visitor session")]
    AlreadyActive(String),

    /// Every visitor spot is occupied
    #[error("No visitor spot available")]
    NoSpotAvailable,

    /// Plate has no open visitor session
    #[error("Plate {0} has no active visitor session")]
    NotActive(String),

    /// Session is missing or already closed
    #[error("Session {0} is not open")]
    SessionNotOpen(String),

    /// Another open session already holds this spot
    #[error("Spot {0} is already bound to an open session")]
    SpotInUse(SpotId),

    // ========================================================================
    // VALIDATION
    // ========================================================================
    /// Exit time is not strictly after entry time
    #[error("Invalid time range: exit must be after entry")]
    InvalidTimeRange,

    /// Plate is empty after normalization
    #[error("Plate must not be empty")]
    InvalidPlate,

    /// Spot number not present in the registry
    #[error("Unknown spot {0}")]
    UnknownSpot(SpotId),

    /// Spot records violate the ownership invariants
    #[error("Invalid spot layout: {0}")]
    InvalidSpotLayout(String),

    // ========================================================================
    // INFRASTRUCTURE
    // ========================================================================
    /// Durable write or read failed; in-memory state was left unchanged
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// A previous holder of the state lock panicked
    #[error("Parking state lock poisoned")]
    StatePoisoned,
}

impl ParkingError {
    /// Stable machine-readable tag for this error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ParkingError::NotAResident(_) => "not_a_resident",
            ParkingError::AlreadyOccupied(_) => "already_occupied",
            ParkingError::AlreadyFree(_) => "already_free",
            ParkingError::IsResident(_) => "is_resident",
            ParkingError::AlreadyActive(_) => "already_active",
            ParkingError::NoSpotAvailable => "no_spot_available",
            ParkingError::NotActive(_) => "not_active",
            ParkingError::SessionNotOpen(_) => "session_not_open",
            ParkingError::SpotInUse(_) => "spot_in_use",
            ParkingError::InvalidTimeRange => "invalid_time_range",
            ParkingError::InvalidPlate => "invalid_plate",
            ParkingError::UnknownSpot(_) => "unknown_spot",
            ParkingError::InvalidSpotLayout(_) => "invalid_spot_layout",
            ParkingError::PersistenceFailure(_) => "persistence_failure",
            ParkingError::StatePoisoned => "state_poisoned",
        }
    }

    /// Wrap a store error, keeping the whole context chain in the message
    pub fn persistence(err: anyhow::Error) -> Self {
        ParkingError::PersistenceFailure(format!("{:#}", err))
    }
}

// Entity Models - Residents, spots, visitor sessions
//
// Each entity has:
// - Stable identity (resident id, spot number, session UUID)
// - A registry or tracker that owns the mutable state for that entity kind

pub mod resident;
pub mod session;
pub mod spot;

pub use resident::{Resident, ResidentId, ResidentRecord};
pub use session::{SessionId, SessionStatus, VisitorSession, VisitorSessionTracker};
pub use spot::{ParkingSpot, SpotCategory, SpotId, SpotRecord, SpotRegistry, SpotState};

use crate::error::{ParkingError, Result};

/// Canonical form of a plate: trimmed and upper-cased
///
/// Example: " abc123 " → "ABC123"
pub fn normalize_plate(raw: &str) -> Result<String> {
    let plate = raw.trim().to_uppercase();
    if plate.is_empty() {
        return Err(ParkingError::InvalidPlate);
    }
    Ok(plate)
}

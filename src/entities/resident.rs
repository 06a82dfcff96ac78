// 🏠 Resident Entity - Identity fixed at provisioning time
//
// A resident owns exactly one spot and one or more plates. Residents are
// never edited or deleted by the engine; the directory lives in the store.

use serde::{Deserialize, Serialize};

use super::spot::{SpotId, SpotState};

pub type ResidentId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    pub id: ResidentId,

    /// Full name, as shown at the gate
    pub name: String,

    /// Unit / apartment label (e.g. "101")
    pub unit: String,

    /// Plates registered to this resident (normalized)
    pub plates: Vec<String>,
}

impl Resident {
    pub fn new(id: ResidentId, name: impl Into<String>, unit: impl Into<String>) -> Self {
        Resident {
            id,
            name: name.into(),
            unit: unit.into(),
            plates: Vec::new(),
        }
    }

    /// Builder-style plate registration; duplicates are ignored
    pub fn with_plate(mut self, plate: impl Into<String>) -> Self {
        let plate = plate.into();
        if !self.plates.contains(&plate) {
            self.plates.push(plate);
        }
        self
    }

    pub fn owns_plate(&self, plate: &str) -> bool {
        self.plates.iter().any(|p| p == plate)
    }
}

/// Directory answer for a plate lookup: who owns it and where they park
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidentRecord {
    pub resident: Resident,
    pub spot_id: SpotId,
    pub spot_state: SpotState,
}

// Parking Access - Core Library
// Occupancy & billing engine for a residential parking facility.
// Exposes all modules for use in CLI, API server, and tests

pub mod access;
pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod provision;
pub mod stats;
pub mod store;
pub mod tariff;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use access::{
    AccessController, ParkingState, PlateStatus, Receipt, ResidentAccess, SharedState,
    VisitorTicket,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ParkingConfig, StorageBackend};
pub use db::SqliteStore;
pub use entities::{
    normalize_plate, ParkingSpot, Resident, ResidentId, ResidentRecord, SessionId, SessionStatus,
    SpotCategory, SpotId, SpotRecord, SpotRegistry, SpotState, VisitorSession,
    VisitorSessionTracker,
};
pub use error::{ParkingError, Result};
pub use provision::{apply_layout, demo_layout, load_layout_csv, seed_demo_facility, LayoutRow};
pub use stats::{CategoryCounts, Occupancy, ParkingStats, StatsAggregator};
pub use store::{MemoryStore, ParkingStore, StoreWrite};
pub use tariff::{Amount, TariffCalculator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

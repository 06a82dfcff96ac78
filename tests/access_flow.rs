// 🚦 Access Flow Tests - Controller against both stores
//
// Covers:
// - resident and visitor flows end to end
// - restart recovery through SqliteStore
// - failed durable writes leave state untouched
// - concurrent gate requests

use anyhow::{anyhow, Result};
use chrono::{Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use parking_access::{
    seed_demo_facility, AccessController, ManualClock, MemoryStore, ParkingError, ParkingStore,
    PlateStatus, Resident, ResidentRecord, SpotId, SpotRecord, SpotState, SqliteStore,
    StoreWrite, TariffCalculator, VisitorSession,
};

fn start_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
    ))
}

fn memory_controller() -> (AccessController, Arc<ManualClock>) {
    let store = MemoryStore::new();
    seed_demo_facility(&store).unwrap();
    let clock = start_clock();
    let controller =
        AccessController::bootstrap(Arc::new(store), TariffCalculator::default(), clock.clone())
            .unwrap();
    (controller, clock)
}

// ============================================================================
// Store that can be told to fail every durable write
// ============================================================================

struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn new(inner: MemoryStore) -> Self {
        FlakyStore {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    fn fail_writes(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }
}

impl ParkingStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    fn resolve_resident_by_plate(&self, plate: &str) -> Result<Option<ResidentRecord>> {
        self.inner.resolve_resident_by_plate(plate)
    }

    fn load_all_spots(&self) -> Result<Vec<SpotRecord>> {
        self.inner.load_all_spots()
    }

    fn load_open_sessions(&self) -> Result<Vec<VisitorSession>> {
        self.inner.load_open_sessions()
    }

    fn load_closed_sessions(&self) -> Result<Vec<VisitorSession>> {
        self.inner.load_closed_sessions()
    }

    fn persist(&self, writes: &[StoreWrite]) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.inner.persist(writes)
    }

    fn provision_resident(
        &self,
        name: &str,
        unit: &str,
        plates: &[String],
        spot_id: SpotId,
    ) -> Result<Resident> {
        self.inner.provision_resident(name, unit, plates, spot_id)
    }

    fn provision_visitor_spot(&self, spot_id: SpotId) -> Result<()> {
        self.inner.provision_visitor_spot(spot_id)
    }
}

// ============================================================================
// End-to-end flows
// ============================================================================

#[test]
fn test_full_day_at_the_gate() {
    let (ctl, clock) = memory_controller();

    ctl.resident_entry("ABC123").unwrap();
    ctl.resident_entry("DEF456").unwrap();
    let first = ctl.visitor_entry("VIS001").unwrap();
    let second = ctl.visitor_entry("VIS002").unwrap();
    assert_eq!(first.spot_id, SpotId(6));
    assert_eq!(second.spot_id, SpotId(7));

    clock.advance(Duration::minutes(45));
    assert_eq!(ctl.visitor_settle("VIS001").unwrap().amount, 1_000);

    // Spot 6 is reused before 8
    let third = ctl.visitor_entry("VIS003").unwrap();
    assert_eq!(third.spot_id, SpotId(6));

    clock.advance(Duration::hours(5));
    assert_eq!(ctl.visitor_settle("VIS002").unwrap().amount, 10_000);
    ctl.resident_exit("ABC123").unwrap();

    let stats = ctl.stats().summary(ctl.now()).unwrap();
    assert_eq!(stats.occupancy.resident.occupied, 1);
    assert_eq!(stats.occupancy.visitor.occupied, 1);
    assert_eq!(stats.open_sessions, 1);
    assert_eq!(stats.settled_sessions, 2);
    assert_eq!(stats.revenue_total, 11_000);

    let history = ctl.stats().recent_sessions(10).unwrap();
    assert_eq!(history[0].plate, "VIS002");
    assert_eq!(history[1].plate, "VIS001");
}

#[test]
fn test_exactly_five_hours_is_still_hourly() {
    let (ctl, clock) = memory_controller();
    ctl.visitor_entry("XYZ789").unwrap();

    clock.advance(Duration::hours(5));
    assert_eq!(ctl.visitor_settle("XYZ789").unwrap().amount, 5_000);
}

#[test]
fn test_plates_are_normalized_everywhere() {
    let (ctl, clock) = memory_controller();

    ctl.visitor_entry("  xyz789 ").unwrap();
    assert_eq!(
        ctl.visitor_entry("XYZ789"),
        Err(ParkingError::AlreadyActive("XYZ789".to_string()))
    );

    clock.advance(Duration::minutes(30));
    let receipt = ctl.visitor_settle("Xyz789").unwrap();
    assert_eq!(receipt.plate, "XYZ789");
    assert_eq!(ctl.visitor_entry(""), Err(ParkingError::InvalidPlate));
}

// ============================================================================
// Durability
// ============================================================================

#[test]
fn test_sqlite_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("parking.db");
    let clock = start_clock();

    {
        let store = SqliteStore::open(&db_path).unwrap();
        assert!(seed_demo_facility(&store).unwrap());
        let ctl = AccessController::bootstrap(
            Arc::new(store),
            TariffCalculator::default(),
            clock.clone(),
        )
        .unwrap();

        ctl.resident_entry("GHI789").unwrap();
        ctl.visitor_entry("VIS001").unwrap();
        ctl.visitor_entry("VIS002").unwrap();
        clock.advance(Duration::minutes(90));
        assert_eq!(ctl.visitor_settle("VIS001").unwrap().amount, 2_000);
    }

    let store = SqliteStore::open(&db_path).unwrap();
    assert!(!seed_demo_facility(&store).unwrap());
    let ctl =
        AccessController::bootstrap(Arc::new(store), TariffCalculator::default(), clock.clone())
            .unwrap();

    assert_eq!(
        ctl.resident_entry("GHI789"),
        Err(ParkingError::AlreadyOccupied(SpotId(3)))
    );
    match ctl.plate_status("VIS002").unwrap() {
        PlateStatus::ActiveVisitor { session, .. } => assert_eq!(session.spot_id, SpotId(7)),
        other => panic!("expected active visitor, got {:?}", other),
    }
    assert_eq!(ctl.stats().revenue_total().unwrap(), 2_000);

    clock.advance(Duration::minutes(30));
    assert_eq!(ctl.visitor_settle("VIS002").unwrap().amount, 2_000);
    assert_eq!(ctl.stats().recent_sessions(100).unwrap().len(), 2);
}

#[test]
fn test_failed_write_changes_nothing() {
    let inner = MemoryStore::new();
    seed_demo_facility(&inner).unwrap();
    let store = Arc::new(FlakyStore::new(inner.clone()));
    let clock = start_clock();
    let ctl = AccessController::bootstrap(
        store.clone(),
        TariffCalculator::default(),
        clock.clone(),
    )
    .unwrap();

    ctl.visitor_entry("VIS001").unwrap();
    clock.advance(Duration::hours(2));

    store.fail_writes(true);
    assert!(matches!(
        ctl.resident_entry("ABC123"),
        Err(ParkingError::PersistenceFailure(_))
    ));
    assert!(matches!(
        ctl.visitor_entry("VIS002"),
        Err(ParkingError::PersistenceFailure(_))
    ));
    assert!(matches!(
        ctl.visitor_settle("VIS001"),
        Err(ParkingError::PersistenceFailure(_))
    ));

    // Memory and store still agree on the pre-failure state
    let spots = ctl.snapshot().unwrap();
    assert!(spots.iter().find(|s| s.id == SpotId(1)).unwrap().is_free());
    assert_eq!(
        spots.iter().filter(|s| s.state == SpotState::Occupied).count(),
        1
    );
    assert_eq!(ctl.stats().open_sessions().unwrap(), 1);
    assert_eq!(inner.load_open_sessions().unwrap().len(), 1);
    assert!(inner.load_closed_sessions().unwrap().is_empty());

    store.fail_writes(false);
    assert_eq!(ctl.visitor_settle("VIS001").unwrap().amount, 2_000);
    assert_eq!(inner.load_closed_sessions().unwrap().len(), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_entries_for_one_plate_admit_once() {
    let (ctl, _) = memory_controller();
    let ctl = Arc::new(ctl);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctl = Arc::clone(&ctl);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ctl.visitor_entry("XYZ789")
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| *e == ParkingError::AlreadyActive("XYZ789".to_string())));
    assert_eq!(ctl.stats().open_sessions().unwrap(), 1);
}

#[test]
fn test_concurrent_visitors_never_share_a_spot() {
    let (ctl, _) = memory_controller();
    let ctl = Arc::new(ctl);
    let barrier = Arc::new(Barrier::new(12));

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let ctl = Arc::clone(&ctl);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ctl.visitor_entry(&format!("VIS{:03}", i))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let mut spots: Vec<SpotId> = results
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .map(|t| t.spot_id)
        .collect();
    spots.sort();

    assert_eq!(spots, vec![SpotId(6), SpotId(7), SpotId(8), SpotId(9), SpotId(10)]);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(ParkingError::NoSpotAvailable)))
            .count(),
        7
    );
}

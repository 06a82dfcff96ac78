// 📊 Stats Aggregator - Read-only occupancy & revenue projections
//
// Recomputed on every call, nothing cached. Each call takes the state read
// lock once, so a projection never mixes pre- and post-mutation state.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use std::sync::RwLockReadGuard;

use crate::access::{ParkingState, SharedState};
use crate::entities::{SpotCategory, VisitorSession};
use crate::error::{ParkingError, Result};
use crate::tariff::Amount;

/// Default size of the history view
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub total: usize,
    pub occupied: usize,
    pub free: usize,
}

impl CategoryCounts {
    fn add(&mut self, occupied: bool) {
        self.total += 1;
        if occupied {
            self.occupied += 1;
        } else {
            self.free += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Occupancy {
    pub resident: CategoryCounts,
    pub visitor: CategoryCounts,
    pub overall: CategoryCounts,
}

/// Everything the dashboard footer shows, from one consistent read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParkingStats {
    pub occupancy: Occupancy,
    pub open_sessions: usize,
    pub settled_sessions: usize,
    pub revenue_total: Amount,
    pub revenue_today: Amount,
    pub day: NaiveDate,
}

/// Calendar day (local time) a timestamp falls on
pub fn local_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

#[derive(Clone)]
pub struct StatsAggregator {
    state: SharedState,
}

impl StatsAggregator {
    pub fn new(state: SharedState) -> Self {
        StatsAggregator { state }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ParkingState>> {
        self.state.read().map_err(|_| ParkingError::StatePoisoned)
    }

    pub fn occupancy(&self) -> Result<Occupancy> {
        let state = self.read()?;
        Ok(occupancy_of(&state))
    }

    pub fn open_sessions(&self) -> Result<usize> {
        Ok(self.read()?.sessions().open_count())
    }

    /// All-time sum of settled amounts
    pub fn revenue_total(&self) -> Result<Amount> {
        let state = self.read()?;
        Ok(revenue_where(&state, |_| true))
    }

    /// Sum of amounts settled on `day` (local calendar)
    pub fn revenue_on(&self, day: NaiveDate) -> Result<Amount> {
        let state = self.read()?;
        Ok(revenue_where(&state, |s| s.exit_time.map(local_day) == Some(day)))
    }

    pub fn summary(&self, now: DateTime<Utc>) -> Result<ParkingStats> {
        let state = self.read()?;
        let day = local_day(now);

        Ok(ParkingStats {
            occupancy: occupancy_of(&state),
            open_sessions: state.sessions().open_count(),
            settled_sessions: state.sessions().history().len(),
            revenue_total: revenue_where(&state, |_| true),
            revenue_today: revenue_where(&state, |s| s.exit_time.map(local_day) == Some(day)),
            day,
        })
    }

    /// OPEN sessions, earliest entry first
    pub fn active_visitors(&self) -> Result<Vec<VisitorSession>> {
        Ok(self.read()?.sessions().open_sessions())
    }

    /// Most recent settlements first
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<VisitorSession>> {
        Ok(self.read()?.sessions().recent_history(limit))
    }
}

fn occupancy_of(state: &ParkingState) -> Occupancy {
    let mut occupancy = Occupancy::default();

    for spot in state.spots().iter() {
        let occupied = !spot.is_free();
        match spot.category {
            SpotCategory::Resident => occupancy.resident.add(occupied),
            SpotCategory::Visitor => occupancy.visitor.add(occupied),
        }
        occupancy.overall.add(occupied);
    }

    occupancy
}

fn revenue_where<F>(state: &ParkingState, keep: F) -> Amount
where
    F: Fn(&VisitorSession) -> bool,
{
    state
        .sessions()
        .history()
        .iter()
        .filter(|s| keep(s))
        .filter_map(|s| s.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessController;
    use crate::clock::{Clock, ManualClock};
    use crate::provision::seed_demo_facility;
    use crate::store::MemoryStore;
    use crate::tariff::TariffCalculator;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn setup() -> (AccessController, Arc<ManualClock>) {
        let store = MemoryStore::new();
        seed_demo_facility(&store).unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
        ));
        let ctl =
            AccessController::bootstrap(Arc::new(store), TariffCalculator::default(), clock.clone())
                .unwrap();
        (ctl, clock)
    }

    #[test]
    fn test_empty_facility_counts() {
        let (ctl, _) = setup();
        let occupancy = ctl.stats().occupancy().unwrap();

        assert_eq!(
            occupancy.resident,
            CategoryCounts {
                total: 5,
                occupied: 0,
                free: 5
            }
        );
        assert_eq!(
            occupancy.visitor,
            CategoryCounts {
                total: 5,
                occupied: 0,
                free: 5
            }
        );
        assert_eq!(occupancy.overall.total, 10);
        assert_eq!(ctl.stats().revenue_total().unwrap(), 0);
    }

    #[test]
    fn test_counts_and_revenue_follow_operations() {
        let (ctl, clock) = setup();
        let stats = ctl.stats();

        ctl.resident_entry("ABC123").unwrap();
        ctl.visitor_entry("VIS001").unwrap();
        ctl.visitor_entry("VIS002").unwrap();
        clock.advance(Duration::minutes(30));
        ctl.visitor_settle("VIS001").unwrap();

        let occupancy = stats.occupancy().unwrap();
        assert_eq!(occupancy.resident.occupied, 1);
        assert_eq!(occupancy.visitor.occupied, 1);
        assert_eq!(
            occupancy.overall,
            CategoryCounts {
                total: 10,
                occupied: 2,
                free: 8
            }
        );

        assert_eq!(stats.open_sessions().unwrap(), 1);
        assert_eq!(stats.revenue_total().unwrap(), 1_000);

        let today = local_day(clock.now());
        assert_eq!(stats.revenue_on(today).unwrap(), 1_000);
        assert_eq!(stats.revenue_on(today - Duration::days(1)).unwrap(), 0);

        let summary = stats.summary(clock.now()).unwrap();
        assert_eq!(summary.revenue_today, 1_000);
        assert_eq!(summary.settled_sessions, 1);
        assert_eq!(summary.open_sessions, 1);
    }

    #[test]
    fn test_revenue_today_excludes_previous_days() {
        let (ctl, clock) = setup();

        ctl.visitor_entry("VIS001").unwrap();
        clock.advance(Duration::hours(2));
        ctl.visitor_settle("VIS001").unwrap();

        clock.advance(Duration::days(2));
        ctl.visitor_entry("VIS002").unwrap();
        clock.advance(Duration::hours(7));
        ctl.visitor_settle("VIS002").unwrap();

        let summary = ctl.stats().summary(clock.now()).unwrap();
        assert_eq!(summary.revenue_total, 12_000);
        assert_eq!(summary.revenue_today, 10_000);
    }

    #[test]
    fn test_repeated_reads_are_identical() {
        let (ctl, clock) = setup();
        ctl.visitor_entry("VIS001").unwrap();
        clock.advance(Duration::minutes(10));
        ctl.visitor_settle("VIS001").unwrap();

        let stats = ctl.stats();
        let now = clock.now();
        let first = stats.summary(now).unwrap();
        let second = stats.summary(now).unwrap();
        assert_eq!(first, second);
        assert_eq!(stats.occupancy().unwrap(), stats.occupancy().unwrap());
        assert_eq!(stats.recent_sessions(10).unwrap(), stats.recent_sessions(10).unwrap());
    }

    #[test]
    fn test_active_and_recent_lists() {
        let (ctl, clock) = setup();
        ctl.visitor_entry("VIS001").unwrap();
        clock.advance(Duration::minutes(5));
        ctl.visitor_entry("VIS002").unwrap();
        clock.advance(Duration::minutes(5));
        ctl.visitor_settle("VIS001").unwrap();

        let active = ctl.stats().active_visitors().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].plate, "VIS002");

        let recent = ctl.stats().recent_sessions(DEFAULT_HISTORY_LIMIT).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].plate, "VIS001");
        assert_eq!(recent[0].amount, Some(1_000));
    }
}

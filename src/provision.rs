// 🏗️ Provisioning - Seeding a store with residents and spots
//
// Two sources:
// - the built-in demo facility (5 residents on spots 1-5, visitor spots 6-10)
// - a CSV layout file: spot,category,name,unit,plates
//
// Provisioning is an administrative step performed before the engine starts.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::entities::{normalize_plate, SpotCategory, SpotId};
use crate::store::ParkingStore;

/// One line of a layout CSV
///
/// ```text
/// spot,category,name,unit,plates
/// 1,RESIDENT,Juan Pérez,101,ABC123;ABC124
/// 6,VISITOR,,,
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LayoutRow {
    pub spot: u32,
    pub category: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit: String,
    /// Semicolon-separated plate list
    #[serde(default)]
    pub plates: String,
}

impl LayoutRow {
    fn plate_list(&self) -> Result<Vec<String>> {
        self.plates
            .split(';')
            .filter(|p| !p.trim().is_empty())
            .map(|p| normalize_plate(p).map_err(anyhow::Error::from))
            .collect()
    }
}

/// Layout of the demo facility ("Los Alamos")
pub fn demo_layout() -> Vec<LayoutRow> {
    let residents = [
        ("Juan Pérez", "101", "ABC123"),
        ("María Gómez", "202", "DEF456"),
        ("Carlos López", "303", "GHI789"),
        ("Ana Martínez", "404", "JKL012"),
        ("Pedro Sánchez", "505", "MNO345"),
    ];

    let mut rows: Vec<LayoutRow> = residents
        .iter()
        .enumerate()
        .map(|(i, (name, unit, plate))| LayoutRow {
            spot: i as u32 + 1,
            category: SpotCategory::Resident.as_str().to_string(),
            name: name.to_string(),
            unit: unit.to_string(),
            plates: plate.to_string(),
        })
        .collect();

    rows.extend((6..=10).map(|spot| LayoutRow {
        spot,
        category: SpotCategory::Visitor.as_str().to_string(),
        name: String::new(),
        unit: String::new(),
        plates: String::new(),
    }));

    rows
}

pub fn load_layout_csv(csv_path: &Path) -> Result<Vec<LayoutRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open layout CSV {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (line, result) in rdr.deserialize().enumerate() {
        let row: LayoutRow =
            result.with_context(|| format!("Failed to parse layout row {}", line + 2))?;
        rows.push(row);
    }

    Ok(rows)
}

/// A validated layout row, ready to write
enum PlannedSpot<'a> {
    Resident {
        spot_id: SpotId,
        name: &'a str,
        unit: &'a str,
        plates: Vec<String>,
    },
    Visitor(SpotId),
}

/// Check every row against the others and against the store, writing nothing
fn plan_layout<'a>(
    store: &dyn ParkingStore,
    rows: &'a [LayoutRow],
) -> Result<Vec<PlannedSpot<'a>>> {
    let existing = store.load_all_spots()?;
    let mut taken_spots: HashSet<SpotId> = existing.iter().map(|s| s.id).collect();
    let mut taken_plates: HashSet<String> = HashSet::new();
    let mut planned = Vec::with_capacity(rows.len());

    for row in rows {
        let spot_id = SpotId(row.spot);
        if !taken_spots.insert(spot_id) {
            bail!("spot {} already exists", spot_id);
        }

        match SpotCategory::parse(&row.category.to_uppercase()) {
            Some(SpotCategory::Resident) => {
                let plates = row.plate_list()?;
                if row.name.trim().is_empty() || plates.is_empty() {
                    bail!("resident spot {} needs a name and at least one plate", spot_id);
                }
                for plate in &plates {
                    if !taken_plates.insert(plate.clone())
                        || store.resolve_resident_by_plate(plate)?.is_some()
                    {
                        bail!("plate {} is already registered", plate);
                    }
                }
                planned.push(PlannedSpot::Resident {
                    spot_id,
                    name: row.name.trim(),
                    unit: row.unit.trim(),
                    plates,
                });
            }
            Some(SpotCategory::Visitor) => planned.push(PlannedSpot::Visitor(spot_id)),
            None => bail!("spot {} has unknown category {:?}", spot_id, row.category),
        }
    }

    Ok(planned)
}

/// Write every row into the store; returns (resident spots, visitor spots)
///
/// All rows are validated first: a bad row anywhere leaves the store untouched.
pub fn apply_layout(store: &dyn ParkingStore, rows: &[LayoutRow]) -> Result<(usize, usize)> {
    let planned = plan_layout(store, rows)?;
    let mut residents = 0;
    let mut visitors = 0;

    for spot in planned {
        match spot {
            PlannedSpot::Resident {
                spot_id,
                name,
                unit,
                plates,
            } => {
                store.provision_resident(name, unit, &plates, spot_id)?;
                residents += 1;
            }
            PlannedSpot::Visitor(spot_id) => {
                store.provision_visitor_spot(spot_id)?;
                visitors += 1;
            }
        }
    }

    info!(residents, visitors, backend = store.backend(), "layout provisioned");
    Ok((residents, visitors))
}

/// Seed the demo facility unless the store already has spots
pub fn seed_demo_facility(store: &dyn ParkingStore) -> Result<bool> {
    if !store.load_all_spots()?.is_empty() {
        return Ok(false);
    }
    apply_layout(store, &demo_layout())?;
    Ok(true)
}

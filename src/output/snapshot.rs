//! Stored view of one crawled property
//!
//! A snapshot is read back from the sink after a crawl: the property record
//! and every building with its units, in site order.

use crate::storage::{Building, CrawlSink, Property, StorageResult, Unit};
use serde::Serialize;

/// A building with its stored units
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildingSnapshot {
    #[serde(flatten)]
    pub building: Building,
    pub units: Vec<Unit>,
}

/// A property with its full stored hierarchy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySnapshot {
    pub property: Property,
    pub buildings: Vec<BuildingSnapshot>,
}

impl PropertySnapshot {
    pub fn unit_count(&self) -> usize {
        self.buildings.iter().map(|b| b.units.len()).sum()
    }
}

/// Loads the stored hierarchy of a property
///
/// Returns `Ok(None)` when the property was never crawled.
pub fn load_snapshot(
    storage: &dyn CrawlSink,
    property_id: &str,
) -> StorageResult<Option<PropertySnapshot>> {
    let Some(property) = storage.get_property(property_id)? else {
        return Ok(None);
    };

    let buildings = storage
        .get_buildings(property_id)?
        .into_iter()
        .map(|building| {
            let units = storage.get_units(property_id, &building.id)?;
            Ok(BuildingSnapshot { building, units })
        })
        .collect::<StorageResult<Vec<_>>>()?;

    Ok(Some(PropertySnapshot {
        property,
        buildings,
    }))
}

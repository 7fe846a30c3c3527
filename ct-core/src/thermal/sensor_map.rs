//! Per-slot gearbox sensor maps
//!
//! Gearbox zones address their sensor by logical index; the map for the
//! slot translates it to the physical sensor index. The registry is the only
//! owner of map storage. A map lives exactly as long as its slot is active.

use std::collections::HashMap;

use ct_protocol::{Mtecr, RegisterId, MTMP_GBOX_INDEX_MIN};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{Result, ThermalError};
use crate::hw::{query_checked, RegisterTransport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorMap {
    slot: u8,
    indices: Vec<u16>,
}

fn allocate(slot: u8, count: usize) -> Result<Vec<u16>> {
    let mut indices = Vec::new();
    indices
        .try_reserve_exact(count)
        .map_err(|_| ThermalError::OutOfMemory { slot, requested: count })?;
    Ok(indices)
}

impl SensorMap {
    /// Discover the physical gearbox sensors of a line card
    pub fn from_device(transport: &dyn RegisterTransport, slot: u8) -> Result<Self> {
        let payload = query_checked(transport, RegisterId::Mtecr, &Mtecr::query(slot).pack())?;
        let mtecr = Mtecr::unpack(&payload)?;
        let count = usize::from(mtecr.sensor_count);

        let mut indices = allocate(slot, count)?;
        indices.extend(mtecr.sensor_indices().into_iter().take(count));
        if indices.len() < count {
            return Err(ThermalError::Protocol(format!(
                "MTECR reports {} sensors but maps {}",
                count,
                indices.len()
            )));
        }

        debug!(slot, count, ?indices, "sensor map discovered");
        Ok(Self { slot, indices })
    }

    /// Main-board map: gearbox sensors are numbered sequentially
    pub fn sequential(slot: u8, count: usize) -> Result<Self> {
        let mut indices = allocate(slot, count)?;
        indices.extend((0..count).map(|i| MTMP_GBOX_INDEX_MIN + i as u16));
        Ok(Self { slot, indices })
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn physical_index(&self, logical: u8) -> Result<u16> {
        self.indices.get(usize::from(logical)).copied().ok_or_else(|| {
            ThermalError::invalid_argument(format!(
                "gearbox {} not mapped on slot {} ({} sensors)",
                logical,
                self.slot,
                self.indices.len()
            ))
        })
    }
}

#[derive(Debug, Default)]
pub struct SensorMapRegistry {
    maps: RwLock<HashMap<u8, SensorMap>>,
}

impl SensorMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a slot's map; a slot holds at most one
    pub fn register(&self, map: SensorMap) -> Result<()> {
        let mut maps = self.maps.write();
        if maps.contains_key(&map.slot) {
            return Err(ThermalError::invalid_argument(format!(
                "slot {} already has a sensor map",
                map.slot
            )));
        }
        info!(slot = map.slot, sensors = map.len(), "sensor map registered");
        maps.insert(map.slot, map);
        Ok(())
    }

    /// Drop a slot's map
    pub fn release(&self, slot: u8) -> Option<SensorMap> {
        let released = self.maps.write().remove(&slot);
        if released.is_some() {
            info!(slot, "sensor map released");
        }
        released
    }

    pub fn is_registered(&self, slot: u8) -> bool {
        self.maps.read().contains_key(&slot)
    }

    pub fn sensor_count(&self, slot: u8) -> Result<usize> {
        self.maps
            .read()
            .get(&slot)
            .map(SensorMap::len)
            .ok_or(ThermalError::SlotInactive(slot))
    }

    /// Resolve a gearbox's physical sensor index
    pub fn physical_index(&self, slot: u8, logical: u8) -> Result<u16> {
        self.maps
            .read()
            .get(&slot)
            .ok_or(ThermalError::SlotInactive(slot))?
            .physical_index(logical)
    }
}

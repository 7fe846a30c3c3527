//! Thermal controller
//!
//! Owns the cooling channels, the arbiter, the sensor map registry and every
//! zone. Zones are grouped into areas, one per active slot. Slot 0 is the
//! main board and lives as long as the controller; line cards come and go
//! through [`ThermalController::activate_slot`] and
//! [`ThermalController::deactivate_slot`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ct_protocol::{Mgpir, RegisterId};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::constants::sensor::{MAIN_BOARD_SLOT, MAX_SLOTS};
use crate::error::{Result, ThermalError};
use crate::hw::{query_checked, Monitor, RegisterTransport};
use crate::settings::Settings;

use super::arbiter::ZoneScoreArbiter;
use super::cooling::{CoolingController, CoolingDevice};
use super::sensor_map::{SensorMap, SensorMapRegistry};
use super::trips::{chassis_trips, module_trips, TripTable};
use super::zone::{ThermalZone, ZoneContext, ZoneKind};

/// Zones of one slot
#[derive(Debug, Default)]
struct ThermalArea {
    module_zones: Vec<Arc<ThermalZone>>,
    gearbox_zones: Vec<Arc<ThermalZone>>,
}

impl ThermalArea {
    fn retire(&self) {
        for zone in self.gearbox_zones.iter().chain(&self.module_zones) {
            zone.retire();
        }
    }
}

pub struct ThermalController {
    transport: Arc<dyn RegisterTransport>,
    arbiter: ZoneScoreArbiter,
    sensor_maps: SensorMapRegistry,
    cooling: CoolingController,
    poll_interval_ms: u64,
    allow_list: Vec<String>,
    slot_names: HashMap<u8, String>,
    initializing: AtomicBool,
    chassis: Arc<ThermalZone>,
    areas: RwLock<BTreeMap<u8, ThermalArea>>,
}

impl ThermalController {
    /// Probe cooling, then build the chassis zone and the main-board area
    pub fn new(transport: Arc<dyn RegisterTransport>, settings: &Settings) -> Result<Self> {
        let cooling = CoolingController::probe(Arc::clone(&transport))?;
        let arbiter = ZoneScoreArbiter::new();
        let poll_interval_ms = settings.poll_interval_ms();

        let chassis = Arc::new(ThermalZone::new(
            arbiter.register_zone(),
            "chassis",
            ZoneKind::Chassis,
            chassis_trips(),
            poll_interval_ms,
        ));

        let slot_names = settings
            .chassis
            .slots
            .iter()
            .filter_map(|s| s.name.clone().map(|name| (s.slot, name)))
            .collect();

        let controller = Self {
            transport,
            arbiter,
            sensor_maps: SensorMapRegistry::new(),
            cooling,
            poll_interval_ms,
            allow_list: settings.external_cooling_allow_list.clone(),
            slot_names,
            initializing: AtomicBool::new(true),
            chassis,
            areas: RwLock::new(BTreeMap::new()),
        };

        controller.bind_own_channels(&controller.chassis)?;
        let main = controller.build_area(MAIN_BOARD_SLOT)?;
        controller.areas.write().insert(MAIN_BOARD_SLOT, main);
        controller.initializing.store(false, Ordering::Release);

        for slot in settings.chassis.active_line_cards() {
            if let Err(e) = controller.activate_slot(slot) {
                warn!(slot, error = %e, "configured line card failed to activate");
            }
        }

        info!(
            zones = controller.zones().len(),
            channels = controller.cooling.channels().len(),
            poll_interval_ms,
            "thermal controller ready"
        );
        Ok(controller)
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::Acquire)
    }

    /// Borrowed state for zone operations
    pub fn context(&self) -> ZoneContext<'_> {
        ZoneContext {
            transport: self.transport.as_ref(),
            arbiter: &self.arbiter,
            sensor_maps: &self.sensor_maps,
            cooling: &self.cooling,
            allow_list: &self.allow_list,
            initializing: self.is_initializing(),
        }
    }

    pub fn transport(&self) -> &dyn RegisterTransport {
        self.transport.as_ref()
    }

    pub fn monitor(&self) -> Monitor<'_> {
        Monitor::new(self.transport.as_ref())
    }

    pub fn cooling(&self) -> &CoolingController {
        &self.cooling
    }

    pub fn arbiter(&self) -> &ZoneScoreArbiter {
        &self.arbiter
    }

    pub fn sensor_maps(&self) -> &SensorMapRegistry {
        &self.sensor_maps
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn slot_name(&self, slot: u8) -> Option<&str> {
        self.slot_names.get(&slot).map(String::as_str)
    }

    pub fn active_slots(&self) -> Vec<u8> {
        self.areas.read().keys().copied().collect()
    }

    pub fn chassis(&self) -> &Arc<ThermalZone> {
        &self.chassis
    }

    /// Every live zone: chassis first, then per slot modules and gearboxes
    pub fn zones(&self) -> Vec<Arc<ThermalZone>> {
        let areas = self.areas.read();
        let mut zones = vec![Arc::clone(&self.chassis)];
        for area in areas.values() {
            zones.extend(area.module_zones.iter().cloned());
            zones.extend(area.gearbox_zones.iter().cloned());
        }
        zones
    }

    pub fn zone(&self, name: &str) -> Option<Arc<ThermalZone>> {
        self.zones().into_iter().find(|z| z.name() == name)
    }

    /// Bind an external cooling device to every zone
    ///
    /// Unrecognized devices are ignored by the zones themselves. Zones that
    /// already hold the device are skipped, and a failing zone does not stop
    /// the rest; the first error is returned.
    pub fn bind_device(&self, device: &CoolingDevice) -> Result<()> {
        let ctx = self.context();
        let mut first_error = None;
        for zone in self.zones() {
            if zone.bindings().iter().any(|b| b.device == *device) {
                continue;
            }
            if let Err(e) = zone.bind(device, &ctx) {
                warn!(zone = zone.name(), error = %e, "cooling bind failed");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // ------------------------------------------------------------------------
    // Line cards
    // ------------------------------------------------------------------------

    pub fn activate_slot(&self, slot: u8) -> Result<()> {
        if slot == MAIN_BOARD_SLOT || slot > MAX_SLOTS {
            return Err(ThermalError::invalid_argument(format!(
                "slot {} is not a line-card slot (1-{})",
                slot, MAX_SLOTS
            )));
        }
        if self.areas.read().contains_key(&slot) {
            return Err(ThermalError::invalid_argument(format!("slot {} is already active", slot)));
        }

        let area = self.build_area(slot)?;
        info!(
            slot,
            modules = area.module_zones.len(),
            gearboxes = area.gearbox_zones.len(),
            "line card activated"
        );
        self.areas.write().insert(slot, area);
        Ok(())
    }

    pub fn deactivate_slot(&self, slot: u8) -> Result<()> {
        if slot == MAIN_BOARD_SLOT {
            return Err(ThermalError::invalid_argument("main board cannot be deactivated"));
        }
        let area = self
            .areas
            .write()
            .remove(&slot)
            .ok_or(ThermalError::SlotInactive(slot))?;

        for zone in &area.gearbox_zones {
            zone.retire();
        }
        self.sensor_maps.release(slot);
        for zone in &area.module_zones {
            zone.retire();
        }
        info!(slot, "line card deactivated");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Area construction
    // ------------------------------------------------------------------------

    /// Module zones, then the sensor map, then gearbox zones
    ///
    /// Anything built before a failure is torn down in reverse order.
    fn build_area(&self, slot: u8) -> Result<ThermalArea> {
        let payload = query_checked(self.transport.as_ref(), RegisterId::Mgpir, &Mgpir::query(slot).pack())?;
        let mgpir = Mgpir::unpack(&payload)?;

        let mut area = ThermalArea::default();
        for module in 0..mgpir.num_of_modules {
            let name = self.zone_name(slot, "module", module);
            match self.new_zone(name, ZoneKind::Module { slot, module }, module_trips()) {
                Ok(zone) => area.module_zones.push(zone),
                Err(e) => {
                    area.retire();
                    return Err(e);
                }
            }
        }

        let mut gearbox_count = usize::from(mgpir.gearbox_count());
        let map = if slot == MAIN_BOARD_SLOT {
            SensorMap::sequential(slot, gearbox_count)
        } else {
            SensorMap::from_device(self.transport.as_ref(), slot)
        };
        let map = match map {
            Ok(map) => map,
            Err(e) => {
                area.retire();
                return Err(e);
            }
        };
        if map.len() < gearbox_count {
            warn!(slot, gearboxes = gearbox_count, mapped = map.len(), "gearbox sensors missing from map");
            gearbox_count = map.len();
        }
        if let Err(e) = self.sensor_maps.register(map) {
            area.retire();
            return Err(e);
        }

        for index in 0..gearbox_count as u8 {
            let name = self.zone_name(slot, "gearbox", index);
            match self.new_zone(name, ZoneKind::Gearbox { slot, index }, module_trips()) {
                Ok(zone) => area.gearbox_zones.push(zone),
                Err(e) => {
                    for zone in &area.gearbox_zones {
                        zone.retire();
                    }
                    self.sensor_maps.release(slot);
                    for zone in &area.module_zones {
                        zone.retire();
                    }
                    return Err(e);
                }
            }
        }

        debug!(slot, modules = area.module_zones.len(), gearboxes = area.gearbox_zones.len(), "area built");
        Ok(area)
    }

    fn zone_name(&self, slot: u8, kind: &str, index: u8) -> String {
        let number = u32::from(index) + 1;
        if slot == MAIN_BOARD_SLOT {
            format!("{}{}", kind, number)
        } else {
            format!("lc{}-{}{}", slot, kind, number)
        }
    }

    fn new_zone(&self, name: String, kind: ZoneKind, trips: TripTable) -> Result<Arc<ThermalZone>> {
        let zone = Arc::new(ThermalZone::new(
            self.arbiter.register_zone(),
            name,
            kind,
            trips,
            self.poll_interval_ms,
        ));
        self.bind_own_channels(&zone)?;
        Ok(zone)
    }

    fn bind_own_channels(&self, zone: &ThermalZone) -> Result<()> {
        let ctx = self.context();
        for device in self.cooling.devices() {
            zone.bind(&device, &ctx)?;
        }
        Ok(())
    }
}

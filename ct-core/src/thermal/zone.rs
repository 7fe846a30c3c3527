//! Thermal zones
//!
//! A zone owns its trip table, mode and cooling bindings. Shared state (the
//! transport, arbiter, sensor maps and cooling channels) is borrowed for each
//! call through [`ZoneContext`]; a zone never owns its controller.
//!
//! Behavior by kind:
//! - chassis and gearbox zones keep the trip table they were created with
//! - module zones recompute their trips from module thresholds on every
//!   non-zero reading
//! - gearbox zones resolve their sensor through the slot's sensor map

use ct_protocol::MTMP_MODULE_INDEX_MIN;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::constants::sensor::{ASIC_INDEX, MAIN_BOARD_SLOT};
use crate::constants::thermal::BINDING_WEIGHT;
use crate::eeprom::ThresholdReader;
use crate::error::{Result, ThermalError};
use crate::hw::{query_sensor, RegisterTransport};

use super::arbiter::{ZoneId, ZoneScoreArbiter};
use super::cooling::{CoolingController, CoolingDevice};
use super::sensor_map::SensorMapRegistry;
use super::trips::{check_index, derive_module_trips, is_monotonic, TripKind, TripPoint, TripTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneKind {
    Chassis,
    Module { slot: u8, module: u8 },
    Gearbox { slot: u8, index: u8 },
}

impl ZoneKind {
    pub fn slot(&self) -> u8 {
        match self {
            ZoneKind::Chassis => MAIN_BOARD_SLOT,
            ZoneKind::Module { slot, .. } | ZoneKind::Gearbox { slot, .. } => *slot,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneMode {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Stable,
    Raising,
}

/// One trip bound to one cooling device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TripBinding {
    pub trip: usize,
    pub device: CoolingDevice,
    pub min_state: u32,
    pub max_state: u32,
    pub weight: u32,
}

/// Shared state borrowed by zone operations
pub struct ZoneContext<'a> {
    pub transport: &'a dyn RegisterTransport,
    pub arbiter: &'a ZoneScoreArbiter,
    pub sensor_maps: &'a SensorMapRegistry,
    pub cooling: &'a CoolingController,
    /// External cooling type names accepted by substring
    pub allow_list: &'a [String],
    /// Controller is still being set up
    pub initializing: bool,
}

impl ZoneContext<'_> {
    fn recognizes(&self, device: &CoolingDevice) -> bool {
        self.cooling.owns(device)
            || self
                .allow_list
                .iter()
                .any(|name| device.type_name.contains(name.as_str()))
    }
}

#[derive(Debug)]
struct ZoneState {
    trips: TripTable,
    mode: ZoneMode,
    polling_delay_ms: u64,
    bindings: Vec<TripBinding>,
    last_temperature_mc: i32,
}

#[derive(Debug)]
pub struct ThermalZone {
    id: ZoneId,
    name: String,
    kind: ZoneKind,
    poll_interval_ms: u64,
    state: Mutex<ZoneState>,
    /// Set once the zone's slot is torn down; readers hold it shared
    retired: RwLock<bool>,
}

impl ThermalZone {
    pub fn new(id: ZoneId, name: impl Into<String>, kind: ZoneKind, trips: TripTable, poll_interval_ms: u64) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            poll_interval_ms,
            state: Mutex::new(ZoneState {
                trips,
                mode: ZoneMode::Enabled,
                polling_delay_ms: poll_interval_ms,
                bindings: Vec::new(),
                last_temperature_mc: 0,
            }),
            retired: RwLock::new(false),
        }
    }

    pub fn id(&self) -> ZoneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    // ------------------------------------------------------------------------
    // Mode
    // ------------------------------------------------------------------------

    pub fn mode(&self) -> ZoneMode {
        self.state.lock().mode
    }

    /// Enabling restores the poll interval, disabling sets it to zero
    pub fn set_mode(&self, mode: ZoneMode) {
        let mut state = self.state.lock();
        state.mode = mode;
        state.polling_delay_ms = match mode {
            ZoneMode::Enabled => self.poll_interval_ms,
            ZoneMode::Disabled => 0,
        };
        info!(zone = %self.name, ?mode, polling_delay_ms = state.polling_delay_ms, "zone mode changed");
    }

    pub fn polling_delay_ms(&self) -> u64 {
        self.state.lock().polling_delay_ms
    }

    // ------------------------------------------------------------------------
    // Temperature
    // ------------------------------------------------------------------------

    /// Last value returned by [`read_temperature`](Self::read_temperature)
    pub fn last_temperature_mc(&self) -> i32 {
        self.state.lock().last_temperature_mc
    }

    /// Read the zone temperature in milli-degrees
    ///
    /// Returns 0 without touching the device while the controller is
    /// initialising, and 0 for a module that is absent or not responding.
    pub fn read_temperature(&self, ctx: &ZoneContext<'_>) -> Result<i32> {
        let retired = self.retired.read();
        if *retired {
            return Err(ThermalError::SlotInactive(self.kind.slot()));
        }
        if ctx.initializing {
            return Ok(0);
        }

        let (slot, sensor_index) = self.sensor_index(ctx)?;
        let temp = match query_sensor(ctx.transport, slot, sensor_index) {
            Ok(reg) => reg.temperature_mc(),
            Err(e) if matches!(self.kind, ZoneKind::Module { .. }) => {
                debug!(zone = %self.name, error = %e, "module temperature unavailable");
                0
            }
            Err(e) => return Err(e),
        };

        if temp != 0 {
            if let ZoneKind::Module { slot, module } = self.kind {
                self.update_module_trips(ctx, slot, module);
            }
            let trips = self.state.lock().trips;
            ctx.arbiter.observe(self.id, temp, &trips);
        }

        self.state.lock().last_temperature_mc = temp;
        Ok(temp)
    }

    fn sensor_index(&self, ctx: &ZoneContext<'_>) -> Result<(u8, u16)> {
        match self.kind {
            ZoneKind::Chassis => Ok((MAIN_BOARD_SLOT, ASIC_INDEX)),
            ZoneKind::Module { slot, module } => Ok((slot, MTMP_MODULE_INDEX_MIN + u16::from(module))),
            ZoneKind::Gearbox { slot, index } => Ok((slot, ctx.sensor_maps.physical_index(slot, index)?)),
        }
    }

    fn update_module_trips(&self, ctx: &ZoneContext<'_>, slot: u8, module: u8) {
        let thresholds = match ThresholdReader::new(ctx.transport).thresholds(slot, module) {
            Ok(th) => th,
            Err(ThermalError::NotReady) => return,
            Err(e) => {
                debug!(zone = %self.name, error = %e, "module thresholds unavailable");
                return;
            }
        };

        let mut state = self.state.lock();
        match derive_module_trips(&state.trips, &thresholds) {
            Ok(trips) => state.trips = trips,
            Err(e) => warn!(
                zone = %self.name,
                crit = thresholds.crit_mc,
                emerg = thresholds.emerg_mc,
                "{}; keeping previous trips",
                e
            ),
        }
    }

    /// Raising while this zone holds the hottest score
    pub fn trend(&self, arbiter: &ZoneScoreArbiter) -> Trend {
        if arbiter.is_hottest(self.id) {
            Trend::Raising
        } else {
            Trend::Stable
        }
    }

    // ------------------------------------------------------------------------
    // Trips
    // ------------------------------------------------------------------------

    pub fn trips(&self) -> TripTable {
        self.state.lock().trips
    }

    pub fn get_trip(&self, index: usize) -> Result<TripPoint> {
        let index = check_index(index)?;
        Ok(self.state.lock().trips[index])
    }

    pub fn trip_type(&self, index: usize) -> Result<TripKind> {
        Ok(self.get_trip(index)?.kind)
    }

    pub fn trip_temp(&self, index: usize) -> Result<i32> {
        Ok(self.get_trip(index)?.temp_mc)
    }

    /// Update one trip temperature; the table must stay non-decreasing
    pub fn set_trip_temp(&self, index: usize, temp_mc: i32) -> Result<()> {
        let index = check_index(index)?;
        let mut state = self.state.lock();
        let mut candidate = state.trips;
        candidate[index].temp_mc = temp_mc;
        if !is_monotonic(&candidate) {
            return Err(ThermalError::invalid_argument(format!(
                "trip {} at {} would break trip ordering",
                index, temp_mc
            )));
        }
        state.trips = candidate;
        Ok(())
    }

    pub fn trip_hysteresis(&self, index: usize) -> Result<i32> {
        Ok(self.get_trip(index)?.hysteresis_mc)
    }

    pub fn set_trip_hysteresis(&self, index: usize, hysteresis_mc: i32) -> Result<()> {
        let index = check_index(index)?;
        if hysteresis_mc < 0 {
            return Err(ThermalError::invalid_argument("hysteresis must not be negative"));
        }
        self.state.lock().trips[index].hysteresis_mc = hysteresis_mc;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Cooling bindings
    // ------------------------------------------------------------------------

    /// Bind every trip to a cooling device
    ///
    /// Devices that are neither ours nor allow-listed are ignored.
    pub fn bind(&self, device: &CoolingDevice, ctx: &ZoneContext<'_>) -> Result<()> {
        if !ctx.recognizes(device) {
            debug!(zone = %self.name, device = %device.type_name, "ignoring foreign cooling device");
            return Ok(());
        }

        let mut state = self.state.lock();
        if state.bindings.iter().any(|b| b.device == *device) {
            return Err(ThermalError::invalid_argument(format!(
                "{}#{} already bound to {}",
                device.type_name, device.id, self.name
            )));
        }

        let trips = state.trips;
        state.bindings.extend(trips.iter().enumerate().map(|(trip, point)| TripBinding {
            trip,
            device: device.clone(),
            min_state: point.min_state,
            max_state: point.max_state,
            weight: BINDING_WEIGHT,
        }));
        debug!(zone = %self.name, device = %device.type_name, id = device.id, "cooling bound");
        Ok(())
    }

    pub fn unbind(&self, device: &CoolingDevice, ctx: &ZoneContext<'_>) -> Result<()> {
        if !ctx.recognizes(device) {
            return Ok(());
        }

        let mut state = self.state.lock();
        let before = state.bindings.len();
        state.bindings.retain(|b| b.device != *device);
        if state.bindings.len() == before {
            return Err(ThermalError::invalid_argument(format!(
                "{}#{} is not bound to {}",
                device.type_name, device.id, self.name
            )));
        }
        Ok(())
    }

    pub fn bindings(&self) -> Vec<TripBinding> {
        self.state.lock().bindings.clone()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Wait for in-flight reads, then refuse all further reads
    pub fn retire(&self) {
        *self.retired.write() = true;
        debug!(zone = %self.name, "zone retired");
    }

    pub fn is_retired(&self) -> bool {
        *self.retired.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::eeprom::id;
    use crate::data::{ChassisProfile, GearboxProfile, ModuleProfile};
    use crate::hw::{InjectedFailure, SimulatedChassis};
    use crate::thermal::sensor_map::SensorMap;
    use crate::thermal::trips::{chassis_trips, module_trips};
    use ct_protocol::RegisterId;
    use std::sync::Arc;

    struct Fixture {
        sim: Arc<SimulatedChassis>,
        arbiter: ZoneScoreArbiter,
        maps: SensorMapRegistry,
        cooling: CoolingController,
        allow_list: Vec<String>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut profile = ChassisProfile::bare();
            profile.slots[0].modules = vec![
                ModuleProfile::new(0, id::QSFP28, 50_000).with_thresholds(70_000, 80_000),
                ModuleProfile::new(1, id::QSFP28, 0),
            ];
            profile.slots[0].gearboxes = vec![GearboxProfile { sensor_index: 256, temperature_mc: 66_000 }];
            let sim = Arc::new(SimulatedChassis::new(&profile));
            let cooling = CoolingController::probe(sim.clone()).unwrap();
            let maps = SensorMapRegistry::new();
            maps.register(SensorMap::sequential(0, 1).unwrap()).unwrap();
            Self {
                sim,
                arbiter: ZoneScoreArbiter::new(),
                maps,
                cooling,
                allow_list: vec!["mlxreg_fan".to_string()],
            }
        }

        fn ctx(&self, initializing: bool) -> ZoneContext<'_> {
            ZoneContext {
                transport: self.sim.as_ref(),
                arbiter: &self.arbiter,
                sensor_maps: &self.maps,
                cooling: &self.cooling,
                allow_list: &self.allow_list,
                initializing,
            }
        }

        fn zone(&self, kind: ZoneKind) -> ThermalZone {
            let trips = match kind {
                ZoneKind::Chassis => chassis_trips(),
                _ => module_trips(),
            };
            ThermalZone::new(self.arbiter.register_zone(), "test", kind, trips, 1_000)
        }
    }

    #[test]
    fn test_initializing_reads_zero_without_device_access() {
        let fx = Fixture::new();
        let zone = fx.zone(ZoneKind::Chassis);
        fx.sim.clear_transactions();
        assert_eq!(zone.read_temperature(&fx.ctx(true)).unwrap(), 0);
        assert!(fx.sim.transactions().is_empty());
    }

    #[test]
    fn test_chassis_reading_keeps_static_trips() {
        let fx = Fixture::new();
        let zone = fx.zone(ZoneKind::Chassis);
        assert_eq!(zone.read_temperature(&fx.ctx(false)).unwrap(), 52_000);
        assert_eq!(zone.trips(), chassis_trips());
        assert_eq!(zone.last_temperature_mc(), 52_000);
    }

    #[test]
    fn test_module_reading_derives_trips() {
        let fx = Fixture::new();
        let zone = fx.zone(ZoneKind::Module { slot: 0, module: 0 });
        fx.sim.set_module_thresholds(0, 0, 75_000, 90_000);
        assert_eq!(zone.read_temperature(&fx.ctx(false)).unwrap(), 50_000);
        assert_eq!(zone.trips().map(|t| t.temp_mc), [65_000, 75_000, 90_000]);
    }

    #[test]
    fn test_inconsistent_thresholds_keep_previous_trips() {
        let fx = Fixture::new();
        let zone = fx.zone(ZoneKind::Module { slot: 0, module: 0 });
        zone.read_temperature(&fx.ctx(false)).unwrap();
        let before = zone.trips();

        fx.sim.set_module_thresholds(0, 0, 80_000, 70_000);
        assert_eq!(zone.read_temperature(&fx.ctx(false)).unwrap(), 50_000);
        assert_eq!(zone.trips(), before);
    }

    #[test]
    fn test_module_not_ready_reads_zero() {
        let fx = Fixture::new();
        let zone = fx.zone(ZoneKind::Module { slot: 0, module: 1 });
        assert_eq!(zone.read_temperature(&fx.ctx(false)).unwrap(), 0);
        assert_eq!(zone.trips(), module_trips());
        assert_eq!(fx.arbiter.highest(), (0, None));
    }

    #[test]
    fn test_module_errors_read_zero_but_chassis_errors_propagate() {
        let fx = Fixture::new();
        fx.sim.inject_failure(RegisterId::Mtmp, InjectedFailure::Transport);
        let module = fx.zone(ZoneKind::Module { slot: 0, module: 0 });
        assert_eq!(module.read_temperature(&fx.ctx(false)).unwrap(), 0);

        let chassis = fx.zone(ZoneKind::Chassis);
        assert!(chassis.read_temperature(&fx.ctx(false)).unwrap_err().is_io());
    }

    #[test]
    fn test_gearbox_resolves_through_sensor_map() {
        let fx = Fixture::new();
        let zone = fx.zone(ZoneKind::Gearbox { slot: 0, index: 0 });
        assert_eq!(zone.read_temperature(&fx.ctx(false)).unwrap(), 66_000);

        fx.maps.release(0);
        assert!(matches!(
            zone.read_temperature(&fx.ctx(false)),
            Err(ThermalError::SlotInactive(0))
        ));
    }

    #[test]
    fn test_hot_zone_raises_trend() {
        let fx = Fixture::new();
        let chassis = fx.zone(ZoneKind::Chassis);
        let gearbox = fx.zone(ZoneKind::Gearbox { slot: 0, index: 0 });
        chassis.read_temperature(&fx.ctx(false)).unwrap();
        gearbox.read_temperature(&fx.ctx(false)).unwrap();
        assert_eq!(gearbox.trend(&fx.arbiter), Trend::Raising);
        assert_eq!(chassis.trend(&fx.arbiter), Trend::Stable);

        fx.sim.set_sensor_temperature(0, 0, 105_000);
        chassis.read_temperature(&fx.ctx(false)).unwrap();
        assert_eq!(fx.arbiter.highest().0, u32::MAX);
        assert_eq!(chassis.trend(&fx.arbiter), Trend::Raising);
        assert_eq!(gearbox.trend(&fx.arbiter), Trend::Stable);
    }

    #[test]
    fn test_mode_controls_polling_delay() {
        let fx = Fixture::new();
        let zone = fx.zone(ZoneKind::Chassis);
        assert_eq!(zone.polling_delay_ms(), 1_000);
        zone.set_mode(ZoneMode::Disabled);
        assert_eq!((zone.mode(), zone.polling_delay_ms()), (ZoneMode::Disabled, 0));
        zone.set_mode(ZoneMode::Enabled);
        assert_eq!(zone.polling_delay_ms(), 1_000);
    }

    #[test]
    fn test_trip_accessors() {
        let fx = Fixture::new();
        let zone = fx.zone(ZoneKind::Chassis);
        assert_eq!(zone.trip_type(2).unwrap(), TripKind::Hot);
        assert_eq!(zone.trip_temp(1).unwrap(), 85_000);
        assert!(matches!(zone.get_trip(3), Err(ThermalError::InvalidArgument(_))));

        zone.set_trip_temp(1, 90_000).unwrap();
        assert_eq!(zone.trip_temp(1).unwrap(), 90_000);
        assert!(zone.set_trip_temp(1, 110_000).is_err());
        assert_eq!(zone.trip_temp(1).unwrap(), 90_000);

        zone.set_trip_hysteresis(0, 2_000).unwrap();
        assert_eq!(zone.trip_hysteresis(0).unwrap(), 2_000);
        assert!(zone.set_trip_hysteresis(0, -1).is_err());
        assert!(zone.set_trip_hysteresis(5, 1).is_err());
    }

    #[test]
    fn test_bind_and_unbind() {
        let fx = Fixture::new();
        let ctx = fx.ctx(false);
        let zone = fx.zone(ZoneKind::Chassis);
        let own = fx.cooling.device(0).unwrap();

        zone.bind(&own, &ctx).unwrap();
        let bindings = zone.bindings();
        assert_eq!(bindings.len(), 3);
        assert_eq!(
            bindings.iter().map(|b| (b.trip, b.min_state, b.max_state)).collect::<Vec<_>>(),
            vec![(0, 0, 4), (1, 4, 10), (2, 10, 10)]
        );
        assert!(zone.bind(&own, &ctx).is_err());

        let external = CoolingDevice::new("mlxreg_fan1", 0);
        zone.bind(&external, &ctx).unwrap();
        assert_eq!(zone.bindings().len(), 6);

        let foreign = CoolingDevice::new("acpi_fan", 0);
        zone.bind(&foreign, &ctx).unwrap();
        zone.unbind(&foreign, &ctx).unwrap();
        assert_eq!(zone.bindings().len(), 6);

        zone.unbind(&own, &ctx).unwrap();
        assert_eq!(zone.bindings().len(), 3);
        assert!(zone.unbind(&own, &ctx).is_err());
    }

    #[test]
    fn test_retired_zone_rejects_reads() {
        let fx = Fixture::new();
        let zone = fx.zone(ZoneKind::Module { slot: 0, module: 0 });
        zone.retire();
        assert!(zone.is_retired());
        assert!(matches!(
            zone.read_temperature(&fx.ctx(false)),
            Err(ThermalError::SlotInactive(0))
        ));
    }
}

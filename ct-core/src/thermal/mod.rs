//! Thermal zones, arbitration and cooling

mod arbiter;
mod controller;
mod cooling;
mod sensor_map;
mod trips;
mod zone;

pub use arbiter::{zone_score, ZoneId, ZoneScoreArbiter};
pub use controller::ThermalController;
pub use cooling::{duty_from_state, state_from_duty, CoolingController, CoolingDevice};
pub use sensor_map::{SensorMap, SensorMapRegistry};
pub use trips::{
    chassis_trips, check_index, default_trips, derive_module_trips, is_monotonic, module_trips, TripKind,
    TripPoint, TripTable,
};
pub use zone::{ThermalZone, Trend, TripBinding, ZoneContext, ZoneKind, ZoneMode};

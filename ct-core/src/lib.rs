//! chassis-thermal core library
//!
//! Thermal telemetry and fan control for a modular switch chassis.
//!
//! # Features
//!
//! - **Module EEPROM**: Paged reads of optical module memory (SFF-8436/8636/8472, CMIS)
//! - **Thresholds**: Module temperature warning/alarm thresholds drive zone trip points
//! - **Thermal Zones**: Chassis, module and gearbox zones with hottest-zone arbitration
//! - **Cooling**: Fan channels with a settable cooling floor
//! - **Line Cards**: Per-slot zone areas created and torn down at runtime
//!
//! # Module Structure
//!
//! - `hw/` - Register transport, simulated chassis, monitoring reads
//! - `eeprom/` - Module classification, paged reader, thresholds
//! - `thermal/` - Trips, zones, arbiter, sensor maps, cooling, controller
//! - `data/` - Hardware profile types and validation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ct_core::{load_settings, SimulatedChassis, ThermalController};
//!
//! let settings = load_settings(None).unwrap();
//! let chassis = Arc::new(SimulatedChassis::new(&settings.chassis));
//! let controller = ThermalController::new(chassis, &settings).unwrap();
//! for zone in controller.zones() {
//!     let temp = zone.read_temperature(&controller.context()).unwrap();
//!     println!("{}: {}", zone.name(), temp);
//! }
//! ```

// Grouped modules
pub mod data;
pub mod eeprom;
pub mod hw;
pub mod thermal;

// Standalone modules
pub mod constants;
pub mod error;
pub mod settings;

// Re-export error types
pub use error::{Result, ThermalError};

// Re-export profile types from data/
pub use data::{
    validate_allow_list, validate_eeprom_image, validate_file_size, validate_profile, ChassisProfile,
    FanProfile, GearboxProfile, ModuleProfile, SlotProfile,
};

// Re-export hardware access from hw/
pub use hw::{
    gearbox_label, module_label, query_checked, query_sensor, write_checked, FanReading, InjectedFailure,
    Monitor, RegisterResponse, RegisterTransport, SensorReading, SimulatedChassis, Transaction,
    TransactionKind,
};

// Re-export module memory access from eeprom/
pub use eeprom::{
    EepromPagedReader, ModuleClassifier, ModuleHandle, ModuleInfo, ModuleStandard, ThresholdReader,
    Thresholds,
};

// Re-export thermal types from thermal/
pub use thermal::{
    CoolingController, CoolingDevice, SensorMap, SensorMapRegistry, ThermalController, ThermalZone,
    Trend, TripBinding, TripKind, TripPoint, TripTable, ZoneContext, ZoneId, ZoneKind, ZoneMode,
    ZoneScoreArbiter,
};

// Re-export settings functions
pub use settings::{load_settings, resolve_settings_path, save_settings, validate_settings, Settings};

//! Hardware profile types and validation

mod profile;
mod validation;

pub use profile::{ChassisProfile, FanProfile, GearboxProfile, ModuleProfile, SlotProfile};
pub use validation::{validate_allow_list, validate_eeprom_image, validate_file_size, validate_profile};

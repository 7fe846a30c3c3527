//! Validation of configuration input
//!
//! Settings files describe the simulated hardware, so every bound the
//! register model relies on is checked before a profile is used.

use std::collections::HashSet;
use std::path::Path;

use ct_protocol::{MFCR_PWMS_MAX, MFCR_TACHOS_MAX};

use crate::constants::eeprom::MAX_LOGICAL_LEN;
use crate::constants::limits;
use crate::constants::sensor::{MAIN_BOARD_SLOT, MAX_MODULES, MAX_SLOTS};
use crate::data::ChassisProfile;
use crate::error::{Result, ThermalError};

/// Validates the simulated hardware description
pub fn validate_profile(profile: &ChassisProfile) -> Result<()> {
    if profile.pwm_count == 0 || usize::from(profile.pwm_count) > MFCR_PWMS_MAX {
        return Err(ThermalError::config(format!(
            "pwm_count must be 1-{}, got {}",
            MFCR_PWMS_MAX, profile.pwm_count
        )));
    }
    if profile.fans.len() > MFCR_TACHOS_MAX {
        return Err(ThermalError::config(format!(
            "at most {} fans are supported, got {}",
            MFCR_TACHOS_MAX,
            profile.fans.len()
        )));
    }
    if profile.slot(MAIN_BOARD_SLOT).is_none() {
        return Err(ThermalError::config("profile has no main board (slot 0)"));
    }

    let mut slots = HashSet::new();
    for slot in &profile.slots {
        if slot.slot > MAX_SLOTS {
            return Err(ThermalError::config(format!(
                "slot {} exceeds the highest slot {}",
                slot.slot, MAX_SLOTS
            )));
        }
        if !slots.insert(slot.slot) {
            return Err(ThermalError::config(format!("slot {} listed twice", slot.slot)));
        }

        let mut modules = HashSet::new();
        for module in &slot.modules {
            if module.module >= MAX_MODULES {
                return Err(ThermalError::config(format!(
                    "slot {} module {} out of range (0-{})",
                    slot.slot,
                    module.module,
                    MAX_MODULES - 1
                )));
            }
            if !modules.insert(module.module) {
                return Err(ThermalError::config(format!(
                    "slot {} module {} listed twice",
                    slot.slot, module.module
                )));
            }
            if let Some(image) = &module.eeprom {
                validate_eeprom_image(image)?;
            }
        }

        let mut sensors = HashSet::new();
        for gearbox in &slot.gearboxes {
            if !sensors.insert(gearbox.sensor_index) {
                return Err(ThermalError::config(format!(
                    "slot {} gearbox sensor {} listed twice",
                    slot.slot, gearbox.sensor_index
                )));
            }
        }
    }
    Ok(())
}

/// Validates a module memory image
pub fn validate_eeprom_image(image: &[u8]) -> Result<()> {
    if image.is_empty() || image.len() > MAX_LOGICAL_LEN {
        return Err(ThermalError::config(format!(
            "EEPROM image must be 1-{} bytes, got {}",
            MAX_LOGICAL_LEN,
            image.len()
        )));
    }
    Ok(())
}

/// Validates the external cooling type allow-list
pub fn validate_allow_list(names: &[String]) -> Result<()> {
    if names.iter().any(|n| n.trim().is_empty()) {
        return Err(ThermalError::config("cooling allow-list entries must not be empty"));
    }
    Ok(())
}

/// Validates settings file size
pub fn validate_file_size(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ThermalError::config(format!("cannot read file metadata: {}", e)))?;

    if metadata.len() > limits::MAX_SETTINGS_SIZE {
        return Err(ThermalError::config(format!(
            "settings file exceeds maximum size of {} bytes",
            limits::MAX_SETTINGS_SIZE
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::eeprom::id;
    use crate::data::{GearboxProfile, ModuleProfile, SlotProfile};

    #[test]
    fn test_default_profile_is_valid() {
        assert!(validate_profile(&ChassisProfile::default()).is_ok());
        assert!(validate_profile(&ChassisProfile::bare()).is_ok());
    }

    #[test]
    fn test_slot_bounds() {
        let mut profile = ChassisProfile::bare();
        profile.slots.push(SlotProfile::new(17));
        assert!(validate_profile(&profile).is_err());

        let mut profile = ChassisProfile::bare();
        profile.slots.push(SlotProfile::new(0));
        assert!(validate_profile(&profile).is_err());

        let mut profile = ChassisProfile::bare();
        profile.slots.clear();
        profile.slots.push(SlotProfile::new(1));
        assert!(validate_profile(&profile).is_err());
    }

    #[test]
    fn test_module_bounds() {
        let mut profile = ChassisProfile::bare();
        profile.slots[0].modules.push(ModuleProfile::new(128, id::SFP, 0));
        assert!(validate_profile(&profile).is_err());

        let mut profile = ChassisProfile::bare();
        profile.slots[0].modules.push(ModuleProfile::new(3, id::SFP, 0));
        profile.slots[0].modules.push(ModuleProfile::new(3, id::QSFP28, 0));
        assert!(validate_profile(&profile).is_err());
    }

    #[test]
    fn test_duplicate_gearbox_sensor() {
        let mut profile = ChassisProfile::bare();
        let gearbox = GearboxProfile { sensor_index: 256, temperature_mc: 0 };
        profile.slots[0].gearboxes = vec![gearbox.clone(), gearbox];
        assert!(validate_profile(&profile).is_err());
    }

    #[test]
    fn test_fan_and_pwm_limits() {
        let mut profile = ChassisProfile::bare();
        profile.pwm_count = 0;
        assert!(validate_profile(&profile).is_err());
        profile.pwm_count = 6;
        assert!(validate_profile(&profile).is_err());

        let mut profile = ChassisProfile::bare();
        profile.fans = vec![profile.fans[0].clone(); 13];
        assert!(validate_profile(&profile).is_err());
    }

    #[test]
    fn test_eeprom_image_length() {
        assert!(validate_eeprom_image(&[0x11]).is_ok());
        assert!(validate_eeprom_image(&vec![0; MAX_LOGICAL_LEN]).is_ok());
        assert!(validate_eeprom_image(&[]).is_err());
        assert!(validate_eeprom_image(&vec![0; MAX_LOGICAL_LEN + 1]).is_err());
    }

    #[test]
    fn test_allow_list() {
        assert!(validate_allow_list(&["mlxreg_fan".to_string()]).is_ok());
        assert!(validate_allow_list(&[]).is_ok());
        assert!(validate_allow_list(&["  ".to_string()]).is_err());
    }
}

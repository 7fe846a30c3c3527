//! Constants for chassis-thermal
//!
//! Memory-map geometry, thermal defaults and cooling limits live here so the
//! addressing and control code never carries bare numbers.

use std::time::Duration;

/// System paths
pub mod paths {
    /// System-wide configuration directory
    pub const CONFIG_DIR: &str = "/etc/chassis-thermal";

    /// Settings file name, shared by the system and user config directories
    pub const SETTINGS_FILE: &str = "settings.json";

    /// Per-user config subdirectory under `dirs::config_dir()`
    pub const USER_CONFIG_SUBDIR: &str = "chassis-thermal";

    /// Environment variable that overrides the settings path
    pub const CONFIG_ENV: &str = "CHASSIS_THERMAL_CONFIG";

    /// Returns the user configuration directory
    pub fn user_config_dir() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join(USER_CONFIG_SUBDIR))
    }
}

/// Module EEPROM geometry
pub mod eeprom {
    /// Lower page boundary: offsets below this are directly addressable
    pub const PAGE_LENGTH: u32 = 256;

    /// Size of each upper page window
    pub const UP_PAGE_LENGTH: u32 = 128;

    /// Largest page number a transaction can address
    pub const MAX_PAGE: u32 = 255;

    /// Largest logical memory image the reader can address
    pub const MAX_LOGICAL_LEN: usize = (PAGE_LENGTH + UP_PAGE_LENGTH * MAX_PAGE) as usize;

    /// CMIS pages at or above this value are shifted on the device
    pub const CMIS_PAGE_THRESHOLD: u8 = 3;

    /// Shift applied to CMIS pages at or above the threshold
    pub const CMIS_PAGE_OFFSET: u8 = 0x0d;

    /// Module identifier bytes (byte 0 of the lower page)
    pub mod id {
        pub const SFP: u8 = 0x03;
        pub const QSFP: u8 = 0x0c;
        pub const QSFP_PLUS: u8 = 0x0d;
        pub const QSFP28: u8 = 0x11;
        pub const QSFP_DD: u8 = 0x18;
        pub const SFP_DD: u8 = 0x1a;
        pub const QSFP_PLUS_CMIS: u8 = 0x1e;
    }

    /// Module info header: identifier, revision, type/flags
    pub const MODULE_INFO_SIZE: usize = 3;
    pub const MODULE_INFO_ID: usize = 0;
    pub const MODULE_INFO_REV_ID: usize = 1;
    pub const MODULE_INFO_TYPE_ID: usize = 2;

    /// QSFP+ revisions from this value on follow SFF-8636
    pub const QSFP_PLUS_SFF8636_REV: u8 = 0x03;

    /// SFP diagnostic monitoring type byte
    pub const SFP_DIAG_MON_OFFSET: u32 = 92;

    /// CMIS flat-memory flag in the type byte
    pub const CMIS_FLAT_MEMORY: u8 = 0x80;

    /// Standard memory sizes reported by module info
    pub const SFF_8436_LEN: usize = 640;
    pub const SFF_8636_LEN: usize = 640;
    pub const SFF_8472_LEN: usize = 512;
    pub const SFF_8079_LEN: usize = 256;
    pub const CMIS_FLAT_LEN: usize = 256;

    /// Threshold page for paged non-CMIS modules
    pub const TH_PAGE_NUM: u8 = 3;

    /// Threshold page for CMIS modules
    pub const TH_PAGE_CMIS_NUM: u8 = 2;

    /// Thresholds live in the upper half of their page
    pub const TH_PAGE_OFF: u16 = 0x80;

    /// Each threshold is a big-endian 16-bit value
    pub const TH_ITEM_SIZE: u16 = 2;

    /// Offset of the temperature high alarm (emergency)
    pub const TEMP_HIGH_ALARM: u16 = 0;

    /// Offset of the temperature high warning (critical)
    pub const TEMP_HIGH_WARN: u16 = 4;
}

/// Thermal zone defaults
pub mod thermal {
    use super::Duration;

    /// Trip points per zone: normal, high, hot
    pub const TRIP_COUNT: usize = 3;

    pub const TRIP_NORMAL: usize = 0;
    pub const TRIP_HIGH: usize = 1;
    pub const TRIP_HOT: usize = 2;

    /// Default trip hysteresis in milli-degrees
    pub const HYSTERESIS_MC: i32 = 5_000;

    /// Distance between the normal and high trips of a module zone
    pub const MODULE_TEMP_SHIFT_MC: i32 = 2 * HYSTERESIS_MC;

    /// Chassis ASIC trip temperatures
    pub const ASIC_TEMP_NORM_MC: i32 = 75_000;
    pub const ASIC_TEMP_HIGH_MC: i32 = 85_000;
    pub const ASIC_TEMP_HOT_MC: i32 = 105_000;

    /// Module and gearbox trip temperatures
    pub const MODULE_TEMP_NORM_MC: i32 = 60_000;
    pub const MODULE_TEMP_HIGH_MC: i32 = 70_000;
    pub const MODULE_TEMP_HOT_MC: i32 = 80_000;

    /// Poll interval on a regular management bus
    pub const POLL_INTERVAL: Duration = Duration::from_millis(1_000);

    /// Poll interval on a low-frequency management bus
    pub const SLOW_POLL_INTERVAL: Duration = Duration::from_millis(20_000);

    /// Shortest poll interval accepted from configuration
    pub const MIN_POLL_INTERVAL_MS: u64 = 50;

    /// Each trip tier passed multiplies the zone score by this factor
    pub const SCORE_SHIFT: u32 = 256;

    /// Score assigned to a zone at or above its hot trip
    pub const SCORE_MAX: u32 = u32::MAX;

    /// Weight used for every trip-to-cooling binding
    pub const BINDING_WEIGHT: u32 = 1;
}

/// Cooling channel limits
pub mod cooling {
    /// Highest abstract cooling state
    pub const MAX_STATE: u32 = 10;

    /// Highest device duty cycle
    pub const MAX_DUTY: u32 = 255;

    /// Minimum state every channel starts with (20 %)
    pub const DEFAULT_FLOOR: u32 = 2;

    /// Type name for this controller's own fan channels
    pub const OWN_TYPE: &str = "chassis_fan";

    /// Allowed external cooling device type names
    pub const DEFAULT_EXTERNAL_ALLOW_LIST: &[&str] = &["mlxreg_fan"];
}

/// Sensor addressing
pub mod sensor {
    /// Sensor index of the chassis ASIC
    pub const ASIC_INDEX: u16 = 0;

    /// Slot index of the main board
    pub const MAIN_BOARD_SLOT: u8 = 0;

    /// Highest line-card slot
    pub const MAX_SLOTS: u8 = 16;

    /// Module indices per slot
    pub const MAX_MODULES: u8 = 128;
}

/// Input limits
pub mod limits {
    /// Largest settings file accepted (EEPROM images make it large)
    pub const MAX_SETTINGS_SIZE: u64 = 4 * 1024 * 1024;
}

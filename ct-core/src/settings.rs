//! Settings
//!
//! Persistent settings stored as JSON. The file is looked up in order:
//! an explicit path, `$CHASSIS_THERMAL_CONFIG`, the user config directory,
//! then `/etc/chassis-thermal`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::cooling::DEFAULT_EXTERNAL_ALLOW_LIST;
use crate::constants::paths;
use crate::constants::thermal::{MIN_POLL_INTERVAL_MS, POLL_INTERVAL, SLOW_POLL_INTERVAL};
use crate::data::{validate_allow_list, validate_file_size, validate_profile, ChassisProfile};
use crate::error::{Result, ThermalError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Management bus runs at low frequency; polls every 20 s instead of 1 s
    #[serde(default)]
    pub low_frequency: bool,

    /// Explicit poll interval, overrides the bus default
    #[serde(default, rename = "poll_interval_ms", skip_serializing_if = "Option::is_none")]
    pub poll_override_ms: Option<u64>,

    /// External cooling device types zones may bind to (substring match)
    #[serde(default = "default_allow_list")]
    pub external_cooling_allow_list: Vec<String>,

    /// Hardware behind the simulated transport
    #[serde(default)]
    pub chassis: ChassisProfile,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            low_frequency: false,
            poll_override_ms: None,
            external_cooling_allow_list: default_allow_list(),
            chassis: ChassisProfile::default(),
        }
    }
}

impl Settings {
    /// Zone poll interval in milliseconds, never below the minimum
    pub fn poll_interval_ms(&self) -> u64 {
        let default = if self.low_frequency {
            SLOW_POLL_INTERVAL
        } else {
            POLL_INTERVAL
        };
        self.poll_override_ms
            .unwrap_or(default.as_millis() as u64)
            .max(MIN_POLL_INTERVAL_MS)
    }
}

fn default_allow_list() -> Vec<String> {
    DEFAULT_EXTERNAL_ALLOW_LIST.iter().map(|s| s.to_string()).collect()
}

/// Check every bound the controller relies on
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_allow_list(&settings.external_cooling_allow_list)?;
    validate_profile(&settings.chassis)
}

/// Resolve the settings file location
pub fn resolve_settings_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = std::env::var_os(paths::CONFIG_ENV) {
        return PathBuf::from(path);
    }

    let user = paths::user_config_dir().map(|dir| dir.join(paths::SETTINGS_FILE));
    if let Some(path) = user.as_ref().filter(|p| p.exists()) {
        return path.clone();
    }
    let system = Path::new(paths::CONFIG_DIR).join(paths::SETTINGS_FILE);
    if system.exists() {
        return system;
    }
    user.unwrap_or(system)
}

/// Load settings; a missing file yields the defaults
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let path = resolve_settings_path(explicit);

    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(Settings::default());
    }

    validate_file_size(&path)?;
    let content = fs::read_to_string(&path)
        .map_err(|e| ThermalError::config(format!("Failed to read settings file: {}", e)))?;
    let settings: Settings = serde_json::from_str(&content)?;
    validate_settings(&settings)?;

    debug!(path = %path.display(), "settings loaded");
    Ok(settings)
}

/// Validate and write settings atomically, returning the path written
pub fn save_settings(settings: &Settings, explicit: Option<&Path>) -> Result<PathBuf> {
    use std::io::Write;

    validate_settings(settings)?;
    let path = resolve_settings_path(explicit);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| ThermalError::config(format!("Failed to create config directory: {}", e)))?;
    }

    let json = serde_json::to_string_pretty(settings)?;

    // write to a temp file then rename over the target
    let temp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&temp_path)
        .map_err(|e| ThermalError::config(format!("Failed to create temp file: {}", e)))?;
    file.write_all(json.as_bytes())
        .map_err(|e| ThermalError::config(format!("Failed to write to temp file: {}", e)))?;
    file.sync_all()
        .map_err(|e| ThermalError::config(format!("Failed to sync temp file: {}", e)))?;
    drop(file);

    fs::rename(&temp_path, &path)
        .map_err(|e| ThermalError::config(format!("Failed to rename temp file: {}", e)))?;

    debug!(path = %path.display(), "settings saved");
    Ok(path)
}

//! Chassis hardware profile
//!
//! Describes the hardware behind the simulated register transport: the ASIC
//! sensor, fans, and per-slot modules and gearboxes.

use serde::{Deserialize, Serialize};

use crate::constants::eeprom::id;
use crate::constants::sensor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChassisProfile {
    /// ASIC temperature in milli-degrees
    #[serde(default = "default_asic_temperature")]
    pub asic_temperature_mc: i32,

    /// One entry per tachometer
    #[serde(default = "default_fans")]
    pub fans: Vec<FanProfile>,

    /// Number of PWM outputs
    #[serde(default = "default_pwm_count")]
    pub pwm_count: u8,

    /// Duty cycle every PWM reports at power-on
    #[serde(default = "default_initial_duty")]
    pub initial_duty: u8,

    /// Slot 0 is the main board, other entries are line cards
    #[serde(default = "default_slots")]
    pub slots: Vec<SlotProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FanProfile {
    pub rpm: u16,

    /// Tachometer reads below its minimum
    #[serde(default)]
    pub under_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotProfile {
    pub slot: u8,

    /// Line-card name used as a label prefix
    #[serde(default)]
    pub name: Option<String>,

    /// Line card is brought up with the controller; ignored for the main board
    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub modules: Vec<ModuleProfile>,

    #[serde(default)]
    pub gearboxes: Vec<GearboxProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleProfile {
    pub module: u8,

    /// EEPROM identifier byte
    pub identifier: u8,

    #[serde(default)]
    pub revision: u8,

    /// Module sensor temperature; 0 means not yet reporting
    #[serde(default)]
    pub temperature_mc: i32,

    /// Temperature high warning written into the EEPROM
    #[serde(default = "default_module_crit")]
    pub crit_mc: i32,

    /// Temperature high alarm written into the EEPROM
    #[serde(default = "default_module_emerg")]
    pub emerg_mc: i32,

    /// Cable not trusted: temperature reads as a sensor fault
    #[serde(default)]
    pub untrusted: bool,

    /// Flat-memory CMIS module
    #[serde(default)]
    pub flat_memory: bool,

    /// Explicit logical EEPROM image, synthesized from the fields above when absent
    #[serde(default)]
    pub eeprom: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GearboxProfile {
    /// Physical sensor index
    pub sensor_index: u16,

    #[serde(default)]
    pub temperature_mc: i32,
}

impl ModuleProfile {
    pub fn new(module: u8, identifier: u8, temperature_mc: i32) -> Self {
        Self {
            module,
            identifier,
            revision: 0,
            temperature_mc,
            crit_mc: default_module_crit(),
            emerg_mc: default_module_emerg(),
            untrusted: false,
            flat_memory: false,
            eeprom: None,
        }
    }

    pub fn with_thresholds(mut self, crit_mc: i32, emerg_mc: i32) -> Self {
        self.crit_mc = crit_mc;
        self.emerg_mc = emerg_mc;
        self
    }
}

impl SlotProfile {
    pub fn new(slot: u8) -> Self {
        Self {
            slot,
            name: None,
            active: false,
            modules: Vec::new(),
            gearboxes: Vec::new(),
        }
    }

    /// MGPIR module count: highest module index plus one
    pub fn module_count(&self) -> u8 {
        self.modules
            .iter()
            .map(|m| m.module.saturating_add(1))
            .max()
            .unwrap_or(0)
    }
}

impl ChassisProfile {
    pub fn slot(&self, slot: u8) -> Option<&SlotProfile> {
        self.slots.iter().find(|s| s.slot == slot)
    }

    /// Line cards marked active, in slot order
    pub fn active_line_cards(&self) -> Vec<u8> {
        let mut slots: Vec<u8> = self
            .slots
            .iter()
            .filter(|s| s.active && s.slot != sensor::MAIN_BOARD_SLOT)
            .map(|s| s.slot)
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Mark a line card active or inactive; false if the slot is not described
    pub fn set_slot_active(&mut self, slot: u8, active: bool) -> bool {
        match self.slots.iter_mut().find(|s| s.slot == slot) {
            Some(profile) => {
                profile.active = active;
                true
            }
            None => false,
        }
    }

    /// A chassis with only a main board and no modules
    pub fn bare() -> Self {
        Self {
            asic_temperature_mc: default_asic_temperature(),
            fans: default_fans(),
            pwm_count: default_pwm_count(),
            initial_duty: default_initial_duty(),
            slots: vec![SlotProfile::new(sensor::MAIN_BOARD_SLOT)],
        }
    }
}

impl Default for ChassisProfile {
    fn default() -> Self {
        Self {
            asic_temperature_mc: default_asic_temperature(),
            fans: default_fans(),
            pwm_count: default_pwm_count(),
            initial_duty: default_initial_duty(),
            slots: default_slots(),
        }
    }
}

fn default_asic_temperature() -> i32 {
    52_000
}

fn default_fans() -> Vec<FanProfile> {
    (0..4)
        .map(|_| FanProfile {
            rpm: 9_000,
            under_limit: false,
        })
        .collect()
}

fn default_pwm_count() -> u8 {
    1
}

fn default_initial_duty() -> u8 {
    153
}

fn default_module_crit() -> i32 {
    70_000
}

fn default_module_emerg() -> i32 {
    80_000
}

fn default_slots() -> Vec<SlotProfile> {
    let mut main = SlotProfile::new(sensor::MAIN_BOARD_SLOT);
    main.modules = vec![
        ModuleProfile::new(0, id::QSFP28, 45_000),
        ModuleProfile::new(1, id::QSFP_DD, 50_000).with_thresholds(75_000, 85_000),
        ModuleProfile::new(2, id::SFP, 40_000),
        ModuleProfile::new(3, id::QSFP28, 0),
    ];
    main.gearboxes = vec![
        GearboxProfile { sensor_index: 256, temperature_mc: 55_000 },
        GearboxProfile { sensor_index: 257, temperature_mc: 57_000 },
    ];

    let mut line_card = SlotProfile::new(1);
    line_card.name = Some("lc1".to_string());
    line_card.modules = vec![
        ModuleProfile::new(0, id::QSFP28, 47_000),
        ModuleProfile::new(1, id::QSFP_PLUS_CMIS, 49_000),
    ];
    line_card.gearboxes = vec![
        GearboxProfile { sensor_index: 0x30, temperature_mc: 58_000 },
        GearboxProfile { sensor_index: 0x31, temperature_mc: 56_000 },
    ];

    vec![main, line_card]
}

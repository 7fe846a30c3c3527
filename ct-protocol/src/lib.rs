//! Register payload codecs for the switch management interface
//!
//! Every register exchanged with the device is a fixed-layout, big-endian
//! payload. Each register gets an explicit struct with `pack`/`unpack`; no
//! payload is ever reinterpreted in place.
//!
//! | Register | Purpose                                   | Length |
//! |----------|-------------------------------------------|--------|
//! | MTMP     | temperature sensor read / history reset   | 20     |
//! | MCIA     | module (cable) EEPROM access              | 64     |
//! | MTECR    | per-slot sensor capability + sensor map   | 40     |
//! | MGPIR    | module / gearbox inventory                | 8      |
//! | MFCR     | fan capability (active tachos and PWMs)   | 8      |
//! | MFSC     | PWM duty cycle                            | 4      |
//! | MFSM     | tachometer RPM                            | 4      |
//! | MFSL     | tachometer limits                         | 8      |
//! | FORE     | fan out-of-range (fault) bitmap           | 4      |
//! | MTBR     | module temperature with fault sentinels   | 12     |

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter for correlating device traffic in logs
static TRANSACTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique transaction ID
pub fn generate_transaction_id() -> u64 {
    TRANSACTION_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Maximum EEPROM bytes carried by a single MCIA transaction
pub const MCIA_EEPROM_SIZE: usize = 48;

/// Number of tachometers addressable through MFCR
pub const MFCR_TACHOS_MAX: usize = 12;

/// Number of PWM outputs addressable through MFCR
pub const MFCR_PWMS_MAX: usize = 5;

/// Number of sensors described by the MTECR bitmap
pub const MTECR_SENSOR_MAP_BITS: usize = 256;

pub const MTMP_LEN: usize = 20;
pub const MCIA_LEN: usize = 16 + MCIA_EEPROM_SIZE;
pub const MTECR_LEN: usize = 8 + MTECR_SENSOR_MAP_BITS / 8;
pub const MGPIR_LEN: usize = 8;
pub const MFCR_LEN: usize = 8;
pub const MFSC_LEN: usize = 4;
pub const MFSM_LEN: usize = 4;
pub const MFSL_LEN: usize = 8;
pub const FORE_LEN: usize = 4;
pub const MTBR_LEN: usize = 12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegisterId {
    Mtmp,
    Mcia,
    Mtecr,
    Mgpir,
    Mfcr,
    Mfsc,
    Mfsm,
    Mfsl,
    Fore,
    Mtbr,
}

impl RegisterId {
    pub fn name(&self) -> &'static str {
        match self {
            RegisterId::Mtmp => "MTMP",
            RegisterId::Mcia => "MCIA",
            RegisterId::Mtecr => "MTECR",
            RegisterId::Mgpir => "MGPIR",
            RegisterId::Mfcr => "MFCR",
            RegisterId::Mfsc => "MFSC",
            RegisterId::Mfsm => "MFSM",
            RegisterId::Mfsl => "MFSL",
            RegisterId::Fore => "FORE",
            RegisterId::Mtbr => "MTBR",
        }
    }

    /// Fixed payload length for this register
    pub fn payload_len(&self) -> usize {
        match self {
            RegisterId::Mtmp => MTMP_LEN,
            RegisterId::Mcia => MCIA_LEN,
            RegisterId::Mtecr => MTECR_LEN,
            RegisterId::Mgpir => MGPIR_LEN,
            RegisterId::Mfcr => MFCR_LEN,
            RegisterId::Mfsc => MFSC_LEN,
            RegisterId::Mfsm => MFSM_LEN,
            RegisterId::Mfsl => MFSL_LEN,
            RegisterId::Fore => FORE_LEN,
            RegisterId::Mtbr => MTBR_LEN,
        }
    }
}

impl std::fmt::Display for RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Field helpers
// ============================================================================

fn check_len(register: RegisterId, payload: &[u8]) -> Result<(), String> {
    if payload.len() < register.payload_len() {
        return Err(format!(
            "{} payload too short: {} < {} bytes",
            register,
            payload.len(),
            register.payload_len()
        ));
    }
    Ok(())
}

fn get_u16(payload: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([payload[offset], payload[offset + 1]])
}

fn put_u16(payload: &mut [u8], offset: usize, value: u16) {
    payload[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

/// Read a bit from an LSB-first bitmap
fn bit_is_set(bitmap: &[u8], bit: usize) -> bool {
    bitmap
        .get(bit / 8)
        .map(|byte| byte & (1 << (bit % 8)) != 0)
        .unwrap_or(false)
}

// ============================================================================
// MTMP - temperature sensor
// ============================================================================

/// Sensor index of the first front-panel module sensor
pub const MTMP_MODULE_INDEX_MIN: u16 = 64;

/// Sensor index of the first gearbox sensor
pub const MTMP_GBOX_INDEX_MIN: u16 = 256;

/// Device temperature unit in milli-degrees (0.125 C)
pub const MTMP_TEMP_UNIT_MC: i32 = 125;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mtmp {
    pub slot_index: u8,
    pub sensor_index: u16,
    /// Max temperature tracking enable
    pub mte: bool,
    /// Max temperature reset
    pub mtr: bool,
    /// Raw temperature in device units
    pub temperature: i16,
    /// Raw max temperature in device units
    pub max_temperature: i16,
}

impl Mtmp {
    pub fn query(slot_index: u8, sensor_index: u16, mte: bool, mtr: bool) -> Self {
        Self {
            slot_index,
            sensor_index,
            mte,
            mtr,
            ..Self::default()
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; MTMP_LEN];
        pl[0] = self.slot_index;
        put_u16(&mut pl, 2, self.sensor_index);
        pl[4] = (u8::from(self.mte) << 7) | (u8::from(self.mtr) << 6);
        pl[8..10].copy_from_slice(&self.temperature.to_be_bytes());
        pl[12..14].copy_from_slice(&self.max_temperature.to_be_bytes());
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Mtmp, payload)?;
        Ok(Self {
            slot_index: payload[0],
            sensor_index: get_u16(payload, 2),
            mte: payload[4] & 0x80 != 0,
            mtr: payload[4] & 0x40 != 0,
            temperature: i16::from_be_bytes([payload[8], payload[9]]),
            max_temperature: i16::from_be_bytes([payload[12], payload[13]]),
        })
    }

    /// Temperature in milli-degrees Celsius
    pub fn temperature_mc(&self) -> i32 {
        i32::from(self.temperature) * MTMP_TEMP_UNIT_MC
    }

    /// Highest recorded temperature in milli-degrees Celsius
    pub fn max_temperature_mc(&self) -> i32 {
        i32::from(self.max_temperature) * MTMP_TEMP_UNIT_MC
    }

    /// Convert milli-degrees to device units, saturating at the i16 range
    pub fn mc_to_raw(milli: i32) -> i16 {
        (milli / MTMP_TEMP_UNIT_MC).clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
    }
}

// ============================================================================
// MCIA - module EEPROM access
// ============================================================================

/// Lower I2C address: page 00h and paged upper memory
pub const MCIA_I2C_ADDR_LOW: u8 = 0x50;

/// Upper I2C address: SFF-8472 diagnostics (A2h)
pub const MCIA_I2C_ADDR_HIGH: u8 = 0x51;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mcia {
    pub status: u8,
    pub slot_index: u8,
    pub module: u8,
    pub i2c_addr: u8,
    pub page: u8,
    pub device_address: u16,
    pub size: u16,
    pub data: [u8; MCIA_EEPROM_SIZE],
}

impl Mcia {
    pub fn query(slot_index: u8, module: u8, page: u8, device_address: u16, size: u16, i2c_addr: u8) -> Self {
        Self {
            status: 0,
            slot_index,
            module,
            i2c_addr,
            page,
            device_address,
            size,
            data: [0u8; MCIA_EEPROM_SIZE],
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; MCIA_LEN];
        pl[0] = self.status;
        pl[1] = self.slot_index;
        pl[2] = self.module;
        pl[4] = self.i2c_addr;
        pl[5] = self.page;
        put_u16(&mut pl, 6, self.device_address);
        put_u16(&mut pl, 8, self.size);
        pl[16..].copy_from_slice(&self.data);
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Mcia, payload)?;
        let mut data = [0u8; MCIA_EEPROM_SIZE];
        data.copy_from_slice(&payload[16..MCIA_LEN]);
        Ok(Self {
            status: payload[0],
            slot_index: payload[1],
            module: payload[2],
            i2c_addr: payload[4],
            page: payload[5],
            device_address: get_u16(payload, 6),
            size: get_u16(payload, 8),
            data,
        })
    }

    /// EEPROM bytes carried by this transaction
    pub fn eeprom(&self) -> &[u8] {
        let len = usize::from(self.size).min(MCIA_EEPROM_SIZE);
        &self.data[..len]
    }
}

/// Validate an MCIA transaction size before it is sent
pub fn validate_mcia_size(size: u16) -> Result<(), String> {
    if size == 0 || usize::from(size) > MCIA_EEPROM_SIZE {
        return Err(format!("MCIA size {} out of range (1-{})", size, MCIA_EEPROM_SIZE));
    }
    Ok(())
}

// ============================================================================
// MTECR - sensor capability and sensor map
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mtecr {
    pub slot_index: u8,
    pub sensor_count: u16,
    pub last_sensor: u16,
    pub internal_sensor_count: u8,
    pub sensor_map: [u8; MTECR_SENSOR_MAP_BITS / 8],
}

impl Mtecr {
    pub fn query(slot_index: u8) -> Self {
        Self {
            slot_index,
            ..Self::default()
        }
    }

    /// Build a response advertising the given physical sensor indices
    pub fn with_sensors(slot_index: u8, indices: &[u16]) -> Self {
        let mut reg = Self::query(slot_index);
        for &idx in indices {
            let bit = usize::from(idx);
            if bit < MTECR_SENSOR_MAP_BITS {
                reg.sensor_map[bit / 8] |= 1 << (bit % 8);
            }
        }
        reg.sensor_count = reg.sensor_indices().len() as u16;
        reg.last_sensor = indices.iter().copied().max().unwrap_or(0);
        reg
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; MTECR_LEN];
        pl[0] = self.slot_index;
        put_u16(&mut pl, 2, self.sensor_count);
        put_u16(&mut pl, 4, self.last_sensor);
        pl[6] = self.internal_sensor_count;
        pl[8..].copy_from_slice(&self.sensor_map);
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Mtecr, payload)?;
        let mut sensor_map = [0u8; MTECR_SENSOR_MAP_BITS / 8];
        sensor_map.copy_from_slice(&payload[8..MTECR_LEN]);
        Ok(Self {
            slot_index: payload[0],
            sensor_count: get_u16(payload, 2),
            last_sensor: get_u16(payload, 4),
            internal_sensor_count: payload[6],
            sensor_map,
        })
    }

    /// Physical sensor indices present in the bitmap, ascending
    pub fn sensor_indices(&self) -> Vec<u16> {
        (0..MTECR_SENSOR_MAP_BITS)
            .filter(|&bit| bit_is_set(&self.sensor_map, bit))
            .map(|bit| bit as u16)
            .collect()
    }
}

// ============================================================================
// MGPIR - module and gearbox inventory
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MgpirDeviceType {
    #[default]
    None,
    GearboxDie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mgpir {
    pub slot_index: u8,
    pub device_type: MgpirDeviceType,
    pub devices_per_flash: u8,
    pub num_of_devices: u8,
    pub num_of_modules: u8,
}

impl Mgpir {
    pub fn query(slot_index: u8) -> Self {
        Self {
            slot_index,
            ..Self::default()
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; MGPIR_LEN];
        pl[0] = self.slot_index;
        pl[1] = match self.device_type {
            MgpirDeviceType::None => 0,
            MgpirDeviceType::GearboxDie => 1,
        };
        pl[2] = self.devices_per_flash;
        pl[3] = self.num_of_devices;
        pl[4] = self.num_of_modules;
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Mgpir, payload)?;
        let device_type = match payload[1] {
            0 => MgpirDeviceType::None,
            1 => MgpirDeviceType::GearboxDie,
            other => return Err(format!("MGPIR unknown device type {}", other)),
        };
        Ok(Self {
            slot_index: payload[0],
            device_type,
            devices_per_flash: payload[2],
            num_of_devices: payload[3],
            num_of_modules: payload[4],
        })
    }

    /// Gearbox count, zero unless the devices are gearbox dies
    pub fn gearbox_count(&self) -> u8 {
        match self.device_type {
            MgpirDeviceType::GearboxDie => self.num_of_devices,
            MgpirDeviceType::None => 0,
        }
    }
}

// ============================================================================
// Fan registers: MFCR, MFSC, MFSM, MFSL, FORE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mfcr {
    pub pwm_frequency: u8,
    pub tacho_active: u16,
    pub pwm_active: u8,
}

impl Mfcr {
    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; MFCR_LEN];
        pl[0] = self.pwm_frequency;
        put_u16(&mut pl, 2, self.tacho_active);
        pl[4] = self.pwm_active;
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Mfcr, payload)?;
        Ok(Self {
            pwm_frequency: payload[0],
            tacho_active: get_u16(payload, 2),
            pwm_active: payload[4],
        })
    }

    pub fn active_tachos(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MFCR_TACHOS_MAX as u8).filter(move |i| self.tacho_active & (1 << i) != 0)
    }

    pub fn active_pwms(&self) -> impl Iterator<Item = u8> + '_ {
        (0..MFCR_PWMS_MAX as u8).filter(move |i| self.pwm_active & (1 << i) != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mfsc {
    pub pwm: u8,
    pub duty: u8,
}

impl Mfsc {
    pub fn new(pwm: u8, duty: u8) -> Self {
        Self { pwm, duty }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; MFSC_LEN];
        pl[0] = self.pwm;
        pl[3] = self.duty;
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Mfsc, payload)?;
        Ok(Self {
            pwm: payload[0],
            duty: payload[3],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mfsm {
    pub tacho: u8,
    pub rpm: u16,
}

impl Mfsm {
    pub fn query(tacho: u8) -> Self {
        Self { tacho, rpm: 0 }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; MFSM_LEN];
        pl[0] = self.tacho;
        put_u16(&mut pl, 2, self.rpm);
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Mfsm, payload)?;
        Ok(Self {
            tacho: payload[0],
            rpm: get_u16(payload, 2),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mfsl {
    pub tacho: u8,
    pub tach_min: u16,
    pub tach_max: u16,
}

impl Mfsl {
    pub fn query(tacho: u8) -> Self {
        Self {
            tacho,
            ..Self::default()
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; MFSL_LEN];
        pl[0] = self.tacho;
        put_u16(&mut pl, 2, self.tach_min);
        put_u16(&mut pl, 4, self.tach_max);
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Mfsl, payload)?;
        Ok(Self {
            tacho: payload[0],
            tach_min: get_u16(payload, 2),
            tach_max: get_u16(payload, 4),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fore {
    pub fan_under_limit: u16,
}

impl Fore {
    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; FORE_LEN];
        put_u16(&mut pl, 0, self.fan_under_limit);
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Fore, payload)?;
        Ok(Self {
            fan_under_limit: get_u16(payload, 0),
        })
    }

    /// True when the tachometer reads below its configured minimum
    pub fn fault(&self, tacho: u8) -> bool {
        usize::from(tacho) < MFCR_TACHOS_MAX && self.fan_under_limit & (1 << tacho) != 0
    }
}

// ============================================================================
// MTBR - module temperature bulk read
// ============================================================================

/// Sensor index of the first module in MTBR addressing
pub const MTBR_BASE_MODULE_INDEX: u16 = 64;

pub const MTBR_NO_CONN: u16 = 0x8000;
pub const MTBR_NO_TEMP_SENS: u16 = 0x8001;
pub const MTBR_INDEX_NA: u16 = 0x8002;
pub const MTBR_BAD_SENS_INFO: u16 = 0x8003;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mtbr {
    pub slot_index: u8,
    pub base_sensor_index: u16,
    pub num_rec: u8,
    pub temperature: u16,
    pub max_temperature: u16,
}

impl Mtbr {
    pub fn query(slot_index: u8, base_sensor_index: u16) -> Self {
        Self {
            slot_index,
            base_sensor_index,
            num_rec: 1,
            ..Self::default()
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut pl = vec![0u8; MTBR_LEN];
        pl[0] = self.slot_index;
        put_u16(&mut pl, 2, self.base_sensor_index);
        pl[4] = self.num_rec;
        put_u16(&mut pl, 8, self.temperature);
        put_u16(&mut pl, 10, self.max_temperature);
        pl
    }

    pub fn unpack(payload: &[u8]) -> Result<Self, String> {
        check_len(RegisterId::Mtbr, payload)?;
        Ok(Self {
            slot_index: payload[0],
            base_sensor_index: get_u16(payload, 2),
            num_rec: payload[4],
            temperature: get_u16(payload, 8),
            max_temperature: get_u16(payload, 10),
        })
    }

    /// An untrusted cable makes the module sensor reading faulty
    pub fn is_fault(&self) -> bool {
        self.temperature == MTBR_BAD_SENS_INFO
    }
}

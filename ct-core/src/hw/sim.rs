//! Simulated chassis
//!
//! A register-level device model built from a [`ChassisProfile`]. It answers
//! every register the core consumes, keeps a transaction log, and can inject
//! transport failures or non-zero status per register.
//!
//! Module EEPROMs are stored as logical images (lower memory, then each upper
//! page in turn). MCIA requests are decoded from the physical page/address
//! space exactly the way a module would, including the CMIS page shift, so a
//! request resolved with the wrong arithmetic reads the wrong bytes.

use std::collections::HashMap;

use ct_protocol::{
    Fore, Mcia, Mfcr, Mfsc, Mfsl, Mfsm, Mgpir, MgpirDeviceType, Mtbr, Mtecr, Mtmp, RegisterId,
    MCIA_EEPROM_SIZE, MCIA_I2C_ADDR_HIGH, MCIA_I2C_ADDR_LOW, MTBR_BAD_SENS_INFO, MTBR_NO_CONN,
    MTMP_MODULE_INDEX_MIN,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::constants::eeprom::{self, id};
use crate::data::{ChassisProfile, ModuleProfile};
use crate::error::{Result, ThermalError};
use crate::hw::transport::{RegisterResponse, RegisterTransport};

/// MCIA status: bad addressing
pub const MCIA_STATUS_BAD_PARAM: u8 = 0x2;

/// MCIA status: no module in the cage
pub const MCIA_STATUS_NOT_CONNECTED: u8 = 0x3;

/// Register status for an unknown sensor, slot, fan or PWM
pub const STATUS_BAD_PARAM: u8 = 0x7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Query,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub register: RegisterId,
    pub kind: TransactionKind,
    pub request: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// The transport itself fails
    Transport,
    /// The device answers with this status
    Status(u8),
}

#[derive(Debug, Clone)]
struct SimSensor {
    temperature_mc: i32,
    max_temperature_mc: i32,
    mte: bool,
}

#[derive(Debug, Clone)]
struct SimModule {
    identifier: u8,
    paged: bool,
    cmis: bool,
    untrusted: bool,
    image: Vec<u8>,
}

#[derive(Debug, Clone)]
struct SimFan {
    rpm: u16,
    under_limit: bool,
    tach_min: u16,
    tach_max: u16,
}

#[derive(Debug, Default)]
struct SimSlot {
    module_count: u8,
    gearbox_sensors: Vec<u16>,
    modules: HashMap<u8, SimModule>,
}

#[derive(Debug, Default)]
struct SimState {
    sensors: HashMap<(u8, u16), SimSensor>,
    slots: HashMap<u8, SimSlot>,
    fans: Vec<SimFan>,
    duties: Vec<u8>,
    failures: HashMap<RegisterId, InjectedFailure>,
    transactions: Vec<Transaction>,
}

pub struct SimulatedChassis {
    state: Mutex<SimState>,
}

impl SimulatedChassis {
    pub fn new(profile: &ChassisProfile) -> Self {
        let mut state = SimState::default();

        state.sensors.insert((0, 0), SimSensor::at(profile.asic_temperature_mc));

        for slot in &profile.slots {
            let mut sim_slot = SimSlot {
                module_count: slot.module_count(),
                ..SimSlot::default()
            };
            for module in &slot.modules {
                let index = MTMP_MODULE_INDEX_MIN + u16::from(module.module);
                state.sensors.insert((slot.slot, index), SimSensor::at(module.temperature_mc));
                sim_slot.modules.insert(module.module, SimModule::from_profile(module));
            }
            for gearbox in &slot.gearboxes {
                state
                    .sensors
                    .insert((slot.slot, gearbox.sensor_index), SimSensor::at(gearbox.temperature_mc));
                sim_slot.gearbox_sensors.push(gearbox.sensor_index);
            }
            state.slots.insert(slot.slot, sim_slot);
        }

        state.fans = profile
            .fans
            .iter()
            .map(|f| SimFan {
                rpm: f.rpm,
                under_limit: f.under_limit,
                tach_min: 1_500,
                tach_max: u16::MAX,
            })
            .collect();
        state.duties = vec![profile.initial_duty; usize::from(profile.pwm_count)];

        Self {
            state: Mutex::new(state),
        }
    }

    /// Make every transaction on `register` fail until cleared
    pub fn inject_failure(&self, register: RegisterId, failure: InjectedFailure) {
        self.state.lock().failures.insert(register, failure);
    }

    pub fn clear_failure(&self, register: RegisterId) {
        self.state.lock().failures.remove(&register);
    }

    /// Snapshot of every transaction seen so far
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().transactions.clone()
    }

    pub fn clear_transactions(&self) {
        self.state.lock().transactions.clear();
    }

    pub fn set_sensor_temperature(&self, slot: u8, sensor_index: u16, temperature_mc: i32) {
        let mut state = self.state.lock();
        let sensor = state
            .sensors
            .entry((slot, sensor_index))
            .or_insert_with(|| SimSensor::at(temperature_mc));
        sensor.temperature_mc = temperature_mc;
        if sensor.mte && temperature_mc > sensor.max_temperature_mc {
            sensor.max_temperature_mc = temperature_mc;
        }
    }

    pub fn set_module_temperature(&self, slot: u8, module: u8, temperature_mc: i32) {
        self.set_sensor_temperature(slot, MTMP_MODULE_INDEX_MIN + u16::from(module), temperature_mc);
    }

    /// Rewrite the thresholds stored in a module's EEPROM
    pub fn set_module_thresholds(&self, slot: u8, module: u8, crit_mc: i32, emerg_mc: i32) {
        let mut state = self.state.lock();
        if let Some(m) = state.slots.get_mut(&slot).and_then(|s| s.modules.get_mut(&module)) {
            write_thresholds(&mut m.image, m.paged, m.cmis, crit_mc, emerg_mc);
        }
    }

    pub fn set_fan_under_limit(&self, tacho: u8, under_limit: bool) {
        if let Some(fan) = self.state.lock().fans.get_mut(usize::from(tacho)) {
            fan.under_limit = under_limit;
        }
    }

    pub fn duty(&self, pwm: u8) -> Option<u8> {
        self.state.lock().duties.get(usize::from(pwm)).copied()
    }

    pub fn set_duty(&self, pwm: u8, duty: u8) {
        if let Some(d) = self.state.lock().duties.get_mut(usize::from(pwm)) {
            *d = duty;
        }
    }

    pub fn tach_min(&self, tacho: u8) -> Option<u16> {
        self.state.lock().fans.get(usize::from(tacho)).map(|f| f.tach_min)
    }

    /// Logical EEPROM image of a module
    pub fn module_image(&self, slot: u8, module: u8) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .slots
            .get(&slot)
            .and_then(|s| s.modules.get(&module))
            .map(|m| m.image.clone())
    }
}

impl RegisterTransport for SimulatedChassis {
    fn query(&self, register: RegisterId, payload: &[u8]) -> Result<RegisterResponse> {
        let mut state = self.state.lock();
        state.record(register, TransactionKind::Query, payload);
        if let Some(status) = state.injected(register)? {
            return Ok(RegisterResponse { payload: payload.to_vec(), status });
        }

        let response = match register {
            RegisterId::Mtmp => state.query_mtmp(payload)?,
            RegisterId::Mcia => state.query_mcia(payload)?,
            RegisterId::Mtecr => state.query_mtecr(payload)?,
            RegisterId::Mgpir => state.query_mgpir(payload)?,
            RegisterId::Mfcr => state.query_mfcr(),
            RegisterId::Mfsc => state.query_mfsc(payload)?,
            RegisterId::Mfsm => state.query_mfsm(payload)?,
            RegisterId::Mfsl => state.query_mfsl(payload)?,
            RegisterId::Fore => state.query_fore(),
            RegisterId::Mtbr => state.query_mtbr(payload)?,
        };
        Ok(response)
    }

    fn write(&self, register: RegisterId, payload: &[u8]) -> Result<u8> {
        let mut state = self.state.lock();
        state.record(register, TransactionKind::Write, payload);
        if let Some(status) = state.injected(register)? {
            return Ok(status);
        }

        match register {
            RegisterId::Mtmp => {
                let reg = Mtmp::unpack(payload)?;
                let Some(sensor) = state.sensors.get_mut(&(reg.slot_index, reg.sensor_index)) else {
                    return Ok(STATUS_BAD_PARAM);
                };
                sensor.mte = reg.mte;
                if reg.mtr {
                    sensor.max_temperature_mc = sensor.temperature_mc;
                }
                Ok(0)
            }
            RegisterId::Mfsc => {
                let reg = Mfsc::unpack(payload)?;
                match state.duties.get_mut(usize::from(reg.pwm)) {
                    Some(duty) => {
                        *duty = reg.duty;
                        Ok(0)
                    }
                    None => Ok(STATUS_BAD_PARAM),
                }
            }
            RegisterId::Mfsl => {
                let reg = Mfsl::unpack(payload)?;
                match state.fans.get_mut(usize::from(reg.tacho)) {
                    Some(fan) => {
                        fan.tach_min = reg.tach_min;
                        fan.tach_max = reg.tach_max;
                        Ok(0)
                    }
                    None => Ok(STATUS_BAD_PARAM),
                }
            }
            other => {
                debug!(register = %other, "write to read-only register");
                Ok(STATUS_BAD_PARAM)
            }
        }
    }
}

impl SimState {
    fn record(&mut self, register: RegisterId, kind: TransactionKind, payload: &[u8]) {
        self.transactions.push(Transaction {
            register,
            kind,
            request: payload.to_vec(),
        });
    }

    fn injected(&self, register: RegisterId) -> Result<Option<u8>> {
        match self.failures.get(&register) {
            Some(InjectedFailure::Transport) => Err(ThermalError::io(register.name(), "injected transport failure")),
            Some(InjectedFailure::Status(status)) => Ok(Some(*status)),
            None => Ok(None),
        }
    }

    fn query_mtmp(&self, payload: &[u8]) -> Result<RegisterResponse> {
        let mut reg = Mtmp::unpack(payload)?;
        let Some(sensor) = self.sensors.get(&(reg.slot_index, reg.sensor_index)) else {
            return Ok(RegisterResponse { payload: reg.pack(), status: STATUS_BAD_PARAM });
        };
        reg.temperature = Mtmp::mc_to_raw(sensor.temperature_mc);
        reg.max_temperature = Mtmp::mc_to_raw(sensor.max_temperature_mc);
        reg.mte = sensor.mte;
        reg.mtr = false;
        Ok(RegisterResponse::ok(reg.pack()))
    }

    fn query_mcia(&self, payload: &[u8]) -> Result<RegisterResponse> {
        let mut reg = Mcia::unpack(payload)?;
        let module = self
            .slots
            .get(&reg.slot_index)
            .and_then(|s| s.modules.get(&reg.module));

        reg.status = match module {
            None => MCIA_STATUS_NOT_CONNECTED,
            Some(module) => match module.resolve(reg.page, reg.device_address, reg.size, reg.i2c_addr) {
                Some(start) => {
                    let size = usize::from(reg.size);
                    reg.data = [0u8; MCIA_EEPROM_SIZE];
                    reg.data[..size].copy_from_slice(&module.image[start..start + size]);
                    0
                }
                None => MCIA_STATUS_BAD_PARAM,
            },
        };
        Ok(RegisterResponse::ok(reg.pack()))
    }

    fn query_mtecr(&self, payload: &[u8]) -> Result<RegisterResponse> {
        let reg = Mtecr::unpack(payload)?;
        let Some(slot) = self.slots.get(&reg.slot_index) else {
            return Ok(RegisterResponse { payload: reg.pack(), status: STATUS_BAD_PARAM });
        };
        Ok(RegisterResponse::ok(
            Mtecr::with_sensors(reg.slot_index, &slot.gearbox_sensors).pack(),
        ))
    }

    fn query_mgpir(&self, payload: &[u8]) -> Result<RegisterResponse> {
        let mut reg = Mgpir::unpack(payload)?;
        let Some(slot) = self.slots.get(&reg.slot_index) else {
            return Ok(RegisterResponse { payload: reg.pack(), status: STATUS_BAD_PARAM });
        };
        reg.num_of_modules = slot.module_count;
        reg.num_of_devices = slot.gearbox_sensors.len() as u8;
        reg.devices_per_flash = u8::from(!slot.gearbox_sensors.is_empty());
        reg.device_type = if slot.gearbox_sensors.is_empty() {
            MgpirDeviceType::None
        } else {
            MgpirDeviceType::GearboxDie
        };
        Ok(RegisterResponse::ok(reg.pack()))
    }

    fn query_mfcr(&self) -> RegisterResponse {
        let tacho_active = (0..self.fans.len().min(ct_protocol::MFCR_TACHOS_MAX)).fold(0u16, |acc, i| acc | (1 << i));
        let pwm_active = (0..self.duties.len().min(ct_protocol::MFCR_PWMS_MAX)).fold(0u8, |acc, i| acc | (1 << i));
        RegisterResponse::ok(
            Mfcr {
                pwm_frequency: 0,
                tacho_active,
                pwm_active,
            }
            .pack(),
        )
    }

    fn query_mfsc(&self, payload: &[u8]) -> Result<RegisterResponse> {
        let mut reg = Mfsc::unpack(payload)?;
        match self.duties.get(usize::from(reg.pwm)) {
            Some(duty) => {
                reg.duty = *duty;
                Ok(RegisterResponse::ok(reg.pack()))
            }
            None => Ok(RegisterResponse { payload: reg.pack(), status: STATUS_BAD_PARAM }),
        }
    }

    fn query_mfsm(&self, payload: &[u8]) -> Result<RegisterResponse> {
        let mut reg = Mfsm::unpack(payload)?;
        match self.fans.get(usize::from(reg.tacho)) {
            Some(fan) => {
                reg.rpm = fan.rpm;
                Ok(RegisterResponse::ok(reg.pack()))
            }
            None => Ok(RegisterResponse { payload: reg.pack(), status: STATUS_BAD_PARAM }),
        }
    }

    fn query_mfsl(&self, payload: &[u8]) -> Result<RegisterResponse> {
        let mut reg = Mfsl::unpack(payload)?;
        match self.fans.get(usize::from(reg.tacho)) {
            Some(fan) => {
                reg.tach_min = fan.tach_min;
                reg.tach_max = fan.tach_max;
                Ok(RegisterResponse::ok(reg.pack()))
            }
            None => Ok(RegisterResponse { payload: reg.pack(), status: STATUS_BAD_PARAM }),
        }
    }

    fn query_fore(&self) -> RegisterResponse {
        let fan_under_limit = self
            .fans
            .iter()
            .enumerate()
            .filter(|(_, f)| f.under_limit)
            .fold(0u16, |acc, (i, _)| acc | (1 << i));
        RegisterResponse::ok(Fore { fan_under_limit }.pack())
    }

    fn query_mtbr(&self, payload: &[u8]) -> Result<RegisterResponse> {
        let mut reg = Mtbr::unpack(payload)?;
        let module = reg
            .base_sensor_index
            .checked_sub(ct_protocol::MTBR_BASE_MODULE_INDEX)
            .and_then(|m| u8::try_from(m).ok());
        let Some(module) = module else {
            return Ok(RegisterResponse { payload: reg.pack(), status: STATUS_BAD_PARAM });
        };

        let untrusted = self
            .slots
            .get(&reg.slot_index)
            .and_then(|s| s.modules.get(&module))
            .map(|m| m.untrusted);
        let sensor = self.sensors.get(&(reg.slot_index, reg.base_sensor_index));

        match (untrusted, sensor) {
            (Some(true), _) => {
                reg.temperature = MTBR_BAD_SENS_INFO;
                reg.max_temperature = MTBR_BAD_SENS_INFO;
            }
            (Some(false), Some(sensor)) => {
                reg.temperature = Mtmp::mc_to_raw(sensor.temperature_mc) as u16;
                reg.max_temperature = Mtmp::mc_to_raw(sensor.max_temperature_mc) as u16;
            }
            _ => {
                reg.temperature = MTBR_NO_CONN;
                reg.max_temperature = MTBR_NO_CONN;
            }
        }
        Ok(RegisterResponse::ok(reg.pack()))
    }
}

impl SimSensor {
    fn at(temperature_mc: i32) -> Self {
        Self {
            temperature_mc,
            max_temperature_mc: temperature_mc,
            mte: false,
        }
    }
}

impl SimModule {
    fn from_profile(profile: &ModuleProfile) -> Self {
        let (paged, cmis) = family_of(profile.identifier);
        let image = match &profile.eeprom {
            Some(image) => image.clone(),
            None => synthesize_eeprom(profile),
        };
        Self {
            identifier: profile.identifier,
            paged,
            cmis,
            untrusted: profile.untrusted,
            image,
        }
    }

    /// Decode a physical transaction into a start offset of the logical image
    fn resolve(&self, page: u8, address: u16, size: u16, i2c_addr: u8) -> Option<usize> {
        let address = u32::from(address);
        let size = u32::from(size);
        if size == 0 || size as usize > MCIA_EEPROM_SIZE || address + size > eeprom::PAGE_LENGTH {
            return None;
        }

        let start: u32 = if self.paged {
            if i2c_addr != MCIA_I2C_ADDR_LOW {
                return None;
            }
            let logical_page = if self.cmis {
                if page < eeprom::CMIS_PAGE_THRESHOLD {
                    page
                } else if page >= eeprom::CMIS_PAGE_THRESHOLD + eeprom::CMIS_PAGE_OFFSET {
                    page - eeprom::CMIS_PAGE_OFFSET
                } else {
                    return None;
                }
            } else {
                page
            };
            let lower = eeprom::UP_PAGE_LENGTH;
            if logical_page == 0 || address + size <= lower {
                address
            } else if address >= lower {
                eeprom::PAGE_LENGTH + eeprom::UP_PAGE_LENGTH * (u32::from(logical_page) - 1) + (address - lower)
            } else {
                return None;
            }
        } else {
            match (i2c_addr, page) {
                (MCIA_I2C_ADDR_LOW, 0) => address,
                (MCIA_I2C_ADDR_HIGH, 0) => eeprom::PAGE_LENGTH + address,
                _ => return None,
            }
        };

        let start = start as usize;
        if start + size as usize > self.image.len() {
            return None;
        }
        debug!(identifier = self.identifier, page, address, size, start, "simulated MCIA read");
        Some(start)
    }
}

/// (paged, cmis) for an identifier; unknown identifiers behave as legacy
fn family_of(identifier: u8) -> (bool, bool) {
    match identifier {
        id::QSFP | id::QSFP_PLUS | id::QSFP28 => (true, false),
        id::QSFP_DD | id::QSFP_PLUS_CMIS => (true, true),
        _ => (false, false),
    }
}

/// Build a logical EEPROM image for a module profile
///
/// Filler bytes follow a fixed pattern so reads at the wrong address are
/// detectable. The identifier, revision, type byte, SFP diagnostics byte and
/// temperature thresholds are placed where a real module keeps them.
pub fn synthesize_eeprom(profile: &ModuleProfile) -> Vec<u8> {
    let (paged, cmis) = family_of(profile.identifier);
    let len = if paged {
        (eeprom::PAGE_LENGTH + eeprom::UP_PAGE_LENGTH * 3) as usize
    } else {
        (eeprom::PAGE_LENGTH * 2) as usize
    };

    let mut image: Vec<u8> = (0..len).map(|i| (i.wrapping_mul(7).wrapping_add(3) & 0xff) as u8).collect();
    image[eeprom::MODULE_INFO_ID] = profile.identifier;
    image[eeprom::MODULE_INFO_REV_ID] = profile.revision;
    image[eeprom::MODULE_INFO_TYPE_ID] = if profile.flat_memory { eeprom::CMIS_FLAT_MEMORY } else { 0 };
    if !paged {
        image[eeprom::SFP_DIAG_MON_OFFSET as usize] = 0x68;
    }
    write_thresholds(&mut image, paged, cmis, profile.crit_mc, profile.emerg_mc);
    image
}

/// Logical offset of the threshold block for a module family
pub fn threshold_base(paged: bool, cmis: bool) -> usize {
    let page = match (paged, cmis) {
        (false, _) => return eeprom::PAGE_LENGTH as usize,
        (true, true) => eeprom::TH_PAGE_CMIS_NUM,
        (true, false) => eeprom::TH_PAGE_NUM,
    };
    (eeprom::PAGE_LENGTH + eeprom::UP_PAGE_LENGTH * (u32::from(page) - 1)) as usize
}

fn write_thresholds(image: &mut [u8], paged: bool, cmis: bool, crit_mc: i32, emerg_mc: i32) {
    let base = threshold_base(paged, cmis);
    let encode = |mc: i32| -> [u8; 2] { [((mc / 1000).clamp(-128, 127) as i8) as u8, 0] };
    let alarm = base + usize::from(eeprom::TEMP_HIGH_ALARM);
    let warn = base + usize::from(eeprom::TEMP_HIGH_WARN);
    if warn + 2 <= image.len() {
        image[alarm..alarm + 2].copy_from_slice(&encode(emerg_mc));
        image[warn..warn + 2].copy_from_slice(&encode(crit_mc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SlotProfile;

    fn chassis_with(module: ModuleProfile) -> SimulatedChassis {
        let mut profile = ChassisProfile::bare();
        profile.slots[0].modules.push(module);
        SimulatedChassis::new(&profile)
    }

    fn mcia(sim: &SimulatedChassis, page: u8, address: u16, size: u16, i2c: u8) -> Mcia {
        let req = Mcia::query(0, 0, page, address, size, i2c);
        let resp = sim.query(RegisterId::Mcia, &req.pack()).unwrap();
        Mcia::unpack(&resp.payload).unwrap()
    }

    #[test]
    fn test_paged_upper_page_decode() {
        let sim = chassis_with(ModuleProfile::new(0, id::QSFP28, 40_000));
        let image = sim.module_image(0, 0).unwrap();

        let reg = mcia(&sim, 2, 0x80, 16, MCIA_I2C_ADDR_LOW);
        assert_eq!(reg.status, 0);
        assert_eq!(reg.eeprom(), &image[384..400]);
    }

    #[test]
    fn test_cmis_physical_page_is_shifted() {
        let sim = chassis_with(ModuleProfile::new(0, id::QSFP_DD, 40_000));
        let image = sim.module_image(0, 0).unwrap();

        // logical page 3 sits at physical page 0x10
        let reg = mcia(&sim, 0x10, 0x80, 8, MCIA_I2C_ADDR_LOW);
        assert_eq!(reg.status, 0);
        assert_eq!(reg.eeprom(), &image[512..520]);

        assert_eq!(mcia(&sim, 3, 0x80, 8, MCIA_I2C_ADDR_LOW).status, MCIA_STATUS_BAD_PARAM);
    }

    #[test]
    fn test_transaction_limits_enforced() {
        let sim = chassis_with(ModuleProfile::new(0, id::SFP, 40_000));
        assert_eq!(mcia(&sim, 0, 0, 49, MCIA_I2C_ADDR_LOW).status, MCIA_STATUS_BAD_PARAM);
        assert_eq!(mcia(&sim, 0, 250, 8, MCIA_I2C_ADDR_LOW).status, MCIA_STATUS_BAD_PARAM);
        assert_eq!(mcia(&sim, 0, 0, 8, MCIA_I2C_ADDR_HIGH).status, 0);
    }

    #[test]
    fn test_missing_module_not_connected() {
        let sim = SimulatedChassis::new(&ChassisProfile::bare());
        assert_eq!(mcia(&sim, 0, 0, 1, MCIA_I2C_ADDR_LOW).status, MCIA_STATUS_NOT_CONNECTED);
    }

    #[test]
    fn test_thresholds_placed_per_family() {
        let sfp = synthesize_eeprom(&ModuleProfile::new(0, id::SFP, 0).with_thresholds(70_000, 80_000));
        assert_eq!(sfp[256], 80);
        assert_eq!(sfp[260], 70);

        let qsfp = synthesize_eeprom(&ModuleProfile::new(0, id::QSFP28, 0).with_thresholds(65_000, 75_000));
        assert_eq!(qsfp[512], 75);
        assert_eq!(qsfp[516], 65);

        let cmis = synthesize_eeprom(&ModuleProfile::new(0, id::QSFP_DD, 0));
        assert_eq!(cmis[384], 80);
        assert_eq!(cmis[388], 70);
    }

    #[test]
    fn test_injected_failures() {
        let sim = SimulatedChassis::new(&ChassisProfile::bare());
        sim.inject_failure(RegisterId::Mfcr, InjectedFailure::Transport);
        assert!(sim.query(RegisterId::Mfcr, &[0; 8]).unwrap_err().is_io());

        sim.inject_failure(RegisterId::Mfcr, InjectedFailure::Status(4));
        assert_eq!(sim.query(RegisterId::Mfcr, &[0; 8]).unwrap().status, 4);

        sim.clear_failure(RegisterId::Mfcr);
        assert_eq!(sim.query(RegisterId::Mfcr, &[0; 8]).unwrap().status, 0);
        assert_eq!(sim.transactions().len(), 3);
    }

    #[test]
    fn test_mtmp_history_reset() {
        let sim = SimulatedChassis::new(&ChassisProfile::bare());
        let enable = Mtmp::query(0, 0, true, false);
        assert_eq!(sim.write(RegisterId::Mtmp, &enable.pack()).unwrap(), 0);
        sim.set_sensor_temperature(0, 0, 90_000);
        sim.set_sensor_temperature(0, 0, 60_000);

        let resp = sim.query(RegisterId::Mtmp, &Mtmp::query(0, 0, false, false).pack()).unwrap();
        let reg = Mtmp::unpack(&resp.payload).unwrap();
        assert_eq!(reg.max_temperature_mc(), 90_000);

        sim.write(RegisterId::Mtmp, &Mtmp::query(0, 0, true, true).pack()).unwrap();
        let resp = sim.query(RegisterId::Mtmp, &Mtmp::query(0, 0, false, false).pack()).unwrap();
        assert_eq!(Mtmp::unpack(&resp.payload).unwrap().max_temperature_mc(), 60_000);
    }

    #[test]
    fn test_line_card_sensor_bitmap() {
        let mut profile = ChassisProfile::bare();
        let mut lc = SlotProfile::new(2);
        lc.gearboxes.push(crate::data::GearboxProfile { sensor_index: 0x41, temperature_mc: 50_000 });
        lc.gearboxes.push(crate::data::GearboxProfile { sensor_index: 0x40, temperature_mc: 50_000 });
        profile.slots.push(lc);
        let sim = SimulatedChassis::new(&profile);

        let resp = sim.query(RegisterId::Mtecr, &Mtecr::query(2).pack()).unwrap();
        let reg = Mtecr::unpack(&resp.payload).unwrap();
        assert_eq!(reg.sensor_count, 2);
        assert_eq!(reg.sensor_indices(), vec![0x40, 0x41]);
    }
}

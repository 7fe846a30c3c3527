//! Sensor and fan monitoring reads
//!
//! Plain reads for status reporting: sensor temperatures with history,
//! tachometers, fan faults, module temperature faults and labels.

use ct_protocol::{Fore, Mfcr, Mfsc, Mfsm, Mtbr, Mtmp, RegisterId, MTBR_BASE_MODULE_INDEX, MTMP_MODULE_INDEX_MIN};
use serde::Serialize;
use tracing::debug;

use crate::eeprom::{ThresholdReader, Thresholds};
use crate::error::{Result, ThermalError};
use crate::hw::transport::{query_checked, write_checked, RegisterTransport};

/// Query one temperature sensor
pub fn query_sensor(transport: &dyn RegisterTransport, slot: u8, sensor_index: u16) -> Result<Mtmp> {
    let request = Mtmp::query(slot, sensor_index, false, false);
    let payload = query_checked(transport, RegisterId::Mtmp, &request.pack())?;
    Ok(Mtmp::unpack(&payload)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensorReading {
    pub temperature_mc: i32,
    pub max_temperature_mc: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FanReading {
    pub tacho: u8,
    pub rpm: u16,
    pub fault: bool,
}

pub struct Monitor<'a> {
    transport: &'a dyn RegisterTransport,
}

impl<'a> Monitor<'a> {
    pub fn new(transport: &'a dyn RegisterTransport) -> Self {
        Self { transport }
    }

    pub fn sensor_temperature(&self, slot: u8, sensor_index: u16) -> Result<SensorReading> {
        let reg = query_sensor(self.transport, slot, sensor_index)?;
        Ok(SensorReading {
            temperature_mc: reg.temperature_mc(),
            max_temperature_mc: reg.max_temperature_mc(),
        })
    }

    /// Restart max-temperature tracking from the current reading
    pub fn reset_temperature_history(&self, slot: u8, sensor_index: u16) -> Result<()> {
        let mut reg = query_sensor(self.transport, slot, sensor_index)?;
        reg.mte = true;
        reg.mtr = true;
        write_checked(self.transport, RegisterId::Mtmp, &reg.pack())?;
        debug!(slot, sensor_index, "temperature history reset");
        Ok(())
    }

    pub fn fan_rpm(&self, tacho: u8) -> Result<u16> {
        let payload = query_checked(self.transport, RegisterId::Mfsm, &Mfsm::query(tacho).pack())?;
        Ok(Mfsm::unpack(&payload)?.rpm)
    }

    pub fn fan_fault(&self, tacho: u8) -> Result<bool> {
        let payload = query_checked(self.transport, RegisterId::Fore, &Fore::default().pack())?;
        Ok(Fore::unpack(&payload)?.fault(tacho))
    }

    /// Read every active tachometer
    pub fn fans(&self) -> Result<Vec<FanReading>> {
        let payload = query_checked(self.transport, RegisterId::Mfcr, &Mfcr::default().pack())?;
        let mfcr = Mfcr::unpack(&payload)?;
        let payload = query_checked(self.transport, RegisterId::Fore, &Fore::default().pack())?;
        let fore = Fore::unpack(&payload)?;

        mfcr.active_tachos()
            .map(|tacho| {
                Ok(FanReading {
                    tacho,
                    rpm: self.fan_rpm(tacho)?,
                    fault: fore.fault(tacho),
                })
            })
            .collect()
    }

    pub fn pwm_duty(&self, pwm: u8) -> Result<u8> {
        let payload = query_checked(self.transport, RegisterId::Mfsc, &Mfsc::new(pwm, 0).pack())?;
        Ok(Mfsc::unpack(&payload)?.duty)
    }

    pub fn module_temperature(&self, slot: u8, module: u8) -> Result<i32> {
        let reg = query_sensor(self.transport, slot, MTMP_MODULE_INDEX_MIN + u16::from(module))?;
        Ok(reg.temperature_mc())
    }

    /// True when the module reports an untrusted sensor
    pub fn module_temperature_fault(&self, slot: u8, module: u8) -> Result<bool> {
        let request = Mtbr::query(slot, MTBR_BASE_MODULE_INDEX + u16::from(module));
        let payload = query_checked(self.transport, RegisterId::Mtbr, &request.pack())?;
        Ok(Mtbr::unpack(&payload)?.is_fault())
    }

    /// Module thresholds, zero while the module is not reporting
    pub fn module_thresholds(&self, slot: u8, module: u8) -> Result<Thresholds> {
        match ThresholdReader::new(self.transport).thresholds(slot, module) {
            Err(ThermalError::NotReady) => Ok(Thresholds::default()),
            other => other,
        }
    }
}

/// Label for a front-panel module sensor (1-based)
pub fn module_label(slot_name: Option<&str>, module: u8) -> String {
    prefixed(slot_name, format!("front panel {:03}", u16::from(module) + 1))
}

/// Label for a gearbox sensor (1-based)
pub fn gearbox_label(slot_name: Option<&str>, index: u8) -> String {
    prefixed(slot_name, format!("gearbox {:03}", u16::from(index) + 1))
}

fn prefixed(slot_name: Option<&str>, label: String) -> String {
    match slot_name {
        Some(name) => format!("{} {}", name, label),
        None => label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::eeprom::id;
    use crate::data::{ChassisProfile, FanProfile, ModuleProfile};
    use crate::hw::{MockRegisterTransport, SimulatedChassis};

    fn sim() -> SimulatedChassis {
        let mut profile = ChassisProfile::bare();
        profile.fans = vec![
            FanProfile { rpm: 8_000, under_limit: false },
            FanProfile { rpm: 0, under_limit: true },
        ];
        let mut untrusted = ModuleProfile::new(1, id::QSFP28, 45_000);
        untrusted.untrusted = true;
        profile.slots[0].modules = vec![
            ModuleProfile::new(0, id::QSFP28, 45_000).with_thresholds(70_000, 80_000),
            untrusted,
            ModuleProfile::new(2, id::QSFP28, 0),
        ];
        SimulatedChassis::new(&profile)
    }

    #[test]
    fn test_sensor_and_history_reset() {
        let sim = sim();
        let monitor = Monitor::new(&sim);
        assert_eq!(monitor.sensor_temperature(0, 0).unwrap().temperature_mc, 52_000);

        monitor.reset_temperature_history(0, 0).unwrap();
        sim.set_sensor_temperature(0, 0, 61_000);
        sim.set_sensor_temperature(0, 0, 58_000);
        let reading = monitor.sensor_temperature(0, 0).unwrap();
        assert_eq!(reading.temperature_mc, 58_000);
        assert_eq!(reading.max_temperature_mc, 61_000);
    }

    #[test]
    fn test_unknown_sensor_is_device_error() {
        let sim = sim();
        assert!(Monitor::new(&sim).sensor_temperature(0, 999).unwrap_err().is_io());
    }

    #[test]
    fn test_fans() {
        let sim = sim();
        let fans = Monitor::new(&sim).fans().unwrap();
        assert_eq!(
            fans,
            vec![
                FanReading { tacho: 0, rpm: 8_000, fault: false },
                FanReading { tacho: 1, rpm: 0, fault: true },
            ]
        );
    }

    #[test]
    fn test_module_reads() {
        let sim = sim();
        let monitor = Monitor::new(&sim);
        assert_eq!(monitor.module_temperature(0, 0).unwrap(), 45_000);
        assert!(!monitor.module_temperature_fault(0, 0).unwrap());
        assert!(monitor.module_temperature_fault(0, 1).unwrap());
        // absent module reports no connection, not a fault
        assert!(!monitor.module_temperature_fault(0, 9).unwrap());

        assert_eq!(monitor.module_thresholds(0, 0).unwrap().crit_mc, 70_000);
        assert_eq!(monitor.module_thresholds(0, 2).unwrap(), Thresholds::default());
    }

    #[test]
    fn test_write_failure_surfaces() {
        let mut mock = MockRegisterTransport::new();
        mock.expect_query()
            .returning(|_, payload| Ok(crate::hw::RegisterResponse::ok(payload.to_vec())));
        mock.expect_write()
            .returning(|_, _| Err(ThermalError::io("MTMP", "bus timeout")));
        assert!(Monitor::new(&mock).reset_temperature_history(0, 0).unwrap_err().is_io());
    }

    #[test]
    fn test_labels() {
        assert_eq!(module_label(None, 0), "front panel 001");
        assert_eq!(gearbox_label(None, 11), "gearbox 012");
        assert_eq!(module_label(Some("lc2"), 4), "lc2 front panel 005");
    }
}

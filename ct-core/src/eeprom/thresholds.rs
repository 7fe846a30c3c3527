//! Module temperature thresholds
//!
//! Paged modules keep their thresholds in the upper half of a dedicated page
//! (page 3, or page 2 for CMIS). Legacy modules keep them at the start of the
//! secondary address space. Each value is a big-endian 16-bit word whose high
//! byte is whole degrees. The low byte holds 1/256 degree fractions and is
//! dropped, so trips are always whole degrees.

use serde::Serialize;
use tracing::debug;

use crate::constants::eeprom;
use crate::error::{Result, ThermalError};
use crate::hw::{query_sensor, RegisterTransport};

use super::classify::{ModuleClassifier, ModuleHandle};
use super::reader::{transfer, AddressSpace, MemoryWindow};

/// Critical and emergency thresholds in milli-degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Thresholds {
    pub crit_mc: i32,
    pub emerg_mc: i32,
}

impl Thresholds {
    /// Usable only when critical does not exceed emergency
    pub fn check(&self) -> Result<()> {
        if self.crit_mc > self.emerg_mc {
            return Err(ThermalError::ThresholdInconsistency {
                crit: self.crit_mc,
                emerg: self.emerg_mc,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdKind {
    /// Temperature high warning
    Critical,
    /// Temperature high alarm
    Emergency,
}

impl ThresholdKind {
    fn item_offset(&self) -> u16 {
        match self {
            ThresholdKind::Critical => eeprom::TEMP_HIGH_WARN,
            ThresholdKind::Emergency => eeprom::TEMP_HIGH_ALARM,
        }
    }
}

/// Device location of one threshold word
pub fn threshold_window(handle: &ModuleHandle, kind: ThresholdKind) -> MemoryWindow {
    let offset = kind.item_offset();
    if handle.paged {
        let page = if handle.cmis {
            eeprom::TH_PAGE_CMIS_NUM
        } else {
            eeprom::TH_PAGE_NUM
        };
        MemoryWindow {
            page,
            device_address: eeprom::TH_PAGE_OFF + offset,
            size: eeprom::TH_ITEM_SIZE,
            address_space: AddressSpace::Primary,
        }
    } else {
        MemoryWindow {
            page: 0,
            device_address: offset,
            size: eeprom::TH_ITEM_SIZE,
            address_space: AddressSpace::Secondary,
        }
    }
}

/// Convert a raw threshold word to milli-degrees, truncating the fraction byte
pub fn decode_threshold(raw: [u8; 2]) -> i32 {
    i32::from(i16::from_be_bytes(raw) >> 8) * 1000
}

pub struct ThresholdReader<'a> {
    transport: &'a dyn RegisterTransport,
}

impl<'a> ThresholdReader<'a> {
    pub fn new(transport: &'a dyn RegisterTransport) -> Self {
        Self { transport }
    }

    /// Read both thresholds of a module
    ///
    /// Returns [`ThermalError::NotReady`] while the module sensor reads 0.
    /// The pair is returned as read; consistency is checked by the consumer.
    pub fn thresholds(&self, slot: u8, module: u8) -> Result<Thresholds> {
        let sensor = query_sensor(
            self.transport,
            slot,
            ct_protocol::MTMP_MODULE_INDEX_MIN + u16::from(module),
        )?;
        if sensor.temperature == 0 {
            debug!(slot, module, "module sensor not reporting, skipping thresholds");
            return Err(ThermalError::NotReady);
        }

        let handle = ModuleClassifier::new(self.transport).classify(slot, module)?;
        Ok(Thresholds {
            crit_mc: self.read_threshold(&handle, ThresholdKind::Critical)?,
            emerg_mc: self.read_threshold(&handle, ThresholdKind::Emergency)?,
        })
    }

    pub fn read_threshold(&self, handle: &ModuleHandle, kind: ThresholdKind) -> Result<i32> {
        let window = threshold_window(handle, kind);
        let data = transfer(self.transport, handle.slot, handle.module, &window)?;
        if data.len() < usize::from(eeprom::TH_ITEM_SIZE) {
            return Err(ThermalError::io(
                "MCIA",
                format!("short threshold read: {} bytes", data.len()),
            ));
        }
        Ok(decode_threshold([data[0], data[1]]))
    }
}

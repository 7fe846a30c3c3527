//! Module family classification from the EEPROM identifier byte

use serde::Serialize;

use crate::constants::eeprom::id;
use crate::error::{Result, ThermalError};
use crate::hw::RegisterTransport;

use super::reader::{transfer, AddressSpace, MemoryWindow};

/// A classified module: where it lives and how its memory is paged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleHandle {
    pub slot: u8,
    pub module: u8,
    pub identifier: u8,
    /// Upper memory is reached through page select
    pub paged: bool,
    /// CMIS memory map (implies `paged`)
    pub cmis: bool,
}

impl ModuleHandle {
    /// Classify an identifier byte read from `slot`/`module`
    pub fn from_identifier(slot: u8, module: u8, identifier: u8) -> Result<Self> {
        let (paged, cmis) = match identifier {
            id::SFP | id::SFP_DD => (false, false),
            id::QSFP | id::QSFP_PLUS | id::QSFP28 => (true, false),
            id::QSFP_DD | id::QSFP_PLUS_CMIS => (true, true),
            _ => {
                return Err(ThermalError::InvalidModuleType {
                    slot,
                    module,
                    identifier,
                })
            }
        };
        Ok(Self {
            slot,
            module,
            identifier,
            paged,
            cmis,
        })
    }
}

pub struct ModuleClassifier<'a> {
    transport: &'a dyn RegisterTransport,
}

impl<'a> ModuleClassifier<'a> {
    pub fn new(transport: &'a dyn RegisterTransport) -> Self {
        Self { transport }
    }

    /// Read the identifier byte and classify the module
    pub fn classify(&self, slot: u8, module: u8) -> Result<ModuleHandle> {
        let window = MemoryWindow {
            page: 0,
            device_address: 0,
            size: 1,
            address_space: AddressSpace::Primary,
        };
        let data = transfer(self.transport, slot, module, &window)?;
        let identifier = *data
            .first()
            .ok_or_else(|| ThermalError::io("MCIA", "empty identifier read"))?;
        ModuleHandle::from_identifier(slot, module, identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ChassisProfile, ModuleProfile};
    use crate::hw::SimulatedChassis;

    #[test]
    fn test_identifier_families() {
        let legacy = ModuleHandle::from_identifier(0, 1, id::SFP).unwrap();
        assert!(!legacy.paged && !legacy.cmis);
        assert!(!ModuleHandle::from_identifier(0, 1, id::SFP_DD).unwrap().paged);

        for ident in [id::QSFP, id::QSFP_PLUS, id::QSFP28] {
            let h = ModuleHandle::from_identifier(0, 1, ident).unwrap();
            assert!(h.paged && !h.cmis);
        }
        for ident in [id::QSFP_DD, id::QSFP_PLUS_CMIS] {
            let h = ModuleHandle::from_identifier(0, 1, ident).unwrap();
            assert!(h.paged && h.cmis);
        }
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        let err = ModuleHandle::from_identifier(2, 7, 0x42).unwrap_err();
        assert!(matches!(
            err,
            ThermalError::InvalidModuleType { slot: 2, module: 7, identifier: 0x42 }
        ));
    }

    #[test]
    fn test_classify_reads_identifier() {
        let mut profile = ChassisProfile::bare();
        profile.slots[0].modules.push(ModuleProfile::new(3, id::QSFP_PLUS_CMIS, 40_000));
        let sim = SimulatedChassis::new(&profile);

        let handle = ModuleClassifier::new(&sim).classify(0, 3).unwrap();
        assert_eq!(handle.identifier, id::QSFP_PLUS_CMIS);
        assert!(handle.cmis);

        assert!(ModuleClassifier::new(&sim).classify(0, 4).unwrap_err().is_io());
    }
}

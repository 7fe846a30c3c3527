//! Paged module EEPROM reader
//!
//! Callers address module memory with a flat logical offset: bytes 0-255 are
//! the lower page and page 00h upper, then each further 128-byte upper page
//! follows in order. Every transaction is limited to [`MCIA_EEPROM_SIZE`]
//! bytes and never crosses the 256-byte page boundary.
//!
//! # Resolution
//!
//! - Offsets below 256 are read directly from page 0.
//! - Paged families select page `(offset - 256) / 128 + 1` and read from its
//!   upper half.
//! - Legacy families switch to the secondary address space instead.
//! - CMIS pages at or above 3 are shifted by `0x0d` on the device.

use ct_protocol::{Mcia, RegisterId, MCIA_EEPROM_SIZE, MCIA_I2C_ADDR_HIGH, MCIA_I2C_ADDR_LOW};
use serde::Serialize;
use tracing::debug;

use crate::constants::eeprom;
use crate::error::{Result, ThermalError};
use crate::hw::{query_checked, RegisterTransport};

use super::classify::{ModuleClassifier, ModuleHandle};

/// Module address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressSpace {
    /// Lower memory and paged upper memory
    Primary,
    /// Legacy diagnostics memory
    Secondary,
}

impl AddressSpace {
    pub fn i2c_addr(&self) -> u8 {
        match self {
            AddressSpace::Primary => MCIA_I2C_ADDR_LOW,
            AddressSpace::Secondary => MCIA_I2C_ADDR_HIGH,
        }
    }
}

/// A resolved device transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryWindow {
    pub page: u8,
    pub device_address: u16,
    pub size: u16,
    pub address_space: AddressSpace,
}

/// Device page for a logical CMIS page
pub fn cmis_page(page: u8) -> Option<u8> {
    if page < eeprom::CMIS_PAGE_THRESHOLD {
        Some(page)
    } else {
        page.checked_add(eeprom::CMIS_PAGE_OFFSET)
    }
}

/// Resolve a logical (offset, size) request into one device transaction
///
/// The returned size may be smaller than requested; callers advance by it.
pub fn resolve_window(handle: &ModuleHandle, offset: u32, size: usize) -> Result<MemoryWindow> {
    if size == 0 {
        return Err(ThermalError::invalid_argument("zero-length EEPROM read"));
    }

    let mut size = size.min(MCIA_EEPROM_SIZE) as u32;
    if offset < eeprom::PAGE_LENGTH && offset + size > eeprom::PAGE_LENGTH {
        size = eeprom::PAGE_LENGTH - offset;
    }

    let mut page = 0u32;
    let mut address = offset;
    let mut address_space = AddressSpace::Primary;

    if offset >= eeprom::PAGE_LENGTH {
        if handle.paged {
            page = (offset - eeprom::PAGE_LENGTH) / eeprom::UP_PAGE_LENGTH + 1;
            address = offset - eeprom::UP_PAGE_LENGTH * page;
        } else {
            address_space = AddressSpace::Secondary;
            address = offset - eeprom::PAGE_LENGTH;
            if address >= eeprom::PAGE_LENGTH {
                return Err(ThermalError::invalid_argument(format!(
                    "offset {} beyond legacy module memory",
                    offset
                )));
            }
        }
        if address + size > eeprom::PAGE_LENGTH {
            size = eeprom::PAGE_LENGTH - address;
        }
    }

    if page > eeprom::MAX_PAGE {
        return Err(ThermalError::invalid_argument(format!(
            "offset {} beyond the last addressable page",
            offset
        )));
    }
    let mut page = page as u8;
    if handle.cmis {
        page = cmis_page(page).ok_or_else(|| {
            ThermalError::invalid_argument(format!("CMIS page {} has no device mapping", page))
        })?;
    }

    Ok(MemoryWindow {
        page,
        device_address: address as u16,
        size: size as u16,
        address_space,
    })
}

/// Issue one MCIA transaction and return the bytes it carried
pub(crate) fn transfer(
    transport: &dyn RegisterTransport,
    slot: u8,
    module: u8,
    window: &MemoryWindow,
) -> Result<Vec<u8>> {
    ct_protocol::validate_mcia_size(window.size).map_err(ThermalError::InvalidArgument)?;

    let request = Mcia::query(
        slot,
        module,
        window.page,
        window.device_address,
        window.size,
        window.address_space.i2c_addr(),
    );
    let payload = query_checked(transport, RegisterId::Mcia, &request.pack())?;
    let response = Mcia::unpack(&payload)?;
    if response.status != 0 {
        return Err(ThermalError::DeviceStatus {
            register: RegisterId::Mcia.name(),
            status: response.status,
        });
    }

    let actual = usize::from(response.size).min(usize::from(window.size));
    Ok(response.data[..actual].to_vec())
}

/// Memory map standard reported by module info
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModuleStandard {
    #[serde(rename = "SFF-8436")]
    Sff8436,
    #[serde(rename = "SFF-8636")]
    Sff8636,
    #[serde(rename = "SFF-8472")]
    Sff8472,
}

impl std::fmt::Display for ModuleStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ModuleStandard::Sff8436 => "SFF-8436",
            ModuleStandard::Sff8636 => "SFF-8636",
            ModuleStandard::Sff8472 => "SFF-8472",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub identifier: u8,
    pub standard: ModuleStandard,
    pub eeprom_len: usize,
}

pub struct EepromPagedReader<'a> {
    transport: &'a dyn RegisterTransport,
}

impl<'a> EepromPagedReader<'a> {
    pub fn new(transport: &'a dyn RegisterTransport) -> Self {
        Self { transport }
    }

    pub fn classify(&self, slot: u8, module: u8) -> Result<ModuleHandle> {
        ModuleClassifier::new(self.transport).classify(slot, module)
    }

    /// Single transaction read for an already classified module
    pub fn read(&self, handle: &ModuleHandle, offset: u32, size: usize) -> Result<Vec<u8>> {
        let window = resolve_window(handle, offset, size)?;
        debug!(
            slot = handle.slot,
            module = handle.module,
            offset,
            page = window.page,
            address = window.device_address,
            size = window.size,
            "EEPROM read"
        );
        transfer(self.transport, handle.slot, handle.module, &window)
    }

    /// Classify, then read one transaction
    pub fn read_module(&self, slot: u8, module: u8, offset: u32, size: usize) -> Result<Vec<u8>> {
        let handle = self.classify(slot, module)?;
        self.read(&handle, offset, size)
    }

    /// Read exactly `len` bytes starting at `offset`, or fail as a whole
    pub fn read_bulk(&self, slot: u8, module: u8, offset: u32, len: usize) -> Result<Vec<u8>> {
        if len == 0 {
            return Err(ThermalError::invalid_argument("EEPROM dump length must be non-zero"));
        }
        let end = (offset as usize)
            .checked_add(len)
            .filter(|end| *end <= eeprom::MAX_LOGICAL_LEN);
        if end.is_none() {
            return Err(ThermalError::invalid_argument(format!(
                "EEPROM range {}+{} exceeds {} bytes",
                offset,
                len,
                eeprom::MAX_LOGICAL_LEN
            )));
        }

        let handle = self.classify(slot, module)?;
        let mut buf = Vec::with_capacity(len);
        let mut cursor = offset;
        while buf.len() < len {
            let chunk = self.read(&handle, cursor, len - buf.len())?;
            if chunk.is_empty() {
                return Err(ThermalError::io("MCIA", format!("no data at offset {}", cursor)));
            }
            cursor += chunk.len() as u32;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    /// Identify the module memory standard and EEPROM size
    pub fn module_info(&self, slot: u8, module: u8) -> Result<ModuleInfo> {
        let header = self.read_lower(slot, module, 0, eeprom::MODULE_INFO_SIZE as u16)?;
        if header.len() < eeprom::MODULE_INFO_SIZE {
            return Err(ThermalError::io("MCIA", "short module info read"));
        }

        let identifier = header[eeprom::MODULE_INFO_ID];
        let revision = header[eeprom::MODULE_INFO_REV_ID];
        let type_flags = header[eeprom::MODULE_INFO_TYPE_ID];

        let (standard, eeprom_len) = match identifier {
            eeprom::id::QSFP => (ModuleStandard::Sff8436, eeprom::SFF_8436_LEN),
            eeprom::id::QSFP_PLUS if revision >= eeprom::QSFP_PLUS_SFF8636_REV => {
                (ModuleStandard::Sff8636, eeprom::SFF_8636_LEN)
            }
            eeprom::id::QSFP_PLUS => (ModuleStandard::Sff8436, eeprom::SFF_8436_LEN),
            eeprom::id::QSFP28 => (ModuleStandard::Sff8636, eeprom::SFF_8636_LEN),
            eeprom::id::SFP | eeprom::id::SFP_DD => {
                let diag = self.read_lower(slot, module, eeprom::SFP_DIAG_MON_OFFSET as u16, 1)?;
                let diag = *diag
                    .first()
                    .ok_or_else(|| ThermalError::io("MCIA", "short diagnostics read"))?;
                let len = if diag != 0 { eeprom::SFF_8472_LEN } else { eeprom::SFF_8079_LEN };
                (ModuleStandard::Sff8472, len)
            }
            eeprom::id::QSFP_DD | eeprom::id::QSFP_PLUS_CMIS => {
                let len = if type_flags & eeprom::CMIS_FLAT_MEMORY != 0 {
                    eeprom::CMIS_FLAT_LEN
                } else {
                    eeprom::SFF_8636_LEN
                };
                (ModuleStandard::Sff8636, len)
            }
            _ => {
                return Err(ThermalError::InvalidModuleType {
                    slot,
                    module,
                    identifier,
                })
            }
        };

        Ok(ModuleInfo {
            identifier,
            standard,
            eeprom_len,
        })
    }

    /// Page 0 read that needs no classification
    fn read_lower(&self, slot: u8, module: u8, address: u16, size: u16) -> Result<Vec<u8>> {
        let window = MemoryWindow {
            page: 0,
            device_address: address,
            size,
            address_space: AddressSpace::Primary,
        };
        transfer(self.transport, slot, module, &window)
    }
}

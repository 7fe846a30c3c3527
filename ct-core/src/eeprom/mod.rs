//! Optical module memory access
//!
//! Classification, paged EEPROM reads and threshold extraction.

mod classify;
mod reader;
mod thresholds;

pub use classify::{ModuleClassifier, ModuleHandle};
pub use reader::{
    cmis_page, resolve_window, AddressSpace, EepromPagedReader, MemoryWindow, ModuleInfo,
    ModuleStandard,
};
pub use thresholds::{decode_threshold, threshold_window, ThresholdKind, ThresholdReader, Thresholds};

//! Error types re-exported from ct-error

pub use ct_error::{Result, ThermalError};

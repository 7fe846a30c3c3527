//! Unified error handling for chassis-thermal
//!
//! This crate provides a single error type used across all chassis-thermal components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;

/// Result type alias using ThermalError
pub type Result<T> = std::result::Result<T, ThermalError>;

/// Unified error type for all chassis-thermal operations
#[derive(thiserror::Error, Debug)]
pub enum ThermalError {
    // ============================================================================
    // Device Transaction Errors
    // ============================================================================
    #[error("Register {register} transaction failed: {reason}")]
    Io {
        register: &'static str,
        reason: String,
    },

    #[error("Register {register} returned status {status:#04x}")]
    DeviceStatus {
        register: &'static str,
        status: u8,
    },

    #[error("Malformed register payload: {0}")]
    Protocol(String),

    // ============================================================================
    // Module and Sensor Errors
    // ============================================================================
    #[error("Unsupported module identifier {identifier:#04x} (slot {slot}, module {module})")]
    InvalidModuleType {
        slot: u8,
        module: u8,
        identifier: u8,
    },

    #[error("Critical threshold {crit} is above emergency threshold {emerg}")]
    ThresholdInconsistency {
        crit: i32,
        emerg: i32,
    },

    #[error("Sensor not ready")]
    NotReady,

    // ============================================================================
    // Lifecycle Errors
    // ============================================================================
    #[error("Out of memory allocating {requested} sensor entries for slot {slot}")]
    OutOfMemory {
        slot: u8,
        requested: usize,
    },

    #[error("Slot {0} is not active")]
    SlotInactive(u8),

    // ============================================================================
    // Validation Errors
    // ============================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    FileIo(#[from] io::Error),
}

impl ThermalError {
    /// Create an invalid argument error from a string
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a device transaction error
    pub fn io(register: &'static str, reason: impl Into<String>) -> Self {
        Self::Io {
            register,
            reason: reason.into(),
        }
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for failures that came from the device or its transport
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::DeviceStatus { .. })
    }
}

impl From<String> for ThermalError {
    fn from(s: String) -> Self {
        Self::Protocol(s)
    }
}

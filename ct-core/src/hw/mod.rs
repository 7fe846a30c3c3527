//! Hardware interaction modules
//!
//! The register transport seam, a simulated chassis behind it, and the
//! monitoring reads built on top.

mod monitor;
pub mod sim;
mod transport;

pub use monitor::{gearbox_label, module_label, query_sensor, FanReading, Monitor, SensorReading};
pub use sim::{InjectedFailure, SimulatedChassis, Transaction, TransactionKind};
pub use transport::{query_checked, write_checked, RegisterResponse, RegisterTransport};

#[cfg(test)]
pub use transport::MockRegisterTransport;

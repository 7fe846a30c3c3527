//! Device register transport
//!
//! The transport is an opaque request/response RPC. Implementations must
//! serialize register transactions themselves; nothing above this layer
//! holds a lock across a query.

use ct_protocol::RegisterId;
use tracing::trace;

use crate::error::{Result, ThermalError};

/// Raw response to a register query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResponse {
    pub payload: Vec<u8>,
    pub status: u8,
}

impl RegisterResponse {
    pub fn ok(payload: Vec<u8>) -> Self {
        Self { payload, status: 0 }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait RegisterTransport: Send + Sync {
    /// Query a register with a packed request payload
    fn query(&self, register: RegisterId, payload: &[u8]) -> Result<RegisterResponse>;

    /// Write a packed payload to a register, returning the device status
    fn write(&self, register: RegisterId, payload: &[u8]) -> Result<u8>;
}

/// Query a register and fail on a non-zero device status
pub fn query_checked(
    transport: &dyn RegisterTransport,
    register: RegisterId,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let txn = ct_protocol::generate_transaction_id();
    trace!(txn, register = %register, len = payload.len(), "register query");

    let response = transport.query(register, payload)?;
    if response.status != 0 {
        return Err(ThermalError::DeviceStatus {
            register: register.name(),
            status: response.status,
        });
    }
    Ok(response.payload)
}

/// Write a register and fail on a non-zero device status
pub fn write_checked(transport: &dyn RegisterTransport, register: RegisterId, payload: &[u8]) -> Result<()> {
    let txn = ct_protocol::generate_transaction_id();
    trace!(txn, register = %register, len = payload.len(), "register write");

    match transport.write(register, payload)? {
        0 => Ok(()),
        status => Err(ThermalError::DeviceStatus {
            register: register.name(),
            status,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_checked_maps_status() {
        let mut mock = MockRegisterTransport::new();
        mock.expect_query()
            .returning(|_, _| Ok(RegisterResponse { payload: vec![0; 4], status: 2 }));

        let err = query_checked(&mock, RegisterId::Mfsm, &[0; 4]).unwrap_err();
        assert!(matches!(err, ThermalError::DeviceStatus { register: "MFSM", status: 2 }));
    }

    #[test]
    fn test_query_checked_passes_payload() {
        let mut mock = MockRegisterTransport::new();
        mock.expect_query()
            .withf(|reg, pl| *reg == RegisterId::Mfsm && pl.len() == 4)
            .returning(|_, _| Ok(RegisterResponse::ok(vec![1, 0, 0x0b, 0xb8])));

        let payload = query_checked(&mock, RegisterId::Mfsm, &[1, 0, 0, 0]).unwrap();
        assert_eq!(payload, vec![1, 0, 0x0b, 0xb8]);
    }

    #[test]
    fn test_write_checked() {
        let mut mock = MockRegisterTransport::new();
        let mut calls = 0;
        mock.expect_write().times(2).returning(move |_, _| {
            calls += 1;
            Ok(if calls == 1 { 0 } else { 5 })
        });

        assert!(write_checked(&mock, RegisterId::Mfsc, &[0; 4]).is_ok());
        assert!(write_checked(&mock, RegisterId::Mfsc, &[0; 4]).unwrap_err().is_io());
    }
}

//! UDS 0x11 ECUReset.

use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

use super::{submit, UdsCommand};

/// Reset sub-functions for SID `0x11`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResetType {
    /// Simulated power off/on cycle; may re-initialize both volatile and
    /// non-volatile memory.
    HardReset,
    /// Simulated key off/on cycle; preserves non-volatile memory.
    KeyOffReset,
    /// Reboots the current application; preserves all memory.
    SoftReset,
    /// Enables rapid power shutdown during a key-off cycle. Once enabled,
    /// the only further request the ECU will accept is another
    /// `ECUReset`.
    EnableRapidPowerShutDown,
    /// Disables rapid power shutdown.
    DisableRapidPowerShutDown,
    /// Vehicle-manufacturer/system-supplier specific reset type.
    Other(u8),
}

impl From<ResetType> for u8 {
    fn from(reset: ResetType) -> u8 {
        match reset {
            ResetType::HardReset => 0x01,
            ResetType::KeyOffReset => 0x02,
            ResetType::SoftReset => 0x03,
            ResetType::EnableRapidPowerShutDown => 0x04,
            ResetType::DisableRapidPowerShutDown => 0x05,
            ResetType::Other(x) => x,
        }
    }
}

/// Asks the ECU to perform `reset_type`.
pub fn ecu_reset(session: &SessionManager, reset_type: ResetType) -> DiagResult<()> {
    submit(session, UdsCommand::EcuReset, &[reset_type.into()]).map(|_| ())
}

/// Enables rapid power shutdown mode, returning the minimum time (seconds)
/// the ECU will remain in the power-down sequence.
pub fn enable_rapid_power_shutdown(session: &SessionManager) -> DiagResult<u8> {
    let response = submit(
        session,
        UdsCommand::EcuReset,
        &[ResetType::EnableRapidPowerShutDown.into()],
    )?;
    match response.get(2) {
        Some(0xFF) => Err(DiagError::RequestOutOfRange),
        Some(time) => Ok(*time),
        None => Err(DiagError::Parse {
            where_: "uds::ecu_reset",
            reason: "response missing power-down time byte".into(),
        }),
    }
}

//! The UDS (ISO 14229) subset: sessions, security access, data
//! identifiers, routine control.
//!
//! Every public operation here is a thin formatter/parser pair submitted
//! through the [`session`](crate::session) manager, which absorbs `0x78`
//! response-pending NRCs and the retry policy (§4.6) before any of these
//! functions see a result.

pub mod clear_diagnostic_information;
pub mod data_identifier;
pub mod diagnostic_session_control;
pub mod ecu_reset;
pub mod read_dtc_information;
pub mod routine_control;
pub mod security_access;
pub mod tester_present;

use std::time::Duration;

use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

/// UDS (ISO 14229-1) service IDs this crate implements.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UdsCommand {
    /// 0x10 DiagnosticSessionControl.
    DiagnosticSessionControl = 0x10,
    /// 0x11 ECUReset.
    EcuReset = 0x11,
    /// 0x14 ClearDiagnosticInformation.
    ClearDiagnosticInformation = 0x14,
    /// 0x19 ReadDTCInformation.
    ReadDtcInformation = 0x19,
    /// 0x22 ReadDataByIdentifier.
    ReadDataByIdentifier = 0x22,
    /// 0x27 SecurityAccess.
    SecurityAccess = 0x27,
    /// 0x2E WriteDataByIdentifier.
    WriteDataByIdentifier = 0x2E,
    /// 0x31 RoutineControl.
    RoutineControl = 0x31,
    /// 0x3E TesterPresent.
    TesterPresent = 0x3E,
}

impl UdsCommand {
    /// The positive response SID, `service + 0x40`.
    pub fn positive_response_sid(self) -> u8 {
        self as u8 + 0x40
    }
}

/// Default submit deadline for UDS requests (mirrors `P2_client`; the
/// session manager's own response-pending loop extends this internally
/// per request as needed).
const DEFAULT_DEADLINE: Duration = Duration::from_millis(2000);

pub(crate) fn submit(
    session: &SessionManager,
    service: UdsCommand,
    payload: &[u8],
) -> DiagResult<Vec<u8>> {
    let mut request = Vec::with_capacity(payload.len() + 1);
    request.push(service as u8);
    request.extend_from_slice(payload);
    let response = session.submit(&request, DEFAULT_DEADLINE)?;
    let expected = service.positive_response_sid();
    if response.first() != Some(&expected) {
        return Err(DiagError::Parse {
            where_: "uds::submit",
            reason: format!("expected response SID 0x{expected:02X}, got {response:02X?}"),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_response_sid_is_service_plus_0x40() {
        assert_eq!(UdsCommand::ReadDataByIdentifier.positive_response_sid(), 0x62);
        assert_eq!(UdsCommand::DiagnosticSessionControl.positive_response_sid(), 0x50);
    }
}

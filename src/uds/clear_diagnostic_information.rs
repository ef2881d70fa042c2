//! UDS 0x14 ClearDiagnosticInformation.

use crate::session::SessionManager;
use crate::DiagResult;

use super::{submit, UdsCommand};

/// Clears diagnostic information matching `dtc_mask` from the ECU. Only the
/// lower 3 bytes of `dtc_mask` are used (`0x000000..=0xFFFFFF`); the all-ones
/// mask `0xFFFFFF` clears every DTC.
pub fn clear_diagnostic_information(session: &SessionManager, dtc_mask: u32) -> DiagResult<()> {
    submit(
        session,
        UdsCommand::ClearDiagnosticInformation,
        &[(dtc_mask >> 16) as u8, (dtc_mask >> 8) as u8, dtc_mask as u8],
    )
    .map(|_| ())
}

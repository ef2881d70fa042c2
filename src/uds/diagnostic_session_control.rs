//! UDS 0x10 DiagnosticSessionControl.

use crate::session::SessionManager;
use crate::DiagResult;

use super::{submit, UdsCommand};

/// UDS diagnostic session types, handled by SID `0x10`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UdsSessionType {
    /// Default session (the ECU's normal startup state); does not require
    /// tester-present keep-alive.
    Default,
    /// Enables programming/flashing services.
    Programming,
    /// Enables extended diagnostic services and value adjustment.
    Extended,
    /// Enables safety-system-related services.
    SafetySystem,
    /// Vehicle-manufacturer (0x40-0x5F) or system-supplier (0x60-0x7E)
    /// specific session.
    Other(u8),
}

impl From<UdsSessionType> for u8 {
    fn from(session: UdsSessionType) -> u8 {
        match session {
            UdsSessionType::Default => 0x01,
            UdsSessionType::Programming => 0x02,
            UdsSessionType::Extended => 0x03,
            UdsSessionType::SafetySystem => 0x04,
            UdsSessionType::Other(x) => x,
        }
    }
}

/// Tells the ECU to enter `session`. The caller is responsible for starting
/// [`SessionManager::keep_alive_start`] for any non-[`UdsSessionType::Default`]
/// session, and stopping it when returning to default (§3 `DiagnosticSession`
/// invariant: keep-alive runs only while a non-default session is active).
pub fn diagnostic_session_control(
    session: &SessionManager,
    mode: UdsSessionType,
) -> DiagResult<()> {
    submit(session, UdsCommand::DiagnosticSessionControl, &[mode.into()])?;
    match mode {
        UdsSessionType::Default => session.keep_alive_stop(),
        _ => session.keep_alive_start(),
    }
    Ok(())
}

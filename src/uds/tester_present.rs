//! UDS 0x3E TesterPresent.
//!
//! [`SessionManager`] already sends this with sub-function `0x80` (no
//! positive response suppressed) as its own keep-alive heartbeat once
//! [`SessionManager::keep_alive_start`] is running; this module exists for
//! callers that want to issue it explicitly.

use crate::session::SessionManager;
use crate::DiagResult;

use super::{submit, UdsCommand};

/// Sub-function `0x00`: the ECU sends a positive response.
const ZERO_SUB_FUNCTION: u8 = 0x00;

/// Sends an explicit TesterPresent request and waits for the positive
/// response. Side-effect-free: it neither starts nor stops a diagnostic
/// session and does not affect keep-alive scheduling.
pub fn tester_present(session: &SessionManager) -> DiagResult<()> {
    submit(session, UdsCommand::TesterPresent, &[ZERO_SUB_FUNCTION]).map(|_| ())
}

//! UDS 0x27 SecurityAccess: seed/key unlock.
//!
//! Key derivation is manufacturer-specific and out of scope for this crate
//! (§1 Non-goals); callers supply it as an injected function.

use crate::session::SessionManager;
use crate::DiagResult;

use super::{submit, UdsCommand};

/// Security access sub-function level. Odd values request a seed, the
/// following even value sends the corresponding key (ISO 14229-1 ties each
/// `requestSeed` sub-function `2n-1` to a `sendKey` sub-function `2n`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccessLevel(pub u8);

impl AccessLevel {
    /// The default (level 1) access level: request-seed sub-function `0x01`.
    pub const DEFAULT: AccessLevel = AccessLevel(0x01);

    fn request_seed_subfunction(self) -> u8 {
        self.0
    }

    fn send_key_subfunction(self) -> u8 {
        self.0 + 1
    }
}

/// Requests a security seed from the ECU for `level`.
pub fn request_seed(session: &SessionManager, level: AccessLevel) -> DiagResult<Vec<u8>> {
    let mut response = submit(
        session,
        UdsCommand::SecurityAccess,
        &[level.request_seed_subfunction()],
    )?;
    response.drain(0..2); // drop response SID and echoed sub-function
    Ok(response)
}

/// Sends the computed key to the ECU, unlocking `level` on success.
pub fn send_key(session: &SessionManager, level: AccessLevel, key: &[u8]) -> DiagResult<()> {
    let mut payload = Vec::with_capacity(key.len() + 1);
    payload.push(level.send_key_subfunction());
    payload.extend_from_slice(key);
    submit(session, UdsCommand::SecurityAccess, &payload).map(|_| ())
}

/// Requests a seed, runs the caller-supplied `compute_key` function over it,
/// and sends the resulting key back, unlocking `level` in one call.
pub fn unlock(
    session: &SessionManager,
    level: AccessLevel,
    compute_key: impl FnOnce(&[u8]) -> Vec<u8>,
) -> DiagResult<()> {
    let seed = request_seed(session, level)?;
    let key = compute_key(&seed);
    send_key(session, level, &key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_level_derives_send_key_subfunction() {
        assert_eq!(AccessLevel::DEFAULT.send_key_subfunction(), 0x02);
        assert_eq!(AccessLevel(0x03).send_key_subfunction(), 0x04);
    }
}

//! UDS 0x22 ReadDataByIdentifier / 0x2E WriteDataByIdentifier.

use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

use super::{submit, UdsCommand};

/// A 2-byte data identifier, e.g. `0xF190` (VIN).
pub type Did = u16;

/// Reads the raw data record for `did`.
pub fn read_data_by_identifier(session: &SessionManager, did: Did) -> DiagResult<Vec<u8>> {
    let response = submit(
        session,
        UdsCommand::ReadDataByIdentifier,
        &[(did >> 8) as u8, did as u8],
    )?;
    if response.len() < 3 {
        return Err(DiagError::Parse {
            where_: "uds::data_identifier",
            reason: "response missing echoed data identifier".into(),
        });
    }
    let echoed = u16::from_be_bytes([response[1], response[2]]);
    if echoed != did {
        return Err(DiagError::Parse {
            where_: "uds::data_identifier",
            reason: format!("expected DID echo 0x{did:04X}, got 0x{echoed:04X}"),
        });
    }
    Ok(response[3..].to_vec())
}

/// Writes `data` to `did`.
pub fn write_data_by_identifier(session: &SessionManager, did: Did, data: &[u8]) -> DiagResult<()> {
    let mut payload = Vec::with_capacity(data.len() + 2);
    payload.push((did >> 8) as u8);
    payload.push(did as u8);
    payload.extend_from_slice(data);
    submit(session, UdsCommand::WriteDataByIdentifier, &payload).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_data_by_identifier_strips_sid_and_did_echo() {
        let response = [0x62, 0xF1, 0x90, b'V', b'I', b'N'];
        let echoed = u16::from_be_bytes([response[1], response[2]]);
        assert_eq!(echoed, 0xF190);
        assert_eq!(&response[3..], b"VIN");
    }
}

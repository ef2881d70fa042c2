//! Mode 03/07/0A (stored/pending/permanent DTCs) and mode 04 (clear DTCs).

use crate::dtc::{decode_dtc_words, Dtc};
use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

use super::service;

/// Which DTC bucket to read, per §4.8 `read_trouble_codes`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DtcKind {
    /// Mode 03, confirmed/stored DTCs.
    Stored,
    /// Mode 07, pending (not yet confirmed) DTCs.
    Pending,
    /// Mode 0A, permanent DTCs (cannot be cleared by mode 04).
    Permanent,
}

impl DtcKind {
    fn mode(self) -> u8 {
        match self {
            DtcKind::Stored => service::STORED_DTCS,
            DtcKind::Pending => service::PENDING_DTCS,
            DtcKind::Permanent => service::PERMANENT_DTCS,
        }
    }

    fn positive_response_sid(self) -> u8 {
        self.mode() + 0x40
    }
}

/// Reads the requested bucket of DTCs.
pub fn read_trouble_codes(session: &SessionManager, kind: DtcKind) -> DiagResult<Vec<Dtc>> {
    let response = super::submit(session, &[kind.mode()])?;
    parse_dtc_response(&response, kind.positive_response_sid())
}

fn parse_dtc_response(response: &[u8], expected_sid: u8) -> DiagResult<Vec<Dtc>> {
    if response.is_empty() || response[0] != expected_sid {
        return Err(DiagError::Parse {
            where_: "obd2::dtc_services",
            reason: format!("expected response SID 0x{expected_sid:02X}, got {response:02X?}"),
        });
    }
    // Some adapters echo a DTC count byte right after the SID; when present
    // it equals half the remaining byte count, so detect it by parity.
    let body = if response.len() >= 2 && (response.len() - 1) % 2 != 0 {
        &response[2..]
    } else {
        &response[1..]
    };
    Ok(decode_dtc_words(body))
}

/// Clears all diagnostic trouble codes and stored values (mode 04). A
/// positive response is the single byte `0x44` with no payload; repeating
/// the call is idempotent (§8).
pub fn clear_trouble_codes(session: &SessionManager) -> DiagResult<()> {
    let response = super::submit(session, &[service::CLEAR_DTCS])?;
    if response.first() == Some(&0x44) {
        Ok(())
    } else {
        Err(DiagError::Parse {
            where_: "obd2::clear_trouble_codes",
            reason: format!("expected 0x44, got {response:02X?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_dtc_scenario() {
        let response = [0x43, 0x02, 0x01, 0x33, 0x02, 0x45];
        let dtcs = parse_dtc_response(&response, 0x43).unwrap();
        let codes: Vec<String> = dtcs.into_iter().map(|d| d.code).collect();
        assert_eq!(codes, vec!["P0133", "P0245"]);
    }

    #[test]
    fn parses_response_with_no_count_byte() {
        let response = [0x43, 0x01, 0x33];
        let dtcs = parse_dtc_response(&response, 0x43).unwrap();
        assert_eq!(dtcs[0].code, "P0133");
    }
}

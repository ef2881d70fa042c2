//! UDS 0x19 ReadDTCInformation.

use crate::dtc::{decode_uds_dtc_records, Dtc};
use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

use super::{submit, UdsCommand};

const REPORT_DTC_BY_STATUS_MASK: u8 = 0x02;
const REPORT_DTC_SNAPSHOT_RECORD: u8 = 0x04;

/// Reads all DTCs whose status byte matches any bit in `status_mask`
/// (sub-function `0x02`).
pub fn report_dtc_by_status_mask(session: &SessionManager, status_mask: u8) -> DiagResult<Vec<Dtc>> {
    let response = submit(
        session,
        UdsCommand::ReadDtcInformation,
        &[REPORT_DTC_BY_STATUS_MASK, status_mask],
    )?;
    // response = [0x59, 0x02, status_availability_mask, (dtc_hi dtc_mid dtc_lo status)...]
    if response.len() < 3 {
        return Err(DiagError::Parse {
            where_: "uds::read_dtc_information",
            reason: "response missing status availability mask".into(),
        });
    }
    Ok(decode_uds_dtc_records(&response[3..]))
}

/// Reads the freeze-frame-style snapshot record `record_number` for `dtc`
/// (sub-function `0x04`).
pub fn report_dtc_snapshot(
    session: &SessionManager,
    dtc: &Dtc,
    record_number: u8,
) -> DiagResult<Vec<u8>> {
    let [hi, mid, lo] = dtc.uds_id_bytes();
    let request = [REPORT_DTC_SNAPSHOT_RECORD, hi, mid, lo, record_number];
    let response = submit(session, UdsCommand::ReadDtcInformation, &request)?;
    if response.len() < 6 {
        return Err(DiagError::Parse {
            where_: "uds::read_dtc_information",
            reason: "snapshot response too short".into(),
        });
    }
    Ok(response[6..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_status_mask_response() {
        let response = [0x59, 0x02, 0xFF, 0x01, 0x33, 0x00, 0x09];
        let dtcs = decode_uds_dtc_records(&response[3..]);
        assert_eq!(dtcs[0].code, "P0133");
        assert_eq!(dtcs[0].status_byte, Some(0x09));
    }

    #[test]
    fn nonzero_third_id_byte_survives_into_snapshot_request_bytes() {
        // A DTC whose third ID byte isn't 0 must round-trip through
        // uds_id_bytes() unchanged, since report_dtc_snapshot keys its
        // request on exactly these three bytes.
        let response = [0x59, 0x02, 0xFF, 0x01, 0x33, 0x7A, 0x09];
        let dtcs = decode_uds_dtc_records(&response[3..]);
        assert_eq!(dtcs[0].uds_id_bytes(), [0x01, 0x33, 0x7A]);
    }
}

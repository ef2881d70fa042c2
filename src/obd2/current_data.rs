//! Mode 01: show current data.

use std::collections::HashMap;

use crate::pid::{self, EngineeringValue};
use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

use super::service;

/// ELM327 concatenates up to 6 single-byte PIDs into one `01` request; above
/// that the adapter's line buffer overflows.
const MAX_PIDS_PER_REQUEST: usize = 6;

/// Reads current data for the given PIDs, batching up to 6 per request.
///
/// Returns a map of `pid -> EngineeringValue` for every PID the ECU answered;
/// PIDs the ECU did not echo back are simply absent from the result rather
/// than erroring the whole call.
pub fn read_current_data(
    session: &SessionManager,
    pids: &[u8],
) -> DiagResult<HashMap<u8, EngineeringValue>> {
    let mut results = HashMap::new();
    for batch in pids.chunks(MAX_PIDS_PER_REQUEST) {
        let mut request = vec![service::CURRENT_DATA];
        request.extend_from_slice(batch);
        let response = super::submit(session, &request)?;
        parse_current_data_response(&response, &mut results)?;
    }
    Ok(results)
}

/// Reads a single PID's current data.
pub fn read_pid(session: &SessionManager, pid: u8) -> DiagResult<EngineeringValue> {
    let mut map = read_current_data(session, &[pid])?;
    map.remove(&pid).ok_or(DiagError::NoData)
}

/// Parses a mode-01 response body (`41 <pid> <data...> 41 <pid> <data...> …`)
/// into `pid -> EngineeringValue` entries, appending into `out`.
fn parse_current_data_response(
    response: &[u8],
    out: &mut HashMap<u8, EngineeringValue>,
) -> DiagResult<()> {
    if response.is_empty() || response[0] != 0x41 {
        return Err(DiagError::Parse {
            where_: "obd2::current_data",
            reason: format!("expected response SID 0x41, got {response:02X?}"),
        });
    }
    let mut i = 1;
    while i < response.len() {
        let pid = response[i];
        let descriptor = pid::lookup(service::CURRENT_DATA, pid).ok_or(DiagError::Parse {
            where_: "obd2::current_data",
            reason: format!("unknown PID 0x{pid:02X}"),
        })?;
        let end = i + 1 + descriptor.data_length_bytes;
        if end > response.len() {
            return Err(DiagError::Parse {
                where_: "obd2::current_data",
                reason: "response truncated mid-PID".into(),
            });
        }
        let value = (descriptor.decoder)(&response[i + 1..end]);
        out.insert(pid, value);
        i = end;
    }
    Ok(())
}

/// Reads PID `0101` (monitor status since DTCs cleared) and reports which
/// readiness monitors have completed, per §4.8 `read_readiness_monitors`.
pub fn read_readiness_monitors(session: &SessionManager) -> DiagResult<u32> {
    match read_pid(session, 0x01)? {
        EngineeringValue::Bitfield(bits) => Ok(bits as u32),
        other => Err(DiagError::Parse {
            where_: "obd2::readiness_monitors",
            reason: format!("unexpected value shape {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_pid_response() {
        let mut out = HashMap::new();
        parse_current_data_response(&[0x41, 0x0C, 0x1A, 0xF8], &mut out).unwrap();
        assert_eq!(out[&0x0C], EngineeringValue::Scalar(1726.0, "rpm"));
    }

    #[test]
    fn parses_concatenated_multi_pid_response() {
        let mut out = HashMap::new();
        // 010C0D -> RPM then speed, ELM327 concatenates both replies.
        parse_current_data_response(&[0x41, 0x0C, 0x1A, 0xF8, 0x41, 0x0D, 0x32], &mut out).unwrap();
        assert_eq!(out[&0x0C], EngineeringValue::Scalar(1726.0, "rpm"));
        assert_eq!(out[&0x0D], EngineeringValue::Scalar(50.0, "km/h"));
    }

    #[test]
    fn rejects_wrong_response_sid() {
        let mut out = HashMap::new();
        assert!(parse_current_data_response(&[0x7F, 0x01, 0x11], &mut out).is_err());
    }
}

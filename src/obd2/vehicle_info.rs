//! Mode 09: request vehicle information.

use crate::hex;
use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

use super::service;

const PID_VIN: u8 = 0x02;
const PID_CALIBRATION_ID: u8 = 0x04;
const PID_ECU_NAME: u8 = 0x0A;

/// Reads the vehicle identification number (PID `0902`).
///
/// The VIN is delivered across one ISO-TP First frame and two Consecutive
/// frames; both the native CAN path and the ELM327 path (via
/// [`Elm327Driver::request_lines_cancellable`](crate::elm327::Elm327Driver::request_lines_cancellable))
/// reassemble this before it reaches `submit`, so the response arrives here
/// as a single flattened payload already. This function strips the response
/// SID, PID and item-index byte, then assembles the remaining ASCII into a
/// VIN per §4.1.
pub fn read_vin(session: &SessionManager) -> DiagResult<String> {
    let response = super::submit(session, &[service::VEHICLE_INFO, PID_VIN])?;
    let body = expect_vehicle_info_response(&response, PID_VIN)?;
    // body = [item_index, vin_ascii...]
    if body.is_empty() {
        return Err(DiagError::NoData);
    }
    Ok(hex::assemble_vin(&[body.to_vec()]))
}

/// Reads the ECU's calibration ID (PID `0904`).
pub fn read_calibration_id(session: &SessionManager) -> DiagResult<String> {
    read_ascii_info(session, PID_CALIBRATION_ID)
}

/// Reads the ECU's name (PID `090A`).
pub fn read_ecu_name(session: &SessionManager) -> DiagResult<String> {
    read_ascii_info(session, PID_ECU_NAME)
}

fn read_ascii_info(session: &SessionManager, pid: u8) -> DiagResult<String> {
    let response = super::submit(session, &[service::VEHICLE_INFO, pid])?;
    let body = expect_vehicle_info_response(&response, pid)?;
    let text: String = body
        .iter()
        .skip(1) // item index byte
        .map(|&b| b as char)
        .filter(|c| c.is_ascii_graphic())
        .collect();
    Ok(text)
}

fn expect_vehicle_info_response<'a>(response: &'a [u8], expected_pid: u8) -> DiagResult<&'a [u8]> {
    if response.len() < 2 || response[0] != 0x49 || response[1] != expected_pid {
        return Err(DiagError::Parse {
            where_: "obd2::vehicle_info",
            reason: format!("expected response SID 0x49 PID 0x{expected_pid:02X}, got {response:02X?}"),
        });
    }
    Ok(&response[2..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_vin_from_flattened_response() {
        // 49 02 01 <17 ASCII bytes>
        let mut response = vec![0x49, 0x02, 0x01];
        response.extend_from_slice(b"1G1JC5944R7252367");
        let body = expect_vehicle_info_response(&response, 0x02).unwrap();
        let vin = hex::assemble_vin(&[body.to_vec()]);
        assert_eq!(vin, "1G1JC5944R7252367");
    }
}

//! Mode 02: show freeze frame data.

use crate::pid::{self, EngineeringValue};
use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

use super::service;

/// Reads one PID's freeze frame value for the given frame number.
///
/// The response carries the same SID+PID shape as mode 01 but with an extra
/// frame-number byte echoed back right after the PID.
pub fn read_freeze_frame(
    session: &SessionManager,
    pid: u8,
    frame_no: u8,
) -> DiagResult<EngineeringValue> {
    let request = vec![service::FREEZE_FRAME, pid, frame_no];
    let response = super::submit(session, &request)?;
    parse_freeze_frame_response(&response, pid)
}

fn parse_freeze_frame_response(response: &[u8], expected_pid: u8) -> DiagResult<EngineeringValue> {
    if response.len() < 3 || response[0] != 0x42 {
        return Err(DiagError::Parse {
            where_: "obd2::freeze_frame",
            reason: format!("expected response SID 0x42, got {response:02X?}"),
        });
    }
    if response[1] != expected_pid {
        return Err(DiagError::Parse {
            where_: "obd2::freeze_frame",
            reason: format!("expected PID 0x{expected_pid:02X}, got 0x{:02X}", response[1]),
        });
    }
    let descriptor = pid::lookup(service::CURRENT_DATA, expected_pid).ok_or(DiagError::Parse {
        where_: "obd2::freeze_frame",
        reason: format!("unknown PID 0x{expected_pid:02X}"),
    })?;
    let data = &response[3..];
    if data.len() < descriptor.data_length_bytes {
        return Err(DiagError::Parse {
            where_: "obd2::freeze_frame",
            reason: "response truncated".into(),
        });
    }
    Ok((descriptor.decoder)(&data[..descriptor.data_length_bytes]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_freeze_frame_rpm() {
        // SID 0x42, PID 0x0C, frame# 0x00, then 2 data bytes.
        let response = [0x42, 0x0C, 0x00, 0x1A, 0xF8];
        let value = parse_freeze_frame_response(&response, 0x0C).unwrap();
        assert_eq!(value, EngineeringValue::Scalar(1726.0, "rpm"));
    }

    #[test]
    fn rejects_mismatched_pid_echo() {
        let response = [0x42, 0x0D, 0x00, 0x32];
        assert!(parse_freeze_frame_response(&response, 0x0C).is_err());
    }
}

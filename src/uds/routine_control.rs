//! UDS 0x31 RoutineControl.

use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

use super::{submit, UdsCommand};

/// Routine control sub-functions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RoutineControlType {
    Start,
    Stop,
    RequestResults,
}

impl From<RoutineControlType> for u8 {
    fn from(kind: RoutineControlType) -> u8 {
        match kind {
            RoutineControlType::Start => 0x01,
            RoutineControlType::Stop => 0x02,
            RoutineControlType::RequestResults => 0x03,
        }
    }
}

/// Invokes `control` for `routine_id`, passing `option_bytes` as its
/// optional input record, returning any status/result bytes the ECU sends
/// back.
pub fn routine_control(
    session: &SessionManager,
    control: RoutineControlType,
    routine_id: u16,
    option_bytes: &[u8],
) -> DiagResult<Vec<u8>> {
    let mut payload = Vec::with_capacity(3 + option_bytes.len());
    payload.push(control.into());
    payload.push((routine_id >> 8) as u8);
    payload.push(routine_id as u8);
    payload.extend_from_slice(option_bytes);
    let response = submit(session, UdsCommand::RoutineControl, &payload)?;
    if response.len() < 4 {
        return Err(DiagError::Parse {
            where_: "uds::routine_control",
            reason: "response missing echoed sub-function/routine id".into(),
        });
    }
    Ok(response[4..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_function_codes_match_iso14229() {
        assert_eq!(u8::from(RoutineControlType::Start), 0x01);
        assert_eq!(u8::from(RoutineControlType::Stop), 0x02);
        assert_eq!(u8::from(RoutineControlType::RequestResults), 0x03);
    }
}

//! OBD-II (SAE J1979 / ISO 15031) services 01-0A.
//!
//! Each service is a thin formatter/parser pair around the session manager:
//! build the request bytes, submit them, decode the response with the
//! [`pid`](crate::pid) registry or [`dtc`](crate::dtc) codec.

mod current_data;
mod dtc_services;
mod freeze_frame;
mod vehicle_info;

pub use current_data::*;
pub use dtc_services::*;
pub use freeze_frame::*;
pub use vehicle_info::*;

use std::time::Duration;

use crate::session::SessionManager;
use crate::DiagResult;

/// OBD-II service (mode) byte values used throughout this module.
pub mod service {
    /// Mode 01: show current data.
    pub const CURRENT_DATA: u8 = 0x01;
    /// Mode 02: show freeze frame data.
    pub const FREEZE_FRAME: u8 = 0x02;
    /// Mode 03: show stored diagnostic trouble codes.
    pub const STORED_DTCS: u8 = 0x03;
    /// Mode 04: clear diagnostic trouble codes and stored values.
    pub const CLEAR_DTCS: u8 = 0x04;
    /// Mode 07: show pending diagnostic trouble codes.
    pub const PENDING_DTCS: u8 = 0x07;
    /// Mode 09: request vehicle information.
    pub const VEHICLE_INFO: u8 = 0x09;
    /// Mode 0A: show permanent diagnostic trouble codes.
    pub const PERMANENT_DTCS: u8 = 0x0A;
}

/// Default per-request deadline used by the OBD-II service layer; the
/// session manager's own `P2_client` governs the adapter round trip, this is
/// simply the caller-facing submit deadline.
pub(crate) const DEFAULT_DEADLINE: Duration = Duration::from_millis(2000);

pub(crate) fn submit(session: &SessionManager, request: &[u8]) -> DiagResult<Vec<u8>> {
    session.submit(request, DEFAULT_DEADLINE)
}

//! The abstract transport contract.
//!
//! This is the seam between the diagnostic stack and whatever byte pipe
//! actually talks to the vehicle (Bluetooth SPP/BLE, TCP, USB CDC, a native
//! CAN interface). The core assumes best-effort byte delivery with no
//! inherent framing - the [`elm327`](crate::elm327) driver and
//! [`isotp`](crate::isotp) engine are what impose framing on top.
//!
//! The transport is owned exclusively by the [`session`](crate::session)
//! manager while open; it is not reentrant.

use std::time::Duration;

/// Result type for transport/channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Error produced by a transport or communication channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Underlying IO error with the channel.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Timeout when writing data to the channel.
    #[error("timeout writing to channel")]
    WriteTimeout,
    /// Timeout when reading from the channel.
    #[error("timeout reading from channel")]
    ReadTimeout,
    /// The channel's Rx buffer is empty. Only applies when read timeout is 0.
    #[error("channel's receive buffer is empty")]
    BufferEmpty,
    /// The channel's Tx buffer is full.
    #[error("channel's transmit buffer is full")]
    BufferFull,
    /// Unsupported channel request.
    #[error("unsupported channel request")]
    UnsupportedRequest,
    /// The interface is not open.
    #[error("channel's interface is not open")]
    InterfaceNotOpen,
    /// The channel is already open/configured and cannot be reconfigured now.
    #[error("channel configuration conflict")]
    ConfigurationConflict,
    /// Underlying API error with hardware.
    #[error("underlying {api_name} API error ({code}): {desc}")]
    ApiError {
        /// Name of the API, e.g. `"socketCAN"`.
        api_name: &'static str,
        /// Internal API error code.
        code: i32,
        /// API error description.
        desc: String,
    },
}

/// Observable connection state of a transport, as produced by
/// [`Transport::state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or cleanly disconnected.
    Disconnected,
    /// `connect()` has been called and has not yet resolved.
    Connecting,
    /// Connected and ready for read/write.
    Connected,
    /// An error occurred. `recoverable` indicates whether a fresh `connect()`
    /// is expected to succeed (e.g. a timeout) versus a hard failure (e.g.
    /// device unplugged).
    Error {
        /// Human-readable description of the failure.
        message: String,
        /// Whether reconnecting is expected to help.
        recoverable: bool,
    },
}

/// The abstract transport contract.
///
/// Implementors: [`hardware::serial::SerialElmTransport`](crate::hardware::serial::SerialElmTransport),
/// [`hardware::socketcan::SocketCanTransport`](crate::hardware::socketcan::SocketCanTransport),
/// [`hardware::simulation::SimulatedTransport`](crate::hardware::simulation::SimulatedTransport).
pub trait Transport: Send {
    /// Opens the underlying connection. Idempotent if already connected.
    fn connect(&mut self) -> ChannelResult<()>;

    /// Closes the underlying connection.
    fn disconnect(&mut self) -> ChannelResult<()>;

    /// Writes raw bytes to the transport.
    fn write(&mut self, bytes: &[u8]) -> ChannelResult<()>;

    /// Reads up to `max_bytes` from the transport, waiting at most `deadline`
    /// for at least one byte to arrive. Returns whatever bytes are available
    /// once the deadline is hit rather than padding with zeros; an empty
    /// `Vec` is a valid (non-error) result when nothing arrived in time for
    /// a best-effort, non-blocking caller, but callers that need a guarantee
    /// should treat an empty read as [`ChannelError::ReadTimeout`].
    fn read(&mut self, max_bytes: usize, deadline: Duration) -> ChannelResult<Vec<u8>>;

    /// Current observable connection state.
    fn state(&self) -> ConnectionState;
}

/// Per-(tx_id, rx_id) ISO-TP channel configuration, used by native transports
/// that expose ISO-TP directly (see [`isotp`](crate::isotp)).
#[derive(Debug, Copy, Clone)]
pub struct IsoTpSettings {
    /// Flow-control block size this engine will request of a sender
    /// (0 = no limit, send everything in one go).
    pub block_size: u8,
    /// Minimum separation time (ms) this engine will request between
    /// consecutive frames it receives.
    pub st_min_ms: u8,
    /// Use 29-bit extended CAN identifiers.
    pub can_use_ext_addr: bool,
    /// Pad CAN frames to 8 bytes when the payload is shorter.
    pub pad_frame: bool,
    /// CAN bus speed in bits/second.
    pub can_speed: u32,
}

impl Default for IsoTpSettings {
    fn default() -> Self {
        Self {
            block_size: 0,
            st_min_ms: 0,
            can_use_ext_addr: false,
            pad_frame: true,
            can_speed: 500_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_isotp_settings_match_spec_defaults() {
        let s = IsoTpSettings::default();
        assert_eq!(s.block_size, 0);
        assert_eq!(s.st_min_ms, 0);
    }
}

#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]

//! `autodiag-core` is the protocol stack of an automotive diagnostic engine:
//! the layer that sits between a raw byte-stream transport (Bluetooth SPP/BLE,
//! TCP, USB CDC, native CAN) and the higher-level verbs an app would expose
//! (read/clear trouble codes, stream live parameters, read vehicle
//! identification, freeze-frame and readiness checks).
//!
//! ## Layout
//!
//! * [`hex`] - byte/ASCII-hex codec and big/little-endian integer extraction.
//! * [`pid`] - the OBD-II PID registry and engineering-unit decoding.
//! * [`dtc`] - diagnostic trouble code codec and UDS negative response codes.
//! * [`isotp`] - the ISO 15765-2 (ISO-TP) segmenter/reassembler state machine.
//! * [`protocol`] - the enumeration of adapter-negotiable link protocols.
//! * [`channel`] - the abstract transport contract and connection state.
//! * [`elm327`] - the ELM327 AT-command driver (init, protocol detection,
//!   prompt-based framing).
//! * [`config`] - the explicit configuration record threaded through the
//!   stack at construction time.
//! * [`session`] - the session manager: single-owner request queue, retries,
//!   timeouts, tester-present keep-alive.
//! * [`obd2`] - OBD-II services 01-0A.
//! * [`uds`] - the UDS (ISO 14229) subset: sessions, security access, data
//!   identifiers, routine control.
//! * [`hardware`] - concrete transport backends (SocketCAN, serial/ELM327,
//!   and an in-memory simulated transport for tests).
//! * [`facade`] - the high-level vehicle-facing verbs composed from the
//!   above.

pub mod channel;
pub mod config;
pub mod dtc;
pub mod elm327;
pub mod facade;
pub mod hardware;
pub mod hex;
pub mod isotp;
pub mod obd2;
pub mod pid;
pub mod protocol;
pub mod session;
pub mod uds;

use channel::ChannelError;

/// Result type returned by every fallible operation in the diagnostic stack.
pub type DiagResult<T> = Result<T, DiagError>;

/// Closed set of errors produced anywhere in the diagnostic stack.
///
/// Parsing and protocol-state errors are surfaced unmodified. Transient
/// transport/adapter errors are retried internally up to the configured
/// bound (see [`config::AdapterConfig`]) before becoming one of these.
#[derive(Debug, thiserror::Error)]
pub enum DiagError {
    /// The transport reported it is no longer connected.
    #[error("transport disconnected")]
    TransportDisconnected,
    /// Underlying transport I/O error.
    #[error("transport I/O error: {cause}")]
    TransportIo {
        /// Description of the underlying failure.
        cause: String,
    },
    /// A request did not complete before its deadline.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before the deadline was hit.
        elapsed_ms: u64,
    },
    /// Adapter initialization failed at a specific AT-command step.
    #[error("adapter init failed at {step}: {observed}")]
    AdapterInitFailed {
        /// Name of the init step (e.g. `"ATZ"`).
        step: &'static str,
        /// What the adapter actually sent back.
        observed: String,
    },
    /// `ATSP`/`ATDPN` never converged on a protocol.
    #[error("no protocol negotiated with adapter")]
    NoProtocolNegotiated,
    /// The adapter reported a protocol this crate does not implement.
    #[error("unsupported protocol reported by adapter")]
    UnsupportedProtocol,
    /// A parse step failed.
    #[error("parse error in {where_}: {reason}")]
    Parse {
        /// Where parsing failed (function/field name).
        where_: &'static str,
        /// Human-readable reason.
        reason: String,
    },
    /// An ISO-TP consecutive frame arrived with the wrong sequence nibble.
    #[error("ISO-TP sequence error")]
    IsoTpSequenceError,
    /// An ISO-TP flow-control frame reported overflow.
    #[error("ISO-TP overflow")]
    IsoTpOverflow,
    /// A flow-control frame arrived while the engine was not sending.
    #[error("unexpected ISO-TP flow control frame")]
    IsoTpUnexpectedFlowControl,
    /// Adapter sentinel: `NO DATA`.
    #[error("no data")]
    NoData,
    /// Adapter sentinel: `BUS INIT: ERROR`.
    #[error("bus init error")]
    BusInitError,
    /// Adapter sentinel: `CAN ERROR`.
    #[error("CAN error")]
    CanError,
    /// Adapter sentinel: `BUFFER FULL`.
    #[error("adapter buffer full")]
    BufferFull,
    /// Adapter sentinel: `STOPPED`.
    #[error("adapter stopped")]
    Stopped,
    /// ECU returned a negative response (`0x7F`).
    #[error("negative response to service 0x{service:02X}: {nrc}")]
    NegativeResponse {
        /// Service ID the request was sent with.
        service: u8,
        /// Decoded negative response code.
        nrc: dtc::Nrc,
    },
    /// NRC 0x33 surfaced as its own variant since callers branch on it often.
    #[error("security access denied")]
    SecurityAccessDenied,
    /// NRC 0x35.
    #[error("invalid security access key")]
    InvalidKey,
    /// NRC 0x22.
    #[error("conditions not correct")]
    ConditionsNotCorrect,
    /// NRC 0x31.
    #[error("request out of range")]
    RequestOutOfRange,
    /// The in-flight request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,
    /// A caller-supplied parameter was invalid.
    #[error("invalid argument: {param}")]
    InvalidArgument {
        /// Name of the offending parameter.
        param: &'static str,
    },
    /// Error from the underlying communication channel.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl From<hex::ParseError> for DiagError {
    fn from(e: hex::ParseError) -> Self {
        DiagError::Parse {
            where_: "hex",
            reason: e.to_string(),
        }
    }
}

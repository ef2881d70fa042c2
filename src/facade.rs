//! The high-level, vehicle-facing verbs built from the lower layers: a
//! thin composition over [`session`](crate::session), [`obd2`](crate::obd2)
//! and [`uds`](crate::uds) that an application would actually call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::obd2::{self, DtcKind};
use crate::pid::{self, EngineeringValue};
use crate::session::SessionManager;
use crate::{DiagError, DiagResult};

/// PID queried by [`Vehicle::detect`]: the mode 01 "supported PIDs 01-20"
/// bitmask every compliant ECU answers.
const DETECT_PID: u8 = 0x00;

/// Result of [`Vehicle::detect`]'s bus handshake: the supported-PIDs mask
/// every compliant ECU answers, plus the VIN when the ECU also answers mode
/// `09` (not every vehicle on the road does, so this is best-effort).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionReport {
    pub supported_pids: u64,
    pub vin: Option<String>,
}

/// The owning handle to one diagnosed vehicle: the session manager plus the
/// verbs a caller actually wants (read/clear codes, stream live data, read
/// VIN, freeze frame, readiness monitors).
#[derive(Debug)]
pub struct Vehicle {
    session: SessionManager,
}

impl Vehicle {
    /// Wraps an already-started [`SessionManager`]. The adapter handshake
    /// (`ATZ` ... `0100`, see
    /// [`Elm327Driver::initialize`](crate::elm327::Elm327Driver::initialize))
    /// runs once, inside [`SessionManager::start`], before a session manager
    /// is ever handed to a facade — this constructor just takes ownership of
    /// the already-live session.
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    /// Confirms an ECU answers on the bus (mode 01 supported-PIDs bitmask,
    /// PID `00`), then best-effort reads the VIN. The adapter-level `ATZ`
    /// handshake has already run by the time a `Vehicle` exists (see
    /// [`Vehicle::new`]), so this only covers the two bus-facing steps left
    /// in the detection sequence.
    pub fn detect(&self) -> DiagResult<DetectionReport> {
        let supported_pids = match obd2::read_current_data(&self.session, &[DETECT_PID])?.remove(&DETECT_PID) {
            Some(EngineeringValue::Bitfield(mask)) => mask,
            Some(other) => {
                return Err(DiagError::Parse {
                    where_: "facade::detect",
                    reason: format!("unexpected PID 00 decode: {other:?}"),
                })
            }
            None => return Err(DiagError::NoData),
        };
        let vin = match obd2::read_vin(&self.session) {
            Ok(vin) => Some(vin),
            Err(DiagError::NoData) => None,
            Err(e) => return Err(e),
        };
        Ok(DetectionReport { supported_pids, vin })
    }

    /// Reads the requested bucket of diagnostic trouble codes.
    pub fn read_trouble_codes(&self, kind: DtcKind) -> DiagResult<Vec<crate::dtc::Dtc>> {
        obd2::read_trouble_codes(&self.session, kind)
    }

    /// Clears stored and pending trouble codes (mode 04).
    pub fn clear_trouble_codes(&self) -> DiagResult<()> {
        obd2::clear_trouble_codes(&self.session)
    }

    /// Reads the vehicle identification number.
    pub fn read_vin(&self) -> DiagResult<String> {
        obd2::read_vin(&self.session)
    }

    /// Reads one PID's freeze-frame value for `frame_no` (usually `0`, the
    /// frame that triggered the MIL).
    pub fn read_freeze_frame(&self, pid: u8, frame_no: u8) -> DiagResult<EngineeringValue> {
        obd2::read_freeze_frame(&self.session, pid, frame_no)
    }

    /// Reads the readiness monitor bitfield (PID `01`).
    pub fn read_readiness_monitors(&self) -> DiagResult<u32> {
        obd2::read_readiness_monitors(&self.session)
    }

    /// Starts a lazy, cancellable live-data stream over `pids`, polling
    /// every `interval_ms`. Nothing is read from the bus until the returned
    /// iterator is advanced.
    pub fn stream_live_data(&self, pids: Vec<u8>, interval_ms: u64) -> LiveDataStream<'_> {
        LiveDataStream {
            session: &self.session,
            pids,
            interval: Duration::from_millis(interval_ms),
            cancel: Arc::new(AtomicBool::new(false)),
            next_poll: Instant::now(),
        }
    }

    /// Returns a reference to the underlying session manager, for callers
    /// that need direct UDS access alongside these OBD-II verbs.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }
}

/// An infinite, lazily-polled stream of live-data samples, produced by
/// [`Vehicle::stream_live_data`]. Each call to [`Iterator::next`] waits out
/// the configured interval (sleeping the calling thread, matching the
/// cooperative-suspension model of the rest of this crate) then issues one
/// mode 01 request for the configured PIDs.
#[derive(Debug)]
pub struct LiveDataStream<'a> {
    session: &'a SessionManager,
    pids: Vec<u8>,
    interval: Duration,
    cancel: Arc<AtomicBool>,
    next_poll: Instant,
}

impl LiveDataStream<'_> {
    /// A handle that can be cloned out and used from another thread to stop
    /// this stream; the next call to [`Iterator::next`] returns `None`.
    pub fn cancel_handle(&self) -> LiveDataCancelHandle {
        LiveDataCancelHandle {
            cancel: self.cancel.clone(),
        }
    }
}

/// Stops a [`LiveDataStream`] from any thread.
#[derive(Debug, Clone)]
pub struct LiveDataCancelHandle {
    cancel: Arc<AtomicBool>,
}

impl LiveDataCancelHandle {
    /// Requests the associated stream stop after its current sample.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

impl Iterator for LiveDataStream<'_> {
    type Item = DiagResult<HashMap<u8, EngineeringValue>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cancel.load(Ordering::Relaxed) {
            return None;
        }
        let now = Instant::now();
        if now < self.next_poll {
            thread::sleep(self.next_poll - now);
        }
        self.next_poll = Instant::now() + self.interval;
        if self.cancel.load(Ordering::Relaxed) {
            return None;
        }
        Some(obd2::read_current_data(self.session, &self.pids))
    }
}

/// Looks up a PID's registered engineering unit range, for callers building
/// UIs around [`Vehicle::stream_live_data`] output without re-deriving it
/// from the raw bytes.
pub fn pid_descriptor(mode: u8, pid_id: u8) -> Option<&'static pid::PidDescriptor> {
    pid::lookup(mode, pid_id)
}

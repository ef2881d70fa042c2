//! Session manager: single-owner request queue, timeouts, retries,
//! tester-present keep-alive, cooperative cancellation.
//!
//! The manager owns the transport exclusively through a background thread,
//! the same shape the teacher crate uses for its UDS worker thread: a
//! command channel in, a response channel out, one thread looping over both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, trace, warn};

use crate::channel::Transport;
use crate::config::{AdapterConfig, DiagnosticConfig};
use crate::dtc::Nrc;
use crate::elm327::Elm327Driver;
use crate::hex;
use crate::{DiagError, DiagResult};

/// A handle returned by [`SessionManager::submit_async`], usable to cancel
/// the in-flight request.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    cancel_flag: Arc<AtomicBool>,
}

impl RequestHandle {
    /// Requests cancellation of the in-flight request this handle was
    /// issued for. Cooperative: the manager observes this at its next read
    /// poll.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }
}

struct SubmitCommand {
    service: u8,
    payload: Vec<u8>,
    reply: mpsc::Sender<DiagResult<Vec<u8>>>,
    cancel_flag: Arc<AtomicBool>,
}

enum Command {
    Submit(SubmitCommand),
    SetKeepAlive(bool),
}

/// Owns a single transport (via an [`Elm327Driver`]) and serializes all
/// requests onto it from a dedicated background thread.
#[derive(Debug)]
pub struct SessionManager {
    running: Arc<AtomicBool>,
    cmd_tx: mpsc::Sender<Command>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SessionManager {
    /// Initializes `driver` (the adapter's `ATZ`/`0100` handshake, see
    /// [`Elm327Driver::initialize`]) and starts the session manager's
    /// background thread, taking ownership of `driver` once initialization
    /// succeeds. This is the only place a driver is handed to a background
    /// thread, so it is the one chokepoint where initialization can be
    /// enforced for every caller, real or simulated.
    pub fn start<T: Transport + 'static>(
        mut driver: Elm327Driver<T>,
        config: DiagnosticConfig,
    ) -> DiagResult<Self> {
        driver.initialize()?;

        let running = Arc::new(AtomicBool::new(true));
        let running_thread = running.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

        let handle = std::thread::spawn(move || {
            let mut keep_alive = false;
            let mut last_tester_present = Instant::now();
            let interval = Duration::from_millis(config.session.tester_present_interval_ms as u64);

            while running_thread.load(Ordering::Relaxed) {
                match cmd_rx.recv_timeout(Duration::from_millis(20)) {
                    Ok(Command::Submit(cmd)) => {
                        let result = perform_request(
                            &mut driver,
                            &config.adapter,
                            cmd.service,
                            &cmd.payload,
                            &cmd.cancel_flag,
                        );
                        if result.is_ok() {
                            last_tester_present = Instant::now();
                        }
                        let _ = cmd.reply.send(result);
                    }
                    Ok(Command::SetKeepAlive(enabled)) => {
                        keep_alive = enabled;
                        last_tester_present = Instant::now();
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if keep_alive && last_tester_present.elapsed() >= interval {
                    trace!("session: sending tester present keep-alive");
                    // Sub-function 0x80 = suppressPosRspMsgIndicationBit: the
                    // ECU need not answer, so a transient error here is not
                    // fatal to the session.
                    if let Err(e) = driver.request("3E80") {
                        warn!("session: tester present keep-alive failed: {e}");
                    }
                    last_tester_present = Instant::now();
                }
            }
        });

        Ok(Self {
            running,
            cmd_tx,
            handle: Some(handle),
        })
    }

    /// Submits a request and blocks until it completes, is cancelled, or
    /// exceeds `deadline`. `service` is the request SID (for NRC matching);
    /// `payload` is the full request bytes including the SID.
    pub fn submit(&self, payload: &[u8], deadline: Duration) -> DiagResult<Vec<u8>> {
        let (handle, reply_rx) = self.submit_async(payload)?;
        match reply_rx.recv_timeout(deadline) {
            Ok(result) => result,
            Err(_) => {
                handle.cancel();
                // Drain the cancellation acknowledgement so the manager
                // realigns before the next submit, but don't block forever
                // waiting for it.
                let _ = reply_rx.recv_timeout(Duration::from_millis(500));
                Err(DiagError::Timeout {
                    elapsed_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Submits a request without blocking, returning a cancellation handle
    /// and a channel the caller can await on its own schedule.
    pub fn submit_async(
        &self,
        payload: &[u8],
    ) -> DiagResult<(RequestHandle, mpsc::Receiver<DiagResult<Vec<u8>>>)> {
        if payload.is_empty() {
            return Err(DiagError::InvalidArgument { param: "payload" });
        }
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let (reply_tx, reply_rx) = mpsc::channel();
        self.cmd_tx
            .send(Command::Submit(SubmitCommand {
                service: payload[0],
                payload: payload.to_vec(),
                reply: reply_tx,
                cancel_flag: cancel_flag.clone(),
            }))
            .map_err(|_| DiagError::TransportDisconnected)?;
        Ok((RequestHandle { cancel_flag }, reply_rx))
    }

    /// Starts tester-present keep-alive, interleaved between user requests
    /// at `config.session.tester_present_interval_ms`.
    pub fn keep_alive_start(&self) {
        let _ = self.cmd_tx.send(Command::SetKeepAlive(true));
    }

    /// Stops tester-present keep-alive.
    pub fn keep_alive_stop(&self) {
        let _ = self.cmd_tx.send(Command::SetKeepAlive(false));
    }

    /// Whether the background thread is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("session: background thread panicked");
            }
        }
    }
}

/// Performs one request end to end: hex-encodes `payload`, sends it,
/// applies the `0x78` response-pending loop and the transient-error retry
/// policy, and returns the first positive or fatal-negative response.
fn perform_request<T: Transport>(
    driver: &mut Elm327Driver<T>,
    config: &AdapterConfig,
    service: u8,
    payload: &[u8],
    cancel_flag: &Arc<AtomicBool>,
) -> DiagResult<Vec<u8>> {
    let hex_payload = hex::bytes_to_ascii_hex(payload);
    let mut retries_left = config.max_retries;

    loop {
        match driver.request_lines_cancellable(&hex_payload, cancel_flag) {
            Ok(lines) => return resolve_pending(lines, service, config.max_pending_repeats),
            Err(DiagError::Cancelled) => return Err(DiagError::Cancelled),
            Err(e) if is_transient(&e) && retries_left > 0 => {
                let attempt = config.max_retries - retries_left;
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt));
                warn!("session: transient error {e}, retrying in {backoff:?}");
                std::thread::sleep(backoff);
                retries_left -= 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Walks the lines of one adapter reply, absorbing any leading `0x78`
/// "response pending" negative responses (re-arming the deadline is the
/// caller's responsibility via its own overall timeout) and returning the
/// first line that is a genuine positive or fatal-negative response.
fn resolve_pending(lines: Vec<Vec<u8>>, service: u8, max_pending_repeats: u32) -> DiagResult<Vec<u8>> {
    let mut pending_seen = 0;
    for line in lines {
        if line.len() >= 3 && line[0] == 0x7F {
            let nrc = Nrc::from(line[2]);
            if nrc == Nrc::RequestCorrectlyReceivedResponsePending {
                pending_seen += 1;
                if pending_seen > max_pending_repeats {
                    return Err(DiagError::Timeout { elapsed_ms: 0 });
                }
                continue;
            }
            return Err(negative_response_error(line[1], nrc));
        }
        return Ok(line);
    }
    Err(DiagError::NegativeResponse {
        service,
        nrc: Nrc::RequestCorrectlyReceivedResponsePending,
    })
}

fn negative_response_error(service: u8, nrc: Nrc) -> DiagError {
    match nrc {
        Nrc::SecurityAccessDenied => DiagError::SecurityAccessDenied,
        Nrc::InvalidKey => DiagError::InvalidKey,
        Nrc::ConditionsNotCorrect => DiagError::ConditionsNotCorrect,
        Nrc::RequestOutOfRange => DiagError::RequestOutOfRange,
        other => DiagError::NegativeResponse { service, nrc: other },
    }
}

fn is_transient(e: &DiagError) -> bool {
    matches!(
        e,
        DiagError::BusInitError | DiagError::Timeout { .. } | DiagError::IsoTpSequenceError
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelResult, ConnectionState};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedTransport {
        replies: Mutex<VecDeque<Vec<u8>>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|s| s.as_bytes().to_vec()).collect()),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn connect(&mut self) -> ChannelResult<()> {
            Ok(())
        }
        fn disconnect(&mut self) -> ChannelResult<()> {
            Ok(())
        }
        fn write(&mut self, _bytes: &[u8]) -> ChannelResult<()> {
            Ok(())
        }
        fn read(&mut self, _max_bytes: usize, _deadline: Duration) -> ChannelResult<Vec<u8>> {
            Ok(self.replies.lock().unwrap().pop_front().unwrap_or_default())
        }
        fn state(&self) -> ConnectionState {
            ConnectionState::Connected
        }
    }

    #[test]
    fn resolves_response_pending_then_positive() {
        let lines = vec![
            vec![0x7F, 0x22, 0x78],
            vec![0x7F, 0x22, 0x78],
            vec![0x62, 0xF1, 0x90, 0x31, 0x32, 0x33],
        ];
        let result = resolve_pending(lines, 0x22, 10).unwrap();
        assert_eq!(result, vec![0x62, 0xF1, 0x90, 0x31, 0x32, 0x33]);
    }

    #[test]
    fn fatal_negative_response_surfaces_immediately() {
        let lines = vec![vec![0x7F, 0x14, 0x22]];
        let err = resolve_pending(lines, 0x14, 10).unwrap_err();
        assert!(matches!(err, DiagError::ConditionsNotCorrect));
    }

    #[test]
    fn submit_round_trips_over_background_thread() {
        let transport = ScriptedTransport::new(vec![
            "ELM327 v1.5\r\r>",
            "OK\r\r>",
            "OK\r\r>",
            "OK\r\r>",
            "OK\r\r>",
            "OK\r\r>",
            "41 00 00 00 00 01\r\r>",
            "6\r\r>",
            "12.3V\r\r>",
            "41 0C 1A F8\r\r>",
        ]);
        let driver = Elm327Driver::new(transport, AdapterConfig::default());
        let manager = SessionManager::start(driver, DiagnosticConfig::default()).unwrap();
        let response = manager.submit(&[0x01, 0x0C], Duration::from_secs(2)).unwrap();
        assert_eq!(response, vec![0x41, 0x0C, 0x1A, 0xF8]);
    }

    #[test]
    fn start_surfaces_adapter_init_failure() {
        let transport = ScriptedTransport::new(vec!["NO DATA\r\r>"]);
        let driver = Elm327Driver::new(transport, AdapterConfig::default());
        let err = SessionManager::start(driver, DiagnosticConfig::default()).unwrap_err();
        assert!(matches!(err, DiagError::AdapterInitFailed { .. }));
    }
}

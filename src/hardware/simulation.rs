//! An in-memory [`Transport`] used by this crate's own test suite (and
//! available to downstream users exercising the stack without hardware).
//!
//! Requests are scripted by their exact ELM327 command line; [`write`]
//! looks the line up and queues the scripted reply (terminated with the
//! `>` prompt) for the next [`read`]. An unscripted request yields `NO
//! DATA`, matching how a real adapter behaves when the ECU doesn't answer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::{ChannelResult, ConnectionState, Transport};

/// An in-memory, script-driven stand-in for a real ELM327/serial link.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
    state: ConnectionState,
    scripts: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
    pending: Arc<Mutex<VecDeque<u8>>>,
}

impl SimulatedTransport {
    /// Creates a transport with no scripted responses.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            scripts: Arc::new(Mutex::new(HashMap::new())),
            pending: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Scripts `response` (without the trailing prompt) to be returned the
    /// next time `request` (an ELM327 command line, without `\r`) is
    /// written.
    pub fn script(&self, request: &str, response: &str) {
        let mut framed = response.as_bytes().to_vec();
        framed.push(b'\r');
        framed.push(b'>');
        self.scripts
            .lock()
            .unwrap()
            .insert(request.as_bytes().to_vec(), framed);
    }

    /// Scripts a multi-line raw response: each element of `lines` becomes
    /// one `\r`-terminated adapter line (e.g. a per-ECU header line in a
    /// multi-frame ISO-TP exchange), exactly as real ELM327 firmware emits
    /// them with `ATH1` set.
    pub fn script_lines(&self, request: &str, lines: &[&str]) {
        self.script(request, &lines.join("\r"));
    }
}

impl Default for SimulatedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self) -> ChannelResult<()> {
        self.state = ConnectionState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) -> ChannelResult<()> {
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        let line: Vec<u8> = bytes
            .iter()
            .copied()
            .filter(|b| *b != b'\r' && *b != b'\n')
            .collect();
        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get(&line)
            .cloned()
            .unwrap_or_else(|| b"NO DATA\r>".to_vec());
        self.pending.lock().unwrap().extend(reply);
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, _deadline: Duration) -> ChannelResult<Vec<u8>> {
        let mut pending = self.pending.lock().unwrap();
        let take = max_bytes.min(pending.len());
        Ok(pending.drain(..take).collect())
    }

    fn state(&self) -> ConnectionState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_request_echoes_back_framed_response() {
        let mut transport = SimulatedTransport::new();
        transport.connect().unwrap();
        transport.script("010C", "41 0C 1A F8");
        transport.write(b"010C\r").unwrap();
        let bytes = transport.read(64, Duration::from_millis(10)).unwrap();
        assert_eq!(bytes, b"41 0C 1A F8\r>".to_vec());
    }

    #[test]
    fn unscripted_request_yields_no_data() {
        let mut transport = SimulatedTransport::new();
        transport.connect().unwrap();
        transport.write(b"0199\r").unwrap();
        let bytes = transport.read(64, Duration::from_millis(10)).unwrap();
        assert_eq!(bytes, b"NO DATA\r>".to_vec());
    }
}

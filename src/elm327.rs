//! ELM327 AT-command driver: adapter initialization, protocol negotiation,
//! and prompt-based request/response framing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, trace, warn};

use crate::channel::Transport;
use crate::config::AdapterConfig;
use crate::hex;
use crate::isotp::{IsoTpEngine, IsoTpFrame, ReceiveOutcome};
use crate::protocol::ProtocolKind;
use crate::{DiagError, DiagResult};

/// Information gathered from the adapter during initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterInfo {
    /// Firmware banner reported by `ATZ`, e.g. `"ELM327 v1.5"`.
    pub firmware_version: String,
    /// Protocol the adapter settled on.
    pub elected_protocol: ProtocolKind,
    /// Whether the adapter is currently using 29-bit CAN IDs.
    pub supports_can_29bit: bool,
    /// Whether the adapter supports extended (multi-frame) addressing.
    pub supports_extended_addressing: bool,
    /// Adapter-reported bus voltage from `ATRV`, if parseable.
    pub negotiated_baud: Option<u32>,
}

const PROMPT: u8 = b'>';
const READ_CHUNK: usize = 256;
const READ_STEP: Duration = Duration::from_millis(50);

/// Drives an ELM327-class adapter over any [`Transport`].
pub struct Elm327Driver<T: Transport> {
    transport: T,
    config: AdapterConfig,
}

impl<T: Transport> std::fmt::Debug for Elm327Driver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Elm327Driver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Elm327Driver<T> {
    /// Wraps an already-connected (or connectable) transport.
    pub fn new(transport: T, config: AdapterConfig) -> Self {
        Self { transport, config }
    }

    /// Runs the deterministic initialization sequence (§4.5) and returns the
    /// resulting [`AdapterInfo`]. Any step failing aborts with
    /// [`DiagError::AdapterInitFailed`].
    pub fn initialize(&mut self) -> DiagResult<AdapterInfo> {
        self.transport.connect().map_err(DiagError::Channel)?;

        let banner = self.send_command("ATZ")?;
        if !banner.to_uppercase().contains("ELM327") {
            return Err(DiagError::AdapterInitFailed {
                step: "ATZ",
                observed: banner,
            });
        }

        self.expect_ok("ATE0")?;
        self.expect_ok("ATL0")?;
        self.expect_ok("ATS0")?;
        self.expect_ok("ATH1")?;
        self.expect_ok("ATSP 0")?;

        if let Some(protocol) = self.config.preferred_protocol {
            let cmd = format!("ATSP {}", protocol_atsp_arg(protocol));
            self.expect_ok(&cmd)?;
        }

        // Triggers protocol negotiation.
        let _ = self.send_command("0100")?;

        let elected_protocol = self.read_elected_protocol()?;

        let rv = self.send_command("ATRV").unwrap_or_default();
        let negotiated_baud = parse_voltage_as_milli(&rv);

        let supports_can_29bit = elected_protocol.default_header_bits() == Some(29);

        let info = AdapterInfo {
            firmware_version: banner,
            elected_protocol,
            supports_can_29bit,
            supports_extended_addressing: elected_protocol.is_can(),
            negotiated_baud,
        };
        debug!("elm327: initialized with {info:?}");
        Ok(info)
    }

    /// Sets the explicit CAN header (`ATSH <hex>`) used for subsequent
    /// requests, for targeting a specific ECU instead of relying on
    /// whichever one answers first.
    pub fn set_header(&mut self, header: &str) -> DiagResult<()> {
        self.expect_ok(&format!("ATSH {header}"))?;
        Ok(())
    }

    /// Toggles CAN auto-formatting (`ATCAF1`/`ATCAF0`).
    pub fn set_can_auto_format(&mut self, enabled: bool) -> DiagResult<()> {
        self.expect_ok(if enabled { "ATCAF1" } else { "ATCAF0" })?;
        Ok(())
    }

    /// Sets the adapter's response timeout in 4ms units (`ATST hh`).
    pub fn set_timeout(&mut self, hex_timeout: u8) -> DiagResult<()> {
        self.expect_ok(&format!("ATST {hex_timeout:02X}"))?;
        Ok(())
    }

    /// Allows reception of CAN frames without the usual 7-data-byte padding
    /// assumption (`ATAL`).
    pub fn allow_long_messages(&mut self) -> DiagResult<()> {
        self.expect_ok("ATAL")?;
        Ok(())
    }

    fn expect_ok(&mut self, cmd: &str) -> DiagResult<String> {
        let resp = self.send_command(cmd)?;
        let upper = resp.to_uppercase();
        if upper.contains("OK") || upper.is_empty() {
            Ok(resp)
        } else if let Some(sentinel) = classify_sentinel(&upper) {
            Err(sentinel)
        } else {
            // Some adapters don't echo OK for every command; treat any
            // non-sentinel response as acceptance.
            Ok(resp)
        }
    }

    fn read_elected_protocol(&mut self) -> DiagResult<ProtocolKind> {
        if let Ok(resp) = self.send_command("ATDPN") {
            let trimmed = resp.trim().trim_start_matches('A');
            if let Ok(id) = trimmed.parse::<u8>() {
                if let Some(p) = ProtocolKind::from_elm_numeric_id(id) {
                    return Ok(p);
                }
            }
        }
        let resp = self.send_command("ATDP")?;
        ProtocolKind::from_atdp_string(&resp).ok_or(DiagError::NoProtocolNegotiated)
    }

    /// Sends one AT command or OBD request line, terminated with `\r`, and
    /// reads until the adapter emits the prompt character.
    pub fn send_command(&mut self, cmd: &str) -> DiagResult<String> {
        trace!("elm327: >> {cmd}");
        let mut line = Vec::with_capacity(cmd.len() + 1);
        line.extend_from_slice(cmd.as_bytes());
        line.push(b'\r');
        self.transport.write(&line).map_err(DiagError::Channel)?;

        let raw = self.read_until_prompt()?;
        let cleaned = clean_response(&raw, cmd);
        trace!("elm327: << {cleaned:?}");
        Ok(cleaned)
    }

    /// Sends an OBD/UDS request as a hex string (e.g. `"010C"`) and returns
    /// the decoded response bytes, handling the `SEARCHING...` transient and
    /// the remaining sentinel strings.
    pub fn request(&mut self, hex_payload: &str) -> DiagResult<Vec<u8>> {
        let mut response = self.send_command(hex_payload)?;
        if response.to_uppercase().contains("SEARCHING") {
            warn!("elm327: SEARCHING..., retrying once");
            response = self.read_until_prompt_cleaned(hex_payload)?;
        }
        let upper = response.to_uppercase();
        if let Some(err) = classify_sentinel(&upper) {
            return Err(err);
        }
        hex::ascii_hex_to_bytes(&response).map_err(DiagError::from)
    }

    fn read_until_prompt_cleaned(&mut self, cmd: &str) -> DiagResult<String> {
        let raw = self.read_until_prompt()?;
        Ok(clean_response(&raw, cmd))
    }

    /// Like [`Elm327Driver::request`], but returns each line of the adapter's
    /// reply as a separately-decoded byte vector rather than one joined
    /// response. Used by the service layer's `0x78` response-pending loop:
    /// an adapter that is waiting on a slow ECU emits one `7F <sid> 78` line
    /// per pending notification, all before the final prompt, so the whole
    /// sequence arrives in a single read.
    pub fn request_lines(&mut self, hex_payload: &str) -> DiagResult<Vec<Vec<u8>>> {
        trace!("elm327: >> {hex_payload}");
        let mut line = Vec::with_capacity(hex_payload.len() + 1);
        line.extend_from_slice(hex_payload.as_bytes());
        line.push(b'\r');
        self.transport.write(&line).map_err(DiagError::Channel)?;

        let mut raw = self.read_until_prompt()?;
        if String::from_utf8_lossy(&raw).to_uppercase().contains("SEARCHING") {
            warn!("elm327: SEARCHING..., retrying once");
            raw = self.read_until_prompt()?;
        }

        decode_response_lines(&raw, hex_payload)
    }

    fn read_until_prompt(&mut self) -> DiagResult<Vec<u8>> {
        let mut buf = Vec::new();
        loop {
            let chunk = self
                .transport
                .read(READ_CHUNK, READ_STEP)
                .map_err(DiagError::Channel)?;
            if chunk.is_empty() {
                continue;
            }
            buf.extend_from_slice(&chunk);
            if buf.contains(&PROMPT) {
                return Ok(buf);
            }
        }
    }

    /// Like [`Elm327Driver::request_lines`], but polled cooperatively: if
    /// `cancel` becomes `true` while waiting for the prompt, the read loop
    /// stops, drains whatever arrives up to the next prompt to keep the
    /// stream aligned, and returns [`DiagError::Cancelled`] instead of the
    /// response.
    pub fn request_lines_cancellable(
        &mut self,
        hex_payload: &str,
        cancel: &AtomicBool,
    ) -> DiagResult<Vec<Vec<u8>>> {
        let mut line = Vec::with_capacity(hex_payload.len() + 1);
        line.extend_from_slice(hex_payload.as_bytes());
        line.push(b'\r');
        self.transport.write(&line).map_err(DiagError::Channel)?;

        let mut raw = Vec::new();
        loop {
            if cancel.load(Ordering::Relaxed) {
                // Drain once more to realign with the next prompt, then bail.
                let _ = self.read_until_prompt();
                return Err(DiagError::Cancelled);
            }
            let chunk = self
                .transport
                .read(READ_CHUNK, READ_STEP)
                .map_err(DiagError::Channel)?;
            if chunk.is_empty() {
                continue;
            }
            raw.extend_from_slice(&chunk);
            if raw.contains(&PROMPT) {
                break;
            }
        }

        decode_response_lines(&raw, hex_payload)
    }

    /// Releases the underlying transport.
    pub fn into_transport(self) -> T {
        self.transport
    }
}

/// Strips the prompt, line endings, and any leading echo of `cmd`, then
/// joins the remaining lines with `\r` preserved as line breaks collapsed to
/// nothing (headers stay on one logical string for hex parsing downstream).
fn clean_response(raw: &[u8], cmd: &str) -> String {
    let text = String::from_utf8_lossy(raw);
    let mut out = String::new();
    for line in text.split(['\r', '\n']) {
        let line = line.trim();
        if line.is_empty() || line == ">" {
            continue;
        }
        if line.eq_ignore_ascii_case(cmd) {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(line);
    }
    out.trim().to_string()
}

/// Splits one adapter reply into its logical response lines, stripping any
/// per-line CAN-ID header and reassembling ISO-TP first/consecutive frames
/// through an [`IsoTpEngine`]. `ATH1` (headers on) is part of the fixed
/// init sequence, so a header-bearing CAN line is identified without
/// tracking adapter mode separately: a CAN-ID header token always has an
/// odd hex-digit count (3 digits for an 11-bit ID), which can never be a
/// whole number of data bytes, while every data byte is two hex digits.
/// Non-headered lines (non-CAN protocols, or single-frame ELM responses
/// with no PCI byte at all) are returned unchanged, as before.
fn decode_response_lines(raw: &[u8], hex_payload: &str) -> DiagResult<Vec<Vec<u8>>> {
    let text = String::from_utf8_lossy(raw);
    let mut lines = Vec::new();
    let mut isotp = IsoTpEngine::new(0, 0);
    for raw_line in text.split(['\r', '\n']) {
        let line = raw_line.trim();
        if line.is_empty() || line == ">" || line.eq_ignore_ascii_case(hex_payload) {
            continue;
        }
        let upper = line.to_uppercase();
        if let Some(err) = classify_sentinel(&upper) {
            return Err(err);
        }

        match strip_can_header(line) {
            Some(rest) => {
                if rest.is_empty() {
                    continue;
                }
                let payload = hex::ascii_hex_to_bytes(rest).map_err(DiagError::from)?;
                let frame = IsoTpFrame::from_can_payload(&payload)?;
                match isotp.on_rx_frame(frame)? {
                    ReceiveOutcome::Complete(data) => lines.push(data),
                    ReceiveOutcome::Pending | ReceiveOutcome::EmitFlowControl(_) => {}
                }
            }
            None => lines.push(hex::ascii_hex_to_bytes(line).map_err(DiagError::from)?),
        }
    }
    if lines.is_empty() {
        return Err(DiagError::NoData);
    }
    Ok(lines)
}

/// Returns `Some(rest)` (the line with its header token removed, possibly
/// empty) if `line`'s first whitespace-separated token looks like a CAN-ID
/// header, `None` if the whole line should be treated as plain data bytes.
fn strip_can_header(line: &str) -> Option<&str> {
    let mut parts = line.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    if !first.is_empty() && first.len() % 2 == 1 && first.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(parts.next().unwrap_or("").trim())
    } else {
        None
    }
}

fn classify_sentinel(upper: &str) -> Option<DiagError> {
    if upper.contains("UNABLE TO CONNECT") {
        Some(DiagError::AdapterInitFailed {
            step: "connect",
            observed: upper.to_string(),
        })
    } else if upper.contains("BUS INIT") {
        Some(DiagError::BusInitError)
    } else if upper.contains("CAN ERROR") {
        Some(DiagError::CanError)
    } else if upper.contains("BUFFER FULL") {
        Some(DiagError::BufferFull)
    } else if upper.contains("STOPPED") {
        Some(DiagError::Stopped)
    } else if upper.contains("NO DATA") {
        Some(DiagError::NoData)
    } else if upper.trim() == "?" {
        Some(DiagError::Parse {
            where_: "elm327",
            reason: "adapter did not understand the command".into(),
        })
    } else {
        None
    }
}

fn protocol_atsp_arg(protocol: ProtocolKind) -> String {
    format!("{}", protocol.elm_numeric_id())
}

fn parse_voltage_as_milli(resp: &str) -> Option<u32> {
    let digits: String = resp.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    let volts: f64 = digits.parse().ok()?;
    Some((volts * 1000.0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelResult, ConnectionState};
    use std::collections::VecDeque;

    /// An in-memory transport that replies with scripted frames, one per
    /// `write` call, ignoring what was actually written beyond logging it.
    struct ScriptedTransport {
        replies: VecDeque<Vec<u8>>,
        sent: Vec<String>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: replies.into_iter().map(|s| s.as_bytes().to_vec()).collect(),
                sent: Vec::new(),
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
        fn write(&mut self, bytes: &[u8]) -> ChannelResult<()> {
            self.sent.push(String::from_utf8_lossy(bytes).to_string());
            Ok(())
        }
        fn read(&mut self, _max_bytes: usize, _deadline: Duration) -> ChannelResult<Vec<u8>> {
            Ok(self.replies.pop_front().unwrap_or_default())
        }
        fn state(&self) -> ConnectionState {
            ConnectionState::Connected
        }
    }

    #[test]
    fn initializes_over_scripted_adapter() {
        let transport = ScriptedTransport::new(vec![
            "ELM327 v1.5\r\r>",
            "OK\r\r>",
            "OK\r\r>",
            "OK\r\r>",
            "OK\r\r>",
            "OK\r\r>",
            "41 0C 00 00\r\r>",
            "6\r\r>",
            "12.3V\r\r>",
        ]);
        let mut driver = Elm327Driver::new(transport, AdapterConfig::default());
        let info = driver.initialize().unwrap();
        assert_eq!(info.elected_protocol, ProtocolKind::Iso15765Can11_500);
        assert!(info.firmware_version.to_uppercase().contains("ELM327"));
        assert_eq!(info.negotiated_baud, Some(12_300));
    }

    #[test]
    fn request_decodes_rpm_scenario() {
        let transport = ScriptedTransport::new(vec!["41 0C 1A F8\r\r>"]);
        let mut driver = Elm327Driver::new(transport, AdapterConfig::default());
        let bytes = driver.request("010C").unwrap();
        assert_eq!(bytes, vec![0x41, 0x0C, 0x1A, 0xF8]);
    }

    #[test]
    fn no_data_sentinel_surfaces_as_error() {
        let transport = ScriptedTransport::new(vec!["NO DATA\r\r>"]);
        let mut driver = Elm327Driver::new(transport, AdapterConfig::default());
        assert!(matches!(driver.request("0902"), Err(DiagError::NoData)));
    }

    #[test]
    fn request_lines_splits_pending_notifications() {
        let transport = ScriptedTransport::new(vec![
            "7F 22 78\r7F 22 78\r62 F1 90 31 32 33\r\r>",
        ]);
        let mut driver = Elm327Driver::new(transport, AdapterConfig::default());
        let lines = driver.request_lines("22F190").unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], vec![0x62, 0xF1, 0x90, 0x31, 0x32, 0x33]);
    }

    #[test]
    fn searching_transient_is_retried_once() {
        let transport = ScriptedTransport::new(vec!["SEARCHING...\r\r>", "41 0C 00 64\r\r>"]);
        let mut driver = Elm327Driver::new(transport, AdapterConfig::default());
        let bytes = driver.request("010C").unwrap();
        assert_eq!(bytes, vec![0x41, 0x0C, 0x00, 0x64]);
    }
}

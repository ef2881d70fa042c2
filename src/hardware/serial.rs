//! Serial (USB/Bluetooth SPP) transport to an ELM327-compatible adapter.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use crate::channel::{ChannelError, ChannelResult, ConnectionState, Transport};

/// Default baud rate most ELM327 clones power up at before `ATBRD`/auto-baud
/// negotiation.
const DEFAULT_BAUD_RATE: u32 = 38_400;

/// A serial link to an ELM327-compatible adapter.
pub struct SerialElmTransport {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn serialport::SerialPort>>,
    state: ConnectionState,
}

impl std::fmt::Debug for SerialElmTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialElmTransport")
            .field("path", &self.path)
            .field("baud_rate", &self.baud_rate)
            .field("state", &self.state)
            .finish()
    }
}

impl SerialElmTransport {
    /// Creates a transport for the serial device at `path` (e.g.
    /// `/dev/ttyUSB0`, `COM3`) at the adapter's default baud rate.
    pub fn new(path: impl Into<String>) -> Self {
        Self::with_baud_rate(path, DEFAULT_BAUD_RATE)
    }

    /// Creates a transport at an explicit `baud_rate`, for adapters that
    /// don't power up at [`DEFAULT_BAUD_RATE`].
    pub fn with_baud_rate(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
            state: ConnectionState::Disconnected,
        }
    }
}

impl Transport for SerialElmTransport {
    fn connect(&mut self) -> ChannelResult<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(Duration::from_millis(10))
            .parity(serialport::Parity::None)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .open()
            .map_err(|e| ChannelError::ApiError {
                api_name: "serialport",
                code: -1,
                desc: e.to_string(),
            })?;
        self.port = Some(port);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) -> ChannelResult<()> {
        self.port = None;
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        let port = self.port.as_mut().ok_or(ChannelError::InterfaceNotOpen)?;
        port.write_all(bytes)?;
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, deadline: Duration) -> ChannelResult<Vec<u8>> {
        let port = self.port.as_mut().ok_or(ChannelError::InterfaceNotOpen)?;
        let start = Instant::now();
        let mut out = Vec::new();
        let mut chunk = vec![0u8; max_bytes.max(1)];
        while start.elapsed() < deadline && out.len() < max_bytes {
            match port.read(&mut chunk) {
                Ok(0) => continue,
                Ok(n) => {
                    out.extend_from_slice(&chunk[..n]);
                    if out.contains(&b'>') {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(ChannelError::Io(e)),
            }
        }
        Ok(out)
    }

    fn state(&self) -> ConnectionState {
        self.state.clone()
    }
}

//! Native ISO-TP over a Linux `SocketCAN` interface.
//!
//! This backend speaks ISO-TP directly through the kernel's `can-isotp`
//! module rather than through an ELM327 AT-command adapter: the kernel
//! handles frame segmentation and flow control, so [`SocketCanTransport`]
//! exposes already-reassembled payloads and the [`isotp`](crate::isotp)
//! engine in this crate is not used on this path.

use std::time::{Duration, Instant};

use socketcan_isotp::{ExtendedId, FlowControlOptions, Id, IsoTpBehaviour, IsoTpOptions, IsoTpSocket, LinkLayerOptions, StandardId};

use crate::channel::{ChannelError, ChannelResult, ConnectionState, IsoTpSettings, Transport};

/// Native SocketCAN ISO-TP transport bound to one (tx, rx) CAN ID pair on
/// one interface (e.g. `can0`).
pub struct SocketCanTransport {
    interface: String,
    tx_id: u32,
    rx_id: u32,
    settings: IsoTpSettings,
    socket: Option<IsoTpSocket>,
    state: ConnectionState,
}

impl std::fmt::Debug for SocketCanTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketCanTransport")
            .field("interface", &self.interface)
            .field("tx_id", &self.tx_id)
            .field("rx_id", &self.rx_id)
            .field("state", &self.state)
            .finish()
    }
}

impl SocketCanTransport {
    /// Creates a transport on `interface` (e.g. `"can0"`) addressing `tx_id`
    /// (the ID this side transmits on) and `rx_id` (the ID this side
    /// listens on), with ISO-TP framing parameters from `settings`.
    pub fn new(interface: impl Into<String>, tx_id: u32, rx_id: u32, settings: IsoTpSettings) -> Self {
        Self {
            interface: interface.into(),
            tx_id,
            rx_id,
            settings,
            socket: None,
            state: ConnectionState::Disconnected,
        }
    }

    fn socket_mut(&mut self) -> ChannelResult<&mut IsoTpSocket> {
        self.socket.as_mut().ok_or(ChannelError::InterfaceNotOpen)
    }
}

impl Transport for SocketCanTransport {
    fn connect(&mut self) -> ChannelResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }
        let mut flags = IsoTpBehaviour::empty();
        if self.settings.pad_frame {
            flags |= IsoTpBehaviour::CAN_ISOTP_TX_PADDING | IsoTpBehaviour::CAN_ISOTP_RX_PADDING;
        }
        let isotp_opts = IsoTpOptions::new(flags, Duration::from_millis(0), 0, 0xCC, 0xCC, 0)
            .map_err(|e| ChannelError::ApiError {
                api_name: "socketCAN-isotp",
                code: -1,
                desc: format!("{e:?}"),
            })?;
        let fc_opts = FlowControlOptions::new(self.settings.block_size, self.settings.st_min_ms, 0);
        let (tx, rx) = if self.settings.can_use_ext_addr {
            (
                Id::Extended(unsafe { ExtendedId::new_unchecked(self.tx_id) }),
                Id::Extended(unsafe { ExtendedId::new_unchecked(self.rx_id) }),
            )
        } else {
            (
                Id::Standard(unsafe { StandardId::new_unchecked(self.tx_id as u16) }),
                Id::Standard(unsafe { StandardId::new_unchecked(self.rx_id as u16) }),
            )
        };
        let socket = IsoTpSocket::open_with_opts(
            &self.interface,
            rx,
            tx,
            Some(isotp_opts),
            Some(fc_opts),
            Some(LinkLayerOptions::default()),
        )?;
        socket.set_nonblocking(true)?;
        self.socket = Some(socket);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    fn disconnect(&mut self) -> ChannelResult<()> {
        self.socket = None;
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> ChannelResult<()> {
        self.socket_mut()?.write(bytes)?;
        Ok(())
    }

    fn read(&mut self, _max_bytes: usize, deadline: Duration) -> ChannelResult<Vec<u8>> {
        let start = Instant::now();
        let socket = self.socket_mut()?;
        loop {
            match socket.read() {
                Ok(frame) => return Ok(frame.to_vec()),
                Err(_) if start.elapsed() < deadline => continue,
                Err(_) => return Ok(Vec::new()),
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.state.clone()
    }
}

impl From<socketcan_isotp::Error> for ChannelError {
    fn from(e: socketcan_isotp::Error) -> Self {
        ChannelError::ApiError {
            api_name: "socketCAN-isotp",
            code: -1,
            desc: format!("{e:?}"),
        }
    }
}

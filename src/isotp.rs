//! ISO 15765-2 (ISO-TP) segmenter/reassembler.
//!
//! One [`IsoTpEngine`] tracks the state machine for a single (tx_id, rx_id)
//! pair. It turns one logical message into a sequence of [`IsoTpFrame`]s on
//! the way out, and turns a sequence of received frames back into a message
//! on the way in, enforcing flow control (block size / separation time) in
//! both directions.

use std::time::Duration;

use log::{debug, trace, warn};

use crate::DiagError;

/// Maximum ISO-TP message length (12-bit length field).
pub const MAX_MESSAGE_LEN: usize = 4095;

const SINGLE_FRAME_MAX: usize = 7;
const FIRST_FRAME_HEAD: usize = 6;
const CONSECUTIVE_FRAME_MAX: usize = 7;

/// Flow control status reported in a [`IsoTpFrame::FlowControl`] frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlowStatus {
    /// Clear to send.
    ContinueToSend,
    /// Pause transmission; wait for another flow control frame.
    Wait,
    /// Receiver cannot accept the message; abort transmission.
    Overflow,
}

/// A single ISO-TP protocol data unit, after PCI decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsoTpFrame {
    /// PCI `0x0N`: a complete message of `data.len()` bytes (1..=7).
    Single { data: Vec<u8> },
    /// PCI `0x1N NN`: first frame of a multi-frame message.
    First { total_length: u16, head_data: Vec<u8> },
    /// PCI `0x2N`: a consecutive frame, `sequence_nibble` in 0..=15.
    Consecutive { sequence_nibble: u8, data: Vec<u8> },
    /// PCI `0x3N`: flow control.
    FlowControl {
        status: FlowStatus,
        block_size: u8,
        separation_time_ms: u8,
    },
}

impl IsoTpFrame {
    /// Decodes a raw 8-byte (or shorter, for non-padded buses) CAN payload
    /// into an [`IsoTpFrame`] by its PCI nibble.
    pub fn from_can_payload(payload: &[u8]) -> Result<Self, DiagError> {
        if payload.is_empty() {
            return Err(DiagError::Parse {
                where_: "isotp::pci",
                reason: "empty CAN payload".into(),
            });
        }
        let pci_type = payload[0] >> 4;
        match pci_type {
            0x0 => {
                let len = (payload[0] & 0x0F) as usize;
                let data = payload.get(1..).unwrap_or(&[]);
                if data.len() < len {
                    return Err(DiagError::Parse {
                        where_: "isotp::single_frame",
                        reason: format!("declared length {len} exceeds payload"),
                    });
                }
                Ok(IsoTpFrame::Single {
                    data: data[..len].to_vec(),
                })
            }
            0x1 => {
                if payload.len() < 2 {
                    return Err(DiagError::Parse {
                        where_: "isotp::first_frame",
                        reason: "missing length byte".into(),
                    });
                }
                let total_length = (((payload[0] & 0x0F) as u16) << 8) | payload[1] as u16;
                Ok(IsoTpFrame::First {
                    total_length,
                    head_data: payload[2..].to_vec(),
                })
            }
            0x2 => {
                let sequence_nibble = payload[0] & 0x0F;
                Ok(IsoTpFrame::Consecutive {
                    sequence_nibble,
                    data: payload[1..].to_vec(),
                })
            }
            0x3 => {
                let status = match payload[0] & 0x0F {
                    0 => FlowStatus::ContinueToSend,
                    1 => FlowStatus::Wait,
                    2 => FlowStatus::Overflow,
                    other => {
                        return Err(DiagError::Parse {
                            where_: "isotp::flow_control",
                            reason: format!("unknown flow status {other}"),
                        })
                    }
                };
                let block_size = payload.get(1).copied().unwrap_or(0);
                let separation_time_ms = normalize_st_min(payload.get(2).copied().unwrap_or(0));
                Ok(IsoTpFrame::FlowControl {
                    status,
                    block_size,
                    separation_time_ms,
                })
            }
            other => Err(DiagError::Parse {
                where_: "isotp::pci",
                reason: format!("unknown PCI type {other:#x}"),
            }),
        }
    }

    /// Encodes this frame into an (unpadded) CAN payload.
    pub fn to_can_payload(&self) -> Vec<u8> {
        match self {
            IsoTpFrame::Single { data } => {
                let mut out = Vec::with_capacity(1 + data.len());
                out.push(data.len() as u8 & 0x0F);
                out.extend_from_slice(data);
                out
            }
            IsoTpFrame::First { total_length, head_data } => {
                let mut out = Vec::with_capacity(2 + head_data.len());
                out.push(0x10 | ((total_length >> 8) as u8 & 0x0F));
                out.push(*total_length as u8);
                out.extend_from_slice(head_data);
                out
            }
            IsoTpFrame::Consecutive { sequence_nibble, data } => {
                let mut out = Vec::with_capacity(1 + data.len());
                out.push(0x20 | (sequence_nibble & 0x0F));
                out.extend_from_slice(data);
                out
            }
            IsoTpFrame::FlowControl {
                status,
                block_size,
                separation_time_ms,
            } => {
                let flag = match status {
                    FlowStatus::ContinueToSend => 0,
                    FlowStatus::Wait => 1,
                    FlowStatus::Overflow => 2,
                };
                vec![0x30 | flag, *block_size, denormalize_st_min(*separation_time_ms)]
            }
        }
    }
}

/// `STmin` byte values `0xF1..=0xF9` encode 100..900 microseconds; this
/// engine rounds those up to 1ms since its suspension granularity is
/// milliseconds. `0x80..=0xF0` and `0xFA..=0xFF` are reserved/invalid and
/// treated as 127ms per the spec's fallback.
fn normalize_st_min(raw: u8) -> u8 {
    match raw {
        0x00..=0x7F => raw,
        0xF1..=0xF9 => 1,
        _ => 127,
    }
}

fn denormalize_st_min(ms: u8) -> u8 {
    ms.min(0x7F)
}

/// Per-(tx_id, rx_id) ISO-TP state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Sending {
        remaining: Vec<u8>,
        next_seq: u8,
        block_size: u8,
        sent_in_block: u8,
    },
    Receiving {
        expected: usize,
        buffer: Vec<u8>,
        next_seq: u8,
    },
    Error,
}

/// Maximum time the engine will wait before emitting a flow control after a
/// First frame, per the spec (configurable only in spirit - this
/// implementation emits it synchronously as part of the same call).
pub const FLOW_CONTROL_DEADLINE: Duration = Duration::from_millis(10);

/// The ISO-TP engine for a single (tx_id, rx_id) pair.
pub struct IsoTpEngine {
    state: State,
    block_size: u8,
    st_min_ms: u8,
}

/// Result of feeding one frame into the receive side of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// The engine needs more frames before a message is complete.
    Pending,
    /// A complete message was reassembled.
    Complete(Vec<u8>),
    /// The engine must emit a flow control frame before the sender will
    /// continue (first frame was just accepted).
    EmitFlowControl(IsoTpFrame),
}

impl IsoTpEngine {
    /// Creates a new engine in the `Idle` state, using `block_size` and
    /// `st_min_ms` as the flow control parameters this engine will request
    /// of a sender.
    pub fn new(block_size: u8, st_min_ms: u8) -> Self {
        Self {
            state: State::Idle,
            block_size,
            st_min_ms,
        }
    }

    /// Current state name, for diagnostics/tests.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Feeds one received ISO-TP frame into the reassembler.
    pub fn on_rx_frame(&mut self, frame: IsoTpFrame) -> Result<ReceiveOutcome, DiagError> {
        match frame {
            IsoTpFrame::Single { data } => {
                trace!("isotp: single frame, {} bytes", data.len());
                self.state = State::Idle;
                Ok(ReceiveOutcome::Complete(data))
            }
            IsoTpFrame::First { total_length, head_data } => {
                debug!("isotp: first frame, total_length={total_length}");
                let mut buffer = Vec::with_capacity(total_length as usize);
                buffer.extend_from_slice(&head_data);
                self.state = State::Receiving {
                    expected: total_length as usize,
                    buffer,
                    next_seq: 1,
                };
                let fc = IsoTpFrame::FlowControl {
                    status: FlowStatus::ContinueToSend,
                    block_size: self.block_size,
                    separation_time_ms: self.st_min_ms,
                };
                Ok(ReceiveOutcome::EmitFlowControl(fc))
            }
            IsoTpFrame::Consecutive { sequence_nibble, data } => {
                let State::Receiving {
                    expected,
                    mut buffer,
                    next_seq,
                } = std::mem::replace(&mut self.state, State::Idle)
                else {
                    warn!("isotp: consecutive frame received while not receiving");
                    self.state = State::Idle;
                    return Ok(ReceiveOutcome::Pending);
                };
                if sequence_nibble != next_seq {
                    warn!(
                        "isotp: sequence error, expected {next_seq} got {sequence_nibble}"
                    );
                    self.state = State::Idle;
                    return Err(DiagError::IsoTpSequenceError);
                }
                buffer.extend_from_slice(&data);
                if buffer.len() >= expected {
                    buffer.truncate(expected);
                    self.state = State::Idle;
                    Ok(ReceiveOutcome::Complete(buffer))
                } else {
                    self.state = State::Receiving {
                        expected,
                        buffer,
                        next_seq: next_sequence_nibble(next_seq),
                    };
                    Ok(ReceiveOutcome::Pending)
                }
            }
            IsoTpFrame::FlowControl { status, block_size, separation_time_ms } => {
                match &mut self.state {
                    State::Sending {
                        block_size: bs,
                        sent_in_block,
                        ..
                    } => match status {
                        FlowStatus::ContinueToSend => {
                            *bs = block_size;
                            *sent_in_block = 0;
                            self.st_min_ms = separation_time_ms;
                            Ok(ReceiveOutcome::Pending)
                        }
                        FlowStatus::Wait => Ok(ReceiveOutcome::Pending),
                        FlowStatus::Overflow => {
                            self.state = State::Idle;
                            Err(DiagError::IsoTpOverflow)
                        }
                    },
                    _ => Err(DiagError::IsoTpUnexpectedFlowControl),
                }
            }
        }
    }

    /// Begins sending `message`, returning the first frame to transmit
    /// (a `Single` frame for short messages, or a `First` frame otherwise)
    /// and the remaining consecutive frames already pre-computed.
    ///
    /// The caller is responsible for pacing consecutive frames by `STmin`
    /// and honoring `block_size` by waiting for a fresh flow control frame
    /// (fed back through [`IsoTpEngine::on_rx_frame`]) every `block_size`
    /// consecutive frames.
    pub fn begin_send(&mut self, message: &[u8]) -> Result<SendPlan, DiagError> {
        if message.len() > MAX_MESSAGE_LEN {
            return Err(DiagError::InvalidArgument {
                param: "message length exceeds 4095 bytes",
            });
        }
        if message.len() <= SINGLE_FRAME_MAX {
            self.state = State::Idle;
            return Ok(SendPlan {
                first_frame: IsoTpFrame::Single { data: message.to_vec() },
                consecutive_frames: Vec::new(),
            });
        }

        let head_data = message[..FIRST_FRAME_HEAD].to_vec();
        let rest = &message[FIRST_FRAME_HEAD..];
        let mut consecutive_frames = Vec::new();
        let mut seq = 1u8;
        for chunk in rest.chunks(CONSECUTIVE_FRAME_MAX) {
            consecutive_frames.push(IsoTpFrame::Consecutive {
                sequence_nibble: seq,
                data: chunk.to_vec(),
            });
            seq = next_sequence_nibble(seq);
        }

        self.state = State::Sending {
            remaining: rest.to_vec(),
            next_seq: 1,
            block_size: 0,
            sent_in_block: 0,
        };

        Ok(SendPlan {
            first_frame: IsoTpFrame::First {
                total_length: message.len() as u16,
                head_data,
            },
            consecutive_frames,
        })
    }

    /// Aborts any in-progress reception or transmission and returns the
    /// engine to `Idle`, per the cancellation contract (§5).
    pub fn abort(&mut self) {
        self.state = State::Idle;
    }
}

/// The frames a caller must transmit for one [`IsoTpEngine::begin_send`]
/// call: the leading frame, then the pre-segmented consecutive frames in
/// order (the caller paces these by STmin/block size).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    /// The leading frame (`Single` or `First`).
    pub first_frame: IsoTpFrame,
    /// Consecutive frames following a `First` frame; empty for `Single`.
    pub consecutive_frames: Vec<IsoTpFrame>,
}

fn next_sequence_nibble(seq: u8) -> u8 {
    if seq == 0xF {
        0
    } else {
        seq + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_frame_round_trips() {
        let frame = IsoTpFrame::Single { data: vec![0x01, 0x0C] };
        let payload = frame.to_can_payload();
        assert_eq!(IsoTpFrame::from_can_payload(&payload).unwrap(), frame);
    }

    #[test]
    fn first_and_consecutive_round_trip() {
        let first = IsoTpFrame::First {
            total_length: 20,
            head_data: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(
            IsoTpFrame::from_can_payload(&first.to_can_payload()).unwrap(),
            first
        );
        let cf = IsoTpFrame::Consecutive {
            sequence_nibble: 3,
            data: vec![7, 8, 9],
        };
        assert_eq!(IsoTpFrame::from_can_payload(&cf.to_can_payload()).unwrap(), cf);
    }

    #[test]
    fn st_min_submillisecond_values_normalize() {
        assert_eq!(normalize_st_min(0xF1), 1);
        assert_eq!(normalize_st_min(0xF9), 1);
        assert_eq!(normalize_st_min(0x80), 127);
        assert_eq!(normalize_st_min(0xFF), 127);
        assert_eq!(normalize_st_min(0x32), 0x32);
    }

    #[test]
    fn reassembles_multi_frame_message() {
        let mut engine = IsoTpEngine::new(0, 0);
        let first = IsoTpFrame::First {
            total_length: 15,
            head_data: vec![0x49, 0x02, 0x01, 0x31, 0x47, 0x31],
        };
        let outcome = engine.on_rx_frame(first).unwrap();
        assert!(matches!(outcome, ReceiveOutcome::EmitFlowControl(_)));

        let cf1 = IsoTpFrame::Consecutive {
            sequence_nibble: 1,
            data: vec![0x4A, 0x43, 0x35, 0x39, 0x34, 0x34, 0x52],
        };
        assert_eq!(engine.on_rx_frame(cf1).unwrap(), ReceiveOutcome::Pending);

        let cf2 = IsoTpFrame::Consecutive {
            sequence_nibble: 2,
            data: vec![0x37, 0x32, 0x35, 0x32, 0x33, 0x36, 0x37],
        };
        let outcome = engine.on_rx_frame(cf2).unwrap();
        match outcome {
            ReceiveOutcome::Complete(data) => {
                assert_eq!(data.len(), 15);
                // data[0..3] = 49 02 01 (response SID, PID, item index).
                let vin: String = data[3..].iter().map(|&b| b as char).collect();
                assert_eq!(vin, "1G1JC5944R7252367");
            }
            other => panic!("expected Complete, got {other:?}"),
        }
        assert!(engine.is_idle());
    }

    #[test]
    fn sequence_error_resets_to_idle_and_rejects() {
        let mut engine = IsoTpEngine::new(0, 0);
        let first = IsoTpFrame::First {
            total_length: 20,
            head_data: vec![0, 1, 2, 3, 4, 5],
        };
        engine.on_rx_frame(first).unwrap();

        let wrong = IsoTpFrame::Consecutive {
            sequence_nibble: 2,
            data: vec![9, 9, 9],
        };
        let err = engine.on_rx_frame(wrong).unwrap_err();
        assert!(matches!(err, DiagError::IsoTpSequenceError));
        assert!(engine.is_idle());

        // Engine must accept a fresh First frame cleanly after the error.
        let first_again = IsoTpFrame::First {
            total_length: 10,
            head_data: vec![1, 2, 3, 4, 5, 6],
        };
        assert!(matches!(
            engine.on_rx_frame(first_again).unwrap(),
            ReceiveOutcome::EmitFlowControl(_)
        ));
    }

    #[test]
    fn sequence_nibble_wraps_from_f_to_zero() {
        let mut seq = 0xEu8;
        seq = next_sequence_nibble(seq);
        assert_eq!(seq, 0xF);
        seq = next_sequence_nibble(seq);
        assert_eq!(seq, 0);
    }

    #[test]
    fn begin_send_short_message_is_single_frame() {
        let mut engine = IsoTpEngine::new(0, 0);
        let plan = engine.begin_send(&[0x01, 0x0C]).unwrap();
        assert_eq!(plan.first_frame, IsoTpFrame::Single { data: vec![0x01, 0x0C] });
        assert!(plan.consecutive_frames.is_empty());
    }

    #[test]
    fn begin_send_long_message_segments_into_consecutive_frames() {
        let mut engine = IsoTpEngine::new(0, 0);
        let message: Vec<u8> = (0..20u8).collect();
        let plan = engine.begin_send(&message).unwrap();
        assert!(matches!(plan.first_frame, IsoTpFrame::First { total_length: 20, .. }));
        // 14 bytes remain after the 6-byte head; 7 bytes/frame -> 2 frames.
        assert_eq!(plan.consecutive_frames.len(), 2);
        assert_eq!(
            plan.consecutive_frames[0],
            IsoTpFrame::Consecutive { sequence_nibble: 1, data: (6..13).collect() }
        );
    }

    #[test]
    fn begin_send_rejects_oversized_message() {
        let mut engine = IsoTpEngine::new(0, 0);
        let big = vec![0u8; MAX_MESSAGE_LEN + 1];
        assert!(engine.begin_send(&big).is_err());
    }

    #[test]
    fn unexpected_flow_control_while_idle_errors() {
        let mut engine = IsoTpEngine::new(0, 0);
        let fc = IsoTpFrame::FlowControl {
            status: FlowStatus::ContinueToSend,
            block_size: 0,
            separation_time_ms: 0,
        };
        assert!(matches!(
            engine.on_rx_frame(fc),
            Err(DiagError::IsoTpUnexpectedFlowControl)
        ));
    }
}

//! Adapter-negotiable link protocols.
//!
//! An ELM327 dongle auto-detects one of these on `ATSP 0` + a probe request,
//! and reports back which one it picked via `ATDPN`/`ATDP`. A native
//! transport picks its protocol out-of-band (e.g. the CAN interface is
//! already known to be 500kbit 11-bit), but still carries the same
//! [`ProtocolKind`] so the rest of the stack (header width, CAN-ness) is
//! uniform either way.

use std::fmt;
use strum_macros::EnumIter;

/// A diagnostic link protocol an ELM327 adapter (or native transport) may be
/// operating over.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtocolKind {
    /// SAE J1850 PWM, 41.6 kbaud (mostly older Ford).
    J1850Pwm,
    /// SAE J1850 VPW, 10.4 kbaud (mostly older GM).
    J1850Vpw,
    /// ISO 9141-2 (mostly older Chrysler/European/Asian).
    Iso9141_2,
    /// ISO 14230-4 KWP2000, 5-baud init.
    Iso14230Kwp5Baud,
    /// ISO 14230-4 KWP2000, fast init.
    Iso14230KwpFast,
    /// ISO 15765-4, CAN 11-bit ID, 500 kbaud.
    Iso15765Can11_500,
    /// ISO 15765-4, CAN 29-bit ID, 500 kbaud.
    Iso15765Can29_500,
    /// ISO 15765-4, CAN 11-bit ID, 250 kbaud.
    Iso15765Can11_250,
    /// ISO 15765-4, CAN 29-bit ID, 250 kbaud.
    Iso15765Can29_250,
    /// SAE J1939 (heavy-duty/commercial vehicles).
    SaeJ1939,
}

impl ProtocolKind {
    /// The numeric ID this protocol is addressed by in `ATSP n` / reported
    /// by `ATDPN` (`A`..`C` map to 10..12).
    pub fn elm_numeric_id(self) -> u8 {
        match self {
            ProtocolKind::J1850Pwm => 1,
            ProtocolKind::J1850Vpw => 2,
            ProtocolKind::Iso9141_2 => 3,
            ProtocolKind::Iso14230Kwp5Baud => 4,
            ProtocolKind::Iso14230KwpFast => 5,
            ProtocolKind::Iso15765Can11_500 => 6,
            ProtocolKind::Iso15765Can29_500 => 7,
            ProtocolKind::Iso15765Can11_250 => 8,
            ProtocolKind::Iso15765Can29_250 => 9,
            ProtocolKind::SaeJ1939 => 10,
        }
    }

    /// Parses the numeric ID reported by `ATDPN` (after stripping a leading
    /// `A` auto-detect marker, if present). `A`..`C` are accepted as 10..12
    /// for adapters that report them as letters.
    pub fn from_elm_numeric_id(id: u8) -> Option<Self> {
        use ProtocolKind::*;
        Some(match id {
            1 => J1850Pwm,
            2 => J1850Vpw,
            3 => Iso9141_2,
            4 => Iso14230Kwp5Baud,
            5 => Iso14230KwpFast,
            6 => Iso15765Can11_500,
            7 => Iso15765Can29_500,
            8 => Iso15765Can11_250,
            9 => Iso15765Can29_250,
            10 => SaeJ1939,
            _ => return None,
        })
    }

    /// Parses the string `ATDP` reports (used as a fallback when `ATDPN`
    /// isn't supported by the adapter firmware).
    pub fn from_atdp_string(s: &str) -> Option<Self> {
        let s = s.trim().to_uppercase();
        use ProtocolKind::*;
        Some(if s.contains("J1850PWM") {
            J1850Pwm
        } else if s.contains("J1850VPW") {
            J1850Vpw
        } else if s.contains("ISO 9141-2") || s.contains("ISO9141-2") {
            Iso9141_2
        } else if s.contains("KWP2000") && s.contains("5") {
            Iso14230Kwp5Baud
        } else if s.contains("KWP2000") {
            Iso14230KwpFast
        } else if s.contains("29") && s.contains("500") {
            Iso15765Can29_500
        } else if s.contains("11") && s.contains("500") {
            Iso15765Can11_500
        } else if s.contains("29") && s.contains("250") {
            Iso15765Can29_250
        } else if s.contains("11") && s.contains("250") {
            Iso15765Can11_250
        } else if s.contains("J1939") {
            SaeJ1939
        } else {
            return None;
        })
    }

    /// Whether this protocol runs over a CAN physical/data-link layer (and
    /// therefore is subject to ISO-TP segmentation).
    pub fn is_can(self) -> bool {
        matches!(
            self,
            ProtocolKind::Iso15765Can11_500
                | ProtocolKind::Iso15765Can29_500
                | ProtocolKind::Iso15765Can11_250
                | ProtocolKind::Iso15765Can29_250
        )
    }

    /// Default CAN identifier width in bits for this protocol; `None` for
    /// non-CAN protocols.
    pub fn default_header_bits(self) -> Option<u8> {
        match self {
            ProtocolKind::Iso15765Can11_500 | ProtocolKind::Iso15765Can11_250 => Some(11),
            ProtocolKind::Iso15765Can29_500 | ProtocolKind::Iso15765Can29_250 => Some(29),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolKind::J1850Pwm => "SAE J1850 PWM",
            ProtocolKind::J1850Vpw => "SAE J1850 VPW",
            ProtocolKind::Iso9141_2 => "ISO 9141-2",
            ProtocolKind::Iso14230Kwp5Baud => "ISO 14230-4 KWP (5-baud init)",
            ProtocolKind::Iso14230KwpFast => "ISO 14230-4 KWP (fast init)",
            ProtocolKind::Iso15765Can11_500 => "ISO 15765-4 CAN (11-bit, 500kbps)",
            ProtocolKind::Iso15765Can29_500 => "ISO 15765-4 CAN (29-bit, 500kbps)",
            ProtocolKind::Iso15765Can11_250 => "ISO 15765-4 CAN (11-bit, 250kbps)",
            ProtocolKind::Iso15765Can29_250 => "ISO 15765-4 CAN (29-bit, 250kbps)",
            ProtocolKind::SaeJ1939 => "SAE J1939",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn elm_numeric_id_round_trips() {
        for p in ProtocolKind::iter() {
            let id = p.elm_numeric_id();
            assert_eq!(ProtocolKind::from_elm_numeric_id(id), Some(p));
        }
    }

    #[test]
    fn only_can_protocols_report_header_bits() {
        for p in ProtocolKind::iter() {
            assert_eq!(p.default_header_bits().is_some(), p.is_can());
        }
    }

    #[test]
    fn atdp_string_fallback_recognizes_can_11_500() {
        assert_eq!(
            ProtocolKind::from_atdp_string("ISO 15765-4 (CAN 11/500)"),
            Some(ProtocolKind::Iso15765Can11_500)
        );
    }
}

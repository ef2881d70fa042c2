//! Diagnostic trouble code codec and UDS negative response codes.

use std::fmt;

/// Category a DTC belongs to, selected by the top two bits of its raw word.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DtcCategory {
    /// Powertrain (`P`).
    Powertrain,
    /// Chassis (`C`).
    Chassis,
    /// Body (`B`).
    Body,
    /// Network/communication (`U`).
    Network,
}

impl DtcCategory {
    fn letter(self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => DtcCategory::Powertrain,
            0b01 => DtcCategory::Chassis,
            0b10 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }
}

/// A decoded diagnostic trouble code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dtc {
    /// SAE-style 5 character code, e.g. `"P0301"`.
    pub code: String,
    /// The raw word the code was decoded from, widened to fit a UDS 3-byte
    /// DTC ID: the top two bytes are the canonical 16-bit SAE word that
    /// `code`/`category` are derived from, and the low byte is the UDS ID's
    /// third byte (0 for 2-byte OBD-II words, which have no third byte).
    pub raw_word: u32,
    /// Status byte, present for UDS `0x19` reads.
    pub status_byte: Option<u8>,
    /// Category derived from the top two bits of `raw_word`.
    pub category: DtcCategory,
}

impl Dtc {
    /// Decodes a raw two-byte DTC word into a [`Dtc`]. Returns `None` for the
    /// reserved all-zero word `P0000`, which callers must filter.
    pub fn decode(word: u16, status_byte: Option<u8>) -> Option<Self> {
        Self::decode_with_extra(word, None, status_byte)
    }

    /// Decodes a raw two-byte DTC word, same as [`Dtc::decode`], but also
    /// carries `extra_byte` (the third byte of a UDS 3-byte DTC ID) into
    /// [`Dtc::raw_word`] so it survives round-trips back into a UDS request.
    pub fn decode_with_extra(word: u16, extra_byte: Option<u8>, status_byte: Option<u8>) -> Option<Self> {
        if word == 0 {
            return None;
        }
        let top = ((word >> 14) & 0b11) as u8;
        let category = DtcCategory::from_bits(top);
        let d1 = (word >> 12) & 0b11;
        let d2 = (word >> 8) & 0b1111;
        let low = word & 0xFF;
        let code = format!("{}{:01X}{:01X}{:02X}", category.letter(), d1, d2, low);
        let raw_word = ((word as u32) << 8) | extra_byte.unwrap_or(0) as u32;
        Some(Dtc {
            code,
            raw_word,
            status_byte,
            category,
        })
    }

    /// Re-encodes the canonical 16-bit SAE word from [`Dtc::raw_word`], for
    /// round-trip tests and for building OBD-II write payloads.
    pub fn encode(&self) -> u16 {
        (self.raw_word >> 8) as u16
    }

    /// The full 3-byte UDS DTC ID (`[hi, mid, lo]`), for re-submitting a
    /// request keyed by this DTC (e.g. a snapshot-by-DTC-number read).
    pub fn uds_id_bytes(&self) -> [u8; 3] {
        [(self.raw_word >> 16) as u8, (self.raw_word >> 8) as u8, self.raw_word as u8]
    }

    /// Parses a DTC from its 5-character SAE code, e.g. `"P0301"`.
    pub fn parse(code: &str) -> Option<Self> {
        let chars: Vec<char> = code.chars().collect();
        if chars.len() != 5 {
            return None;
        }
        let top = match chars[0].to_ascii_uppercase() {
            'P' => 0b00u16,
            'C' => 0b01,
            'B' => 0b10,
            'U' => 0b11,
            _ => return None,
        };
        let d1 = chars[1].to_digit(16)? as u16;
        if d1 > 0b11 {
            return None;
        }
        let d2 = chars[2].to_digit(16)? as u16;
        let low_hi = chars[3].to_digit(16)? as u16;
        let low_lo = chars[4].to_digit(16)? as u16;
        let raw_word = (top << 14) | (d1 << 12) | (d2 << 8) | (low_hi << 4) | low_lo;
        Self::decode(raw_word, None)
    }
}

/// Parses a service 03/07/0A style response body (after the response SID and
/// any optional count byte have already been stripped) into a list of DTCs,
/// each two bytes wide, with no status byte. `P0000` entries are dropped.
pub fn decode_dtc_words(body: &[u8]) -> Vec<Dtc> {
    body.chunks_exact(2)
        .filter_map(|pair| Dtc::decode(u16::from_be_bytes([pair[0], pair[1]]), None))
        .collect()
}

/// Parses a UDS `0x19` `reportDTCByStatusMask` response body (after SID,
/// sub-function and status-availability mask have been stripped) into a list
/// of DTCs, each a 3-byte DTC ID followed by a 1-byte status.
pub fn decode_uds_dtc_records(body: &[u8]) -> Vec<Dtc> {
    body.chunks_exact(4)
        .filter_map(|rec| {
            let word = u16::from_be_bytes([rec[0], rec[1]]);
            Dtc::decode_with_extra(word, Some(rec[2]), Some(rec[3]))
        })
        .collect()
}

/// UDS (ISO 14229-1) negative response codes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Nrc {
    /// 0x10 General reject.
    GeneralReject,
    /// 0x11 Service not supported.
    ServiceNotSupported,
    /// 0x12 Sub-function not supported.
    SubFunctionNotSupported,
    /// 0x13 Incorrect message length or invalid format.
    IncorrectMessageLengthOrInvalidFormat,
    /// 0x14 Response too long.
    ResponseTooLong,
    /// 0x21 Busy, repeat request.
    BusyRepeatRequest,
    /// 0x22 Conditions not correct.
    ConditionsNotCorrect,
    /// 0x24 Request sequence error.
    RequestSequenceError,
    /// 0x25 No response from subnet component.
    NoResponseFromSubnetComponent,
    /// 0x26 Failure prevents execution of requested action.
    FailurePreventsExecution,
    /// 0x31 Request out of range.
    RequestOutOfRange,
    /// 0x33 Security access denied.
    SecurityAccessDenied,
    /// 0x35 Invalid key.
    InvalidKey,
    /// 0x36 Exceeded number of attempts.
    ExceededNumberOfAttempts,
    /// 0x37 Required time delay not expired.
    RequiredTimeDelayNotExpired,
    /// 0x70 Upload/download not accepted.
    UploadDownloadNotAccepted,
    /// 0x71 Transfer data suspended.
    TransferDataSuspended,
    /// 0x72 General programming failure.
    GeneralProgrammingFailure,
    /// 0x73 Wrong block sequence counter.
    WrongBlockSequenceCounter,
    /// 0x78 Request correctly received, response pending.
    RequestCorrectlyReceivedResponsePending,
    /// 0x7E Sub-function not supported in active session.
    SubFunctionNotSupportedInActiveSession,
    /// 0x7F Service not supported in active session.
    ServiceNotSupportedInActiveSession,
    /// Any code outside the table above.
    IsoSaeReserved(u8),
}

impl Nrc {
    /// Raw NRC byte this variant maps to.
    pub fn code(self) -> u8 {
        match self {
            Nrc::GeneralReject => 0x10,
            Nrc::ServiceNotSupported => 0x11,
            Nrc::SubFunctionNotSupported => 0x12,
            Nrc::IncorrectMessageLengthOrInvalidFormat => 0x13,
            Nrc::ResponseTooLong => 0x14,
            Nrc::BusyRepeatRequest => 0x21,
            Nrc::ConditionsNotCorrect => 0x22,
            Nrc::RequestSequenceError => 0x24,
            Nrc::NoResponseFromSubnetComponent => 0x25,
            Nrc::FailurePreventsExecution => 0x26,
            Nrc::RequestOutOfRange => 0x31,
            Nrc::SecurityAccessDenied => 0x33,
            Nrc::InvalidKey => 0x35,
            Nrc::ExceededNumberOfAttempts => 0x36,
            Nrc::RequiredTimeDelayNotExpired => 0x37,
            Nrc::UploadDownloadNotAccepted => 0x70,
            Nrc::TransferDataSuspended => 0x71,
            Nrc::GeneralProgrammingFailure => 0x72,
            Nrc::WrongBlockSequenceCounter => 0x73,
            Nrc::RequestCorrectlyReceivedResponsePending => 0x78,
            Nrc::SubFunctionNotSupportedInActiveSession => 0x7E,
            Nrc::ServiceNotSupportedInActiveSession => 0x7F,
            Nrc::IsoSaeReserved(code) => code,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Nrc::GeneralReject => "general reject",
            Nrc::ServiceNotSupported => "service not supported",
            Nrc::SubFunctionNotSupported => "sub-function not supported",
            Nrc::IncorrectMessageLengthOrInvalidFormat => {
                "incorrect message length or invalid format"
            }
            Nrc::ResponseTooLong => "response too long",
            Nrc::BusyRepeatRequest => "busy, repeat request",
            Nrc::ConditionsNotCorrect => "conditions not correct",
            Nrc::RequestSequenceError => "request sequence error",
            Nrc::NoResponseFromSubnetComponent => "no response from subnet component",
            Nrc::FailurePreventsExecution => "failure prevents execution of requested action",
            Nrc::RequestOutOfRange => "request out of range",
            Nrc::SecurityAccessDenied => "security access denied",
            Nrc::InvalidKey => "invalid key",
            Nrc::ExceededNumberOfAttempts => "exceeded number of attempts",
            Nrc::RequiredTimeDelayNotExpired => "required time delay not expired",
            Nrc::UploadDownloadNotAccepted => "upload/download not accepted",
            Nrc::TransferDataSuspended => "transfer data suspended",
            Nrc::GeneralProgrammingFailure => "general programming failure",
            Nrc::WrongBlockSequenceCounter => "wrong block sequence counter",
            Nrc::RequestCorrectlyReceivedResponsePending => {
                "request correctly received, response pending"
            }
            Nrc::SubFunctionNotSupportedInActiveSession => {
                "sub-function not supported in active session"
            }
            Nrc::ServiceNotSupportedInActiveSession => "service not supported in active session",
            Nrc::IsoSaeReserved(_) => "ISO/SAE reserved",
        }
    }
}

impl From<u8> for Nrc {
    fn from(code: u8) -> Self {
        match code {
            0x10 => Nrc::GeneralReject,
            0x11 => Nrc::ServiceNotSupported,
            0x12 => Nrc::SubFunctionNotSupported,
            0x13 => Nrc::IncorrectMessageLengthOrInvalidFormat,
            0x14 => Nrc::ResponseTooLong,
            0x21 => Nrc::BusyRepeatRequest,
            0x22 => Nrc::ConditionsNotCorrect,
            0x24 => Nrc::RequestSequenceError,
            0x25 => Nrc::NoResponseFromSubnetComponent,
            0x26 => Nrc::FailurePreventsExecution,
            0x31 => Nrc::RequestOutOfRange,
            0x33 => Nrc::SecurityAccessDenied,
            0x35 => Nrc::InvalidKey,
            0x36 => Nrc::ExceededNumberOfAttempts,
            0x37 => Nrc::RequiredTimeDelayNotExpired,
            0x70 => Nrc::UploadDownloadNotAccepted,
            0x71 => Nrc::TransferDataSuspended,
            0x72 => Nrc::GeneralProgrammingFailure,
            0x73 => Nrc::WrongBlockSequenceCounter,
            0x78 => Nrc::RequestCorrectlyReceivedResponsePending,
            0x7E => Nrc::SubFunctionNotSupportedInActiveSession,
            0x7F => Nrc::ServiceNotSupportedInActiveSession,
            other => Nrc::IsoSaeReserved(other),
        }
    }
}

impl fmt::Display for Nrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X} {}", self.code(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_powertrain_code() {
        // 0x0133 -> P0133
        let dtc = Dtc::decode(0x0133, None).unwrap();
        assert_eq!(dtc.code, "P0133");
        assert_eq!(dtc.category, DtcCategory::Powertrain);
    }

    #[test]
    fn decodes_chassis_body_network_prefixes() {
        assert_eq!(Dtc::decode(0x4000, None).unwrap().code.chars().next(), Some('C'));
        assert_eq!(Dtc::decode(0x8000, None).unwrap().code.chars().next(), Some('B'));
        assert_eq!(Dtc::decode(0xC000, None).unwrap().code.chars().next(), Some('U'));
    }

    #[test]
    fn all_zero_word_is_filtered() {
        assert!(Dtc::decode(0, None).is_none());
    }

    #[test]
    fn encode_decode_round_trips() {
        for raw in [0x0133u16, 0x0245, 0x4000, 0x8001, 0xC0FF] {
            let dtc = Dtc::decode(raw, None).unwrap();
            assert_eq!(dtc.encode(), raw);
            assert_eq!(Dtc::parse(&dtc.code).unwrap().encode(), raw);
        }
    }

    #[test]
    fn uds_record_preserves_third_id_byte() {
        // rec = [0x01, 0x33, 0x7A, 0x09]: third ID byte 0x7A must survive
        // into raw_word/uds_id_bytes rather than being discarded.
        let dtc = Dtc::decode_with_extra(0x0133, Some(0x7A), Some(0x09)).unwrap();
        assert_eq!(dtc.code, "P0133");
        assert_eq!(dtc.uds_id_bytes(), [0x01, 0x33, 0x7A]);
        assert_eq!(dtc.status_byte, Some(0x09));
    }

    #[test]
    fn decodes_stored_dtc_scenario() {
        // Service 03 response body after stripping `43 02`: 0133, 0245
        let body = [0x01u8, 0x33, 0x02, 0x45];
        let codes: Vec<String> = decode_dtc_words(&body).into_iter().map(|d| d.code).collect();
        assert_eq!(codes, vec!["P0133", "P0245"]);
    }

    #[test]
    fn nrc_round_trips_through_code() {
        for nrc in [
            Nrc::GeneralReject,
            Nrc::ConditionsNotCorrect,
            Nrc::SecurityAccessDenied,
            Nrc::RequestCorrectlyReceivedResponsePending,
            Nrc::ServiceNotSupportedInActiveSession,
        ] {
            assert_eq!(Nrc::from(nrc.code()), nrc);
        }
    }

    #[test]
    fn unknown_nrc_is_reserved() {
        assert_eq!(Nrc::from(0x55), Nrc::IsoSaeReserved(0x55));
    }

    #[test]
    fn conditions_not_correct_matches_clear_dtc_scenario() {
        let nrc = Nrc::from(0x22);
        assert_eq!(nrc, Nrc::ConditionsNotCorrect);
        assert_eq!(nrc.to_string(), "0x22 conditions not correct");
    }
}

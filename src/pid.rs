//! OBD-II PID registry and engineering-unit decoding.
//!
//! Decoders are pure functions over the raw response payload (the bytes
//! after the response SID, the echoed PID, and - for freeze frame - the
//! frame number have been stripped).

use std::fmt;

/// A decoded OBD-II parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineeringValue {
    /// A numeric value with a unit string, e.g. `(1726.0, "rpm")`.
    Scalar(f64, &'static str),
    /// A textual value, e.g. a VIN or calibration ID.
    Text(String),
    /// A raw bitfield, e.g. "supported PIDs" or monitor status.
    Bitfield(u64),
    /// Bytes with no further decoding applied.
    Bytes(Vec<u8>),
}

impl fmt::Display for EngineeringValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineeringValue::Scalar(v, unit) => write!(f, "{v} {unit}"),
            EngineeringValue::Text(s) => write!(f, "{s}"),
            EngineeringValue::Bitfield(b) => write!(f, "{b:#034b}"),
            EngineeringValue::Bytes(b) => write!(f, "{b:02X?}"),
        }
    }
}

/// Describes one (mode, pid) entry in the registry.
pub struct PidDescriptor {
    /// OBD-II mode/service byte, e.g. `0x01`.
    pub mode: u8,
    /// Parameter ID within the mode.
    pub pid: u8,
    /// Human-readable name.
    pub name: &'static str,
    /// Number of payload bytes this PID's response carries.
    pub data_length_bytes: usize,
    /// Pure decode formula.
    pub decoder: fn(&[u8]) -> EngineeringValue,
    /// Minimum value the decoder can produce (for [`EngineeringValue::Scalar`]).
    pub min: f64,
    /// Maximum value the decoder can produce (for [`EngineeringValue::Scalar`]).
    pub max: f64,
}

impl fmt::Debug for PidDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PidDescriptor")
            .field("mode", &self.mode)
            .field("pid", &self.pid)
            .field("name", &self.name)
            .finish()
    }
}

fn decode_fuel_system_status(bytes: &[u8]) -> EngineeringValue {
    let bits = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
    EngineeringValue::Bitfield(bits)
}

fn decode_percent_over_255(bytes: &[u8]) -> EngineeringValue {
    EngineeringValue::Scalar(bytes[0] as f64 / 2.55, "%")
}

fn decode_temp_minus_40(bytes: &[u8]) -> EngineeringValue {
    EngineeringValue::Scalar(bytes[0] as f64 - 40.0, "degC")
}

fn decode_rpm(bytes: &[u8]) -> EngineeringValue {
    let raw = (bytes[0] as f64 * 256.0 + bytes[1] as f64) / 4.0;
    EngineeringValue::Scalar(raw, "rpm")
}

fn decode_speed_kph(bytes: &[u8]) -> EngineeringValue {
    EngineeringValue::Scalar(bytes[0] as f64, "km/h")
}

fn decode_maf(bytes: &[u8]) -> EngineeringValue {
    let raw = (bytes[0] as f64 * 256.0 + bytes[1] as f64) / 100.0;
    EngineeringValue::Scalar(raw, "g/s")
}

fn decode_fuel_trim(bytes: &[u8]) -> EngineeringValue {
    EngineeringValue::Scalar((bytes[0] as f64 - 128.0) / 1.28, "%")
}

fn decode_timing_advance(bytes: &[u8]) -> EngineeringValue {
    EngineeringValue::Scalar(bytes[0] as f64 / 2.0 - 64.0, "deg BTDC")
}

fn decode_kpa(bytes: &[u8]) -> EngineeringValue {
    EngineeringValue::Scalar(bytes[0] as f64, "kPa")
}

fn decode_control_module_voltage(bytes: &[u8]) -> EngineeringValue {
    let raw = (bytes[0] as f64 * 256.0 + bytes[1] as f64) / 1000.0;
    EngineeringValue::Scalar(raw, "V")
}

fn decode_supported_pid_mask(bytes: &[u8]) -> EngineeringValue {
    let mask = crate::hex::u32_be(bytes, 0).unwrap_or(0);
    EngineeringValue::Bitfield(mask as u64)
}

fn decode_ascii_text(bytes: &[u8]) -> EngineeringValue {
    let text: String = bytes
        .iter()
        .map(|&b| b as char)
        .filter(|c| c.is_ascii_graphic())
        .collect();
    EngineeringValue::Text(text)
}

fn decode_vin(bytes: &[u8]) -> EngineeringValue {
    decode_ascii_text(bytes)
}

/// Whether bit `k` (1-indexed from the MSB) of a "supported PIDs" bitfield
/// indicates PID `(base + k)` is supported.
pub fn supported_pid_bit(mask: u32, k: u8) -> bool {
    debug_assert!((1..=32).contains(&k));
    (mask >> (32 - k)) & 1 == 1
}

macro_rules! descriptor {
    ($mode:expr, $pid:expr, $name:expr, $len:expr, $dec:expr, $min:expr, $max:expr) => {
        PidDescriptor {
            mode: $mode,
            pid: $pid,
            name: $name,
            data_length_bytes: $len,
            decoder: $dec,
            min: $min,
            max: $max,
        }
    };
}

/// The full statically-built PID registry: required PIDs per the minimum set
/// plus the supplemented ones (supported-PID masks, fuel trim, timing
/// advance, barometric pressure, module voltage, calibration ID, ECU name).
pub const REGISTRY: &[PidDescriptor] = &[
    descriptor!(0x01, 0x00, "Supported PIDs 01-20", 4, decode_supported_pid_mask, 0.0, u32::MAX as f64),
    descriptor!(0x01, 0x01, "Monitor status since DTCs cleared", 4, decode_fuel_system_status, 0.0, u32::MAX as f64),
    descriptor!(0x01, 0x03, "Fuel system status", 2, decode_fuel_system_status, 0.0, u16::MAX as f64),
    descriptor!(0x01, 0x04, "Calculated engine load", 1, decode_percent_over_255, 0.0, 100.0),
    descriptor!(0x01, 0x05, "Engine coolant temperature", 1, decode_temp_minus_40, -40.0, 215.0),
    descriptor!(0x01, 0x06, "Short term fuel trim bank 1", 1, decode_fuel_trim, -100.0, 99.2),
    descriptor!(0x01, 0x07, "Long term fuel trim bank 1", 1, decode_fuel_trim, -100.0, 99.2),
    descriptor!(0x01, 0x0C, "Engine RPM", 2, decode_rpm, 0.0, 16_383.75),
    descriptor!(0x01, 0x0D, "Vehicle speed", 1, decode_speed_kph, 0.0, 255.0),
    descriptor!(0x01, 0x0E, "Timing advance", 1, decode_timing_advance, -64.0, 63.5),
    descriptor!(0x01, 0x0F, "Intake air temperature", 1, decode_temp_minus_40, -40.0, 215.0),
    descriptor!(0x01, 0x10, "MAF air flow rate", 2, decode_maf, 0.0, 655.35),
    descriptor!(0x01, 0x11, "Throttle position", 1, decode_percent_over_255, 0.0, 100.0),
    descriptor!(0x01, 0x20, "Supported PIDs 21-40", 4, decode_supported_pid_mask, 0.0, u32::MAX as f64),
    descriptor!(0x01, 0x2F, "Fuel level input", 1, decode_percent_over_255, 0.0, 100.0),
    descriptor!(0x01, 0x33, "Barometric pressure", 1, decode_kpa, 0.0, 255.0),
    descriptor!(0x01, 0x40, "Supported PIDs 41-60", 4, decode_supported_pid_mask, 0.0, u32::MAX as f64),
    descriptor!(0x01, 0x42, "Control module voltage", 2, decode_control_module_voltage, 0.0, 65.535),
    descriptor!(0x01, 0x60, "Supported PIDs 61-80", 4, decode_supported_pid_mask, 0.0, u32::MAX as f64),
    descriptor!(0x01, 0x80, "Supported PIDs 81-A0", 4, decode_supported_pid_mask, 0.0, u32::MAX as f64),
    descriptor!(0x01, 0xA0, "Supported PIDs A1-C0", 4, decode_supported_pid_mask, 0.0, u32::MAX as f64),
    descriptor!(0x01, 0xC0, "Supported PIDs C1-E0", 4, decode_supported_pid_mask, 0.0, u32::MAX as f64),
    descriptor!(0x01, 0xE0, "Supported PIDs E1-FF", 4, decode_supported_pid_mask, 0.0, u32::MAX as f64),
    descriptor!(0x09, 0x02, "Vehicle identification number", 17, decode_vin, 0.0, 0.0),
    descriptor!(0x09, 0x04, "Calibration ID", 18, decode_ascii_text, 0.0, 0.0),
    descriptor!(0x09, 0x0A, "ECU name", 20, decode_ascii_text, 0.0, 0.0),
];

/// Looks up a [`PidDescriptor`] by (mode, pid).
pub fn lookup(mode: u8, pid: u8) -> Option<&'static PidDescriptor> {
    REGISTRY.iter().find(|d| d.mode == mode && d.pid == pid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_engine_rpm_scenario() {
        let d = lookup(0x01, 0x0C).unwrap();
        let value = (d.decoder)(&[0x1A, 0xF8]);
        assert_eq!(value, EngineeringValue::Scalar(1726.0, "rpm"));
    }

    #[test]
    fn decodes_coolant_temperature() {
        let d = lookup(0x01, 0x05).unwrap();
        assert_eq!((d.decoder)(&[0x7B]), EngineeringValue::Scalar(83.0, "degC"));
    }

    #[test]
    fn all_registered_scalars_decode_within_range() {
        for d in REGISTRY {
            let zeros = vec![0u8; d.data_length_bytes];
            if let EngineeringValue::Scalar(v, _) = (d.decoder)(&zeros) {
                assert!(v >= d.min && v <= d.max, "{} out of range: {v}", d.name);
            }
        }
    }

    #[test]
    fn supported_pid_bit_indexes_from_msb() {
        // Only the MSB set: bit 1 (base+1) is supported, nothing else.
        let mask = 0x8000_0000u32;
        assert!(supported_pid_bit(mask, 1));
        for k in 2..=32 {
            assert!(!supported_pid_bit(mask, k));
        }
        // Only the LSB set: bit 32 (base+32) is supported.
        let mask = 0x0000_0001u32;
        assert!(supported_pid_bit(mask, 32));
    }

    #[test]
    fn decodes_vin_pid() {
        let bytes = b"1G1JC5944R7252367".to_vec();
        let d = lookup(0x09, 0x02).unwrap();
        assert_eq!(
            (d.decoder)(&bytes),
            EngineeringValue::Text("1G1JC5944R7252367".to_string())
        );
    }
}

use core::fmt;

/// Why an incoming frame (NMEA sentence or UBX message) was discarded.
///
/// Frame-level errors never reach the host: the framing state machine logs
/// them (under the `std` feature) and returns to `Start`. They are exposed
/// here so internal code paths and tests have a concrete type to assert on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    InvalidChecksum { expect: u16, got: u16 },
    InvalidField { sentence: &'static str, field: &'static str },
    Overflow,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::InvalidChecksum { expect, got } => write!(
                f,
                "invalid frame checksum, expected 0x{expect:02x}, got 0x{got:02x}"
            ),
            FrameError::InvalidField { sentence, field } => {
                write!(f, "invalid field {field} of sentence {sentence}")
            },
            FrameError::Overflow => f.write_str("frame payload exceeded staging buffer"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FrameError {}

/// Why a public façade configuration call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The configuration driver is still walking a command table or has a
    /// command outstanding; see [`crate::device::GnssDevice::done`].
    NotDone,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotDone => f.write_str("configuration driver is not idle"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

//! Sync bytes, header offsets and size limits for both wire protocols.

/// Start-of-sentence character for NMEA 0183.
pub const NMEA_SYNC_CHAR: u8 = 0x24; // '$'
pub const NMEA_END_CHAR_1: u8 = 0x0d; // '\r'
pub const NMEA_END_CHAR_2: u8 = 0x0a; // '\n'

/// First byte of the two-byte UBX sync sequence.
pub const UBX_SYNC_CHAR_1: u8 = 0xb5;
/// Second byte of the two-byte UBX sync sequence.
pub const UBX_SYNC_CHAR_2: u8 = 0x62;

/// Bounded staging area for one frame's payload (NMEA sentence field or UBX
/// payload chunk). Overflow silently aborts the frame to `Start`.
pub const RX_DATA_SIZE: usize = 96;

/// Size of the largest single frame staged in a runtime reconfiguration
/// table: the runtime-built periodic command (`CFG-PM2`), a 6-byte header
/// plus 44-byte payload plus 2-byte checksum.
pub const TX_DATA_SIZE: usize = 52;

/// Maximum number of frames chained in a single runtime reconfiguration
/// table (continuous-mode frame, the built PM2 frame, power-save, save).
pub const TX_TABLE_SIZE: usize = 8;

/// Maximum satellites tracked per cycle.
pub const MAX_SATELLITES: usize = 32;

/// Nominal retransmit interval for unacknowledged binary commands, in
/// milliseconds.
pub const UBX_RETRANSMIT_MILLIS: u32 = 250;

pub(crate) const NMEA_HEX_ASCII: &[u8; 16] = b"0123456789ABCDEF";

/// NAV class/id pairs this crate decodes, packed as `(class << 8) | id`.
pub mod ubx_message {
    pub const NAV_DOP: u16 = 0x0104;
    pub const NAV_PVT: u16 = 0x0107;
    pub const NAV_TIMEGPS: u16 = 0x0120;
    pub const NAV_SVINFO: u16 = 0x0130;
    pub const ACK_NACK: u16 = 0x0500;
    pub const ACK_ACK: u16 = 0x0501;
}

//! Byte-driven lexical state machine: classifies incoming bytes into either
//! an NMEA sentence or a UBX binary frame, validates checksums, and hands
//! complete/partial frames to the sentence and message processors.

use crate::checksum::{NmeaChecksum, UbxChecksum};
use crate::constants::{NMEA_END_CHAR_1, NMEA_END_CHAR_2, NMEA_HEX_ASCII, NMEA_SYNC_CHAR, RX_DATA_SIZE, UBX_SYNC_CHAR_1, UBX_SYNC_CHAR_2};
use crate::error::FrameError;

/// Every state the framing machine can occupy. Ordering matters: any state
/// `<= NmeaEndLf` treats `$` as a sentence restart (the "universal restart"
/// rule), matching the original driver's `state <= GNSS_STATE_NMEA_END_LF`
/// check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Start,
    NmeaPayload,
    NmeaChecksumHi,
    NmeaChecksumLo,
    NmeaEndCr,
    NmeaEndLf,
    UbxSync2,
    UbxClass,
    UbxId,
    UbxLengthLo,
    UbxLengthHi,
    UbxPayload,
    UbxCkA,
    UbxCkB,
}

impl FrameState {
    fn admits_sentence_restart(self) -> bool {
        matches!(
            self,
            FrameState::Start
                | FrameState::NmeaPayload
                | FrameState::NmeaChecksumHi
                | FrameState::NmeaChecksumLo
                | FrameState::NmeaEndCr
                | FrameState::NmeaEndLf
        )
    }
}

/// Whether the framing machine should recognize the UBX binary sync
/// sequence. Plain-NMEA mode disables it (see `spec.md` section 6 and the mode
/// table in `device.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryMode {
    Disabled,
    Enabled,
}

/// One fully delimited frame, handed up to the sentence/message processors.
pub enum Frame<'a> {
    /// A complete NMEA field has just been delimited by `,` or the sentence
    /// has ended at `*`; `is_last` distinguishes the two so the sentence
    /// processor can run its end-of-sentence finalizer.
    NmeaField { data: &'a [u8], is_last: bool },
    /// The checksum-validated sentence has reached CRLF.
    NmeaEnd,
    /// The UBX header (class, id, length) has just been completed; `D` may
    /// start staging payload immediately.
    UbxHeader { class: u8, id: u8, length: u16 },
    /// A chunk of UBX payload bytes has been accumulated to the requested
    /// chunk boundary (see `UbxChunking`).
    UbxChunk { offset: usize, data: &'a [u8] },
    /// The frame's checksum validated; `data` is the payload bytes captured
    /// since the last chunk boundary (bounded by `RX_DATA_SIZE`).
    UbxEnd { class: u8, id: u8, total_len: usize, tail: &'a [u8] },
}

/// Requests how many payload bytes should accumulate before the next
/// `Frame::UbxChunk` fires. The handler's return value is consulted both
/// after `Frame::UbxHeader` and after every `Frame::UbxChunk`, so a message
/// can re-arm a different chunk size each time (NAV-SVINFO takes an 8-byte
/// header chunk, then one 12-byte chunk per SV record). `None` stops
/// chunking; the rest of the payload is only delivered as `Frame::UbxEnd`'s
/// `tail`.

pub struct Framer {
    state: FrameState,
    binary_mode: BinaryMode,

    nmea_checksum: NmeaChecksum,
    rx: [u8; RX_DATA_SIZE],
    rx_count: usize,

    ubx_checksum: UbxChecksum,
    ubx_class: u8,
    ubx_id: u8,
    ubx_length: u16,
    ubx_rx_ck_a: u8,
    rx_offset: usize,
    rx_chunk: usize,

    /// Most recent frame-level failure, kept around for internal inspection
    /// and `#[cfg(test)]` assertions; never surfaced through the public
    /// façade (see `SPEC_FULL.md` 11.1).
    last_error: Option<FrameError>,
}

impl Framer {
    pub fn new(binary_mode: BinaryMode) -> Self {
        Framer {
            state: FrameState::Start,
            binary_mode,
            nmea_checksum: NmeaChecksum::new(),
            rx: [0; RX_DATA_SIZE],
            rx_count: 0,
            ubx_checksum: UbxChecksum::new(),
            ubx_class: 0,
            ubx_id: 0,
            ubx_length: 0,
            ubx_rx_ck_a: 0,
            rx_offset: 0,
            rx_chunk: usize::MAX,
            last_error: None,
        }
    }

    pub fn set_binary_mode(&mut self, mode: BinaryMode) {
        self.binary_mode = mode;
    }

    /// Takes the most recent frame-level failure, if one occurred since the
    /// last call. Internal/test-facing only; see `SPEC_FULL.md` 11.1.
    pub fn take_last_error(&mut self) -> Option<FrameError> {
        self.last_error.take()
    }

    /// Feeds one byte through the state machine, invoking `on_frame` for
    /// every frame event produced. The handler's return value only matters
    /// for `Frame::UbxHeader`: `Some(n)` requests a `Frame::UbxChunk` every
    /// `n` payload bytes (used by NAV-SVINFO's per-SV records); any other
    /// return value is ignored.
    pub fn feed_byte<F: FnMut(Frame<'_>) -> Option<usize>>(&mut self, c: u8, mut on_frame: F) {
        if self.state.admits_sentence_restart() && c == NMEA_SYNC_CHAR {
            self.state = FrameState::NmeaPayload;
            self.nmea_checksum = NmeaChecksum::new();
            self.rx_count = 0;
            return;
        }

        match self.state {
            FrameState::Start => {
                if self.binary_mode == BinaryMode::Enabled && c == UBX_SYNC_CHAR_1 {
                    self.state = FrameState::UbxSync2;
                }
            },

            FrameState::NmeaPayload => {
                if c == b'*' {
                    on_frame(Frame::NmeaField { data: &self.rx[..self.rx_count], is_last: true });
                    self.state = FrameState::NmeaChecksumHi;
                } else if (0x20..=0x7f).contains(&c) {
                    if self.rx_count >= RX_DATA_SIZE {
                        self.last_error = Some(FrameError::Overflow);
                        #[cfg(feature = "std")]
                        log::trace!("{}", FrameError::Overflow);
                        self.state = FrameState::Start;
                    } else {
                        self.nmea_checksum.update(c);
                        if c == b',' {
                            on_frame(Frame::NmeaField { data: &self.rx[..self.rx_count], is_last: false });
                            self.rx_count = 0;
                        } else {
                            self.rx[self.rx_count] = c;
                            self.rx_count += 1;
                        }
                    }
                } else {
                    self.state = FrameState::Start;
                }
            },

            FrameState::NmeaChecksumHi => {
                let want = NMEA_HEX_ASCII[(self.nmea_checksum.value() >> 4) as usize];
                if c == want {
                    self.state = FrameState::NmeaChecksumLo;
                } else {
                    let err = FrameError::InvalidChecksum { expect: want as u16, got: c as u16 };
                    self.last_error = Some(err);
                    #[cfg(feature = "std")]
                    log::trace!("{err}");
                    self.state = FrameState::Start;
                }
            },

            FrameState::NmeaChecksumLo => {
                let want = NMEA_HEX_ASCII[(self.nmea_checksum.value() & 0x0f) as usize];
                if c == want {
                    self.state = FrameState::NmeaEndCr;
                } else {
                    let err = FrameError::InvalidChecksum { expect: want as u16, got: c as u16 };
                    self.last_error = Some(err);
                    #[cfg(feature = "std")]
                    log::trace!("{err}");
                    self.state = FrameState::Start;
                }
            },

            FrameState::NmeaEndCr => {
                self.state = if c == NMEA_END_CHAR_1 { FrameState::NmeaEndLf } else { FrameState::Start };
            },

            FrameState::NmeaEndLf => {
                if c == NMEA_END_CHAR_2 {
                    on_frame(Frame::NmeaEnd);
                }
                self.state = FrameState::Start;
            },

            FrameState::UbxSync2 => {
                self.state = if c == UBX_SYNC_CHAR_2 { FrameState::UbxClass } else { FrameState::Start };
            },

            FrameState::UbxClass => {
                self.ubx_checksum = UbxChecksum::new();
                self.ubx_checksum.update(c);
                self.ubx_class = c;
                self.state = FrameState::UbxId;
            },

            FrameState::UbxId => {
                self.ubx_checksum.update(c);
                self.ubx_id = c;
                self.state = FrameState::UbxLengthLo;
            },

            FrameState::UbxLengthLo => {
                self.ubx_checksum.update(c);
                self.ubx_length = c as u16;
                self.state = FrameState::UbxLengthHi;
            },

            FrameState::UbxLengthHi => {
                self.ubx_checksum.update(c);
                self.ubx_length |= (c as u16) << 8;
                self.rx_count = 0;
                self.rx_offset = 0;

                let want = on_frame(Frame::UbxHeader { class: self.ubx_class, id: self.ubx_id, length: self.ubx_length });
                self.rx_chunk = want.unwrap_or(usize::MAX);

                self.state = if self.rx_count as u16 == self.ubx_length { FrameState::UbxCkA } else { FrameState::UbxPayload };
            },

            FrameState::UbxPayload => {
                self.ubx_checksum.update(c);

                let local = self.rx_count - self.rx_offset;
                if local < RX_DATA_SIZE {
                    self.rx[local] = c;
                }
                self.rx_count += 1;

                if self.rx_count - self.rx_offset == self.rx_chunk {
                    let want = on_frame(Frame::UbxChunk { offset: self.rx_offset, data: &self.rx[..self.rx_chunk.min(RX_DATA_SIZE)] });
                    self.rx_offset = self.rx_count;
                    self.rx_chunk = want.unwrap_or(usize::MAX);
                }

                if self.rx_count as u16 == self.ubx_length {
                    self.state = FrameState::UbxCkA;
                }
            },

            FrameState::UbxCkA => {
                self.ubx_rx_ck_a = c;
                self.state = FrameState::UbxCkB;
            },

            FrameState::UbxCkB => {
                let (ck_a, ck_b) = self.ubx_checksum.result();

                if ck_a == self.ubx_rx_ck_a && ck_b == c {
                    let local = self.rx_count - self.rx_offset;
                    if local <= RX_DATA_SIZE {
                        on_frame(Frame::UbxEnd {
                            class: self.ubx_class,
                            id: self.ubx_id,
                            total_len: self.rx_count,
                            tail: &self.rx[..local],
                        });
                    }
                } else {
                    let err = FrameError::InvalidChecksum {
                        expect: u16::from_le_bytes([ck_a, ck_b]),
                        got: u16::from_le_bytes([self.ubx_rx_ck_a, c]),
                    };
                    self.last_error = Some(err);
                    #[cfg(feature = "std")]
                    log::trace!("ubx fletcher checksum mismatch on class=0x{:02x} id=0x{:02x}: {err}", self.ubx_class, self.ubx_id);
                }

                self.state = FrameState::Start;
            },
        }
    }

    pub fn feed(&mut self, bytes: &[u8], mut on_frame: impl FnMut(Frame<'_>)) {
        for &b in bytes {
            self.feed_byte(b, &mut on_frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_bytes_without_dollar_stay_in_start() {
        let mut framer = Framer::new(BinaryMode::Disabled);
        let mut events = 0;
        framer.feed(b"\x01\x02\xff\x00garbage", |_| events += 1);
        assert_eq!(events, 0);
        assert_eq!(framer.state, FrameState::Start);
    }

    #[test]
    fn well_formed_sentence_produces_fields_and_end() {
        let mut framer = Framer::new(BinaryMode::Disabled);
        let mut fields = Vec::new();
        let mut ended = false;
        framer.feed(b"$GPRMC,123519,A*6A\r\n", |f| match f {
            Frame::NmeaField { data, .. } => fields.push(data.to_vec()),
            Frame::NmeaEnd => ended = true,
            _ => {},
        });
        assert_eq!(fields[0], b"GPRMC");
        assert_eq!(fields[1], b"123519");
        assert_eq!(fields[2], b"A");
        assert!(ended);
    }

    #[test]
    fn bad_checksum_produces_no_end_event() {
        let mut framer = Framer::new(BinaryMode::Disabled);
        let mut ended = false;
        framer.feed(b"$GPRMC,123519,A*00\r\n", |f| {
            if matches!(f, Frame::NmeaEnd) {
                ended = true;
            }
        });
        assert!(!ended);
        assert_eq!(framer.state, FrameState::Start);
        assert!(matches!(framer.take_last_error(), Some(FrameError::InvalidChecksum { .. })));
    }

    #[test]
    fn overflowing_nmea_payload_records_overflow_error() {
        let mut framer = Framer::new(BinaryMode::Disabled);
        let mut long_field = b"$GPGGA,".to_vec();
        long_field.extend(core::iter::repeat(b'1').take(RX_DATA_SIZE + 4));
        framer.feed(&long_field, |_| {});
        assert_eq!(framer.take_last_error(), Some(FrameError::Overflow));
    }

    #[test]
    fn ubx_bad_checksum_records_invalid_checksum_error() {
        let mut framer = Framer::new(BinaryMode::Enabled);
        framer.feed(&[0xb5, 0x62, 0x05, 0x01, 0x02, 0x00, 0x04, 0x05, 0x11, 0x39], |_| {});
        assert!(matches!(framer.take_last_error(), Some(FrameError::InvalidChecksum { .. })));
    }

    #[test]
    fn take_last_error_clears_after_reading() {
        let mut framer = Framer::new(BinaryMode::Disabled);
        framer.feed(b"$GPRMC,123519,A*00\r\n", |_| {});
        assert!(framer.take_last_error().is_some());
        assert!(framer.take_last_error().is_none());
    }

    #[test]
    fn dollar_mid_sentence_restarts() {
        let mut framer = Framer::new(BinaryMode::Disabled);
        let mut fields = Vec::new();
        framer.feed(b"$GPGGA,broken$GPRMC,123519,A*6A\r\n", |f| {
            if let Frame::NmeaField { data, .. } = f {
                fields.push(data.to_vec());
            }
        });
        assert_eq!(fields[0], b"GPRMC");
    }

    #[test]
    fn ubx_ack_ack_frame_validates() {
        let mut framer = Framer::new(BinaryMode::Enabled);
        let mut header = None;
        let mut ended = None;
        framer.feed(&[0xb5, 0x62, 0x05, 0x01, 0x02, 0x00, 0x04, 0x05, 0x11, 0x38], |f| match f {
            Frame::UbxHeader { class, id, length } => header = Some((class, id, length)),
            Frame::UbxEnd { class, id, total_len, tail } => ended = Some((class, id, total_len, tail.to_vec())),
            _ => {},
        });
        assert_eq!(header, Some((0x05, 0x01, 2)));
        assert_eq!(ended, Some((0x05, 0x01, 2, vec![0x04, 0x05])));
    }

    #[test]
    fn ubx_bad_checksum_suppresses_end_event() {
        let mut framer = Framer::new(BinaryMode::Enabled);
        let mut ended = false;
        framer.feed(&[0xb5, 0x62, 0x05, 0x01, 0x02, 0x00, 0x04, 0x05, 0x11, 0x39], |f| {
            if matches!(f, Frame::UbxEnd { .. }) {
                ended = true;
            }
        });
        assert!(!ended);
    }

    #[test]
    fn binary_mode_disabled_ignores_ubx_sync() {
        let mut framer = Framer::new(BinaryMode::Disabled);
        framer.feed_byte(0xb5, |_| panic!("no frame expected"));
        assert_eq!(framer.state, FrameState::Start);
    }
}

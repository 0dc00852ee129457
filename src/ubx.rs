//! Binary message processor (component D): typed decoding of NAV-DOP,
//! NAV-PVT, NAV-TIMEGPS, NAV-SVINFO, ACK-ACK and ACK-NACK, dispatched by the
//! combined `(class << 8) | id` key the framing layer reports on
//! [`crate::framing::Frame::UbxHeader`]/`UbxEnd`.
//!
//! Multi-byte fields are assembled explicitly from little-endian bytes
//! rather than reinterpreted in place, since a portable implementation can't
//! assume the host shares the wire's endianness or alignment.

use crate::constants::ubx_message::{ACK_ACK, ACK_NACK, NAV_DOP, NAV_PVT, NAV_SVINFO, NAV_TIMEGPS};
use crate::fix::{EpochMask, FixCorrelator, FixQuality, FixType, Location, LocationMask};
use crate::satellites::{canonicalize_prn, SatelliteEntry, SatelliteFlags, SatelliteTable};

fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le_i16(b: &[u8]) -> i16 {
    i16::from_le_bytes([b[0], b[1]])
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn le_i32(b: &[u8]) -> i32 {
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

/// GPS time-of-week in a full week, milliseconds.
const MILLIS_PER_WEEK: i64 = 7 * 24 * 60 * 60 * 1000;

/// One NAV-SVINFO (or NAV-DOP/PVT/TIMEGPS) record is 12 bytes; the first
/// chunk the framing layer hands over is the 8-byte message header plus the
/// first 12-byte record, 20 bytes total (see `SPEC_FULL.md` §10 for why the
/// original driver's "20-byte header" is really header-plus-first-record).
const SVINFO_RECORD_LEN: usize = 12;

/// Binary parsing context (spec §3): the last-observed navigation itow used
/// to detect a new cycle, plus the running GPS week/time-of-week maintained
/// by NAV-TIMEGPS.
#[derive(Debug, Default)]
pub struct UbxProcessor {
    itow: Option<u32>,
    active: (u8, u8),
    svinfo_declared: u8,
    svinfo_stored: u8,
}

impl UbxProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(class: u8, id: u8) -> u16 {
        ((class as u16) << 8) | id as u16
    }

    /// If `itow` differs from the last-observed navigation itow, the working
    /// fix and in-view table are discarded and a new cycle begins (spec §4.D
    /// "Cycle detection").
    fn sync_cycle(&mut self, itow: u32, loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) {
        if self.itow != Some(itow) {
            #[cfg(feature = "std")]
            log::debug!("nav itow {itow} differs from the cycle's {:?}, starting a new cycle", self.itow);
            corr.begin_cycle();
            loc.reset();
            sats.clear();
            self.itow = Some(itow);
        }
    }

    /// Called on `Frame::UbxHeader`; requests NAV-SVINFO be chunked 20 bytes
    /// (header + first record) then 12 bytes per subsequent record. Every
    /// other message is read whole from `Frame::UbxEnd`'s `tail`.
    pub fn on_header(&mut self, class: u8, id: u8) -> Option<usize> {
        self.active = (class, id);
        if Self::key(class, id) == NAV_SVINFO {
            self.svinfo_declared = 0;
            self.svinfo_stored = 0;
            Some(8 + SVINFO_RECORD_LEN)
        } else {
            None
        }
    }

    /// Called on `Frame::UbxChunk`; only meaningful for NAV-SVINFO, whose
    /// per-SV records stream in one at a time.
    pub fn on_chunk(&mut self, offset: usize, data: &[u8], loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) -> Option<usize> {
        let (class, id) = self.active;
        if Self::key(class, id) != NAV_SVINFO {
            return None;
        }

        if offset == 0 {
            if data.len() < 8 + SVINFO_RECORD_LEN {
                return Some(SVINFO_RECORD_LEN);
            }
            let itow = le_u32(&data[0..4]);
            self.sync_cycle(itow, loc, sats, corr);
            sats.clear();
            self.svinfo_declared = data[4];
            self.push_record(&data[8..8 + SVINFO_RECORD_LEN], sats);
        } else {
            self.push_record(data, sats);
        }
        Some(SVINFO_RECORD_LEN)
    }

    fn push_record(&mut self, rec: &[u8], sats: &mut SatelliteTable) {
        if rec.len() < SVINFO_RECORD_LEN {
            return;
        }
        self.svinfo_stored = self.svinfo_stored.saturating_add(1);
        let Some(prn) = canonicalize_prn(rec[1]) else { return };
        let flags_byte = rec[2];
        let quality = rec[3];
        let mut flags = SatelliteFlags::empty();
        if quality >= 2 {
            flags.insert(SatelliteFlags::TRACKING);
        }
        if flags_byte & 0x01 != 0 {
            flags.insert(SatelliteFlags::NAVIGATING);
        }
        if flags_byte & 0x02 != 0 {
            flags.insert(SatelliteFlags::CORRECTION);
        }
        sats.push(SatelliteEntry { prn, elevation: rec[5] as i8 as i16, azimuth: le_i16(&rec[6..8]), snr: rec[4], flags });
    }

    /// Called on `Frame::UbxEnd`; dispatches by `(class, id)` on the full
    /// captured payload (`tail`, bounded by the 96-byte staging area).
    /// `on_ack` is invoked once for ACK-ACK/ACK-NACK, carrying the
    /// acknowledged `(class, id)` key and whether it was an ack, for the
    /// configuration driver to route.
    pub fn on_end(
        &mut self,
        class: u8,
        id: u8,
        tail: &[u8],
        loc: &mut Location,
        sats: &mut SatelliteTable,
        corr: &mut FixCorrelator,
        mut on_ack: impl FnMut(u16, bool),
    ) {
        match Self::key(class, id) {
            NAV_DOP if tail.len() >= 18 => self.on_nav_dop(tail, loc, sats, corr),
            NAV_PVT if tail.len() >= 84 => self.on_nav_pvt(tail, loc, sats, corr),
            NAV_TIMEGPS if tail.len() >= 16 => self.on_nav_timegps(tail, loc, sats, corr),
            NAV_SVINFO => {
                if self.svinfo_stored >= self.svinfo_declared {
                    corr.note(EpochMask::NAV_SVINFO);
                }
            },
            ACK_ACK if tail.len() >= 2 => on_ack(Self::key(tail[0], tail[1]), true),
            ACK_NACK if tail.len() >= 2 => on_ack(Self::key(tail[0], tail[1]), false),
            _ => {},
        }
    }

    fn on_nav_dop(&mut self, payload: &[u8], loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) {
        let itow = le_u32(&payload[0..4]);
        self.sync_cycle(itow, loc, sats, corr);
        loc.pdop = le_u16(&payload[6..8]);
        loc.vdop = le_u16(&payload[10..12]);
        loc.hdop = le_u16(&payload[12..14]);
        loc.mask.insert(LocationMask::PDOP | LocationMask::HDOP | LocationMask::VDOP);
        corr.note(EpochMask::NAV_DOP);
    }

    fn on_nav_pvt(&mut self, payload: &[u8], loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) {
        let itow = le_u32(&payload[0..4]);
        self.sync_cycle(itow, loc, sats, corr);

        let valid = payload[11];
        if valid & 0b11 == 0b11 {
            let year = le_u16(&payload[4..6]);
            loc.year = year.saturating_sub(1980) as u8;
            loc.month = payload[6];
            loc.day = payload[7];
            loc.hour = payload[8];
            loc.minute = payload[9];
            loc.second = payload[10];
            let nanos = le_i32(&payload[16..20]);
            loc.millis = if nanos < 0 { 0 } else { ((nanos + 500_000) / 1_000_000) as u16 };
            loc.mask.insert(LocationMask::TIME);
        }

        let raw_fix = payload[20];
        let quality_byte = payload[21];
        loc.fix_type = match raw_fix {
            2 => FixType::TwoD,
            3 => FixType::ThreeD,
            4 => FixType::TwoD,
            5 => FixType::Time,
            _ => FixType::None,
        };
        loc.quality = if matches!(raw_fix, 1 | 4) {
            FixQuality::Estimated
        } else if quality_byte & 0xc0 == 0xc0 {
            FixQuality::RtkFixed
        } else if quality_byte & 0x40 != 0 {
            FixQuality::RtkFloat
        } else if quality_byte & 0x03 == 0x03 {
            FixQuality::Differential
        } else if quality_byte & 0x01 != 0 {
            FixQuality::Autonomous
        } else {
            FixQuality::None
        };
        loc.num_sv = payload[23];

        loc.longitude = le_i32(&payload[24..28]);
        loc.latitude = le_i32(&payload[28..32]);
        let height_ellipsoid = le_i32(&payload[32..36]);
        let height_msl = le_i32(&payload[36..40]);
        loc.altitude = height_msl;
        loc.separation = height_ellipsoid - height_msl;
        loc.ehpe = le_u32(&payload[40..44]);
        loc.evpe = le_u32(&payload[44..48]);
        loc.climb = -le_i32(&payload[56..60]);
        loc.speed = le_u32(&payload[60..64]) as i32;
        loc.course = le_i32(&payload[64..68]);

        loc.mask.insert(
            LocationMask::POSITION
                | LocationMask::ALTITUDE
                | LocationMask::SPEED
                | LocationMask::COURSE
                | LocationMask::CLIMB
                | LocationMask::EHPE
                | LocationMask::EVPE,
        );
        corr.note(EpochMask::NAV_PVT);
    }

    fn on_nav_timegps(&mut self, payload: &[u8], loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) {
        let itow = le_u32(&payload[0..4]);
        self.sync_cycle(itow, loc, sats, corr);

        let valid = payload[11];
        if valid & 0b11 != 0b11 {
            return;
        }
        let ftow_ns = le_i32(&payload[4..8]);
        let mut week = le_i16(&payload[8..10]) as i32;
        let leap_seconds = payload[10] as i8;

        let mut tow = itow as i64 + ((ftow_ns as i64 + 500_000) / 1_000_000);
        if tow < 0 {
            tow += MILLIS_PER_WEEK;
            week -= 1;
        } else if tow >= MILLIS_PER_WEEK {
            tow -= MILLIS_PER_WEEK;
            week += 1;
        }
        let _ = (tow, week); // retained for host-visible time-of-week if ever exposed

        loc.correction = leap_seconds as i16;
        loc.mask.insert(LocationMask::CORRECTION);
        corr.note(EpochMask::NAV_TIMEGPS);
    }
}

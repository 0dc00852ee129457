//! Fix correlator (component E): the shared location record, its validity
//! mask, the fix type/quality enumerations, and the `seen`/`expected`
//! bitmask algebra that decides when a cycle has accumulated enough
//! sentences or messages to publish.

use bitflags::bitflags;

bitflags! {
    /// Which fields of [`Location`] carry a meaningful value this cycle.
    /// Cleared bits mean the corresponding field holds its zero/sentinel
    /// default when the record is handed to the host callback.
    #[derive(Default)]
    pub struct LocationMask: u32 {
        const TIME       = 1 << 0;
        const POSITION   = 1 << 1;
        const ALTITUDE   = 1 << 2;
        const SPEED      = 1 << 3;
        const COURSE     = 1 << 4;
        const CLIMB      = 1 << 5;
        const EHPE       = 1 << 6;
        const EVPE       = 1 << 7;
        const PDOP       = 1 << 8;
        const HDOP       = 1 << 9;
        const VDOP       = 1 << 10;
        const CORRECTION = 1 << 11;
    }
}

bitflags! {
    /// Bits for every sentence/message that contributes to a cycle, plus the
    /// `SOLUTION` interlock that gates the satellite publish until after the
    /// location publish. Lives alongside `expected` masks in [`FixCorrelator`].
    #[derive(Default)]
    pub struct EpochMask: u32 {
        const GGA         = 1 << 0;
        const GSA_GP      = 1 << 1;
        const GSA_GL      = 1 << 2;
        const GST         = 1 << 3;
        const RMC         = 1 << 4;
        const GSV         = 1 << 5;
        const NAV_DOP     = 1 << 6;
        const NAV_PVT     = 1 << 7;
        const NAV_TIMEGPS = 1 << 8;
        const NAV_SVINFO  = 1 << 9;
        const SOLUTION    = 1 << 10;
    }
}

/// Fix type, ordered None < Time < TwoD < ThreeD so callers can compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FixType {
    #[default]
    None,
    Time,
    TwoD,
    ThreeD,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FixQuality {
    #[default]
    None,
    Estimated,
    Autonomous,
    Differential,
    Precise,
    RtkFloat,
    RtkFixed,
}

/// Maps a raw NMEA GGA quality indicator (0..8) onto [`FixQuality`]. Values
/// 7 (manual input) and 8 (simulation) have no corresponding variant in this
/// crate's quality enumeration; both fold into `Estimated` as the closest
/// "not a live satellite fix" category.
pub fn gga_quality_from_indicator(indicator: u8) -> FixQuality {
    match indicator {
        1 => FixQuality::Autonomous,
        2 => FixQuality::Differential,
        3 => FixQuality::Precise,
        4 => FixQuality::RtkFixed,
        5 => FixQuality::RtkFloat,
        6 | 7 | 8 => FixQuality::Estimated,
        _ => FixQuality::None,
    }
}

/// DOP sentinel written into a cleared PDOP/HDOP/VDOP field on publish.
pub const DOP_SENTINEL: u16 = 9999;

/// The single shared location record, mutated field-by-field by the NMEA
/// and binary processors and snapshotted to the host on publish.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Location {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millis: u16,
    pub latitude: i32,
    pub longitude: i32,
    pub altitude: i32,
    pub separation: i32,
    pub speed: i32,
    pub course: i32,
    pub climb: i32,
    pub ehpe: u32,
    pub evpe: u32,
    pub pdop: u16,
    pub hdop: u16,
    pub vdop: u16,
    pub fix_type: FixType,
    pub quality: FixQuality,
    pub num_sv: u8,
    pub correction: i16,
    pub mask: LocationMask,
}

impl Location {
    /// Resets every field to its zero default, matching the original
    /// driver's clear-to-zero at cycle start. `fix_type`/`quality` are also
    /// reset since a new cycle has not yet established either.
    pub fn reset(&mut self) {
        *self = Location::default();
    }

    /// Applies the type-downgrade rule (spec §4.E) and fills cleared fields
    /// with their zero/sentinel default, producing the exact snapshot that
    /// should cross to the host. Called once, immediately before publish.
    fn finalize_for_publish(&mut self) {
        let retained = match self.fix_type {
            FixType::None | FixType::Time => LocationMask::TIME | LocationMask::CORRECTION,
            FixType::TwoD => LocationMask::all() & !(LocationMask::ALTITUDE | LocationMask::EVPE | LocationMask::VDOP),
            FixType::ThreeD => LocationMask::all(),
        };
        self.mask &= retained;

        if !self.mask.contains(LocationMask::TIME) {
            self.hour = 0;
            self.minute = 0;
            self.second = 0;
            self.millis = 0;
        }
        if !self.mask.contains(LocationMask::POSITION) {
            self.latitude = 0;
            self.longitude = 0;
        }
        if !self.mask.contains(LocationMask::ALTITUDE) {
            self.altitude = 0;
            self.separation = 0;
        }
        if !self.mask.contains(LocationMask::SPEED) {
            self.speed = 0;
        }
        if !self.mask.contains(LocationMask::COURSE) {
            self.course = 0;
        }
        if !self.mask.contains(LocationMask::CLIMB) {
            self.climb = 0;
        }
        if !self.mask.contains(LocationMask::EHPE) {
            self.ehpe = 0;
        }
        if !self.mask.contains(LocationMask::EVPE) {
            self.evpe = 0;
        }
        if !self.mask.contains(LocationMask::PDOP) {
            self.pdop = DOP_SENTINEL;
        }
        if !self.mask.contains(LocationMask::HDOP) {
            self.hdop = DOP_SENTINEL;
        }
        if !self.mask.contains(LocationMask::VDOP) {
            self.vdop = DOP_SENTINEL;
        }
        if !self.mask.contains(LocationMask::CORRECTION) {
            self.correction = 0;
        }
    }
}

/// Which wire protocol is currently feeding the correlator; only affects how
/// `expected_satellites` is chosen (a single GSV group vs a single SVINFO
/// frame) since fix-type/numsv assembly is already done by the time C/D
/// hand a finished cycle to [`FixCorrelator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    Nmea,
    Ubx,
}

/// Drives the `seen`/`expected` bitmask algebra. Owns no [`Location`] or
/// satellite table itself — callers pass those in so the correlator stays
/// decoupled from how either is populated.
pub struct FixCorrelator {
    mode: ProtocolMode,
    seen: EpochMask,
    expected_location: EpochMask,
    expected_satellites: EpochMask,
}

impl FixCorrelator {
    pub fn new(mode: ProtocolMode) -> Self {
        let expected_satellites = match mode {
            ProtocolMode::Nmea => EpochMask::GSV,
            ProtocolMode::Ubx => EpochMask::NAV_SVINFO,
        };
        FixCorrelator {
            mode,
            seen: EpochMask::empty(),
            expected_location: EpochMask::empty(),
            expected_satellites,
        }
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    /// Installs the steady-state expected-frame mask for the location
    /// publish, mode-dependent (set once by the config driver on reaching
    /// `Done`, adjusted afterwards by `add_expected`/`remove_expected` as
    /// talkers are observed).
    pub fn set_expected_location(&mut self, mask: EpochMask) {
        self.expected_location = mask;
    }

    pub fn add_expected(&mut self, bits: EpochMask) {
        self.expected_location.insert(bits);
    }

    pub fn remove_expected(&mut self, bits: EpochMask) {
        self.expected_location.remove(bits);
    }

    /// Starts a new cycle: clears every `seen` bit, including `SOLUTION`.
    /// Called when GGA (NMEA) or a fresh SVINFO (binary) observes a
    /// different timestamp than the cycle in progress.
    pub fn begin_cycle(&mut self) {
        self.seen = EpochMask::empty();
    }

    pub fn note(&mut self, bit: EpochMask) {
        self.seen.insert(bit);
    }

    pub fn has_seen(&self, bit: EpochMask) -> bool {
        self.seen.contains(bit)
    }

    /// If the location's contributing sentences/messages have all arrived,
    /// finalizes and publishes it, clears the relevant `seen` bits, and sets
    /// `SOLUTION` so the satellite table is allowed to publish next.
    pub fn try_publish_location(&mut self, location: &mut Location, mut publish: impl FnMut(&Location)) {
        if !self.seen.contains(self.expected_location) || self.expected_location.is_empty() {
            return;
        }
        location.finalize_for_publish();
        publish(location);
        self.seen.remove(self.expected_location);
        self.seen.insert(EpochMask::SOLUTION);
    }

    /// True exactly when the satellite table is about to publish on this
    /// call: `SOLUTION` is set and every satellite-contributing frame has
    /// arrived. Callers use this to cross-reference the GSA used-mask (or
    /// the binary SVINFO per-SV flag) against the table immediately before
    /// [`Self::try_publish_satellites`] hands it to the host.
    pub fn satellites_ready(&self) -> bool {
        self.seen.contains(EpochMask::SOLUTION) && self.seen.contains(self.expected_satellites)
    }

    /// If `SOLUTION` is set (the location for this cycle already published)
    /// and the satellite-contributing frames have all arrived, publishes the
    /// satellite table and clears those `seen` bits.
    pub fn try_publish_satellites<S>(&mut self, satellites: &S, mut publish: impl FnMut(&S)) {
        if !self.seen.contains(EpochMask::SOLUTION) {
            return;
        }
        if !self.seen.contains(self.expected_satellites) {
            return;
        }
        publish(satellites);
        self.seen.remove(self.expected_satellites);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_d_downgrade_masks_altitude_evpe_vdop() {
        let mut loc = Location {
            fix_type: FixType::TwoD,
            mask: LocationMask::all(),
            altitude: 123,
            evpe: 7,
            vdop: 42,
            pdop: 11,
            ..Default::default()
        };
        loc.finalize_for_publish();
        assert!(!loc.mask.contains(LocationMask::ALTITUDE));
        assert!(!loc.mask.contains(LocationMask::EVPE));
        assert!(!loc.mask.contains(LocationMask::VDOP));
        assert_eq!(loc.altitude, 0);
        assert_eq!(loc.vdop, DOP_SENTINEL);
        assert!(loc.mask.contains(LocationMask::PDOP));
        assert_eq!(loc.pdop, 11);
    }

    #[test]
    fn none_downgrade_keeps_only_time_and_correction() {
        let mut loc = Location {
            fix_type: FixType::None,
            mask: LocationMask::all(),
            correction: 18,
            latitude: 5,
            ..Default::default()
        };
        loc.finalize_for_publish();
        assert_eq!(loc.mask, LocationMask::TIME | LocationMask::CORRECTION);
        assert_eq!(loc.latitude, 0);
        assert_eq!(loc.correction, 18);
    }

    #[test]
    fn location_publishes_only_once_expected_mask_satisfied() {
        let mut corr = FixCorrelator::new(ProtocolMode::Nmea);
        corr.set_expected_location(EpochMask::GGA | EpochMask::RMC);
        let mut loc = Location::default();
        let mut fired = 0;

        corr.note(EpochMask::GGA);
        corr.try_publish_location(&mut loc, |_| fired += 1);
        assert_eq!(fired, 0);

        corr.note(EpochMask::RMC);
        corr.try_publish_location(&mut loc, |_| fired += 1);
        assert_eq!(fired, 1);
        assert!(corr.has_seen(EpochMask::SOLUTION));
        assert!(!corr.has_seen(EpochMask::GGA));
    }

    #[test]
    fn satellites_wait_for_solution_bit() {
        let mut corr = FixCorrelator::new(ProtocolMode::Nmea);
        corr.note(EpochMask::GSV);
        let mut fired = 0;
        corr.try_publish_satellites(&(), |_| fired += 1);
        assert_eq!(fired, 0, "must not publish satellites before SOLUTION");

        corr.note(EpochMask::SOLUTION);
        corr.try_publish_satellites(&(), |_| fired += 1);
        assert_eq!(fired, 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn location_serializes_fix_type_and_mask_as_expected_json() {
        let loc = Location {
            fix_type: FixType::ThreeD,
            quality: FixQuality::Autonomous,
            mask: LocationMask::TIME | LocationMask::POSITION,
            latitude: 480_705_633,
            longitude: 115_166_667,
            num_sv: 5,
            ..Default::default()
        };
        let actual = serde_json::to_value(&loc).unwrap();
        assert_eq!(actual["fix_type"], serde_json::json!("ThreeD"));
        assert_eq!(actual["quality"], serde_json::json!("Autonomous"));
        assert_eq!(actual["latitude"], serde_json::json!(480_705_633));
        assert_eq!(actual["num_sv"], serde_json::json!(5));

        let restored: Location = serde_json::from_value(actual).unwrap();
        assert_eq!(restored.fix_type, loc.fix_type);
        assert_eq!(restored.mask, loc.mask);
        assert_eq!(restored.latitude, loc.latitude);
    }
}

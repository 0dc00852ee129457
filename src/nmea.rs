//! NMEA sentence processor (component C): a field-sequence driven parser for
//! GGA/GSA/GST/GSV/RMC and vendor PMTK001. Each field mutates the shared
//! [`Location`]/[`SatelliteTable`] and toggles bits in the epoch correlator;
//! there is no intermediate AST, matching the byte-at-a-time style the
//! framing layer already delivers fields in.

use crate::error::FrameError;
use crate::fix::{gga_quality_from_indicator, EpochMask, FixCorrelator, FixType, Location, LocationMask};
use crate::numeric::{self, NmeaTime};
use crate::satellites::{canonicalize_prn, SatelliteEntry, SatelliteFlags, SatelliteTable};

/// Which sentence the current field sequence belongs to. `Skip` is the sink
/// state for anything unrecognized: every subsequent field of that sentence
/// is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sentence {
    Gga,
    Gsa,
    Gst,
    Gsv,
    Rmc,
    Pmtk001,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Talker {
    Gp,
    Gl,
    Gn,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GsaFix {
    None,
    TwoD,
    ThreeD,
}

/// Running state for a GSA sentence: the used-PRN mask/count (component F's
/// "used" cross-reference source) and the fix mode, both cumulative across
/// a cycle's GP/GL GSA pair and reset only when a new cycle begins.
#[derive(Debug, Default)]
struct GsaContext {
    used_mask: u128,
    used_count: u32,
    fix: Option<GsaFixState>,
}

#[derive(Debug, Clone, Copy)]
struct GsaFixState {
    fix: GsaFix,
}

impl GsaContext {
    fn reset(&mut self) {
        self.used_mask = 0;
        self.used_count = 0;
        self.fix = None;
    }

    /// Sets the used-mask bit and bumps the counter in one call, mirroring
    /// the original driver's inline bookkeeping (see `SPEC_FULL.md` §10.5)
    /// rather than computing a mask popcount separately.
    fn note_used_prn(&mut self, prn: u32) {
        if (1..=96).contains(&prn) {
            self.used_mask |= 1u128 << (prn - 1);
            self.used_count += 1;
        }
    }

    /// PRNs (1..=96) marked used by the GSA sentence(s) seen this cycle.
    fn used_prns(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=96u8).filter(move |&prn| self.used_mask & (1u128 << (prn - 1)) != 0)
    }
}

/// Running state for one GSV group (possibly several sentences).
#[derive(Debug, Default)]
struct GsvContext {
    declared_total_sentences: u8,
    current_sentence: u8,
    declared_total_svs: u16,
    quad_field: u8,
    quad_prn: Option<u8>,
    quad_elev: i16,
    quad_azim: i16,
    group_ok: bool,
    /// Total-sentences/total-SVs as declared by sentence 1 of the group;
    /// every later sentence's own declared totals must match these or the
    /// group aborts (`group_ok = false`). Survives the per-sentence reset in
    /// `start_sentence`; only cleared at a fresh cycle.
    committed_total_sentences: Option<u8>,
    committed_total_svs: Option<u16>,
}

/// Drives the field-sequence state machine. Owns no [`Location`] or
/// [`SatelliteTable`]; those are threaded through explicitly so the caller
/// (the device façade) controls their lifetime and can share them with the
/// binary processor too.
pub struct NmeaProcessor {
    sentence: Sentence,
    talker: Talker,
    field_index: u32,
    lat_pending: Option<i32>,
    lon_pending: Option<i32>,
    gst_sigma_lat: u32,
    last_time: Option<NmeaTime>,
    gsa: GsaContext,
    gsv: GsvContext,
    rmc_fix_from_gsa: GsaFix,
    rmc_time_ok: bool,
    pmtk_cmd: u16,

    /// Most recent field-level parse failure; see `FrameError`'s doc comment
    /// on why this never reaches the host.
    last_error: Option<FrameError>,
}

impl Default for NmeaProcessor {
    fn default() -> Self {
        NmeaProcessor {
            sentence: Sentence::Skip,
            talker: Talker::Other,
            field_index: 0,
            lat_pending: None,
            lon_pending: None,
            gst_sigma_lat: 0,
            last_time: None,
            gsa: GsaContext::default(),
            gsv: GsvContext::default(),
            rmc_fix_from_gsa: GsaFix::None,
            rmc_time_ok: true,
            pmtk_cmd: 0,
            last_error: None,
        }
    }
}

impl NmeaProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cross-references the GSA used-PRN mask accumulated this cycle against
    /// an already-built satellite table, setting `Navigating` on each
    /// matching entry (spec §4.E/§4.F). Called once, immediately before the
    /// satellite table is handed to the host.
    pub fn cross_reference_used(&self, sats: &mut SatelliteTable) {
        for prn in self.gsa.used_prns() {
            sats.mark_navigating(prn);
        }
    }

    /// Takes the most recent field-level parse failure, if one occurred
    /// since the last call. Internal/test-facing only, never surfaced
    /// through the public façade (`spec.md` §7).
    pub fn take_last_error(&mut self) -> Option<FrameError> {
        self.last_error.take()
    }

    fn note_invalid(&mut self, sentence: &'static str, field: &'static str) {
        self.last_error = Some(FrameError::InvalidField { sentence, field });
        #[cfg(feature = "std")]
        log::debug!("{sentence}: skipping unparseable {field} field");
    }

    fn begin_cycle(&mut self, loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) {
        corr.begin_cycle();
        loc.reset();
        sats.clear();
        self.gsa.reset();
        self.gsv = GsvContext::default();
    }

    /// Classifies the leading field of a sentence (e.g. `GPGGA`, `PMTK001`)
    /// and resets the per-sentence parse state.
    fn start_sentence(&mut self, leading: &[u8]) {
        self.field_index = 0;
        self.lat_pending = None;
        self.lon_pending = None;

        if leading == b"PMTK001" {
            self.sentence = Sentence::Pmtk001;
            self.talker = Talker::Other;
            return;
        }

        if leading.len() != 5 {
            self.sentence = Sentence::Skip;
            return;
        }
        self.talker = match &leading[0..2] {
            b"GP" => Talker::Gp,
            b"GL" => Talker::Gl,
            b"GN" => Talker::Gn,
            _ => Talker::Other,
        };
        self.sentence = match &leading[2..5] {
            b"GGA" => Sentence::Gga,
            b"GSA" => Sentence::Gsa,
            b"GST" => Sentence::Gst,
            b"GSV" => Sentence::Gsv,
            b"RMC" => Sentence::Rmc,
            _ => Sentence::Skip,
        };
        if self.sentence == Sentence::Gsv {
            let committed_total_sentences = self.gsv.committed_total_sentences;
            let committed_total_svs = self.gsv.committed_total_svs;
            self.gsv = GsvContext { group_ok: true, committed_total_sentences, committed_total_svs, ..GsvContext::default() };
        }
    }

    /// Checks the cross-sentence time-consistency rule: the first sentence
    /// in a cycle to carry a time stamp "wins" it; any later sentence in the
    /// same cycle with a different stamp starts a fresh cycle.
    fn check_time(&mut self, time: NmeaTime, loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) {
        match self.last_time {
            Some(prev) if prev != time => {
                #[cfg(feature = "std")]
                log::debug!(
                    "sentence time {:02}:{:02}:{:02}.{:03} differs from the cycle's {:02}:{:02}:{:02}.{:03}, starting a new cycle",
                    time.hour, time.minute, time.second, time.millis, prev.hour, prev.minute, prev.second, prev.millis
                );
                self.begin_cycle(loc, sats, corr);
                self.last_time = Some(time);
            },
            None => self.last_time = Some(time),
            _ => {},
        }
    }

    /// Feeds one delimited field through the current sentence's sequence.
    /// `on_pmtk_ack` is invoked once PMTK001's status field completes,
    /// carrying `(command, acked)` for the configuration driver to route.
    pub fn on_field(
        &mut self,
        field: &[u8],
        is_last: bool,
        loc: &mut Location,
        sats: &mut SatelliteTable,
        corr: &mut FixCorrelator,
        mut on_pmtk_ack: impl FnMut(u16, bool),
    ) {
        if self.field_index == 0 {
            self.start_sentence(field);
            self.field_index = 1;
            return;
        }

        let idx = self.field_index - 1;
        match self.sentence {
            Sentence::Gga => self.on_gga_field(idx, field, loc, sats, corr),
            Sentence::Gsa => self.on_gsa_field(idx, field, loc),
            Sentence::Gst => self.on_gst_field(idx, field, loc, sats, corr),
            Sentence::Gsv => self.on_gsv_field(idx, field, sats),
            Sentence::Rmc => self.on_rmc_field(idx, field, loc, sats, corr),
            Sentence::Pmtk001 => self.on_pmtk_field(idx, field, &mut on_pmtk_ack),
            Sentence::Skip => {},
        }
        self.field_index += 1;

        if is_last {
            self.on_sentence_end(loc, sats, corr, &mut on_pmtk_ack);
        }
    }

    fn on_gga_field(&mut self, idx: u32, field: &[u8], loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) {
        match idx {
            0 => {
                if let Some(time) = numeric::parse_time(field) {
                    self.check_time(time, loc, sats, corr);
                    loc.hour = time.hour;
                    loc.minute = time.minute;
                    loc.second = time.second;
                    loc.millis = time.millis;
                    loc.mask.insert(LocationMask::TIME);
                } else {
                    self.note_invalid("GGA", "time");
                }
            },
            1 => {
                if let Some(v) = numeric::parse_latitude(field) {
                    self.lat_pending = Some(v);
                } else {
                    self.note_invalid("GGA", "latitude");
                }
            },
            2 => {
                if let Some(v) = self.lat_pending {
                    let signed = if field == b"S" { -v } else { v };
                    loc.latitude = signed;
                    if self.lon_pending.is_some() {
                        loc.mask.insert(LocationMask::POSITION);
                    }
                }
            },
            3 => {
                if let Some(v) = numeric::parse_longitude(field) {
                    self.lon_pending = Some(v);
                } else {
                    self.note_invalid("GGA", "longitude");
                }
            },
            4 => {
                if let Some(v) = self.lon_pending {
                    let signed = if field == b"W" { -v } else { v };
                    loc.longitude = signed;
                    if loc.mask.contains(LocationMask::POSITION) || self.lat_pending.is_some() {
                        loc.mask.insert(LocationMask::POSITION);
                    }
                }
            },
            5 => {
                if let Some(v) = numeric::parse_unsigned(field) {
                    loc.quality = gga_quality_from_indicator(v as u8);
                } else {
                    self.note_invalid("GGA", "fix_quality");
                }
            },
            6 => {}, // number-of-SVs: elided, matching the original (numsv is sourced from GSA/PVT)
            7 => {
                if let Some(v) = numeric::parse_fixed(field, 2) {
                    loc.hdop = v as u16;
                    loc.mask.insert(LocationMask::HDOP);
                }
            },
            8 => {
                if let Some(v) = numeric::parse_fixed(field, 3) {
                    loc.altitude = v;
                    loc.mask.insert(LocationMask::ALTITUDE);
                }
            },
            9 => {}, // altitude unit, always 'M'
            10 => {
                if let Some(v) = numeric::parse_fixed(field, 3) {
                    loc.separation = v;
                }
            },
            11 => {}, // separation unit
            _ => {},  // differential age / station id: skipped
        }
    }

    fn on_gsa_field(&mut self, idx: u32, field: &[u8], loc: &mut Location) {
        match idx {
            0 => {}, // mode: manual/automatic, not carried into Location
            1 => {
                let fix = match field {
                    b"2" => GsaFix::TwoD,
                    b"3" => GsaFix::ThreeD,
                    _ => GsaFix::None,
                };
                self.gsa.fix = Some(GsaFixState { fix });
            },
            2..=13 => {
                if !field.is_empty() && field != b"00" {
                    if let Some(prn) = numeric::parse_unsigned(field) {
                        self.gsa.note_used_prn(prn);
                    }
                }
            },
            14 => {
                if let Some(v) = numeric::parse_fixed(field, 2) {
                    loc.pdop = v as u16;
                    loc.mask.insert(LocationMask::PDOP);
                } else {
                    self.note_invalid("GSA", "PDOP");
                }
            },
            15 => {
                if let Some(v) = numeric::parse_fixed(field, 2) {
                    loc.hdop = v as u16;
                    loc.mask.insert(LocationMask::HDOP);
                } else {
                    self.note_invalid("GSA", "HDOP");
                }
            },
            16 => {
                if let Some(v) = numeric::parse_fixed(field, 2) {
                    loc.vdop = v as u16;
                    loc.mask.insert(LocationMask::VDOP);
                } else {
                    self.note_invalid("GSA", "VDOP");
                }
            },
            _ => {},
        }
    }

    fn on_gst_field(&mut self, idx: u32, field: &[u8], loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) {
        match idx {
            0 => {
                if let Some(time) = numeric::parse_time(field) {
                    self.check_time(time, loc, sats, corr);
                    loc.mask.insert(LocationMask::TIME);
                }
            },
            1..=3 => {}, // rms / semi-major / semi-minor / orientation: skipped
            4 => {
                if let Some(v) = numeric::parse_fixed(field, 3) {
                    self.gst_sigma_lat = v.unsigned_abs();
                } else {
                    self.note_invalid("GST", "latitude_sigma");
                }
            },
            5 => {
                if let Some(v) = numeric::parse_fixed(field, 3) {
                    let sigma_lon = v.unsigned_abs();
                    let ehpe = numeric::isqrt(
                        self.gst_sigma_lat.saturating_mul(self.gst_sigma_lat).saturating_add(sigma_lon.saturating_mul(sigma_lon)),
                    );
                    loc.ehpe = ehpe;
                    loc.mask.insert(LocationMask::EHPE);
                }
            },
            6 => {
                if let Some(v) = numeric::parse_fixed(field, 3) {
                    loc.evpe = v.unsigned_abs();
                    loc.mask.insert(LocationMask::EVPE);
                }
            },
            _ => {},
        }
    }

    fn on_gsv_field(&mut self, idx: u32, field: &[u8], sats: &mut SatelliteTable) {
        match idx {
            0 => {
                self.gsv.declared_total_sentences = numeric::parse_unsigned(field).unwrap_or(0) as u8;
            },
            1 => {
                self.gsv.current_sentence = numeric::parse_unsigned(field).unwrap_or(0) as u8;
                if self.gsv.current_sentence == 1 {
                    self.gsv.group_ok = true;
                    self.gsv.committed_total_sentences = Some(self.gsv.declared_total_sentences);
                } else if self.gsv.committed_total_sentences != Some(self.gsv.declared_total_sentences) {
                    #[cfg(feature = "std")]
                    log::debug!("GSV: total-sentences changed mid-group, aborting group");
                    self.gsv.group_ok = false;
                }
                let expected_current = (sats.len() / 4) as u8 + 1;
                if self.gsv.current_sentence != expected_current {
                    self.gsv.group_ok = false;
                }
            },
            2 => {
                self.gsv.declared_total_svs = numeric::parse_unsigned(field).unwrap_or(0) as u16;
                if self.gsv.current_sentence == 1 {
                    self.gsv.committed_total_svs = Some(self.gsv.declared_total_svs);
                } else if self.gsv.committed_total_svs != Some(self.gsv.declared_total_svs) {
                    #[cfg(feature = "std")]
                    log::debug!("GSV: total-SVs changed mid-group, aborting group");
                    self.gsv.group_ok = false;
                }
            },
            _ => {
                let sub = (idx - 3) % 4;
                match sub {
                    0 => {
                        self.gsv.quad_prn = if field.is_empty() {
                            None
                        } else {
                            numeric::parse_unsigned(field).and_then(|v| canonicalize_prn(v as u8))
                        };
                    },
                    1 => {
                        self.gsv.quad_elev = numeric::parse_unsigned(field).unwrap_or(0) as i16;
                    },
                    2 => {
                        self.gsv.quad_azim = numeric::parse_unsigned(field).unwrap_or(0) as i16;
                    },
                    3 => {
                        if let Some(prn) = self.gsv.quad_prn {
                            let tracked = !field.is_empty();
                            let snr = if tracked { numeric::parse_unsigned(field).unwrap_or(0) as u8 } else { 0 };
                            let mut flags = SatelliteFlags::empty();
                            if tracked {
                                flags.insert(SatelliteFlags::TRACKING);
                            }
                            sats.push(SatelliteEntry { prn, elevation: self.gsv.quad_elev, azimuth: self.gsv.quad_azim, snr, flags });
                        }
                    },
                    _ => unreachable!(),
                }
            },
        }
    }

    fn on_rmc_field(&mut self, idx: u32, field: &[u8], loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator) {
        match idx {
            0 => {
                self.rmc_time_ok = true;
                if let Some(time) = numeric::parse_time(field) {
                    self.check_time(time, loc, sats, corr);
                    loc.hour = time.hour;
                    loc.minute = time.minute;
                    loc.second = time.second;
                    loc.millis = time.millis;
                    loc.mask.insert(LocationMask::TIME);
                } else {
                    self.rmc_time_ok = false;
                    self.note_invalid("RMC", "time");
                }
            },
            1 => {
                self.rmc_time_ok = self.rmc_time_ok && field == b"A";
            },
            2 => {
                if let Some(v) = numeric::parse_latitude(field) {
                    self.lat_pending = Some(v);
                } else {
                    self.note_invalid("RMC", "latitude");
                }
            },
            3 => {
                if let Some(v) = self.lat_pending {
                    loc.latitude = if field == b"S" { -v } else { v };
                }
            },
            4 => {
                if let Some(v) = numeric::parse_longitude(field) {
                    self.lon_pending = Some(v);
                } else {
                    self.note_invalid("RMC", "longitude");
                }
            },
            5 => {
                if let Some(v) = self.lon_pending {
                    loc.longitude = if field == b"W" { -v } else { v };
                    if self.lat_pending.is_some() {
                        loc.mask.insert(LocationMask::POSITION);
                    }
                }
            },
            6 => {
                if let Some(v) = numeric::parse_fixed(field, 2) {
                    loc.speed = ((v as i64) * 1852 + 1800) / 3600;
                    loc.mask.insert(LocationMask::SPEED);
                }
            },
            7 => {
                if let Some(v) = numeric::parse_fixed(field, 5) {
                    loc.course = v;
                    loc.mask.insert(LocationMask::COURSE);
                }
            },
            8 => {
                if field.len() == 6 {
                    let day = numeric::parse_unsigned(&field[0..2]).unwrap_or(0);
                    let month = numeric::parse_unsigned(&field[2..4]).unwrap_or(0);
                    let year2 = numeric::parse_unsigned(&field[4..6]).unwrap_or(0);
                    let actual_year = if year2 <= 79 { 2000 + year2 } else { 1900 + year2 };
                    loc.year = (actual_year.saturating_sub(1980)) as u8;
                    loc.month = month as u8;
                    loc.day = day as u8;
                }
            },
            _ => {}, // magnetic variation / mode indicator: skipped
        }
    }

    fn on_pmtk_field(&mut self, idx: u32, field: &[u8], on_pmtk_ack: &mut impl FnMut(u16, bool)) {
        match idx {
            0 => {
                if let Some(cmd) = numeric::parse_unsigned(field) {
                    self.pmtk_cmd = cmd as u16;
                } else {
                    self.note_invalid("PMTK001", "command");
                }
            },
            1 => {
                if let Some(status) = numeric::parse_unsigned(field) {
                    on_pmtk_ack(self.pmtk_cmd, status == 3);
                } else {
                    self.note_invalid("PMTK001", "status");
                }
            },
            _ => {},
        }
    }

    fn on_sentence_end(&mut self, loc: &mut Location, sats: &mut SatelliteTable, corr: &mut FixCorrelator, _on_pmtk_ack: &mut impl FnMut(u16, bool)) {
        match self.sentence {
            Sentence::Gga => {
                corr.note(EpochMask::GGA);
            },
            Sentence::Gsa => {
                // Talker prefix picks the GSA slot directly: 'L' is GLONASS-only,
                // 'P'/'N'/anything else is attributed to the GPS slot. A 'N' (combined)
                // talker also arms the GL slot so a cycle isn't considered complete
                // until the GLONASS GSA has been observed too.
                let bit = if self.talker == Talker::Gl { EpochMask::GSA_GL } else { EpochMask::GSA_GP };
                if self.talker == Talker::Gn {
                    corr.add_expected(EpochMask::GSA_GL);
                }
                corr.note(bit);
                if let Some(state) = self.gsa.fix {
                    self.rmc_fix_from_gsa = state.fix;
                }
                loc.num_sv = self.gsa.used_count.min(u8::MAX as u32) as u8;
            },
            Sentence::Gst => {
                corr.note(EpochMask::GST);
            },
            Sentence::Gsv => {
                if self.gsv.group_ok
                    && self.gsv.current_sentence == self.gsv.declared_total_sentences
                    && sats.len() == self.gsv.declared_total_svs as usize
                {
                    corr.note(EpochMask::GSV);
                }
            },
            Sentence::Rmc => {
                loc.fix_type = if !self.rmc_time_ok {
                    FixType::None
                } else {
                    match self.rmc_fix_from_gsa {
                        GsaFix::None => FixType::Time,
                        GsaFix::TwoD => FixType::TwoD,
                        GsaFix::ThreeD => FixType::ThreeD,
                    }
                };
                corr.note(EpochMask::RMC);
            },
            Sentence::Pmtk001 | Sentence::Skip => {},
        }
    }
}

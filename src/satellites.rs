//! Satellite tracker (component F): the bounded in-view list accumulated
//! across a GSV group or a single NAV-SVINFO frame, and the PRN
//! canonicalization that folds every constellation's on-wire numbering into
//! one disjoint range.

use bitflags::bitflags;

use crate::constants::MAX_SATELLITES;

bitflags! {
    /// Tracking/use state of one entry. `Searching` is the absence of
    /// `TRACKING`; `NAVIGATING` and `CORRECTION` are overlay bits set only
    /// once a satellite is already tracked (by a GSA/SVINFO cross-reference,
    /// not by GSV itself).
    #[derive(Default)]
    pub struct SatelliteFlags: u8 {
        const TRACKING   = 1 << 0;
        const NAVIGATING = 1 << 1;
        const CORRECTION = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SatelliteEntry {
    pub prn: u8,
    pub elevation: i16,
    pub azimuth: i16,
    pub snr: u8,
    pub flags: SatelliteFlags,
}

/// Remaps an on-wire `svid`/PRN into this crate's canonical PRN space,
/// exactly as the original driver's switch does (see `SPEC_FULL.md` §10.4).
/// Returns `None` for ids outside every documented range, which the caller
/// must silently drop rather than store.
pub fn canonicalize_prn(svid: u8) -> Option<u8> {
    match svid {
        1..=32 => Some(svid),
        33..=64 => Some(svid + 173),
        65..=96 => Some(svid),
        120..=151 => Some(svid - 87),
        152..=158 => Some(svid),
        159..=163 => Some(svid + 42),
        193..=200 => Some(svid),
        255 => Some(255),
        _ => None,
    }
}

/// Bounded, ordered accumulator for one cycle's worth of satellite entries.
/// Rebuilt from scratch every cycle; entries beyond `MAX_SATELLITES` are
/// silently dropped, matching the "excess SVs are silently dropped"
/// invariant.
#[derive(Debug, Clone)]
pub struct SatelliteTable {
    entries: [SatelliteEntry; MAX_SATELLITES],
    count: usize,
}

impl Default for SatelliteTable {
    fn default() -> Self {
        SatelliteTable { entries: [SatelliteEntry::default(); MAX_SATELLITES], count: 0 }
    }
}

impl SatelliteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn as_slice(&self) -> &[SatelliteEntry] {
        &self.entries[..self.count]
    }

    /// Appends one entry in on-wire order. No-op once the table is full.
    pub fn push(&mut self, entry: SatelliteEntry) {
        if self.count < MAX_SATELLITES {
            self.entries[self.count] = entry;
            self.count += 1;
        }
    }

    /// Sets `NAVIGATING` on the first stored entry with a matching PRN, used
    /// when cross-referencing the GSA used-mask against the GSV-built table.
    /// No-op if the PRN was never stored (e.g. it was dropped for exceeding
    /// the table cap, or never appeared in the GSV group at all).
    pub fn mark_navigating(&mut self, prn: u8) {
        if let Some(entry) = self.entries[..self.count].iter_mut().find(|e| e.prn == prn) {
            entry.flags.insert(SatelliteFlags::NAVIGATING);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_gps_range_is_unchanged() {
        assert_eq!(canonicalize_prn(1), Some(1));
        assert_eq!(canonicalize_prn(32), Some(32));
    }

    #[test]
    fn canonicalize_beidou_and_sbas_ranges() {
        assert_eq!(canonicalize_prn(33), Some(206));
        assert_eq!(canonicalize_prn(64), Some(237));
        assert_eq!(canonicalize_prn(120), Some(33));
        assert_eq!(canonicalize_prn(151), Some(64));
        assert_eq!(canonicalize_prn(159), Some(201));
        assert_eq!(canonicalize_prn(163), Some(205));
    }

    #[test]
    fn canonicalize_unmapped_id_is_dropped() {
        assert_eq!(canonicalize_prn(0), None);
        assert_eq!(canonicalize_prn(254), None);
    }

    #[test]
    fn canonicalize_glonass_range_passes_through() {
        assert_eq!(canonicalize_prn(65), Some(65));
        assert_eq!(canonicalize_prn(96), Some(96));
        assert_eq!(canonicalize_prn(255), Some(255));
    }

    #[test]
    fn table_caps_at_max_satellites_and_drops_excess() {
        let mut table = SatelliteTable::new();
        for i in 0..(MAX_SATELLITES + 5) {
            table.push(SatelliteEntry { prn: i as u8, ..Default::default() });
        }
        assert_eq!(table.len(), MAX_SATELLITES);
    }

    #[test]
    fn mark_navigating_sets_flag_on_matching_prn_only() {
        let mut table = SatelliteTable::new();
        table.push(SatelliteEntry { prn: 5, ..Default::default() });
        table.push(SatelliteEntry { prn: 9, ..Default::default() });
        table.mark_navigating(9);
        assert!(!table.as_slice()[0].flags.contains(SatelliteFlags::NAVIGATING));
        assert!(table.as_slice()[1].flags.contains(SatelliteFlags::NAVIGATING));
    }
}

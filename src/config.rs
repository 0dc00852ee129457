//! Configuration driver (component G): walks the baud-rate handshake and
//! init command table at startup, then builds and sends small runtime
//! reconfiguration tables (constellation, SBAS, QZSS, periodic power
//! management, sleep/wake) on host request. Owns no serial port itself;
//! every step hands the caller the next frame to send and waits to be told
//! what happened to it.

use crate::checksum::write_checksum;
use crate::constants::{TX_DATA_SIZE, TX_TABLE_SIZE};
use crate::error::ConfigError;
use crate::tables::{
    self, baud_command, mtk_init_table, steady_state_location_mask, ubx_init_table, GnssMode, Rate,
    CFG_13_DISABLE, CFG_13_ENABLE, CFG_GNSS_GLONASS_ENABLE, CFG_GNSS_GPS_ENABLE, CFG_GNSS_QZSS_ENABLE, CFG_RXM_CONTINUOUS,
    CFG_RXM_POWER_SAVE, CFG_SAVE, CFG_SBAS_DISABLE, CFG_SBAS_ENABLE, PMTK_RESUME, PMTK_STANDBY, RXM_PMREQ_SLEEP,
    UBX_WAKE_CONTINUOUS,
};
use crate::fix::EpochMask;

const MAX_RETRIES: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Done,
    MtkBaudRate,
    MtkInitTable,
    UbxBaudRate,
    UbxInitTable,
}

/// What the driver wants the host to do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<'a> {
    /// Send this frame and arm the retransmit timer.
    Send(&'a [u8]),
    /// The driver has reached the idle phase; no frame outstanding.
    Done,
}

#[derive(Clone, Copy)]
struct RuntimeTable {
    frames: [[u8; TX_DATA_SIZE]; TX_TABLE_SIZE],
    lens: [usize; TX_TABLE_SIZE],
    count: usize,
}

impl RuntimeTable {
    fn new() -> Self {
        RuntimeTable { frames: [[0u8; TX_DATA_SIZE]; TX_TABLE_SIZE], lens: [0; TX_TABLE_SIZE], count: 0 }
    }

    /// Copies `frame` in as the next table entry. No-op if the table is full
    /// or the frame is too large for one scratch slot; both are programmer
    /// errors in this module, not a condition runtime input can trigger.
    fn push(&mut self, frame: &[u8]) {
        if self.count >= TX_TABLE_SIZE || frame.len() > TX_DATA_SIZE {
            return;
        }
        self.frames[self.count][..frame.len()].copy_from_slice(frame);
        self.lens[self.count] = frame.len();
        self.count += 1;
    }

    fn len(&self) -> usize {
        self.count
    }

    fn frame(&self, index: usize) -> &[u8] {
        &self.frames[index][..self.lens[index]]
    }
}

#[derive(Clone, Copy)]
enum TableSource {
    Static(&'static [&'static [u8]]),
    Runtime(RuntimeTable),
}

impl TableSource {
    fn len(&self) -> usize {
        match self {
            TableSource::Static(t) => t.len(),
            TableSource::Runtime(t) => t.len(),
        }
    }

    fn frame(&self, index: usize) -> &[u8] {
        match self {
            TableSource::Static(t) => t[index],
            TableSource::Runtime(t) => t.frame(index),
        }
    }
}

/// Builds the `CFG-PM2` power-management frame the periodic command installs
/// at runtime (`spec.md` §4.G/§4.H: "a 44-byte binary payload ... the on-time
/// and update/search periods are encoded little-endian at fixed offsets").
/// `on_time_seconds == 0` requests the receiver's default cycle (1 s update,
/// 10 s search); otherwise both periods track `period_seconds`. `force`
/// selects the aggressive power-save flag once the update period is slow
/// enough (>= 10 s) to make backup-mode cycling worthwhile.
fn build_cfg_pm2(on_time_seconds: u16, period_seconds: u16, force: bool) -> [u8; 52] {
    let (update_period_ms, search_period_ms): (u32, u32) = if on_time_seconds == 0 {
        (1000, 10_000)
    } else {
        let ms = u32::from(period_seconds) * 1000;
        (ms, ms)
    };
    let flags = if on_time_seconds != 0 && update_period_ms >= 10_000 {
        if force {
            0x01
        } else {
            0x00
        }
    } else {
        0x02
    };

    let mut frame = [0u8; 52];
    frame[0] = 0xb5;
    frame[1] = 0x62;
    frame[2] = 0x06;
    frame[3] = 0x3b;
    frame[4] = 0x2c;
    frame[5] = 0x00;
    frame[6] = 0x01; // version
    frame[11] = 0x01; // flags, high half
    frame[12] = flags;
    frame[14..18].copy_from_slice(&update_period_ms.to_le_bytes());
    frame[18..22].copy_from_slice(&search_period_ms.to_le_bytes());
    frame[26..28].copy_from_slice(&on_time_seconds.to_le_bytes());
    write_checksum(&mut frame);
    frame
}

/// Drives the init handshake and any later runtime reconfiguration. Holds no
/// serial port or clock; the caller feeds back `on_ack`/`on_nack`/
/// `on_timeout` as those events occur on the wire.
pub struct ConfigDriver {
    mode: GnssMode,
    phase: Phase,
    table: Option<TableSource>,
    index: usize,
    retries: u8,
    rate: Rate,
}

impl ConfigDriver {
    pub fn new(mode: GnssMode) -> Self {
        ConfigDriver { mode, phase: Phase::Done, table: None, index: 0, retries: 0, rate: Rate::Hz1 }
    }

    pub fn mode(&self) -> GnssMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True once the table pointer is null and the phase is `Done`, i.e. the
    /// driver is idle and will accept a new runtime reconfiguration request.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done && self.table.is_none()
    }

    fn require_done(&self) -> Result<(), ConfigError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(ConfigError::NotDone)
        }
    }

    /// Starts the baud-rate handshake and init table walk for `rate`. Plain
    /// NMEA mode has no configuration driver at all and goes straight to
    /// `Done`.
    pub fn begin_init(&mut self, baud: u32, rate: Rate) -> Step<'_> {
        self.rate = rate;
        self.index = 0;
        self.retries = 0;
        self.table = None;

        if self.mode == GnssMode::Nmea {
            self.phase = Phase::Done;
            return Step::Done;
        }

        self.phase = match self.mode {
            GnssMode::MediaTek => Phase::MtkBaudRate,
            GnssMode::Ublox => Phase::UbxBaudRate,
            GnssMode::Nmea => unreachable!(),
        };

        match baud_command(self.mode, baud) {
            Some(cmd) => Step::Send(cmd),
            None => self.advance_to_init_table(),
        }
    }

    fn advance_to_init_table(&mut self) -> Step<'_> {
        self.phase = match self.mode {
            GnssMode::MediaTek => Phase::MtkInitTable,
            GnssMode::Ublox => Phase::UbxInitTable,
            GnssMode::Nmea => Phase::Done,
        };
        if self.mode == GnssMode::Nmea {
            self.table = None;
            return Step::Done;
        }
        self.table = Some(TableSource::Static(match self.mode {
            GnssMode::MediaTek => mtk_init_table(self.rate),
            GnssMode::Ublox => ubx_init_table(self.rate),
            GnssMode::Nmea => unreachable!(),
        }));
        self.index = 0;
        self.retries = 0;
        self.send_current()
    }

    fn send_current(&self) -> Step<'_> {
        match &self.table {
            Some(t) if self.index < t.len() => Step::Send(t.frame(self.index)),
            _ => Step::Done,
        }
    }

    fn finish(&mut self) -> Step<'_> {
        self.table = None;
        self.phase = Phase::Done;
        Step::Done
    }

    /// The in-flight command was accepted (PMTK ack or UBX ACK-ACK matching
    /// the outstanding class/id). Advances the table, or finishes it and
    /// installs the steady-state expected-frame mask.
    pub fn on_ack(&mut self, expected: &mut EpochMask) -> Step<'_> {
        match self.phase {
            Phase::MtkInitTable | Phase::UbxInitTable => self.advance(expected),
            _ => Step::Done,
        }
    }

    /// The in-flight command was explicitly rejected (UBX ACK-NACK). Advances
    /// the table exactly as an ack would (`spec.md` §4.G/§7: "a nack is
    /// treated as an advance"); only the retransmit timer retries a command.
    pub fn on_nack(&mut self, expected: &mut EpochMask) -> Step<'_> {
        match self.phase {
            Phase::MtkInitTable | Phase::UbxInitTable => {
                #[cfg(feature = "std")]
                log::warn!("command at table index {} nacked, advancing to the next entry", self.index);
                self.advance(expected)
            },
            _ => Step::Done,
        }
    }

    fn advance(&mut self, expected: &mut EpochMask) -> Step<'_> {
        self.index += 1;
        self.retries = 0;
        if self.table.as_ref().map(|t| self.index >= t.len()).unwrap_or(true) {
            *expected = steady_state_location_mask(self.mode);
            self.finish()
        } else {
            self.send_current()
        }
    }

    /// No ack arrived within the retransmit window (`UBX_RETRANSMIT_MILLIS`).
    /// During a baud-rate phase this instead means "the port has had time to
    /// switch speed", so it advances straight to the init table. `expected`
    /// is only ever written if giving up on the last table entry finishes
    /// the driver, mirroring [`Self::on_ack`]/[`Self::on_nack`]'s contract.
    pub fn on_timeout(&mut self, expected: &mut EpochMask) -> Step<'_> {
        match self.phase {
            Phase::MtkBaudRate | Phase::UbxBaudRate => self.advance_to_init_table(),
            Phase::MtkInitTable | Phase::UbxInitTable => self.retransmit(expected),
            Phase::Done => Step::Done,
        }
    }

    fn retransmit(&mut self, expected: &mut EpochMask) -> Step<'_> {
        if self.table.is_none() {
            return Step::Done;
        }
        if self.retries >= MAX_RETRIES {
            #[cfg(feature = "std")]
            log::warn!("giving up on table index {} after {MAX_RETRIES} retransmits", self.index);
            self.index += 1;
            self.retries = 0;
            if self.table.as_ref().map(|t| self.index >= t.len()).unwrap_or(true) {
                *expected = steady_state_location_mask(self.mode);
                return self.finish();
            }
        } else {
            self.retries += 1;
            #[cfg(feature = "std")]
            log::warn!("retransmit timeout on table index {}, retry {}/{MAX_RETRIES}", self.index, self.retries);
        }
        self.send_current()
    }

    fn start_runtime(&mut self, table: RuntimeTable) -> Result<Step<'_>, ConfigError> {
        self.require_done()?;
        self.phase = match self.mode {
            GnssMode::MediaTek => Phase::MtkInitTable,
            GnssMode::Ublox => Phase::UbxInitTable,
            GnssMode::Nmea => Phase::Done,
        };
        self.index = 0;
        self.retries = 0;
        self.table = Some(TableSource::Runtime(table));
        Ok(self.send_current())
    }

    /// Enables or disables GPS/GLONASS/QZSS and saves the result (u-blox
    /// only; no-op on other modes since they have no per-constellation
    /// command).
    pub fn set_constellation(&mut self, gps: bool, glonass: bool, qzss: bool) -> Result<Step<'_>, ConfigError> {
        self.require_done()?;
        let mut table = RuntimeTable::new();
        if self.mode == GnssMode::Ublox {
            if gps {
                table.push(&CFG_GNSS_GPS_ENABLE);
            }
            if glonass {
                table.push(&CFG_GNSS_GLONASS_ENABLE);
            }
            if qzss {
                table.push(&CFG_GNSS_QZSS_ENABLE);
            }
            table.push(&CFG_SAVE);
        }
        self.start_runtime(table)
    }

    pub fn set_sbas(&mut self, enabled: bool) -> Result<Step<'_>, ConfigError> {
        self.require_done()?;
        let mut table = RuntimeTable::new();
        if self.mode == GnssMode::Ublox {
            table.push(if enabled { &CFG_SBAS_ENABLE } else { &CFG_SBAS_DISABLE });
            table.push(&CFG_SAVE);
        }
        self.start_runtime(table)
    }

    /// `set_qzss` is folded into [`Self::set_constellation`]'s `qzss`
    /// argument at the device façade; exposed standalone here so a caller
    /// that only wants to flip QZSS doesn't have to resend GPS/GLONASS too.
    pub fn set_qzss(&mut self, enabled: bool) -> Result<Step<'_>, ConfigError> {
        self.require_done()?;
        let mut table = RuntimeTable::new();
        if self.mode == GnssMode::Ublox {
            if enabled {
                table.push(&CFG_GNSS_QZSS_ENABLE);
            }
            table.push(&CFG_SAVE);
        }
        self.start_runtime(table)
    }

    /// Installs a `CFG-PM2` power-management cycle (u-blox only; NMEA and
    /// MediaTek have no equivalent runtime knob). `on_time_seconds == 0`
    /// requests the receiver's default continuous cycle; otherwise the
    /// receiver wakes for `on_time_seconds` out of every `period_seconds`.
    /// Re-enables continuous tracking first so the command frame itself is
    /// never lost to a receiver already asleep, then re-arms power-save
    /// behind it when a cycle was actually requested.
    pub fn set_periodic(&mut self, on_time_seconds: u16, period_seconds: u16, force: bool) -> Result<Step<'_>, ConfigError> {
        self.require_done()?;
        let mut table = RuntimeTable::new();
        if self.mode == GnssMode::Ublox {
            table.push(&CFG_RXM_CONTINUOUS);
            table.push(&build_cfg_pm2(on_time_seconds, period_seconds, force));
            if on_time_seconds != 0 {
                table.push(&CFG_RXM_POWER_SAVE);
            }
            table.push(&CFG_SAVE);
        }
        self.start_runtime(table)
    }

    /// Toggles the external antenna/timing pin (u-blox `CFG-13` only).
    pub fn set_external(&mut self, enabled: bool) -> Result<Step<'_>, ConfigError> {
        self.require_done()?;
        let mut table = RuntimeTable::new();
        if self.mode == GnssMode::Ublox {
            table.push(if enabled { &CFG_13_ENABLE } else { &CFG_13_DISABLE });
            table.push(&CFG_SAVE);
        }
        self.start_runtime(table)
    }

    pub fn sleep(&mut self) -> Result<Step<'_>, ConfigError> {
        self.require_done()?;
        let mut table = RuntimeTable::new();
        match self.mode {
            GnssMode::Ublox => table.push(&RXM_PMREQ_SLEEP),
            GnssMode::MediaTek => table.push(PMTK_STANDBY),
            GnssMode::Nmea => {},
        }
        self.start_runtime(table)
    }

    pub fn wake(&mut self) -> Result<Step<'_>, ConfigError> {
        self.require_done()?;
        let mut table = RuntimeTable::new();
        match self.mode {
            GnssMode::Ublox => table.push(&UBX_WAKE_CONTINUOUS),
            GnssMode::MediaTek => table.push(PMTK_RESUME),
            GnssMode::Nmea => {},
        }
        self.start_runtime(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmea_mode_skips_the_driver_entirely() {
        let mut driver = ConfigDriver::new(GnssMode::Nmea);
        assert_eq!(driver.begin_init(9600, Rate::Hz1), Step::Done);
        assert!(driver.is_done());
    }

    #[test]
    fn ubx_init_walks_table_then_finishes_on_ack() {
        let mut driver = ConfigDriver::new(GnssMode::Ublox);
        let step = driver.begin_init(9600, Rate::Hz1);
        assert!(matches!(step, Step::Send(_)));
        assert_eq!(driver.phase(), Phase::UbxBaudRate);

        let mut expected = EpochMask::empty();
        assert!(matches!(driver.on_timeout(&mut expected), Step::Send(_)));
        assert_eq!(driver.phase(), Phase::UbxInitTable);

        let table_len = tables::ubx_init_table(Rate::Hz1).len();
        let mut expected = EpochMask::empty();
        for _ in 0..table_len - 1 {
            assert!(matches!(driver.on_ack(&mut expected), Step::Send(_)));
        }
        assert_eq!(driver.on_ack(&mut expected), Step::Done);
        assert!(driver.is_done());
        assert_eq!(expected, steady_state_location_mask(GnssMode::Ublox));
    }

    #[test]
    fn nack_advances_the_table_like_an_ack() {
        let mut driver = ConfigDriver::new(GnssMode::Ublox);
        driver.begin_init(9600, Rate::Hz1);
        let mut expected = EpochMask::empty();
        driver.on_timeout(&mut expected);
        let first = match driver.send_current() {
            Step::Send(f) => f.to_vec(),
            Step::Done => panic!("expected a frame"),
        };
        let mut expected = EpochMask::empty();
        let step = driver.on_nack(&mut expected);
        match step {
            Step::Send(f) => assert_ne!(f, &first[..], "a nack must advance past the nacked entry"),
            Step::Done => panic!("single-entry table should not be exhausted yet"),
        }
    }

    #[test]
    fn timeout_retransmits_same_entry_before_giving_up() {
        let mut driver = ConfigDriver::new(GnssMode::Ublox);
        driver.begin_init(9600, Rate::Hz1);
        let mut expected = EpochMask::empty();
        driver.on_timeout(&mut expected);
        let first = match driver.send_current() {
            Step::Send(f) => f.to_vec(),
            Step::Done => panic!("expected a frame"),
        };
        for _ in 0..MAX_RETRIES {
            let step = driver.on_timeout(&mut expected);
            match step {
                Step::Send(f) => assert_eq!(f, &first[..]),
                Step::Done => panic!("should still be retrying"),
            }
        }
        // one more timeout beyond MAX_RETRIES gives up on this entry and moves on
        let step = driver.on_timeout(&mut expected);
        if let Step::Send(f) = step {
            assert_ne!(f, &first[..]);
        }
    }

    #[test]
    fn runtime_reconfiguration_requires_idle_driver() {
        let mut driver = ConfigDriver::new(GnssMode::Ublox);
        driver.begin_init(9600, Rate::Hz1);
        assert_eq!(driver.set_sbas(true).unwrap_err(), ConfigError::NotDone);
    }

    #[test]
    fn set_periodic_re_enables_continuous_mode_before_the_built_frame() {
        let mut driver = ConfigDriver::new(GnssMode::Ublox);
        let step = driver.set_periodic(1, 2, false).expect("idle driver accepts request");
        match step {
            Step::Send(f) => assert_eq!(f, &CFG_RXM_CONTINUOUS),
            Step::Done => panic!("expected a frame"),
        }
    }

    #[test]
    fn set_periodic_builds_a_valid_checksummed_pm2_frame() {
        let mut driver = ConfigDriver::new(GnssMode::Ublox);
        driver.set_periodic(1, 2, false).expect("idle driver accepts request");
        let mut expected = EpochMask::empty();
        let frame = match driver.on_ack(&mut expected) {
            Step::Send(f) => f,
            Step::Done => panic!("expected the built PM2 frame next"),
        };
        assert_eq!(frame.len(), 52);
        assert_eq!(&frame[2..6], &[0x06, 0x3b, 0x2c, 0x00]);
        // period_seconds=2 => updatePeriod=searchPeriod=2000ms, too short for power-save (flags=0x02)
        assert_eq!(frame[12], 0x02);
        assert_eq!(&frame[14..18], &2000u32.to_le_bytes());
        assert_eq!(&frame[18..22], &2000u32.to_le_bytes());
        assert_eq!(&frame[26..28], &1u16.to_le_bytes());
    }

    #[test]
    fn set_periodic_zero_on_time_requests_the_default_cycle_and_skips_power_save() {
        let mut driver = ConfigDriver::new(GnssMode::Ublox);
        driver.set_periodic(0, 0, false).expect("idle driver accepts request");
        let mut expected = EpochMask::empty();
        let frame = match driver.on_ack(&mut expected) {
            Step::Send(f) => f,
            Step::Done => panic!("expected the built PM2 frame next"),
        };
        assert_eq!(&frame[14..18], &1000u32.to_le_bytes());
        assert_eq!(&frame[18..22], &10_000u32.to_le_bytes());
        // no power-save entry when on_time_seconds is 0: next step goes straight to CFG_SAVE
        match driver.on_ack(&mut expected) {
            Step::Send(f) => assert_eq!(f, &CFG_SAVE),
            Step::Done => panic!("expected CFG_SAVE next"),
        }
    }

    #[test]
    fn wake_sends_the_pulse_prefixed_continuous_frame() {
        let mut driver = ConfigDriver::new(GnssMode::Ublox);
        let step = driver.wake().expect("idle driver accepts request");
        match step {
            Step::Send(f) => assert_eq!(f, &UBX_WAKE_CONTINUOUS),
            Step::Done => panic!("expected a frame"),
        }
    }
}
